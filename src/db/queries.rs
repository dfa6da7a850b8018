pub const CREATE_ACTIVITY_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS activity_events (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      TEXT NOT NULL,
  kind         TEXT NOT NULL,
  created_at   TEXT NOT NULL,
  completed_at TEXT,
  subject_id   INTEGER,
  note         TEXT,
  quantity     INTEGER,
  deleted      INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      TEXT NOT NULL,
  title        TEXT NOT NULL,
  category     TEXT NOT NULL DEFAULT 'other',
  priority     TEXT NOT NULL DEFAULT 'medium',
  due_date     TEXT,
  status       TEXT NOT NULL DEFAULT 'pending',
  created_at   TEXT NOT NULL,
  completed_at TEXT,
  deleted      INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_HOBBIES: &str = r#"
CREATE TABLE IF NOT EXISTS hobbies (
  id                 INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id            TEXT NOT NULL,
  name               TEXT NOT NULL,
  sessions_per_week  INTEGER NOT NULL DEFAULT 3,
  minutes_per_session INTEGER NOT NULL DEFAULT 20,
  created_at         TEXT NOT NULL,
  deleted            INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_COMEBACK_CHALLENGES: &str = r#"
CREATE TABLE IF NOT EXISTS comeback_challenges (
  id             INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id        TEXT NOT NULL,
  challenge_type TEXT NOT NULL,
  challenge_text TEXT NOT NULL,
  completed      INTEGER NOT NULL DEFAULT 0,
  dismissed      INTEGER NOT NULL DEFAULT 0,
  created_at     TEXT NOT NULL
);
"#;

pub const CREATE_WEEKLY_SNAPSHOTS: &str = r#"
CREATE TABLE IF NOT EXISTS weekly_snapshots (
  user_id  TEXT PRIMARY KEY,
  as_of    TEXT NOT NULL,
  payload  TEXT NOT NULL
);
"#;

pub const CREATE_REPORTS: &str = r#"
CREATE TABLE IF NOT EXISTS reports (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id      TEXT NOT NULL,
  date         TEXT NOT NULL,
  generated_at INTEGER NOT NULL,
  md_path      TEXT NOT NULL,
  json_path    TEXT NOT NULL,
  UNIQUE(user_id, date)
);
"#;

pub const CREATE_STUDY_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS study_sessions (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id    TEXT NOT NULL,
  question   TEXT NOT NULL,
  answer     TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;

pub const INDEX_EVENTS_USER_KIND: &str =
    "CREATE INDEX IF NOT EXISTS idx_activity_events_user_kind ON activity_events(user_id, kind);";

pub const INDEX_TASKS_USER_STATUS: &str =
    "CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status);";

pub const INDEX_CHALLENGES_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_comeback_challenges_user ON comeback_challenges(user_id);";

pub const INDEX_REPORTS_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_date ON reports(date);";

pub const INDEX_STUDY_SESSIONS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_study_sessions_user ON study_sessions(user_id, created_at);";

pub const TASK_COLUMNS: &str =
    "id, user_id, title, category, priority, due_date, status, created_at, completed_at";

pub const HOBBY_COLUMNS: &str =
    "id, user_id, name, sessions_per_week, minutes_per_session, created_at";

pub const EVENT_COLUMNS: &str =
    "id, user_id, kind, created_at, completed_at, subject_id, note, quantity, deleted";

pub const CHALLENGE_COLUMNS: &str =
    "id, user_id, challenge_type, challenge_text, completed, dismissed, created_at";

pub const REPORT_COLUMNS: &str = "id, user_id, date, generated_at, md_path, json_path";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_ACTIVITY_EVENTS,
        CREATE_TASKS,
        CREATE_HOBBIES,
        CREATE_COMEBACK_CHALLENGES,
        CREATE_WEEKLY_SNAPSHOTS,
        CREATE_REPORTS,
        CREATE_STUDY_SESSIONS,
        INDEX_EVENTS_USER_KIND,
        INDEX_TASKS_USER_STATUS,
        INDEX_CHALLENGES_USER,
        INDEX_REPORTS_DATE,
        INDEX_STUDY_SESSIONS_USER,
    ]
}
