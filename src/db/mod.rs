pub mod queries;
mod store;

use crate::engine::model::ActivityKind;
use crate::engine::time::format_timestamp;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use queries::{HOBBY_COLUMNS, REPORT_COLUMNS, TASK_COLUMNS};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_SESSIONS_PER_WEEK: i64 = 3;
pub const DEFAULT_MINUTES_PER_SESSION: i64 = 20;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Academic,
    PersonalDev,
    Wellbeing,
    #[default]
    Other,
}

impl TaskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Academic => "academic",
            TaskCategory::PersonalDev => "personal_dev",
            TaskCategory::Wellbeing => "wellbeing",
            TaskCategory::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "academic" | "study" => Some(TaskCategory::Academic),
            "personal_dev" | "personal" => Some(TaskCategory::PersonalDev),
            "wellbeing" => Some(TaskCategory::Wellbeing),
            "other" => Some(TaskCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" | "med" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

/// Ordering for the completed-task listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedSort {
    #[default]
    CompletedDesc,
    CompletedAsc,
    DueAsc,
    DueDesc,
    TitleAsc,
    TitleDesc,
}

impl CompletedSort {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "completed_desc" | "newest" => Some(CompletedSort::CompletedDesc),
            "completed_asc" | "oldest" => Some(CompletedSort::CompletedAsc),
            "due_asc" => Some(CompletedSort::DueAsc),
            "due_desc" => Some(CompletedSort::DueDesc),
            "title_asc" => Some(CompletedSort::TitleAsc),
            "title_desc" => Some(CompletedSort::TitleDesc),
            _ => None,
        }
    }

    fn order_clause(self) -> &'static str {
        match self {
            CompletedSort::CompletedDesc => "completed_at DESC, id DESC",
            CompletedSort::CompletedAsc => "completed_at ASC, id ASC",
            CompletedSort::DueAsc => "due_date IS NULL, due_date ASC, id ASC",
            CompletedSort::DueDesc => "due_date IS NULL, due_date DESC, id DESC",
            CompletedSort::TitleAsc => "title COLLATE NOCASE ASC, id ASC",
            CompletedSort::TitleDesc => "title COLLATE NOCASE DESC, id DESC",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub category: TaskCategory,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: TaskCategory::default(),
            priority: TaskPriority::default(),
            due_date: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletedTaskQuery {
    pub search: Option<String>,
    pub category: Option<TaskCategory>,
    pub priority: Option<TaskPriority>,
    pub completed_from: Option<DateTime<Utc>>,
    pub completed_to: Option<DateTime<Utc>>,
    pub sort: CompletedSort,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl Default for CompletedTaskQuery {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            priority: None,
            completed_from: None,
            completed_to: None,
            sort: CompletedSort::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedTaskPage {
    pub total: u32,
    pub page: u32,
    pub page_size: u32,
    pub tasks: Vec<TaskRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HobbyRow {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub sessions_per_week: i64,
    pub minutes_per_session: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHobby {
    pub name: String,
    #[serde(default)]
    pub sessions_per_week: Option<i64>,
    #[serde(default)]
    pub minutes_per_session: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetaRow {
    pub id: i64,
    pub user_id: String,
    pub date: String,
    pub generated_at: i64,
    pub md_path: String,
    pub json_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudySessionRow {
    pub id: i64,
    pub user_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    /// Every user id that owns at least one stored record.
    pub fn known_users(&self) -> Result<Vec<String>> {
        let mut statement = self.conn.prepare(
            "SELECT user_id FROM activity_events
             UNION SELECT user_id FROM tasks
             UNION SELECT user_id FROM hobbies
             UNION SELECT user_id FROM comeback_challenges
             UNION SELECT user_id FROM study_sessions
             ORDER BY 1",
        )?;

        let users = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to list users")?;

        Ok(users)
    }

    pub fn create_task(&self, user_id: &str, task: &NewTask, now: DateTime<Utc>) -> Result<TaskRow> {
        let title = task.title.trim();
        if title.is_empty() {
            bail!("task title must not be empty");
        }

        self.conn
            .execute(
                "INSERT INTO tasks (user_id, title, category, priority, due_date, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
                params![
                    user_id,
                    title,
                    task.category.as_str(),
                    task.priority.as_str(),
                    task.due_date.map(|date| date.format("%Y-%m-%d").to_string()),
                    format_timestamp(now),
                ],
            )
            .context("Failed to insert task")?;

        let id = self.conn.last_insert_rowid();
        self.task(user_id, id)?
            .context("Inserted task could not be read back")
    }

    pub fn task(&self, user_id: &str, id: i64) -> Result<Option<TaskRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2 AND deleted = 0"
                ),
                params![id, user_id],
                task_from_row,
            )
            .optional()
            .context("Failed to load task")?;

        Ok(row)
    }

    /// Open tasks, earliest due date first; tasks without a due date lead.
    pub fn pending_tasks(&self, user_id: &str) -> Result<Vec<TaskRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS}
             FROM tasks
             WHERE user_id = ?1 AND status = 'pending' AND deleted = 0
             ORDER BY due_date IS NOT NULL, due_date ASC, id ASC"
        ))?;

        let rows = statement
            .query_map(params![user_id], task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query pending tasks")?;

        Ok(rows)
    }

    /// Every live task of the user, pending or done, created inside the optional bounds.
    pub fn tasks_created_between(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS}
             FROM tasks
             WHERE user_id = ?1 AND deleted = 0
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)
             ORDER BY created_at ASC, id ASC"
        ))?;

        let rows = statement
            .query_map(
                params![user_id, from.map(format_timestamp), to.map(format_timestamp)],
                task_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query tasks")?;

        Ok(rows)
    }

    pub fn completed_tasks(
        &self,
        user_id: &str,
        query: &CompletedTaskQuery,
    ) -> Result<CompletedTaskPage> {
        let mut clauses = vec![
            "user_id = ?".to_string(),
            "status = 'done'".to_string(),
            "deleted = 0".to_string(),
        ];
        let mut values = vec![Value::Text(user_id.to_string())];

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("LOWER(title) LIKE ? ESCAPE '\\'".to_string());
            values.push(Value::Text(format!("%{}%", escape_like(&search.to_lowercase()))));
        }
        if let Some(category) = query.category {
            clauses.push("category = ?".to_string());
            values.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(priority) = query.priority {
            clauses.push("priority = ?".to_string());
            values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(from) = query.completed_from {
            clauses.push("completed_at >= ?".to_string());
            values.push(Value::Text(format_timestamp(from)));
        }
        if let Some(to) = query.completed_to {
            clauses.push("completed_at <= ?".to_string());
            values.push(Value::Text(format_timestamp(to)));
        }

        let where_clause = clauses.join(" AND ");
        let total: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM tasks WHERE {where_clause}"),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .context("Failed to count completed tasks")?;

        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut page_values = values.clone();
        page_values.push(Value::Integer(i64::from(page_size)));
        page_values.push(Value::Integer(i64::from(page - 1) * i64::from(page_size)));

        let mut statement = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {where_clause} ORDER BY {} LIMIT ? OFFSET ?",
            query.sort.order_clause()
        ))?;
        let tasks = statement
            .query_map(params_from_iter(page_values.iter()), task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query completed tasks")?;

        Ok(CompletedTaskPage {
            total: total as u32,
            page,
            page_size,
            tasks,
        })
    }

    pub fn completed_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tasks
                 WHERE user_id = ?1 AND status = 'done' AND deleted = 0
                   AND completed_at >= ?2 AND completed_at <= ?3",
                params![user_id, format_timestamp(from), format_timestamp(to)],
                |row| row.get(0),
            )
            .context("Failed to count completed tasks")?;

        Ok(count as u32)
    }

    /// Puts a done task back to pending and retracts its completion events.
    pub fn restore_task(&mut self, user_id: &str, id: i64) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let restored = transaction
            .execute(
                "UPDATE tasks SET status = 'pending', completed_at = NULL
                 WHERE id = ?1 AND user_id = ?2 AND status = 'done' AND deleted = 0",
                params![id, user_id],
            )
            .context("Failed to restore task")?;
        if restored == 0 {
            return Ok(false);
        }

        retract_completions(&transaction, user_id, id)?;
        transaction.commit().context("Failed to commit task restore")?;
        Ok(true)
    }

    pub fn delete_task(&mut self, user_id: &str, id: i64) -> Result<bool> {
        let transaction = self
            .conn
            .transaction()
            .context("Failed to start transaction")?;

        let deleted = transaction
            .execute(
                "UPDATE tasks SET deleted = 1 WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
                params![id, user_id],
            )
            .context("Failed to delete task")?;
        if deleted == 0 {
            return Ok(false);
        }

        retract_completions(&transaction, user_id, id)?;
        transaction.commit().context("Failed to commit task delete")?;
        Ok(true)
    }

    pub fn create_hobby(
        &self,
        user_id: &str,
        hobby: &NewHobby,
        now: DateTime<Utc>,
    ) -> Result<HobbyRow> {
        let name = hobby.name.trim();
        if name.is_empty() {
            bail!("hobby name must not be empty");
        }
        let sessions = hobby.sessions_per_week.unwrap_or(DEFAULT_SESSIONS_PER_WEEK);
        let minutes = hobby.minutes_per_session.unwrap_or(DEFAULT_MINUTES_PER_SESSION);
        if sessions < 1 || minutes < 1 {
            bail!("hobby targets must be positive");
        }

        self.conn
            .execute(
                "INSERT INTO hobbies (user_id, name, sessions_per_week, minutes_per_session, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, name, sessions, minutes, format_timestamp(now)],
            )
            .context("Failed to insert hobby")?;

        let id = self.conn.last_insert_rowid();
        self.hobby(user_id, id)?
            .context("Inserted hobby could not be read back")
    }

    pub fn hobby(&self, user_id: &str, id: i64) -> Result<Option<HobbyRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {HOBBY_COLUMNS} FROM hobbies WHERE id = ?1 AND user_id = ?2 AND deleted = 0"
                ),
                params![id, user_id],
                hobby_from_row,
            )
            .optional()
            .context("Failed to load hobby")?;

        Ok(row)
    }

    pub fn hobbies(&self, user_id: &str) -> Result<Vec<HobbyRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {HOBBY_COLUMNS} FROM hobbies WHERE user_id = ?1 AND deleted = 0 ORDER BY id ASC"
        ))?;

        let rows = statement
            .query_map(params![user_id], hobby_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query hobbies")?;

        Ok(rows)
    }

    pub fn delete_hobby(&self, user_id: &str, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "UPDATE hobbies SET deleted = 1 WHERE id = ?1 AND user_id = ?2 AND deleted = 0",
                params![id, user_id],
            )
            .context("Failed to delete hobby")?;

        Ok(deleted > 0)
    }

    pub fn report_meta(&self, user_id: &str, date: NaiveDate) -> Result<Option<ReportMetaRow>> {
        let date_str = date.format("%Y-%m-%d").to_string();
        let row = self
            .conn
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE user_id = ?1 AND date = ?2"),
                params![user_id, date_str],
                report_from_row,
            )
            .optional()
            .context("Failed to load report metadata")?;

        Ok(row)
    }

    pub fn list_reports(&self, user_id: &str, limit: usize) -> Result<Vec<ReportMetaRow>> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS}
             FROM reports
             WHERE user_id = ?1
             ORDER BY date DESC
             LIMIT ?2"
        ))?;

        let rows = statement
            .query_map(params![user_id, limit as i64], report_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list reports")?;

        Ok(rows)
    }

    pub fn upsert_report_meta(
        &self,
        user_id: &str,
        date: NaiveDate,
        generated_at: i64,
        md_path: &str,
        json_path: &str,
    ) -> Result<()> {
        let date_str = date.format("%Y-%m-%d").to_string();
        self.conn
            .execute(
                "INSERT INTO reports (user_id, date, generated_at, md_path, json_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, date)
                 DO UPDATE SET generated_at=excluded.generated_at, md_path=excluded.md_path, json_path=excluded.json_path",
                params![user_id, date_str, generated_at, md_path, json_path],
            )
            .context("Failed to upsert report metadata")?;

        Ok(())
    }

    pub fn insert_study_session(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO study_sessions (user_id, question, answer, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, question, answer, format_timestamp(now)],
            )
            .context("Failed to insert study session")?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn recent_study_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<StudySessionRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, user_id, question, answer, created_at
             FROM study_sessions
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = statement
            .query_map(params![user_id, limit as i64], |row| {
                Ok(StudySessionRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    question: row.get(2)?,
                    answer: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query study sessions")?;

        Ok(rows)
    }

    pub fn study_question_count(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<u32> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM study_sessions
                 WHERE user_id = ?1
                   AND (?2 IS NULL OR created_at >= ?2)
                   AND (?3 IS NULL OR created_at <= ?3)",
                params![
                    user_id,
                    from.map(format_timestamp),
                    to.map(format_timestamp)
                ],
                |row| row.get(0),
            )
            .context("Failed to count study sessions")?;

        Ok(count as u32)
    }
}

fn retract_completions(
    transaction: &rusqlite::Transaction<'_>,
    user_id: &str,
    task_id: i64,
) -> Result<()> {
    transaction
        .execute(
            "UPDATE activity_events SET deleted = 1
             WHERE user_id = ?1 AND kind = ?2 AND subject_id = ?3 AND deleted = 0",
            params![user_id, ActivityKind::TaskCompleted.as_str(), task_id],
        )
        .context("Failed to retract task completion events")?;

    Ok(())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    let category: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;

    Ok(TaskRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        category: TaskCategory::parse(&category).unwrap_or_default(),
        priority: TaskPriority::parse(&priority).unwrap_or_default(),
        due_date: due_date.and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok()),
        status: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

fn hobby_from_row(row: &Row<'_>) -> rusqlite::Result<HobbyRow> {
    Ok(HobbyRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        sessions_per_week: row.get(3)?,
        minutes_per_session: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportMetaRow> {
    Ok(ReportMetaRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        generated_at: row.get(3)?,
        md_path: row.get(4)?,
        json_path: row.get(5)?,
    })
}
