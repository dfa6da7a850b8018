use crate::engine::time::{format_timestamp, parse_timestamp};
use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MoodCheckin,
    RecommendationDone,
    TaskCompleted,
    HobbySession,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::MoodCheckin,
        ActivityKind::RecommendationDone,
        ActivityKind::TaskCompleted,
        ActivityKind::HobbySession,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::MoodCheckin => "mood_checkin",
            ActivityKind::RecommendationDone => "recommendation_done",
            ActivityKind::TaskCompleted => "task_completed",
            ActivityKind::HobbySession => "hobby_session",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "mood_checkin" | "mood" => Some(ActivityKind::MoodCheckin),
            "recommendation_done" | "reco" | "recommendation" => {
                Some(ActivityKind::RecommendationDone)
            }
            "task_completed" | "task" => Some(ActivityKind::TaskCompleted),
            "hobby_session" | "hobby" => Some(ActivityKind::HobbySession),
            _ => None,
        }
    }
}

/// One stored occurrence of a trackable action.
///
/// Timestamps are kept as the raw stored text so that a single unparseable row can be
/// skipped by the calculators instead of failing the whole read.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub id: i64,
    pub user_id: String,
    pub kind: ActivityKind,
    pub created_at: String,
    pub completed_at: Option<String>,
    /// Task, hobby or recommendation id the event refers to.
    pub subject_id: Option<i64>,
    /// Mood label or free-form session note.
    pub note: Option<String>,
    /// Energy level for mood check-ins, minutes for hobby sessions.
    pub quantity: Option<i64>,
    pub deleted: bool,
}

impl ActivityEvent {
    /// The instant the event counts toward a streak: completion time when present,
    /// creation time otherwise.
    pub fn occurred_at(&self) -> Result<DateTime<Utc>, EngineError> {
        let raw = self.completed_at.as_deref().unwrap_or(&self.created_at);
        parse_timestamp(raw).ok_or_else(|| EngineError::MalformedEvent {
            id: self.id,
            reason: format!("unparseable timestamp {raw:?}"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewActivityEvent {
    pub user_id: String,
    pub kind: ActivityKind,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub subject_id: Option<i64>,
    pub note: Option<String>,
    pub quantity: Option<i64>,
}

impl NewActivityEvent {
    pub fn new(user_id: &str, kind: ActivityKind, at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            created_at: at,
            completed_at: None,
            subject_id: None,
            note: None,
            quantity: None,
        }
    }

    pub fn subject(mut self, id: i64) -> Self {
        self.subject_id = Some(id);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    pub fn created_at_text(&self) -> String {
        format_timestamp(self.created_at)
    }

    pub fn completed_at_text(&self) -> Option<String> {
        self.completed_at.map(format_timestamp)
    }
}

/// Inclusive range on an event's occurred-at instant. Soft-deleted rows are always excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventPatch {
    pub deleted: Option<bool>,
}

impl EventPatch {
    pub fn soft_delete() -> Self {
        Self {
            deleted: Some(true),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Offered,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComebackChallenge {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub challenge_type: String,
    pub challenge_text: String,
    pub completed: bool,
    pub dismissed: bool,
    pub created_at: String,
}

impl ComebackChallenge {
    pub fn state(&self) -> ChallengeState {
        match (self.completed, self.dismissed) {
            (true, _) => ChallengeState::Completed,
            (false, true) => ChallengeState::Skipped,
            (false, false) => ChallengeState::Offered,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub user_id: String,
    pub challenge_type: String,
    pub challenge_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeFilter {
    All,
    Offered,
    Completed,
}

/// Trailing seven-day rollup for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub user_id: String,
    pub as_of: NaiveDate,
    pub window_start: NaiveDate,
    pub mood_logs_7d: u32,
    pub recommendations_done_7d: u32,
    pub tasks_done_7d: u32,
    pub tasks_created_7d: u32,
    pub hobby_sessions_7d: u32,
    pub hobby_minutes_7d: i64,
    #[serde(default)]
    pub skipped_records: u32,
}
