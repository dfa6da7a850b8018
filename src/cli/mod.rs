pub mod onboard;

use crate::db::{CompletedSort, TaskCategory, TaskPriority};
use crate::recommend::MoodLabel;
use crate::tracker::CHALLENGE_HISTORY_LIMIT;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mindtrack",
    about = "Student wellbeing tracker: mood check-ins, streaks, comeback challenges & weekly reports"
)]
pub struct Cli {
    /// Student id; falls back to `default_user` from the config.
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Onboard,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    Doctor,
    Dashboard,
    Mood {
        #[command(subcommand)]
        command: MoodCommands,
    },
    Reco {
        #[command(subcommand)]
        command: RecoCommands,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    Hobby {
        #[command(subcommand)]
        command: HobbyCommands,
    },
    Streak,
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },
    Report {
        /// As-of date (YYYY-MM-DD); defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Generate for every known student instead of one.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    Teacher {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },
    Ask {
        question: String,
    },
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
    Serve,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum MoodCommands {
    Log {
        #[arg(value_parser = parse_mood)]
        mood: MoodLabel,
        energy: u8,
    },
    Another {
        #[arg(value_parser = parse_mood)]
        mood: MoodLabel,
        energy: u8,
        #[arg(long)]
        current: Option<i64>,
    },
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Retract a check-in by the id shown in `mood history`.
    Delete {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum RecoCommands {
    List {
        #[arg(long, value_parser = parse_mood)]
        mood: Option<MoodLabel>,
    },
    Done {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    Add {
        title: String,
        #[arg(long, value_parser = parse_category, default_value = "other")]
        category: TaskCategory,
        #[arg(long, value_parser = parse_priority, default_value = "medium")]
        priority: TaskPriority,
        #[arg(long, value_parser = parse_date)]
        due: Option<NaiveDate>,
    },
    List,
    Done {
        id: i64,
        /// Backdate the completion to this day (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        on: Option<NaiveDate>,
    },
    Restore {
        id: i64,
    },
    Delete {
        id: i64,
    },
    Completed {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_category)]
        category: Option<TaskCategory>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TaskPriority>,
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
        #[arg(long, value_parser = parse_sort)]
        sort: Option<CompletedSort>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    Counts,
}

#[derive(Debug, Subcommand)]
pub enum HobbyCommands {
    Add {
        name: String,
        #[arg(long)]
        sessions_per_week: Option<i64>,
        #[arg(long)]
        minutes_per_session: Option<i64>,
    },
    List,
    Delete {
        id: i64,
    },
    Log {
        id: i64,
        #[arg(long)]
        minutes: Option<i64>,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ChallengeCommands {
    Show,
    Accept { id: i64 },
    Skip { id: i64 },
    History {
        #[arg(long, default_value_t = CHALLENGE_HISTORY_LIMIT)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date `{raw}`, expected YYYY-MM-DD"))
}

fn parse_mood(raw: &str) -> Result<MoodLabel, String> {
    MoodLabel::parse(raw).ok_or_else(|| {
        let allowed = MoodLabel::ALL
            .iter()
            .map(|label| label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown mood `{raw}`, expected one of: {allowed}")
    })
}

fn parse_category(raw: &str) -> Result<TaskCategory, String> {
    TaskCategory::parse(raw).ok_or_else(|| {
        format!("unknown category `{raw}`, expected academic, personal_dev, wellbeing or other")
    })
}

fn parse_priority(raw: &str) -> Result<TaskPriority, String> {
    TaskPriority::parse(raw)
        .ok_or_else(|| format!("unknown priority `{raw}`, expected low, medium or high"))
}

fn parse_sort(raw: &str) -> Result<CompletedSort, String> {
    CompletedSort::parse(raw).ok_or_else(|| {
        format!(
            "unknown sort `{raw}`, expected completed_desc, completed_asc, due_asc, due_desc, title_asc or title_desc"
        )
    })
}
