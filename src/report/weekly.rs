use crate::engine::model::WeeklyAggregate;
use crate::engine::streak::StreakSummary;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const HOBBY_HIGHLIGHT_MINUTES: i64 = 120;
const STREAK_HIGHLIGHT_DAYS: u32 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub user_id: String,
    pub as_of: NaiveDate,
    pub window_start: NaiveDate,
    pub generated_at: String,
    pub aggregate: WeeklyAggregate,
    pub streaks: Vec<StreakLine>,
    pub streaks_saved: u32,
    pub challenges_offered: u32,
    pub saves_until_milestone: u32,
    pub challenge_waiting: bool,
    pub study_questions_7d: u32,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakLine {
    pub kind: String,
    pub current: u32,
    pub longest: u32,
    pub active_days: u32,
}

impl From<&StreakSummary> for StreakLine {
    fn from(summary: &StreakSummary) -> Self {
        Self {
            kind: summary.kind.as_str().to_string(),
            current: summary.current,
            longest: summary.longest,
            active_days: summary.active_days,
        }
    }
}

/// Inputs gathered from the engine for one student.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub aggregate: WeeklyAggregate,
    pub streaks: Vec<StreakSummary>,
    pub streaks_saved: u32,
    pub challenges_offered: u32,
    pub saves_until_milestone: u32,
    pub challenge_waiting: bool,
    pub study_questions_7d: u32,
}

#[derive(Debug)]
pub struct SavedReport {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

pub fn build_weekly_report(inputs: ReportInputs, generated_at: DateTime<Utc>) -> WeeklyReport {
    let highlights = detect_highlights(&inputs);
    let ReportInputs {
        aggregate,
        streaks,
        streaks_saved,
        challenges_offered,
        saves_until_milestone,
        challenge_waiting,
        study_questions_7d,
    } = inputs;

    WeeklyReport {
        user_id: aggregate.user_id.clone(),
        as_of: aggregate.as_of,
        window_start: aggregate.window_start,
        generated_at: generated_at.to_rfc3339(),
        streaks: streaks.iter().map(StreakLine::from).collect(),
        aggregate,
        streaks_saved,
        challenges_offered,
        saves_until_milestone,
        challenge_waiting,
        study_questions_7d,
        highlights,
    }
}

pub fn render_markdown(report: &WeeklyReport) -> String {
    let weekly = &report.aggregate;

    let streak_rows = report
        .streaks
        .iter()
        .map(|line| {
            format!(
                "| {} | {} | {} | {} |",
                kind_label(&line.kind),
                line.current,
                line.longest,
                line.active_days
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let highlight_rows = if report.highlights.is_empty() {
        "- Nothing unusual this week".to_string()
    } else {
        report
            .highlights
            .iter()
            .map(|entry| format!("- {entry}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "# Weekly Wellbeing Report - {} ({} to {})\n\n## This Week\n- Mood check-ins: {}\n- Recommendations done: {}\n- Tasks done / created: {} / {}\n- Hobby sessions: {} ({})\n- Study buddy questions: {}\n\n## Streaks\n| Activity | Current | Longest | Active days |\n|----------|---------|---------|-------------|\n{}\n\n## Comeback Challenges\n- Streaks saved: {}\n- Challenges offered: {}\n- Saves until next milestone: {}\n\n## Highlights\n{}\n",
        report.user_id,
        report.window_start,
        report.as_of,
        weekly.mood_logs_7d,
        weekly.recommendations_done_7d,
        weekly.tasks_done_7d,
        weekly.tasks_created_7d,
        weekly.hobby_sessions_7d,
        format_minutes(weekly.hobby_minutes_7d),
        report.study_questions_7d,
        streak_rows,
        report.streaks_saved,
        report.challenges_offered,
        report.saves_until_milestone,
        highlight_rows
    )
}

/// Writes `<report_dir>/<user>/<as_of>.{md,json}`.
pub fn save_report_files(report: &WeeklyReport, report_dir: &Path) -> Result<SavedReport> {
    let user_dir = report_dir.join(path_safe(&report.user_id));
    fs::create_dir_all(&user_dir).with_context(|| {
        format!("Failed to create report directory: {}", user_dir.display())
    })?;

    let date = report.as_of.format("%Y-%m-%d").to_string();
    let markdown_path = user_dir.join(format!("{date}.md"));
    let json_path = user_dir.join(format!("{date}.json"));

    fs::write(&markdown_path, render_markdown(report)).with_context(|| {
        format!(
            "Failed to write Markdown report: {}",
            markdown_path.display()
        )
    })?;

    let json_content =
        serde_json::to_string_pretty(report).context("Failed to serialize report JSON")?;
    fs::write(&json_path, json_content)
        .with_context(|| format!("Failed to write JSON report: {}", json_path.display()))?;

    Ok(SavedReport {
        markdown_path,
        json_path,
    })
}

fn detect_highlights(inputs: &ReportInputs) -> Vec<String> {
    let weekly = &inputs.aggregate;

    let no_mood = (weekly.mood_logs_7d == 0)
        .then_some("No mood check-ins this week".to_string());

    let stalled_tasks = (weekly.tasks_created_7d > 0 && weekly.tasks_done_7d == 0).then_some(
        format!(
            "{} task(s) created but none completed",
            weekly.tasks_created_7d
        ),
    );

    let long_streak = inputs
        .streaks
        .iter()
        .find(|summary| summary.current >= STREAK_HIGHLIGHT_DAYS)
        .map(|summary| {
            format!(
                "{} streak is at {} days",
                kind_label(summary.kind.as_str()),
                summary.current
            )
        });

    let hobby_time = (weekly.hobby_minutes_7d >= HOBBY_HIGHLIGHT_MINUTES).then_some(format!(
        "Hobby time reached {}",
        format_minutes(weekly.hobby_minutes_7d)
    ));

    let waiting = inputs
        .challenge_waiting
        .then_some("A comeback challenge is waiting".to_string());

    let skipped = (weekly.skipped_records > 0).then_some(format!(
        "{} record(s) had unreadable timestamps and were left out",
        weekly.skipped_records
    ));

    [no_mood, stalled_tasks, long_streak, hobby_time, waiting, skipped]
        .into_iter()
        .flatten()
        .collect()
}

fn kind_label(kind: &str) -> &'static str {
    match kind {
        "mood_checkin" => "Mood check-in",
        "recommendation_done" => "Recommendation",
        "task_completed" => "Task",
        "hobby_session" => "Hobby",
        _ => "Other",
    }
}

fn path_safe(user_id: &str) -> String {
    user_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    let hours = minutes / 60;
    let remain = minutes % 60;

    if hours > 0 {
        if remain == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {remain}m")
        }
    } else {
        format!("{remain}m")
    }
}
