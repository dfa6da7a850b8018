use crate::engine::model::{ActivityEvent, ActivityKind, WeeklyAggregate};
use crate::engine::time::{DayPolicy, parse_timestamp};
use chrono::{Duration, NaiveDate};
use tracing::warn;

pub const WINDOW_DAYS: i64 = 7;

/// First calendar date of the trailing window ending at `as_of` (inclusive on both ends).
pub fn window_start(as_of: NaiveDate) -> NaiveDate {
    as_of - Duration::days(WINDOW_DAYS - 1)
}

/// Full rescan of the trailing seven days. Counts use the event's occurred-at instant,
/// `tasks_created_7d` uses task creation timestamps.
pub fn compute_weekly_aggregate(
    user_id: &str,
    events: &[ActivityEvent],
    task_creations: &[String],
    as_of: NaiveDate,
    policy: &DayPolicy,
) -> WeeklyAggregate {
    let start = window_start(as_of);
    let in_window = |date: NaiveDate| date >= start && date <= as_of;

    let mut aggregate = WeeklyAggregate {
        user_id: user_id.to_string(),
        as_of,
        window_start: start,
        mood_logs_7d: 0,
        recommendations_done_7d: 0,
        tasks_done_7d: 0,
        tasks_created_7d: 0,
        hobby_sessions_7d: 0,
        hobby_minutes_7d: 0,
        skipped_records: 0,
    };

    for event in events.iter().filter(|event| !event.deleted && event.user_id == user_id) {
        let occurred_at = match event.occurred_at() {
            Ok(timestamp) => timestamp,
            Err(error) => {
                warn!(error = %error, user_id, "skipping event in weekly aggregate");
                aggregate.skipped_records += 1;
                continue;
            }
        };

        if !in_window(policy.local_date(occurred_at)) {
            continue;
        }

        match event.kind {
            ActivityKind::MoodCheckin => aggregate.mood_logs_7d += 1,
            ActivityKind::RecommendationDone => aggregate.recommendations_done_7d += 1,
            ActivityKind::TaskCompleted => aggregate.tasks_done_7d += 1,
            ActivityKind::HobbySession => {
                aggregate.hobby_sessions_7d += 1;
                aggregate.hobby_minutes_7d += event.quantity.unwrap_or_default().max(0);
            }
        }
    }

    for raw in task_creations {
        match parse_timestamp(raw) {
            Some(created_at) if in_window(policy.local_date(created_at)) => {
                aggregate.tasks_created_7d += 1;
            }
            Some(_) => {}
            None => {
                warn!(user_id, raw = %raw, "skipping task with unreadable creation time");
                aggregate.skipped_records += 1;
            }
        }
    }

    aggregate
}
