use crate::engine::model::{ActivityEvent, ActivityKind};
use crate::engine::time::DayPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub kind: ActivityKind,
    pub as_of: NaiveDate,
    pub current: u32,
    pub longest: u32,
    pub active_days: u32,
    pub last_active: Option<NaiveDate>,
}

/// Distinct calendar dates of usable events plus the number of records that were skipped
/// because their timestamp could not be read.
#[derive(Debug, Clone, Default)]
pub struct ActiveDays {
    pub days: BTreeSet<NaiveDate>,
    pub skipped: u32,
}

/// Consecutive days with activity, walking backwards from `as_of`.
///
/// `as_of` itself must have activity, otherwise the streak is 0.
pub fn compute_streak<I>(timestamps: I, as_of: NaiveDate, policy: &DayPolicy) -> u32
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let days = timestamps
        .into_iter()
        .map(|timestamp| policy.local_date(timestamp))
        .collect::<HashSet<_>>();

    run_ending_at(|date| days.contains(&date), as_of)
}

pub fn active_days(events: &[ActivityEvent], policy: &DayPolicy) -> ActiveDays {
    events
        .iter()
        .filter(|event| !event.deleted)
        .fold(ActiveDays::default(), |mut acc, event| {
            match event.occurred_at() {
                Ok(timestamp) => {
                    acc.days.insert(policy.local_date(timestamp));
                }
                Err(error) => {
                    warn!(error = %error, user_id = %event.user_id, "skipping event in streak computation");
                    acc.skipped += 1;
                }
            }
            acc
        })
}

pub fn streak_for_events(events: &[ActivityEvent], as_of: NaiveDate, policy: &DayPolicy) -> u32 {
    let usable = events
        .iter()
        .filter(|event| !event.deleted)
        .filter_map(|event| match event.occurred_at() {
            Ok(timestamp) => Some(timestamp),
            Err(error) => {
                warn!(error = %error, user_id = %event.user_id, "skipping event in streak computation");
                None
            }
        });

    compute_streak(usable, as_of, policy)
}

pub fn summarize_streak(
    kind: ActivityKind,
    events: &[ActivityEvent],
    as_of: NaiveDate,
    policy: &DayPolicy,
) -> StreakSummary {
    let ActiveDays { days, .. } = active_days(events, policy);
    let visible = days.range(..=as_of).copied().collect::<Vec<_>>();

    let longest = visible
        .iter()
        .fold((0_u32, 0_u32, None::<NaiveDate>), |(best, run, previous), day| {
            let run = match previous.and_then(|prev| prev.succ_opt()) {
                Some(expected) if expected == *day => run + 1,
                _ => 1,
            };
            (best.max(run), run, Some(*day))
        })
        .0;

    StreakSummary {
        kind,
        as_of,
        current: run_ending_at(|date| days.contains(&date), as_of),
        longest,
        active_days: visible.len() as u32,
        last_active: visible.last().copied(),
    }
}

fn run_ending_at(has_activity: impl Fn(NaiveDate) -> bool, as_of: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut cursor = Some(as_of);

    while let Some(day) = cursor.filter(|day| has_activity(*day)) {
        streak += 1;
        cursor = day.pred_opt();
    }

    streak
}
