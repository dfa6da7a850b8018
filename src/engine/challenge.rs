use crate::engine::model::{ActivityEvent, ComebackChallenge};
use crate::engine::streak::{active_days, compute_streak};
use crate::engine::time::{DayPolicy, parse_timestamp};
use crate::error::EngineError;
use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CHALLENGE_TYPE_TASK: &str = "task";
pub const SAVE_MILESTONE: u32 = 10;

pub const RECOVERY_PROMPTS: [&str; 5] = [
    "Do 5 deep breaths and refocus.",
    "Write down one thing you're grateful for.",
    "Stand up and stretch for 2 minutes.",
    "Quick win: Tidy your desk for 3 minutes.",
    "Think of one small goal for tomorrow.",
];

/// Source of uniform choices. Injected so selection can be pinned in tests.
pub trait RandomSource {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

pub struct SystemRandom {
    rng: StdRng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }
}

pub fn choose_prompt(random: &mut impl RandomSource) -> &'static str {
    let index = random.pick(RECOVERY_PROMPTS.len()) % RECOVERY_PROMPTS.len();
    RECOVERY_PROMPTS[index]
}

/// When a task completion should produce a comeback offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComebackTrigger {
    /// Task streak anchored at today evaluates to 0 right after the completion is recorded.
    #[default]
    ZeroStreak,
    /// First completion of today, with earlier completions on record but none yesterday.
    ChainBreak,
}

impl ComebackTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            ComebackTrigger::ZeroStreak => "zero_streak",
            ComebackTrigger::ChainBreak => "chain_break",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "zero_streak" | "zero" => Some(ComebackTrigger::ZeroStreak),
            "chain_break" | "break" => Some(ComebackTrigger::ChainBreak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCheck {
    pub streak: u32,
    pub offer: bool,
}

/// Evaluates the trigger over every task-completion event of the user, including the one
/// that was just recorded.
pub fn evaluate_trigger(
    trigger: ComebackTrigger,
    completions: &[ActivityEvent],
    today: NaiveDate,
    policy: &DayPolicy,
) -> TriggerCheck {
    let timestamps = usable_timestamps(completions);
    let streak = compute_streak(timestamps.iter().copied(), today, policy);

    let offer = match trigger {
        ComebackTrigger::ZeroStreak => streak == 0,
        ComebackTrigger::ChainBreak => {
            let completions_today = timestamps
                .iter()
                .filter(|timestamp| policy.local_date(**timestamp) == today)
                .count();
            let earlier_days = active_days(completions, policy)
                .days
                .range(..today)
                .count();
            let yesterday_streak = today
                .pred_opt()
                .map(|yesterday| compute_streak(timestamps.iter().copied(), yesterday, policy))
                .unwrap_or_default();

            completions_today == 1 && earlier_days > 0 && yesterday_streak == 0
        }
    };

    TriggerCheck { streak, offer }
}

/// Picks the single offer to surface. Several open offers should never exist; if they do the
/// most recently created one wins and the conflict is logged.
pub fn resolve_active(
    user_id: &str,
    mut offered: Vec<ComebackChallenge>,
) -> Option<ComebackChallenge> {
    offered.sort_by(|left, right| {
        created_key(right)
            .cmp(&created_key(left))
            .then_with(|| right.id.cmp(&left.id))
    });

    if offered.len() > 1 {
        let violation = EngineError::InvariantViolation {
            user_id: user_id.to_string(),
            detail: format!(
                "{} open comeback challenges: {:?}",
                offered.len(),
                offered.iter().map(|challenge| challenge.id).collect::<Vec<_>>()
            ),
        };
        warn!(error = %violation, "resolving to most recent comeback challenge");
    }

    offered.into_iter().next()
}

pub fn saves_until_milestone(streaks_saved: u32) -> u32 {
    SAVE_MILESTONE - (streaks_saved % SAVE_MILESTONE)
}

fn created_key(challenge: &ComebackChallenge) -> Option<DateTime<Utc>> {
    parse_timestamp(&challenge.created_at)
}

fn usable_timestamps(events: &[ActivityEvent]) -> Vec<DateTime<Utc>> {
    events
        .iter()
        .filter(|event| !event.deleted)
        .filter_map(|event| event.occurred_at().ok())
        .collect()
}
