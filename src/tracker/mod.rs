//! Student-facing operations on top of the engagement engine and the SQLite store.

pub mod dashboard;
pub mod hobbies;
pub mod mood;
pub mod study;
pub mod tasks;
pub mod teacher;

use crate::config::Config;
use crate::db::Database;
use crate::engine::challenge::{RandomSource, SystemRandom, saves_until_milestone};
use crate::engine::model::{ActivityKind, ComebackChallenge, WeeklyAggregate};
use crate::engine::streak::StreakSummary;
use crate::engine::time::DayPolicy;
use crate::engine::{EngagementEngine, EngineSettings};
use crate::error::EngineError;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Bounce-back history length shown when the caller does not ask for one.
pub const CHALLENGE_HISTORY_LIMIT: usize = 10;

pub struct Tracker<R = SystemRandom> {
    config: Config,
    database: Database,
    random: R,
    settings: EngineSettings,
}

impl Tracker<SystemRandom> {
    pub fn open(config: Config) -> Result<Self> {
        let database = Database::open(&config.db_path)?;
        Self::with_parts(config, database, SystemRandom::new())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeView {
    pub active: Option<ComebackChallenge>,
    pub streaks_saved: u32,
    pub challenges_offered: u32,
    pub saves_until_milestone: u32,
}

impl<R: RandomSource> Tracker<R> {
    pub fn with_parts(config: Config, database: Database, random: R) -> Result<Self> {
        let settings = config.engine_settings()?;
        Ok(Self {
            config,
            database,
            random,
            settings,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn policy(&self) -> &DayPolicy {
        &self.settings.policy
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.settings.policy.today(now)
    }

    pub fn engine(&mut self) -> EngagementEngine<'_, Database, R> {
        EngagementEngine::new(&mut self.database, &mut self.random, self.settings)
    }

    pub fn streak_summary(
        &mut self,
        user_id: &str,
        kind: ActivityKind,
        as_of: NaiveDate,
    ) -> Result<StreakSummary> {
        Ok(self.engine().streak_summary(user_id, kind, as_of)?)
    }

    pub fn challenge_view(&mut self, user_id: &str) -> Result<ChallengeView> {
        let engine = self.engine();
        let streaks_saved = engine.streaks_saved(user_id)?;

        Ok(ChallengeView {
            active: engine.active_challenge(user_id)?,
            streaks_saved,
            challenges_offered: engine.challenges_offered(user_id)?,
            saves_until_milestone: saves_until_milestone(streaks_saved),
        })
    }

    pub fn accept_challenge(&mut self, user_id: &str, id: i64) -> Result<u32> {
        Ok(self.engine().complete_challenge(user_id, id)?)
    }

    pub fn skip_challenge(&mut self, user_id: &str, id: i64) -> Result<()> {
        Ok(self.engine().skip_challenge(user_id, id)?)
    }

    pub fn challenge_history(&mut self, user_id: &str, limit: usize) -> Result<Vec<ComebackChallenge>> {
        Ok(self.engine().challenge_history(user_id, limit)?)
    }

    /// Fresh weekly rollup, or the last cached one when the log cannot be read.
    pub fn weekly(&mut self, user_id: &str, as_of: NaiveDate) -> Result<Option<WeeklyAggregate>> {
        Ok(self.engine().weekly_or_last_known(user_id, as_of)?)
    }
}

pub(crate) fn not_found(message: impl Into<String>) -> anyhow::Error {
    EngineError::NotFound(message.into()).into()
}

pub(crate) fn invalid_input(message: impl Into<String>) -> anyhow::Error {
    EngineError::InvalidInput(message.into()).into()
}

pub(crate) fn require_user(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(invalid_input("a signed-in user id is required"));
    }
    Ok(trimmed)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Tracker;
    use crate::config::Config;
    use crate::db::Database;
    use crate::engine::challenge::{ComebackTrigger, RandomSource};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    pub struct FixedIndex(pub usize);

    impl RandomSource for FixedIndex {
        fn pick(&mut self, _len: usize) -> usize {
            self.0
        }
    }

    pub fn config_in(dir: &TempDir) -> Config {
        Config {
            db_path: dir.path().join("db/mindtrack.db"),
            report_dir: dir.path().join("reports"),
            recommendations_path: dir.path().join("missing-catalog.json"),
            comeback_trigger: ComebackTrigger::ChainBreak,
            ..Config::default()
        }
    }

    pub fn open_tracker() -> (TempDir, Tracker<FixedIndex>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(&dir);
        let database = Database::open(&config.db_path).expect("open db");
        let tracker = Tracker::with_parts(config, database, FixedIndex(0)).expect("tracker");
        (dir, tracker)
    }

    /// Monday 2026-05-04 at noon UTC, shifted by whole days.
    pub fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap() + Duration::days(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{day, open_tracker};
    use crate::db::NewTask;
    use crate::engine::model::ActivityKind;

    #[test]
    fn challenge_view_tracks_milestone_progress() {
        let (_dir, mut tracker) = open_tracker();
        let first = tracker
            .create_task("amy", &NewTask::titled("essay"), day(0))
            .unwrap();
        let second = tracker
            .create_task("amy", &NewTask::titled("quiz"), day(0))
            .unwrap();
        tracker.complete_task("amy", first.id, None, day(0)).unwrap();
        let completion = tracker.complete_task("amy", second.id, None, day(2)).unwrap();
        let offered = completion.outcome.challenge.expect("offer after gap");

        let view = tracker.challenge_view("amy").unwrap();
        assert_eq!(view.active.map(|c| c.id), Some(offered.id));
        assert_eq!(view.saves_until_milestone, 10);

        assert_eq!(tracker.accept_challenge("amy", offered.id).unwrap(), 1);
        let view = tracker.challenge_view("amy").unwrap();
        assert!(view.active.is_none());
        assert_eq!(view.saves_until_milestone, 9);
        assert_eq!(tracker.challenge_history("amy", 3).unwrap().len(), 1);

        let summary = tracker
            .streak_summary("amy", ActivityKind::TaskCompleted, day(2).date_naive())
            .unwrap();
        assert_eq!(summary.current, 1);
        assert_eq!(summary.longest, 1);
    }
}
