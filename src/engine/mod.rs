//! Engagement engine: streaks, comeback challenges and the weekly rollup.
//!
//! Everything derived here is a projection of the event log. A mutation first makes the event
//! durable and then refreshes derived state; a failure in the refresh leaves the event in place
//! and only marks the outcome as stale.

pub mod challenge;
pub mod model;
pub mod store;
pub mod streak;
pub mod time;
pub mod weekly;

use crate::engine::challenge::{
    CHALLENGE_TYPE_TASK, ComebackTrigger, RandomSource, choose_prompt, evaluate_trigger,
    resolve_active,
};
use crate::engine::model::{
    ActivityEvent, ActivityKind, ChallengeFilter, ChallengeState, ComebackChallenge, EventFilter,
    EventPatch, NewActivityEvent, NewChallenge, WeeklyAggregate,
};
use crate::engine::store::{ChallengeStore, EventLog, SnapshotStore};
use crate::engine::streak::{StreakSummary, streak_for_events, summarize_streak};
use crate::engine::time::DayPolicy;
use crate::engine::weekly::{compute_weekly_aggregate, window_start};
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineSettings {
    pub policy: DayPolicy,
    pub trigger: ComebackTrigger,
}

/// Result of one user mutation. `stale` is set when the event was stored but some derived
/// value could not be refreshed.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub event_id: i64,
    pub kind: ActivityKind,
    pub streak: Option<u32>,
    pub challenge: Option<ComebackChallenge>,
    pub weekly: Option<WeeklyAggregate>,
    pub stale: bool,
}

pub struct EngagementEngine<'a, S, R> {
    store: &'a mut S,
    random: &'a mut R,
    settings: EngineSettings,
}

impl<'a, S, R> EngagementEngine<'a, S, R>
where
    S: EventLog + ChallengeStore + SnapshotStore,
    R: RandomSource,
{
    pub fn new(store: &'a mut S, random: &'a mut R, settings: EngineSettings) -> Self {
        Self {
            store,
            random,
            settings,
        }
    }

    pub fn policy(&self) -> &DayPolicy {
        &self.settings.policy
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.settings.policy.today(now)
    }

    /// Persists one activity event and refreshes the derived state that depends on it.
    pub fn record_activity(
        &mut self,
        event: NewActivityEvent,
        now: DateTime<Utc>,
    ) -> EngineResult<MutationOutcome> {
        let user_id = require_user(&event.user_id)?.to_string();
        let kind = event.kind;

        let event_id = self.store.insert_event(&event)?;
        debug!(user_id = %user_id, kind = kind.as_str(), event_id, "activity recorded");

        let today = self.today(now);
        let mut stale = false;
        let mut challenge = None;

        let streak = match self.events(&user_id, kind, &EventFilter::all()) {
            Ok(events) => {
                if kind == ActivityKind::TaskCompleted {
                    let check =
                        evaluate_trigger(self.settings.trigger, &events, today, self.policy());
                    if check.offer {
                        challenge = self.try_offer(&user_id, now);
                    }
                    Some(check.streak)
                } else {
                    Some(streak_for_events(&events, today, self.policy()))
                }
            }
            Err(error) => {
                warn!(error = %error, user_id = %user_id, "streak refresh failed after write");
                stale = true;
                None
            }
        };

        let weekly = match self.refresh_weekly(&user_id, today) {
            Ok(aggregate) => Some(aggregate),
            Err(error) => {
                warn!(error = %error, user_id = %user_id, "weekly refresh failed after write");
                stale = true;
                None
            }
        };

        Ok(MutationOutcome {
            event_id,
            kind,
            streak,
            challenge,
            weekly,
            stale,
        })
    }

    pub fn complete_task(
        &mut self,
        user_id: &str,
        task_id: i64,
        completed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EngineResult<MutationOutcome> {
        let event = NewActivityEvent::new(user_id, ActivityKind::TaskCompleted, now)
            .subject(task_id)
            .completed(completed_at);

        self.record_activity(event, now)
    }

    /// Retracts one of the user's events and refreshes the cached rollup.
    pub fn soft_delete_event(
        &mut self,
        user_id: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let user_id = require_user(user_id)?.to_string();
        if !self
            .store
            .update_event(&user_id, id, &EventPatch::soft_delete())?
        {
            return Err(EngineError::NotFound(format!("event {id}")));
        }
        debug!(user_id = %user_id, event_id = id, "activity retracted");

        let today = self.today(now);
        if let Err(error) = self.refresh_weekly(&user_id, today) {
            warn!(error = %error, user_id = %user_id, "weekly refresh failed after retract");
        }

        Ok(())
    }

    pub fn streak(&self, user_id: &str, kind: ActivityKind, as_of: NaiveDate) -> EngineResult<u32> {
        let events = self.events(require_user(user_id)?, kind, &EventFilter::all())?;
        Ok(streak_for_events(&events, as_of, self.policy()))
    }

    pub fn streak_summary(
        &self,
        user_id: &str,
        kind: ActivityKind,
        as_of: NaiveDate,
    ) -> EngineResult<StreakSummary> {
        let events = self.events(require_user(user_id)?, kind, &EventFilter::all())?;
        Ok(summarize_streak(kind, &events, as_of, self.policy()))
    }

    pub fn weekly_aggregate(&self, user_id: &str, as_of: NaiveDate) -> EngineResult<WeeklyAggregate> {
        let user_id = require_user(user_id)?;
        let policy = self.policy();

        // Padded by a day each side; the calculator applies the exact calendar window.
        let filter = EventFilter::between(
            policy.start_of_day(window_start(as_of)) - Duration::days(1),
            policy.end_of_day(as_of) + Duration::days(1),
        );

        let events = ActivityKind::ALL
            .into_iter()
            .map(|kind| self.events(user_id, kind, &filter))
            .collect::<EngineResult<Vec<_>>>()?
            .concat();
        let task_creations = self.store.query_task_creations(user_id, &filter)?;

        Ok(compute_weekly_aggregate(
            user_id,
            &events,
            &task_creations,
            as_of,
            policy,
        ))
    }

    /// Recomputes the rollup and caches it. A failed cache write does not fail the refresh.
    pub fn refresh_weekly(
        &mut self,
        user_id: &str,
        as_of: NaiveDate,
    ) -> EngineResult<WeeklyAggregate> {
        let aggregate = self.weekly_aggregate(user_id, as_of)?;

        if let Err(error) = self.store.save_weekly_snapshot(&aggregate) {
            warn!(error = %error, user_id, "failed to cache weekly snapshot");
        }

        Ok(aggregate)
    }

    /// Fresh rollup when the log is readable, otherwise the last cached one.
    pub fn weekly_or_last_known(
        &mut self,
        user_id: &str,
        as_of: NaiveDate,
    ) -> EngineResult<Option<WeeklyAggregate>> {
        match self.refresh_weekly(user_id, as_of) {
            Ok(aggregate) => Ok(Some(aggregate)),
            Err(EngineError::Store(error)) => {
                warn!(error = %error, user_id, "serving last known weekly snapshot");
                Ok(self.store.last_weekly_snapshot(user_id)?)
            }
            Err(error) => Err(error),
        }
    }

    /// Stores a new offer and retires any older open one (last write wins).
    pub fn offer_challenge(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ComebackChallenge> {
        let user_id = require_user(user_id)?;
        let previous = self.store.query_challenges(user_id, ChallengeFilter::Offered)?;

        let offered = self.store.insert_challenge(&NewChallenge {
            user_id: user_id.to_string(),
            challenge_type: CHALLENGE_TYPE_TASK.to_string(),
            challenge_text: choose_prompt(&mut *self.random).to_string(),
            created_at: now,
        })?;

        for stale in previous.iter().filter(|challenge| challenge.id != offered.id) {
            if let Err(error) =
                self.store
                    .update_challenge(user_id, stale.id, ChallengeState::Skipped)
            {
                warn!(error = %error, user_id, challenge_id = stale.id, "failed to retire superseded challenge");
            }
        }

        info!(user_id, challenge_id = offered.id, "comeback challenge offered");
        Ok(offered)
    }

    pub fn active_challenge(&self, user_id: &str) -> EngineResult<Option<ComebackChallenge>> {
        let user_id = require_user(user_id)?;
        let offered = self.store.query_challenges(user_id, ChallengeFilter::Offered)?;
        Ok(resolve_active(user_id, offered))
    }

    /// Accepts an offer and returns the updated number of saved streaks.
    pub fn complete_challenge(&mut self, user_id: &str, id: i64) -> EngineResult<u32> {
        self.transition(user_id, id, ChallengeState::Completed)?;
        info!(user_id, challenge_id = id, "comeback challenge completed");
        self.streaks_saved(user_id)
    }

    pub fn skip_challenge(&mut self, user_id: &str, id: i64) -> EngineResult<()> {
        self.transition(user_id, id, ChallengeState::Skipped)?;
        info!(user_id, challenge_id = id, "comeback challenge skipped");
        Ok(())
    }

    pub fn streaks_saved(&self, user_id: &str) -> EngineResult<u32> {
        let completed = self
            .store
            .query_challenges(require_user(user_id)?, ChallengeFilter::Completed)?;
        Ok(completed.len() as u32)
    }

    pub fn challenges_offered(&self, user_id: &str) -> EngineResult<u32> {
        let all = self
            .store
            .query_challenges(require_user(user_id)?, ChallengeFilter::All)?;
        Ok(all.len() as u32)
    }

    pub fn challenge_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<ComebackChallenge>> {
        let mut completed = self
            .store
            .query_challenges(require_user(user_id)?, ChallengeFilter::Completed)?;
        completed.truncate(limit);
        Ok(completed)
    }

    fn transition(&mut self, user_id: &str, id: i64, state: ChallengeState) -> EngineResult<()> {
        let user_id = require_user(user_id)?;
        if self.store.update_challenge(user_id, id, state)? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!(
                "no open comeback challenge {id} for user {user_id}"
            )))
        }
    }

    fn try_offer(&mut self, user_id: &str, now: DateTime<Utc>) -> Option<ComebackChallenge> {
        match self.offer_challenge(user_id, now) {
            Ok(challenge) => Some(challenge),
            Err(error) => {
                warn!(error = %error, user_id, "comeback challenge not offered");
                None
            }
        }
    }

    fn events(
        &self,
        user_id: &str,
        kind: ActivityKind,
        filter: &EventFilter,
    ) -> EngineResult<Vec<ActivityEvent>> {
        Ok(self.store.query_events(user_id, kind, filter)?)
    }
}

fn require_user(user_id: &str) -> EngineResult<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(
            "a signed-in user id is required".to_string(),
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::{EngagementEngine, EngineSettings};
    use crate::engine::challenge::{ComebackTrigger, RECOVERY_PROMPTS, RandomSource};
    use crate::engine::model::{ActivityKind, ChallengeState, NewActivityEvent};
    use crate::engine::store::memory::MemoryStore;
    use crate::engine::time::DayPolicy;
    use crate::error::EngineError;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    struct FixedIndex(usize);

    impl RandomSource for FixedIndex {
        fn pick(&mut self, _len: usize) -> usize {
            self.0
        }
    }

    const USER: &str = "student-1";

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap() + Duration::days(offset)
    }

    fn date(offset: i64) -> NaiveDate {
        day(offset).date_naive()
    }

    fn settings(trigger: ComebackTrigger) -> EngineSettings {
        EngineSettings {
            policy: DayPolicy::utc(),
            trigger,
        }
    }

    #[test]
    fn end_to_end_break_offer_and_save() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(1);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::ChainBreak));

        for (task_id, offset) in [(1, 0), (2, 1), (3, 2)] {
            let outcome = engine
                .complete_task(USER, task_id, day(offset), day(offset))
                .expect("task completion");
            assert!(outcome.challenge.is_none());
        }
        assert_eq!(
            engine.streak(USER, ActivityKind::TaskCompleted, date(2)).unwrap(),
            3
        );

        let outcome = engine
            .complete_task(USER, 4, day(4), day(4))
            .expect("completion after gap");
        assert_eq!(outcome.streak, Some(1));
        let offered = outcome.challenge.expect("comeback challenge offered");
        assert_eq!(offered.challenge_text, RECOVERY_PROMPTS[1]);
        assert_eq!(
            engine.active_challenge(USER).unwrap().map(|c| c.id),
            Some(offered.id)
        );

        let saved_before = engine.streaks_saved(USER).unwrap();
        let saved_after = engine.complete_challenge(USER, offered.id).unwrap();
        assert_eq!(saved_after, saved_before + 1);
        assert!(engine.active_challenge(USER).unwrap().is_none());
        assert_eq!(engine.challenge_history(USER, 10).unwrap().len(), 1);
    }

    #[test]
    fn zero_streak_rule_stays_quiet_for_same_day_completion() {
        // The offer keys off task completions only; the displayed mood streak plays no part.
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::ZeroStreak));

        engine.complete_task(USER, 1, day(0), day(0)).unwrap();
        let outcome = engine.complete_task(USER, 2, day(4), day(4)).unwrap();

        assert_eq!(outcome.streak, Some(1));
        assert!(outcome.challenge.is_none());
    }

    #[test]
    fn zero_streak_rule_offers_for_backdated_completion() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(3);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::ZeroStreak));

        let mood = NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(5));
        engine.record_activity(mood, day(5)).unwrap();

        let outcome = engine.complete_task(USER, 9, day(3), day(5)).unwrap();

        assert_eq!(outcome.streak, Some(0));
        assert_eq!(
            outcome.challenge.map(|c| c.challenge_text),
            Some(RECOVERY_PROMPTS[3].to_string())
        );
        assert_eq!(
            engine.streak(USER, ActivityKind::MoodCheckin, date(5)).unwrap(),
            1
        );
    }

    #[test]
    fn second_offer_replaces_the_open_one() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let first = engine.offer_challenge(USER, day(0)).unwrap();
        let second = engine.offer_challenge(USER, day(1)).unwrap();

        let active = engine.active_challenge(USER).unwrap().expect("active offer");
        assert_eq!(active.id, second.id);
        assert_eq!(engine.challenges_offered(USER).unwrap(), 2);
        assert_eq!(engine.streaks_saved(USER).unwrap(), 0);

        drop(engine);
        let retired = store
            .challenges
            .iter()
            .find(|challenge| challenge.id == first.id)
            .expect("first challenge kept");
        assert_eq!(retired.state(), ChallengeState::Skipped);
        assert!(!retired.completed);
    }

    #[test]
    fn skip_abandons_offer_without_saving() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let offered = engine.offer_challenge(USER, day(0)).unwrap();
        engine.skip_challenge(USER, offered.id).unwrap();

        assert!(engine.active_challenge(USER).unwrap().is_none());
        assert_eq!(engine.streaks_saved(USER).unwrap(), 0);
        assert_eq!(engine.challenges_offered(USER).unwrap(), 1);
        assert!(matches!(
            engine.complete_challenge(USER, offered.id),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn challenge_transitions_are_scoped_to_owner() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let offered = engine.offer_challenge(USER, day(0)).unwrap();

        assert!(matches!(
            engine.complete_challenge("someone-else", offered.id),
            Err(EngineError::NotFound(_))
        ));
        assert!(engine.active_challenge(USER).unwrap().is_some());
    }

    #[test]
    fn failed_challenge_write_keeps_the_event() {
        let mut store = MemoryStore {
            fail_challenge_writes: true,
            ..MemoryStore::default()
        };
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::ZeroStreak));

        let outcome = engine.complete_task(USER, 1, day(0), day(2)).unwrap();

        assert_eq!(outcome.streak, Some(0));
        assert!(outcome.challenge.is_none());
        drop(engine);
        assert_eq!(store.events.len(), 1);
        assert!(store.challenges.is_empty());
    }

    #[test]
    fn failed_event_write_is_reported() {
        let mut store = MemoryStore {
            fail_event_writes: true,
            ..MemoryStore::default()
        };
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let result = engine.record_activity(
            NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(0)),
            day(0),
        );

        assert!(matches!(result, Err(EngineError::Store(_))));
    }

    #[test]
    fn unreadable_log_marks_outcome_stale_and_serves_last_snapshot() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);

        {
            let mut engine =
                EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));
            let outcome = engine
                .record_activity(
                    NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(0)),
                    day(0),
                )
                .unwrap();
            assert!(!outcome.stale);
            assert_eq!(outcome.weekly.map(|weekly| weekly.mood_logs_7d), Some(1));
        }

        store.fail_reads = true;
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let outcome = engine
            .record_activity(
                NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(1)),
                day(1),
            )
            .unwrap();
        assert!(outcome.stale);
        assert!(outcome.streak.is_none());
        assert!(outcome.weekly.is_none());

        let last_known = engine
            .weekly_or_last_known(USER, date(1))
            .unwrap()
            .expect("cached snapshot");
        assert_eq!(last_known.mood_logs_7d, 1);
    }

    #[test]
    fn soft_deleted_event_drops_out_of_streak_and_rollup() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let kept = NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(0));
        let removed = NewActivityEvent::new(USER, ActivityKind::MoodCheckin, day(1));
        engine.record_activity(kept, day(0)).unwrap();
        let outcome = engine.record_activity(removed, day(1)).unwrap();
        assert_eq!(outcome.streak, Some(2));

        assert!(matches!(
            engine.soft_delete_event("someone-else", outcome.event_id, day(1)),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            engine.soft_delete_event(USER, 999, day(1)),
            Err(EngineError::NotFound(_))
        ));
        engine.soft_delete_event(USER, outcome.event_id, day(1)).unwrap();

        assert_eq!(
            engine.streak(USER, ActivityKind::MoodCheckin, date(1)).unwrap(),
            0
        );
        assert_eq!(engine.weekly_aggregate(USER, date(1)).unwrap().mood_logs_7d, 1);
        drop(engine);
        assert_eq!(store.events.len(), 2, "soft delete keeps the row");
    }

    #[test]
    fn malformed_rows_do_not_abort_reads() {
        let mut store = MemoryStore::default();
        store.push_raw_event(USER, ActivityKind::MoodCheckin, "not-a-date");
        store.push_raw_event(USER, ActivityKind::MoodCheckin, "2026-09-01T08:00:00Z");
        let mut random = FixedIndex(0);
        let engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        assert_eq!(
            engine.streak(USER, ActivityKind::MoodCheckin, date(0)).unwrap(),
            1
        );
        let weekly = engine.weekly_aggregate(USER, date(0)).unwrap();
        assert_eq!(weekly.mood_logs_7d, 1);
        assert_eq!(weekly.skipped_records, 1);
    }

    #[test]
    fn hobby_minutes_and_task_creations_feed_the_rollup() {
        let mut store = MemoryStore::default();
        store
            .task_creations
            .push((USER.to_string(), "2026-09-01T07:00:00Z".to_string()));
        store
            .task_creations
            .push((USER.to_string(), "2026-08-01T07:00:00Z".to_string()));
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        let hobby = NewActivityEvent::new(USER, ActivityKind::HobbySession, day(0))
            .subject(3)
            .quantity(40);
        let outcome = engine.record_activity(hobby, day(0)).unwrap();

        let weekly = outcome.weekly.expect("weekly rollup");
        assert_eq!(weekly.hobby_sessions_7d, 1);
        assert_eq!(weekly.hobby_minutes_7d, 40);
        assert_eq!(weekly.tasks_created_7d, 1);
    }

    #[test]
    fn blank_user_is_rejected() {
        let mut store = MemoryStore::default();
        let mut random = FixedIndex(0);
        let engine =
            EngagementEngine::new(&mut store, &mut random, settings(ComebackTrigger::default()));

        assert!(matches!(
            engine.streak("  ", ActivityKind::MoodCheckin, date(0)),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
