use super::{Tracker, invalid_input, not_found, require_user};
use crate::engine::MutationOutcome;
use crate::engine::challenge::RandomSource;
use crate::engine::model::{ActivityKind, EventFilter, NewActivityEvent};
use crate::engine::store::EventLog;
use crate::recommend::{Catalog, MoodLabel, Suggestion, validate_energy};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub event_id: i64,
    pub mood: MoodLabel,
    pub energy: u8,
    pub suggestion: Suggestion,
    pub mood_streak: Option<u32>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodEntry {
    pub id: i64,
    pub mood: Option<MoodLabel>,
    pub energy: Option<i64>,
    pub created_at: String,
}

impl<R: RandomSource> Tracker<R> {
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::load_or_builtin(&self.config.recommendations_path)
    }

    /// Records a check-in and picks a recommendation for it.
    pub fn check_in(
        &mut self,
        user_id: &str,
        mood: MoodLabel,
        energy: u8,
        now: DateTime<Utc>,
    ) -> Result<CheckIn> {
        let user_id = require_user(user_id)?.to_string();
        let energy = validate_energy(energy).map_err(|error| invalid_input(error.to_string()))?;

        let event = NewActivityEvent::new(&user_id, ActivityKind::MoodCheckin, now)
            .note(mood.as_str())
            .quantity(i64::from(energy));
        let outcome = self.engine().record_activity(event, now)?;

        let suggestion = self.catalog()?.suggest(mood, energy, None, &mut self.random);

        Ok(CheckIn {
            event_id: outcome.event_id,
            mood,
            energy,
            suggestion,
            mood_streak: outcome.streak,
            stale: outcome.stale,
        })
    }

    /// "Try another": a different match for the same mood and energy when one exists.
    pub fn another_suggestion(
        &mut self,
        mood: MoodLabel,
        energy: u8,
        current: Option<i64>,
    ) -> Result<Suggestion> {
        let energy = validate_energy(energy).map_err(|error| invalid_input(error.to_string()))?;
        Ok(self
            .catalog()?
            .suggest(mood, energy, current, &mut self.random))
    }

    pub fn complete_recommendation(
        &mut self,
        user_id: &str,
        recommendation_id: i64,
        now: DateTime<Utc>,
    ) -> Result<MutationOutcome> {
        let user_id = require_user(user_id)?.to_string();
        if self.catalog()?.get(recommendation_id).is_none() {
            return Err(not_found(format!("recommendation {recommendation_id}")));
        }

        let event = NewActivityEvent::new(&user_id, ActivityKind::RecommendationDone, now)
            .subject(recommendation_id);
        Ok(self.engine().record_activity(event, now)?)
    }

    /// Retracts a check-in logged by mistake. The row stays in the log, soft-deleted.
    pub fn delete_check_in(&mut self, user_id: &str, event_id: i64, now: DateTime<Utc>) -> Result<()> {
        let user_id = require_user(user_id)?.to_string();
        let owned = self
            .database
            .query_events(&user_id, ActivityKind::MoodCheckin, &EventFilter::all())?
            .iter()
            .any(|event| event.id == event_id);
        if !owned {
            return Err(not_found(format!("mood check-in {event_id}")));
        }

        Ok(self.engine().soft_delete_event(&user_id, event_id, now)?)
    }

    /// Most recent check-ins first.
    pub fn mood_history(&self, user_id: &str, limit: usize) -> Result<Vec<MoodEntry>> {
        let user_id = require_user(user_id)?;
        let events =
            self.database
                .query_events(user_id, ActivityKind::MoodCheckin, &EventFilter::all())?;

        Ok(events
            .into_iter()
            .rev()
            .take(limit)
            .map(|event| MoodEntry {
                id: event.id,
                mood: event.note.as_deref().and_then(MoodLabel::parse),
                energy: event.quantity,
                created_at: event.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::EngineError;
    use crate::recommend::{FALLBACK_RECOMMENDATION, MoodLabel};
    use crate::tracker::testing::{day, open_tracker};

    #[test]
    fn check_in_records_event_and_suggests_matching_entry() {
        let (_dir, mut tracker) = open_tracker();

        let first = tracker.check_in("amy", MoodLabel::Tired, 1, day(0)).unwrap();
        let second = tracker.check_in("amy", MoodLabel::Calm, 4, day(1)).unwrap();

        let catalog = tracker.catalog().unwrap();
        let picked = catalog
            .get(first.suggestion.id.expect("catalog match"))
            .unwrap();
        assert_eq!(picked.mood, MoodLabel::Tired);
        assert!(picked.energy_min <= 1 && 1 <= picked.energy_max);
        assert_eq!(second.mood_streak, Some(2));

        let history = tracker.mood_history("amy", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].mood, Some(MoodLabel::Calm));
        assert_eq!(history[0].energy, Some(4));
    }

    #[test]
    fn out_of_range_energy_is_rejected_before_writing() {
        let (_dir, mut tracker) = open_tracker();

        let error = tracker
            .check_in("amy", MoodLabel::Sad, 9, day(0))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidInput(_))
        ));
        assert!(tracker.mood_history("amy", 10).unwrap().is_empty());
    }

    #[test]
    fn another_suggestion_moves_off_the_current_one() {
        let (_dir, mut tracker) = open_tracker();
        let first = tracker
            .another_suggestion(MoodLabel::Stressed, 4, None)
            .unwrap();
        let next = tracker
            .another_suggestion(MoodLabel::Stressed, 4, first.id)
            .unwrap();

        assert_ne!(first.id, next.id);
        assert_ne!(next.text, FALLBACK_RECOMMENDATION);
    }

    #[test]
    fn completing_recommendation_feeds_its_own_streak() {
        let (_dir, mut tracker) = open_tracker();

        let outcome = tracker.complete_recommendation("amy", 4, day(0)).unwrap();
        assert_eq!(outcome.streak, Some(1));
        assert_eq!(outcome.weekly.map(|weekly| weekly.recommendations_done_7d), Some(1));

        let missing = tracker.complete_recommendation("amy", 999, day(0)).unwrap_err();
        assert!(matches!(
            missing.downcast_ref::<EngineError>(),
            Some(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_check_in_retracts_it_for_its_owner_only() {
        let (_dir, mut tracker) = open_tracker();
        tracker.check_in("amy", MoodLabel::Calm, 3, day(0)).unwrap();
        let mistake = tracker.check_in("amy", MoodLabel::Sad, 1, day(1)).unwrap();
        let reco = tracker.complete_recommendation("amy", 4, day(1)).unwrap();

        let foreign = tracker.delete_check_in("ben", mistake.event_id, day(1)).unwrap_err();
        assert!(matches!(
            foreign.downcast_ref::<EngineError>(),
            Some(EngineError::NotFound(_))
        ));
        assert!(tracker.delete_check_in("amy", reco.event_id, day(1)).is_err());

        tracker.delete_check_in("amy", mistake.event_id, day(1)).unwrap();
        let history = tracker.mood_history("amy", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mood, Some(MoodLabel::Calm));

        let weekly = tracker.weekly("amy", day(1).date_naive()).unwrap().unwrap();
        assert_eq!(weekly.mood_logs_7d, 1);
        assert!(tracker.delete_check_in("amy", mistake.event_id, day(1)).is_err());
    }
}
