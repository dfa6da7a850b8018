use super::{Tracker, invalid_input, not_found, require_user};
use crate::db::{HobbyRow, NewHobby};
use crate::engine::MutationOutcome;
use crate::engine::challenge::RandomSource;
use crate::engine::model::{ActivityKind, NewActivityEvent};
use anyhow::Result;
use chrono::{DateTime, Utc};

impl<R: RandomSource> Tracker<R> {
    pub fn create_hobby(&self, user_id: &str, hobby: &NewHobby, now: DateTime<Utc>) -> Result<HobbyRow> {
        let user_id = require_user(user_id)?;
        if hobby.name.trim().is_empty() {
            return Err(invalid_input("hobby name must not be empty"));
        }
        if hobby.sessions_per_week.is_some_and(|value| value < 1)
            || hobby.minutes_per_session.is_some_and(|value| value < 1)
        {
            return Err(invalid_input("hobby targets must be positive"));
        }
        self.database.create_hobby(user_id, hobby, now)
    }

    pub fn hobbies(&self, user_id: &str) -> Result<Vec<HobbyRow>> {
        self.database.hobbies(require_user(user_id)?)
    }

    pub fn delete_hobby(&self, user_id: &str, hobby_id: i64) -> Result<()> {
        if !self.database.delete_hobby(require_user(user_id)?, hobby_id)? {
            return Err(not_found(format!("hobby {hobby_id}")));
        }
        Ok(())
    }

    /// Logs a practice session. Minutes default to the hobby's per-session target.
    pub fn log_session(
        &mut self,
        user_id: &str,
        hobby_id: i64,
        minutes: Option<i64>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MutationOutcome> {
        let user_id = require_user(user_id)?.to_string();
        let hobby = self
            .database
            .hobby(&user_id, hobby_id)?
            .ok_or_else(|| not_found(format!("hobby {hobby_id}")))?;

        let minutes = minutes.unwrap_or(hobby.minutes_per_session);
        if minutes < 1 {
            return Err(invalid_input("session minutes must be positive"));
        }

        let mut event = NewActivityEvent::new(&user_id, ActivityKind::HobbySession, now)
            .subject(hobby.id)
            .quantity(minutes);
        if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
            event = event.note(note);
        }

        Ok(self.engine().record_activity(event, now)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::NewHobby;
    use crate::error::EngineError;
    use crate::tracker::testing::{day, open_tracker};

    fn guitar() -> NewHobby {
        NewHobby {
            name: "guitar".to_string(),
            sessions_per_week: None,
            minutes_per_session: Some(25),
        }
    }

    #[test]
    fn sessions_default_to_target_minutes_and_roll_up() {
        let (_dir, mut tracker) = open_tracker();
        let hobby = tracker.create_hobby("amy", &guitar(), day(0)).unwrap();

        tracker.log_session("amy", hobby.id, None, None, day(0)).unwrap();
        let outcome = tracker
            .log_session("amy", hobby.id, Some(40), Some("scales"), day(1))
            .unwrap();

        assert_eq!(outcome.streak, Some(2));
        let weekly = outcome.weekly.expect("weekly rollup");
        assert_eq!(weekly.hobby_sessions_7d, 2);
        assert_eq!(weekly.hobby_minutes_7d, 65);
    }

    #[test]
    fn rejects_unknown_hobby_and_non_positive_minutes() {
        let (_dir, mut tracker) = open_tracker();
        let hobby = tracker.create_hobby("amy", &guitar(), day(0)).unwrap();

        let foreign = tracker.log_session("ben", hobby.id, None, None, day(0)).unwrap_err();
        assert!(matches!(
            foreign.downcast_ref::<EngineError>(),
            Some(EngineError::NotFound(_))
        ));

        let zero = tracker.log_session("amy", hobby.id, Some(0), None, day(0)).unwrap_err();
        assert!(matches!(
            zero.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidInput(_))
        ));

        tracker.delete_hobby("amy", hobby.id).unwrap();
        assert!(tracker.hobbies("amy").unwrap().is_empty());
        assert!(tracker.log_session("amy", hobby.id, None, None, day(0)).is_err());
    }
}
