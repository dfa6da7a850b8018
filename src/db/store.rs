use super::Database;
use super::queries::{CHALLENGE_COLUMNS, EVENT_COLUMNS};
use crate::engine::model::{
    ActivityEvent, ActivityKind, ChallengeFilter, ChallengeState, ComebackChallenge, EventFilter,
    EventPatch, NewActivityEvent, NewChallenge, WeeklyAggregate,
};
use crate::engine::store::{ChallengeStore, EventLog, SnapshotStore};
use crate::engine::time::{format_timestamp, parse_timestamp};
use crate::error::StoreError;
use rusqlite::{OptionalExtension, Row, params};
use tracing::warn;

impl EventLog for Database {
    fn query_events(
        &self,
        user_id: &str,
        kind: ActivityKind,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let mut statement = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM activity_events
             WHERE user_id = ?1 AND kind = ?2 AND deleted = 0"
        ))?;

        let rows = statement
            .query_map(params![user_id, kind.as_str()], |row| event_from_row(row, kind))?
            .collect::<Result<Vec<_>, _>>()?;

        // Range filtering happens here so that rows with unreadable timestamps still reach the
        // calculators, which count and skip them.
        let mut events = rows
            .into_iter()
            .filter(|event| match event.occurred_at() {
                Ok(at) => {
                    filter.from.is_none_or(|from| at >= from) && filter.to.is_none_or(|to| at <= to)
                }
                Err(_) => true,
            })
            .collect::<Vec<_>>();
        events.sort_by_key(|event| (event.occurred_at().ok(), event.id));

        Ok(events)
    }

    fn insert_event(&mut self, event: &NewActivityEvent) -> Result<i64, StoreError> {
        let transaction = self.conn.transaction()?;

        if let (ActivityKind::TaskCompleted, Some(task_id)) = (event.kind, event.subject_id) {
            let flipped = transaction.execute(
                "UPDATE tasks SET status = 'done', completed_at = ?1
                 WHERE id = ?2 AND user_id = ?3 AND status = 'pending' AND deleted = 0",
                params![format_timestamp(event.occurred_at()), task_id, event.user_id],
            )?;
            if flipped == 0 {
                return Err(StoreError::Rejected(format!(
                    "task {task_id} is not an open task of user {}",
                    event.user_id
                )));
            }
        }

        transaction.execute(
            "INSERT INTO activity_events (user_id, kind, created_at, completed_at, subject_id, note, quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.user_id,
                event.kind.as_str(),
                event.created_at_text(),
                event.completed_at_text(),
                event.subject_id,
                event.note,
                event.quantity,
            ],
        )?;
        let id = transaction.last_insert_rowid();
        transaction.commit()?;

        Ok(id)
    }

    fn update_event(
        &mut self,
        user_id: &str,
        id: i64,
        patch: &EventPatch,
    ) -> Result<bool, StoreError> {
        let changed = match patch.deleted {
            Some(deleted) => self.conn.execute(
                "UPDATE activity_events SET deleted = ?1 WHERE id = ?2 AND user_id = ?3",
                params![deleted, id, user_id],
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM activity_events WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| row.get::<_, i64>(0),
            )? as usize,
        };

        Ok(changed > 0)
    }

    fn query_task_creations(
        &self,
        user_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<String>, StoreError> {
        let mut statement = self
            .conn
            .prepare("SELECT created_at FROM tasks WHERE user_id = ?1 AND deleted = 0")?;

        let rows = statement
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|raw| match parse_timestamp(raw) {
                Some(at) => {
                    filter.from.is_none_or(|from| at >= from) && filter.to.is_none_or(|to| at <= to)
                }
                None => true,
            })
            .collect())
    }
}

impl ChallengeStore for Database {
    fn insert_challenge(
        &mut self,
        challenge: &NewChallenge,
    ) -> Result<ComebackChallenge, StoreError> {
        let created_at = format_timestamp(challenge.created_at);
        self.conn.execute(
            "INSERT INTO comeback_challenges (user_id, challenge_type, challenge_text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                challenge.user_id,
                challenge.challenge_type,
                challenge.challenge_text,
                created_at,
            ],
        )?;

        Ok(ComebackChallenge {
            id: self.conn.last_insert_rowid(),
            user_id: challenge.user_id.clone(),
            challenge_type: challenge.challenge_type.clone(),
            challenge_text: challenge.challenge_text.clone(),
            completed: false,
            dismissed: false,
            created_at,
        })
    }

    fn update_challenge(
        &mut self,
        user_id: &str,
        id: i64,
        state: ChallengeState,
    ) -> Result<bool, StoreError> {
        let assignment = match state {
            ChallengeState::Completed => "completed = 1",
            ChallengeState::Skipped => "dismissed = 1",
            ChallengeState::Offered => return Ok(false),
        };

        let changed = self.conn.execute(
            &format!(
                "UPDATE comeback_challenges SET {assignment}
                 WHERE id = ?1 AND user_id = ?2 AND completed = 0 AND dismissed = 0"
            ),
            params![id, user_id],
        )?;

        Ok(changed > 0)
    }

    fn query_challenges(
        &self,
        user_id: &str,
        filter: ChallengeFilter,
    ) -> Result<Vec<ComebackChallenge>, StoreError> {
        let condition = match filter {
            ChallengeFilter::All => "",
            ChallengeFilter::Offered => "AND completed = 0 AND dismissed = 0",
            ChallengeFilter::Completed => "AND completed = 1",
        };

        let mut statement = self.conn.prepare(&format!(
            "SELECT {CHALLENGE_COLUMNS}
             FROM comeback_challenges
             WHERE user_id = ?1 {condition}
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = statement
            .query_map(params![user_id], challenge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl SnapshotStore for Database {
    fn save_weekly_snapshot(&mut self, aggregate: &WeeklyAggregate) -> Result<(), StoreError> {
        let payload = serde_json::to_string(aggregate)
            .map_err(|error| StoreError::Rejected(error.to_string()))?;

        self.conn.execute(
            "INSERT INTO weekly_snapshots (user_id, as_of, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET as_of=excluded.as_of, payload=excluded.payload",
            params![
                aggregate.user_id,
                aggregate.as_of.format("%Y-%m-%d").to_string(),
                payload
            ],
        )?;

        Ok(())
    }

    fn last_weekly_snapshot(&self, user_id: &str) -> Result<Option<WeeklyAggregate>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM weekly_snapshots WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(payload.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(aggregate) => Some(aggregate),
            Err(error) => {
                warn!(error = %error, user_id, "discarding unreadable weekly snapshot");
                None
            }
        }))
    }
}

fn event_from_row(row: &Row<'_>, kind: ActivityKind) -> rusqlite::Result<ActivityEvent> {
    Ok(ActivityEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        created_at: row.get(3)?,
        completed_at: row.get(4)?,
        subject_id: row.get(5)?,
        note: row.get(6)?,
        quantity: row.get(7)?,
        deleted: row.get(8)?,
    })
}

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<ComebackChallenge> {
    Ok(ComebackChallenge {
        id: row.get(0)?,
        user_id: row.get(1)?,
        challenge_type: row.get(2)?,
        challenge_text: row.get(3)?,
        completed: row.get(4)?,
        dismissed: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::db::tests::open_temp;
    use crate::db::{NewTask, TaskCategory, TaskPriority};
    use crate::engine::challenge::{ComebackTrigger, RECOVERY_PROMPTS, RandomSource};
    use crate::engine::model::{ActivityKind, EventFilter, EventPatch, NewActivityEvent};
    use crate::engine::store::{EventLog, SnapshotStore};
    use crate::engine::{EngagementEngine, EngineSettings};
    use crate::error::{EngineError, StoreError};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    struct FixedIndex(usize);

    impl RandomSource for FixedIndex {
        fn pick(&mut self, _len: usize) -> usize {
            self.0
        }
    }

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap() + Duration::days(offset)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            category: TaskCategory::Wellbeing,
            priority: TaskPriority::Low,
            due_date: None,
        }
    }

    #[test]
    fn completing_task_flips_row_and_records_event_together() {
        let (_dir, mut database) = open_temp();
        let task = database.create_task("amy", &new_task("stretch"), day(0)).unwrap();

        let event = NewActivityEvent::new("amy", ActivityKind::TaskCompleted, day(1))
            .subject(task.id)
            .completed(day(1));
        database.insert_event(&event).unwrap();

        let stored = database.task("amy", task.id).unwrap().expect("task");
        assert_eq!(stored.status, "done");
        assert_eq!(stored.completed_at.as_deref(), Some("2026-03-10T12:00:00Z"));

        let again = database.insert_event(&event);
        assert!(matches!(again, Err(StoreError::Rejected(_))));
        let events = database
            .query_events("amy", ActivityKind::TaskCompleted, &EventFilter::all())
            .unwrap();
        assert_eq!(events.len(), 1, "rejected completion must not leave an event");
    }

    #[test]
    fn restoring_task_retracts_its_streak_contribution() {
        let (_dir, mut database) = open_temp();
        let task = database.create_task("amy", &new_task("laundry"), day(0)).unwrap();
        let mut random = FixedIndex(0);

        {
            let mut engine = EngagementEngine::new(
                &mut database,
                &mut random,
                EngineSettings::default(),
            );
            let outcome = engine.complete_task("amy", task.id, day(0), day(0)).unwrap();
            assert_eq!(outcome.streak, Some(1));
        }

        assert!(database.restore_task("amy", task.id).unwrap());
        assert!(!database.restore_task("amy", task.id).unwrap());
        assert_eq!(database.pending_tasks("amy").unwrap().len(), 1);

        let engine = EngagementEngine::new(&mut database, &mut random, EngineSettings::default());
        assert_eq!(
            engine
                .streak("amy", ActivityKind::TaskCompleted, day(0).date_naive())
                .unwrap(),
            0
        );
    }

    #[test]
    fn completing_unknown_task_is_a_store_rejection() {
        let (_dir, mut database) = open_temp();
        let mut random = FixedIndex(0);
        let mut engine =
            EngagementEngine::new(&mut database, &mut random, EngineSettings::default());

        let result = engine.complete_task("amy", 404, day(0), day(0));
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::Rejected(_)))
        ));
    }

    #[test]
    fn malformed_timestamps_survive_the_round_trip_and_are_skipped() {
        let (_dir, database) = open_temp();
        database
            .conn
            .execute(
                "INSERT INTO activity_events (user_id, kind, created_at) VALUES ('amy', 'mood_checkin', 'yesterday-ish')",
                [],
            )
            .unwrap();
        database
            .conn
            .execute(
                "INSERT INTO activity_events (user_id, kind, created_at) VALUES ('amy', 'mood_checkin', '2026-03-09 08:00:00')",
                [],
            )
            .unwrap();

        let events = database
            .query_events(
                "amy",
                ActivityKind::MoodCheckin,
                &EventFilter::between(day(0) - Duration::days(1), day(1)),
            )
            .unwrap();
        assert_eq!(events.len(), 2);

        let mut database = database;
        let mut random = FixedIndex(0);
        let engine = EngagementEngine::new(&mut database, &mut random, EngineSettings::default());
        let weekly = engine.weekly_aggregate("amy", day(0).date_naive()).unwrap();
        assert_eq!(weekly.mood_logs_7d, 1);
        assert_eq!(weekly.skipped_records, 1);
    }

    #[test]
    fn event_updates_are_scoped_to_the_owner() {
        let (_dir, mut database) = open_temp();
        let id = database
            .insert_event(&NewActivityEvent::new("amy", ActivityKind::MoodCheckin, day(0)))
            .unwrap();

        assert!(!database.update_event("ben", id, &EventPatch::soft_delete()).unwrap());
        assert!(!database.update_event("amy", id + 100, &EventPatch::soft_delete()).unwrap());
        let filter = EventFilter::all();
        assert_eq!(database.query_events("amy", ActivityKind::MoodCheckin, &filter).unwrap().len(), 1);

        assert!(database.update_event("amy", id, &EventPatch::soft_delete()).unwrap());
        assert!(database.query_events("amy", ActivityKind::MoodCheckin, &filter).unwrap().is_empty());
    }

    #[test]
    fn challenge_lifecycle_against_sqlite() {
        let (_dir, mut database) = open_temp();
        let mut random = FixedIndex(2);
        let settings = EngineSettings {
            trigger: ComebackTrigger::ChainBreak,
            ..EngineSettings::default()
        };

        let first = database.create_task("amy", &new_task("one"), day(0)).unwrap();
        let second = database.create_task("amy", &new_task("two"), day(0)).unwrap();
        let mut engine = EngagementEngine::new(&mut database, &mut random, settings);

        engine.complete_task("amy", first.id, day(0), day(0)).unwrap();
        let outcome = engine.complete_task("amy", second.id, day(3), day(3)).unwrap();
        let offered = outcome.challenge.expect("offer after the gap");
        assert_eq!(offered.challenge_text, RECOVERY_PROMPTS[2]);

        let replacement = engine.offer_challenge("amy", day(3) + Duration::hours(1)).unwrap();
        assert_eq!(
            engine.active_challenge("amy").unwrap().map(|c| c.id),
            Some(replacement.id)
        );
        assert!(matches!(
            engine.complete_challenge("amy", offered.id),
            Err(EngineError::NotFound(_))
        ));

        assert_eq!(engine.complete_challenge("amy", replacement.id).unwrap(), 1);
        assert_eq!(engine.challenges_offered("amy").unwrap(), 2);
        assert_eq!(engine.challenge_history("amy", 5).unwrap()[0].id, replacement.id);
    }

    #[test]
    fn weekly_snapshot_is_replaced_per_user() {
        let (_dir, mut database) = open_temp();
        let mut random = FixedIndex(0);

        {
            let mut engine =
                EngagementEngine::new(&mut database, &mut random, EngineSettings::default());
            engine
                .record_activity(
                    NewActivityEvent::new("amy", ActivityKind::HobbySession, day(0)).quantity(30),
                    day(0),
                )
                .unwrap();
            engine
                .record_activity(
                    NewActivityEvent::new("amy", ActivityKind::HobbySession, day(1)).quantity(15),
                    day(1),
                )
                .unwrap();
        }

        let snapshot = database
            .last_weekly_snapshot("amy")
            .unwrap()
            .expect("snapshot");
        assert_eq!(snapshot.as_of, day(1).date_naive());
        assert_eq!(snapshot.hobby_minutes_7d, 45);
        assert!(database.last_weekly_snapshot("ben").unwrap().is_none());
    }
}
