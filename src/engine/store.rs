use crate::engine::model::{
    ActivityEvent, ActivityKind, ChallengeFilter, ChallengeState, ComebackChallenge, EventFilter,
    EventPatch, NewActivityEvent, NewChallenge, WeeklyAggregate,
};
use crate::error::StoreError;

/// Append-only activity log. Soft-deleted events never come back from `query_events`.
pub trait EventLog {
    /// Events of one kind for one user, ordered by occurred-at then id.
    fn query_events(
        &self,
        user_id: &str,
        kind: ActivityKind,
        filter: &EventFilter,
    ) -> Result<Vec<ActivityEvent>, StoreError>;

    fn insert_event(&mut self, event: &NewActivityEvent) -> Result<i64, StoreError>;

    /// Applies `patch` to one of the user's events. Returns `false` when no event with that id
    /// belongs to the user.
    fn update_event(
        &mut self,
        user_id: &str,
        id: i64,
        patch: &EventPatch,
    ) -> Result<bool, StoreError>;

    /// Raw creation timestamps of the user's non-deleted tasks.
    fn query_task_creations(
        &self,
        user_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<String>, StoreError>;
}

pub trait ChallengeStore {
    fn insert_challenge(&mut self, challenge: &NewChallenge)
    -> Result<ComebackChallenge, StoreError>;

    /// Moves an offered challenge to `state`. Returns `false` when no offered challenge with
    /// that id belongs to the user.
    fn update_challenge(
        &mut self,
        user_id: &str,
        id: i64,
        state: ChallengeState,
    ) -> Result<bool, StoreError>;

    /// Newest first.
    fn query_challenges(
        &self,
        user_id: &str,
        filter: ChallengeFilter,
    ) -> Result<Vec<ComebackChallenge>, StoreError>;
}

/// Cached copy of the latest weekly aggregate. Never the source of truth.
pub trait SnapshotStore {
    fn save_weekly_snapshot(&mut self, aggregate: &WeeklyAggregate) -> Result<(), StoreError>;

    fn last_weekly_snapshot(&self, user_id: &str) -> Result<Option<WeeklyAggregate>, StoreError>;
}

#[cfg(test)]
pub mod memory {
    use super::{ChallengeStore, EventLog, SnapshotStore};
    use crate::engine::model::{
        ActivityEvent, ActivityKind, ChallengeFilter, ChallengeState, ComebackChallenge,
        EventFilter, EventPatch, NewActivityEvent, NewChallenge, WeeklyAggregate,
    };
    use crate::engine::time::{format_timestamp, parse_timestamp};
    use crate::error::StoreError;
    use std::collections::HashMap;

    /// In-process store with switches to simulate an unavailable backend.
    #[derive(Default)]
    pub struct MemoryStore {
        pub events: Vec<ActivityEvent>,
        pub task_creations: Vec<(String, String)>,
        pub challenges: Vec<ComebackChallenge>,
        pub snapshots: HashMap<String, WeeklyAggregate>,
        pub fail_reads: bool,
        pub fail_event_writes: bool,
        pub fail_challenge_writes: bool,
    }

    impl MemoryStore {
        pub fn push_raw_event(&mut self, user_id: &str, kind: ActivityKind, created_at: &str) {
            let id = self.events.len() as i64 + 1;
            self.events.push(ActivityEvent {
                id,
                user_id: user_id.to_string(),
                kind,
                created_at: created_at.to_string(),
                completed_at: None,
                subject_id: None,
                note: None,
                quantity: None,
                deleted: false,
            });
        }

        fn unavailable() -> StoreError {
            StoreError::Transient("memory store switched off".to_string())
        }
    }

    impl EventLog for MemoryStore {
        fn query_events(
            &self,
            user_id: &str,
            kind: ActivityKind,
            filter: &EventFilter,
        ) -> Result<Vec<ActivityEvent>, StoreError> {
            if self.fail_reads {
                return Err(Self::unavailable());
            }

            let mut rows = self
                .events
                .iter()
                .filter(|event| event.user_id == user_id && event.kind == kind && !event.deleted)
                .filter(|event| match event.occurred_at() {
                    Ok(at) => {
                        filter.from.is_none_or(|from| at >= from)
                            && filter.to.is_none_or(|to| at <= to)
                    }
                    Err(_) => true,
                })
                .cloned()
                .collect::<Vec<_>>();
            rows.sort_by_key(|event| (event.occurred_at().ok(), event.id));

            Ok(rows)
        }

        fn insert_event(&mut self, event: &NewActivityEvent) -> Result<i64, StoreError> {
            if self.fail_event_writes {
                return Err(Self::unavailable());
            }

            let id = self.events.len() as i64 + 1;
            self.events.push(ActivityEvent {
                id,
                user_id: event.user_id.clone(),
                kind: event.kind,
                created_at: event.created_at_text(),
                completed_at: event.completed_at_text(),
                subject_id: event.subject_id,
                note: event.note.clone(),
                quantity: event.quantity,
                deleted: false,
            });

            Ok(id)
        }

        fn update_event(
            &mut self,
            user_id: &str,
            id: i64,
            patch: &EventPatch,
        ) -> Result<bool, StoreError> {
            if self.fail_event_writes {
                return Err(Self::unavailable());
            }

            let Some(event) = self
                .events
                .iter_mut()
                .find(|event| event.id == id && event.user_id == user_id)
            else {
                return Ok(false);
            };
            if let Some(deleted) = patch.deleted {
                event.deleted = deleted;
            }

            Ok(true)
        }

        fn query_task_creations(
            &self,
            user_id: &str,
            _filter: &EventFilter,
        ) -> Result<Vec<String>, StoreError> {
            if self.fail_reads {
                return Err(Self::unavailable());
            }

            Ok(self
                .task_creations
                .iter()
                .filter(|(owner, _)| owner == user_id)
                .map(|(_, created_at)| created_at.clone())
                .collect())
        }
    }

    impl ChallengeStore for MemoryStore {
        fn insert_challenge(
            &mut self,
            challenge: &NewChallenge,
        ) -> Result<ComebackChallenge, StoreError> {
            if self.fail_challenge_writes {
                return Err(Self::unavailable());
            }

            let stored = ComebackChallenge {
                id: self.challenges.len() as i64 + 1,
                user_id: challenge.user_id.clone(),
                challenge_type: challenge.challenge_type.clone(),
                challenge_text: challenge.challenge_text.clone(),
                completed: false,
                dismissed: false,
                created_at: format_timestamp(challenge.created_at),
            };
            self.challenges.push(stored.clone());

            Ok(stored)
        }

        fn update_challenge(
            &mut self,
            user_id: &str,
            id: i64,
            state: ChallengeState,
        ) -> Result<bool, StoreError> {
            if self.fail_challenge_writes {
                return Err(Self::unavailable());
            }

            let target = self.challenges.iter_mut().find(|challenge| {
                challenge.id == id
                    && challenge.user_id == user_id
                    && challenge.state() == ChallengeState::Offered
            });

            Ok(match (target, state) {
                (Some(challenge), ChallengeState::Completed) => {
                    challenge.completed = true;
                    true
                }
                (Some(challenge), ChallengeState::Skipped) => {
                    challenge.dismissed = true;
                    true
                }
                _ => false,
            })
        }

        fn query_challenges(
            &self,
            user_id: &str,
            filter: ChallengeFilter,
        ) -> Result<Vec<ComebackChallenge>, StoreError> {
            if self.fail_reads {
                return Err(Self::unavailable());
            }

            let mut rows = self
                .challenges
                .iter()
                .filter(|challenge| challenge.user_id == user_id)
                .filter(|challenge| match filter {
                    ChallengeFilter::All => true,
                    ChallengeFilter::Offered => challenge.state() == ChallengeState::Offered,
                    ChallengeFilter::Completed => challenge.completed,
                })
                .cloned()
                .collect::<Vec<_>>();
            rows.sort_by_key(|challenge| {
                std::cmp::Reverse((parse_timestamp(&challenge.created_at), challenge.id))
            });

            Ok(rows)
        }
    }

    impl SnapshotStore for MemoryStore {
        fn save_weekly_snapshot(&mut self, aggregate: &WeeklyAggregate) -> Result<(), StoreError> {
            if self.fail_event_writes {
                return Err(Self::unavailable());
            }

            self.snapshots
                .insert(aggregate.user_id.clone(), aggregate.clone());
            Ok(())
        }

        fn last_weekly_snapshot(
            &self,
            user_id: &str,
        ) -> Result<Option<WeeklyAggregate>, StoreError> {
            Ok(self.snapshots.get(user_id).cloned())
        }
    }
}
