use super::tasks::CompletionCounts;
use super::{Tracker, require_user};
use crate::db::{HobbyRow, TaskRow};
use crate::engine::challenge::{RandomSource, saves_until_milestone};
use crate::engine::model::{ActivityKind, ComebackChallenge, WeeklyAggregate};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Everything the student home screen shows in one read.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user_id: String,
    pub today: NaiveDate,
    pub mood_streak: u32,
    pub recommendation_streak: u32,
    pub task_streak: u32,
    pub streaks_saved: u32,
    pub saves_until_milestone: u32,
    pub active_challenge: Option<ComebackChallenge>,
    pub pending_tasks: Vec<TaskRow>,
    pub hobbies: Vec<HobbyRow>,
    pub completed: CompletionCounts,
    pub weekly: Option<WeeklyAggregate>,
}

impl<R: RandomSource> Tracker<R> {
    pub fn dashboard(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<Dashboard> {
        let user_id = require_user(user_id)?.to_string();
        let today = self.today(now);

        let engine = self.engine();
        let mood_streak = engine.streak(&user_id, ActivityKind::MoodCheckin, today)?;
        let recommendation_streak =
            engine.streak(&user_id, ActivityKind::RecommendationDone, today)?;
        let task_streak = engine.streak(&user_id, ActivityKind::TaskCompleted, today)?;
        let streaks_saved = engine.streaks_saved(&user_id)?;
        let active_challenge = engine.active_challenge(&user_id)?;

        Ok(Dashboard {
            mood_streak,
            recommendation_streak,
            task_streak,
            streaks_saved,
            saves_until_milestone: saves_until_milestone(streaks_saved),
            active_challenge,
            pending_tasks: self.pending_tasks(&user_id)?,
            hobbies: self.hobbies(&user_id)?,
            completed: self.completion_counts(&user_id, now)?,
            weekly: self.weekly(&user_id, today)?,
            today,
            user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{NewHobby, NewTask};
    use crate::recommend::MoodLabel;
    use crate::tracker::testing::{day, open_tracker};

    #[test]
    fn dashboard_collects_streaks_tasks_and_rollup() {
        let (_dir, mut tracker) = open_tracker();
        tracker.check_in("amy", MoodLabel::Happy, 4, day(0)).unwrap();
        tracker.check_in("amy", MoodLabel::Calm, 3, day(1)).unwrap();
        tracker.complete_recommendation("amy", 4, day(1)).unwrap();
        let done = tracker.create_task("amy", &NewTask::titled("essay"), day(0)).unwrap();
        tracker.create_task("amy", &NewTask::titled("quiz"), day(0)).unwrap();
        tracker.complete_task("amy", done.id, None, day(1)).unwrap();
        tracker
            .create_hobby(
                "amy",
                &NewHobby {
                    name: "chess".to_string(),
                    sessions_per_week: Some(2),
                    minutes_per_session: None,
                },
                day(0),
            )
            .unwrap();

        let dashboard = tracker.dashboard("amy", day(1)).unwrap();
        assert_eq!(dashboard.mood_streak, 2);
        assert_eq!(dashboard.recommendation_streak, 1);
        assert_eq!(dashboard.task_streak, 1);
        assert_eq!(dashboard.saves_until_milestone, 10);
        assert!(dashboard.active_challenge.is_none());
        assert_eq!(dashboard.pending_tasks.len(), 1);
        assert_eq!(dashboard.hobbies.len(), 1);
        assert_eq!(dashboard.completed.this_week, 1);

        let weekly = dashboard.weekly.expect("weekly");
        assert_eq!(weekly.mood_logs_7d, 2);
        assert_eq!(weekly.tasks_created_7d, 2);
        assert_eq!(weekly.tasks_done_7d, 1);
    }

    #[test]
    fn streaks_lapse_when_today_has_no_activity() {
        let (_dir, mut tracker) = open_tracker();
        tracker.check_in("amy", MoodLabel::Tired, 2, day(0)).unwrap();

        let dashboard = tracker.dashboard("amy", day(2)).unwrap();
        assert_eq!(dashboard.mood_streak, 0);
        assert!(dashboard.pending_tasks.is_empty());
    }
}
