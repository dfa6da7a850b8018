pub mod weekly;

use crate::engine::challenge::{RandomSource, saves_until_milestone};
use crate::engine::model::ActivityKind;
use crate::engine::weekly::window_start;
use crate::report::weekly::{ReportInputs, SavedReport, WeeklyReport};
use crate::tracker::Tracker;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

/// Builds one student's weekly report, writes it to disk and records its metadata.
pub fn generate_and_store_report<R: RandomSource>(
    tracker: &mut Tracker<R>,
    user_id: &str,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(WeeklyReport, SavedReport)> {
    let policy = *tracker.policy();
    let study_questions_7d = tracker.database().study_question_count(
        user_id,
        Some(policy.start_of_day(window_start(as_of))),
        Some(policy.end_of_day(as_of)),
    )?;

    let engine = tracker.engine();
    let streaks = ActivityKind::ALL
        .into_iter()
        .map(|kind| engine.streak_summary(user_id, kind, as_of))
        .collect::<Result<Vec<_>, _>>()?;
    let streaks_saved = engine.streaks_saved(user_id)?;
    let challenges_offered = engine.challenges_offered(user_id)?;
    let challenge_waiting = engine.active_challenge(user_id)?.is_some();

    let aggregate = tracker
        .weekly(user_id, as_of)?
        .with_context(|| format!("No weekly data available for {user_id}"))?;

    let report = weekly::build_weekly_report(
        ReportInputs {
            aggregate,
            streaks,
            streaks_saved,
            challenges_offered,
            saves_until_milestone: saves_until_milestone(streaks_saved),
            challenge_waiting,
            study_questions_7d,
        },
        now,
    );

    let saved = weekly::save_report_files(&report, &tracker.config().report_dir)?;

    tracker.database().upsert_report_meta(
        &report.user_id,
        as_of,
        now.timestamp(),
        &saved.markdown_path.display().to_string(),
        &saved.json_path.display().to_string(),
    )?;

    Ok((report, saved))
}

/// Reports for every known student. One student's failure does not stop the rest.
pub fn generate_all_reports<R: RandomSource>(
    tracker: &mut Tracker<R>,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<(WeeklyReport, SavedReport)>> {
    let users = tracker.database().known_users()?;
    let mut generated = Vec::with_capacity(users.len());

    for user_id in users {
        match generate_and_store_report(tracker, &user_id, as_of, now) {
            Ok(result) => generated.push(result),
            Err(error) => warn!(error = %error, user_id = %user_id, "weekly report failed"),
        }
    }

    info!(count = generated.len(), as_of = %as_of, "weekly reports generated");
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::{generate_all_reports, generate_and_store_report};
    use crate::db::NewTask;
    use crate::recommend::MoodLabel;
    use crate::tracker::testing::{day, open_tracker};

    #[test]
    fn report_is_written_and_indexed() {
        let (dir, mut tracker) = open_tracker();
        tracker.check_in("amy", MoodLabel::Happy, 5, day(0)).unwrap();
        let task = tracker.create_task("amy", &NewTask::titled("lab"), day(0)).unwrap();
        tracker.complete_task("amy", task.id, None, day(1)).unwrap();

        let as_of = day(1).date_naive();
        let (report, saved) =
            generate_and_store_report(&mut tracker, "amy", as_of, day(1)).unwrap();

        assert_eq!(report.aggregate.tasks_done_7d, 1);
        assert_eq!(report.streaks.len(), 4);
        assert!(saved.markdown_path.starts_with(dir.path().join("reports/amy")));

        let meta = tracker
            .database()
            .report_meta("amy", as_of)
            .unwrap()
            .expect("report meta");
        assert_eq!(meta.json_path, saved.json_path.display().to_string());
    }

    #[test]
    fn every_known_student_gets_a_report() {
        let (_dir, mut tracker) = open_tracker();
        tracker.check_in("amy", MoodLabel::Calm, 3, day(0)).unwrap();
        tracker.check_in("ben", MoodLabel::Tired, 1, day(0)).unwrap();

        let generated = generate_all_reports(&mut tracker, day(0).date_naive(), day(0)).unwrap();
        let users = generated
            .iter()
            .map(|(report, _)| report.user_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(users, vec!["amy", "ben"]);
    }
}
