use super::{Tracker, invalid_input, require_user};
use crate::db::TaskRow;
use crate::engine::challenge::RandomSource;
use crate::engine::model::{ActivityKind, EventFilter, WeeklyAggregate};
use crate::engine::store::EventLog;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

const TOP_STUDENTS: usize = 5;
const LOW_ENERGY_MAX: i64 = 2;
const MEDIUM_ENERGY_MAX: i64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct StudentOverview {
    pub user_id: String,
    pub mood_streak: u32,
    pub recommendation_streak: u32,
    pub task_streak: u32,
    pub longest_mood_streak: u32,
    pub streaks_saved: u32,
    pub challenges_offered: u32,
    pub weekly: Option<WeeklyAggregate>,
    pub study_questions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnergyDistribution {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSummary {
    pub total: u32,
    pub completed: u32,
    pub pending: u32,
    /// Pending with a due date before today.
    pub overdue: u32,
    /// Percent, one decimal.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u32,
}

/// Class-wide analytics over the same students and date range as the rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassSummary {
    pub mood_checkins: u32,
    pub average_energy: Option<f64>,
    pub energy_distribution: EnergyDistribution,
    pub tasks: TaskSummary,
    pub categories: Vec<LabelCount>,
    pub priorities: Vec<LabelCount>,
    pub top_task_completers: Vec<LabelCount>,
    pub top_study_askers: Vec<LabelCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherOverview {
    pub as_of: NaiveDate,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub students: Vec<StudentOverview>,
    pub class: ClassSummary,
}

impl<R: RandomSource> Tracker<R> {
    /// Per-student engagement rows plus a class summary. Streaks are always as of today;
    /// `from`/`to` bound question counts, mood check-ins and task creation dates.
    pub fn teacher_overview(
        &mut self,
        only_user: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<TeacherOverview> {
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(invalid_input(format!("date range {from}..{to} is reversed")));
        }

        let users = match only_user {
            Some(user_id) => vec![require_user(user_id)?.to_string()],
            None => self.database.known_users()?,
        };
        let as_of = self.today(now);

        let mut students = Vec::with_capacity(users.len());
        for user_id in &users {
            students.push(self.student_overview(user_id.clone(), as_of, from, to)?);
        }
        let class = self.class_summary(&users, &students, from, to, as_of)?;

        Ok(TeacherOverview {
            as_of,
            from,
            to,
            students,
            class,
        })
    }

    fn class_summary(
        &self,
        users: &[String],
        students: &[StudentOverview],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        as_of: NaiveDate,
    ) -> Result<ClassSummary> {
        let policy = *self.policy();
        let filter = EventFilter {
            from: from.map(|date| policy.start_of_day(date)),
            to: to.map(|date| policy.end_of_day(date)),
        };

        let mut energies = Vec::new();
        let mut tasks = Vec::new();
        for user_id in users {
            energies.extend(
                self.database
                    .query_events(user_id, ActivityKind::MoodCheckin, &filter)?
                    .into_iter()
                    .filter_map(|event| event.quantity),
            );
            tasks.extend(
                self.database
                    .tasks_created_between(user_id, filter.from, filter.to)?,
            );
        }

        let questions = students
            .iter()
            .map(|row| (row.user_id.as_str(), row.study_questions));
        Ok(summarize_class(&energies, &tasks, questions, as_of))
    }

    fn student_overview(
        &mut self,
        user_id: String,
        as_of: NaiveDate,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<StudentOverview> {
        let policy = *self.policy();
        let study_questions = self.database.study_question_count(
            &user_id,
            from.map(|date| policy.start_of_day(date)),
            to.map(|date| policy.end_of_day(date)),
        )?;

        let engine = self.engine();
        let mood = engine.streak_summary(&user_id, ActivityKind::MoodCheckin, as_of)?;
        let recommendation_streak =
            engine.streak(&user_id, ActivityKind::RecommendationDone, as_of)?;
        let task_streak = engine.streak(&user_id, ActivityKind::TaskCompleted, as_of)?;
        let streaks_saved = engine.streaks_saved(&user_id)?;
        let challenges_offered = engine.challenges_offered(&user_id)?;

        Ok(StudentOverview {
            mood_streak: mood.current,
            recommendation_streak,
            task_streak,
            longest_mood_streak: mood.longest,
            streaks_saved,
            challenges_offered,
            weekly: self.weekly(&user_id, as_of)?,
            study_questions,
            user_id,
        })
    }
}

fn summarize_class<'a>(
    energies: &[i64],
    tasks: &[TaskRow],
    study_questions: impl IntoIterator<Item = (&'a str, u32)>,
    today: NaiveDate,
) -> ClassSummary {
    let mut distribution = EnergyDistribution::default();
    for &energy in energies {
        match energy {
            ..=LOW_ENERGY_MAX => distribution.low += 1,
            ..=MEDIUM_ENERGY_MAX => distribution.medium += 1,
            _ => distribution.high += 1,
        }
    }
    let average_energy = (!energies.is_empty()).then(|| {
        let mean = energies.iter().sum::<i64>() as f64 / energies.len() as f64;
        (mean * 100.0).round() / 100.0
    });

    let mut summary = TaskSummary::default();
    let mut categories = BTreeMap::new();
    let mut priorities = BTreeMap::new();
    let mut completers = BTreeMap::new();
    for task in tasks {
        summary.total += 1;
        if task.status == "done" {
            summary.completed += 1;
            *completers.entry(task.user_id.clone()).or_insert(0) += 1;
        } else {
            summary.pending += 1;
            if task.due_date.is_some_and(|due| due < today) {
                summary.overdue += 1;
            }
        }
        *categories.entry(task.category.as_str().to_string()).or_insert(0) += 1;
        *priorities.entry(task.priority.as_str().to_string()).or_insert(0) += 1;
    }
    if summary.total > 0 {
        let rate = f64::from(summary.completed) * 100.0 / f64::from(summary.total);
        summary.completion_rate = (rate * 10.0).round() / 10.0;
    }

    let askers = study_questions
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(user_id, count)| (user_id.to_string(), count))
        .collect::<BTreeMap<_, _>>();

    ClassSummary {
        mood_checkins: energies.len() as u32,
        average_energy,
        energy_distribution: distribution,
        tasks: summary,
        categories: ranked(categories, usize::MAX),
        priorities: ranked(priorities, usize::MAX),
        top_task_completers: ranked(completers, TOP_STUDENTS),
        top_study_askers: ranked(askers, TOP_STUDENTS),
    }
}

/// Highest count first; ties keep label order.
fn ranked(counts: BTreeMap<String, u32>, limit: usize) -> Vec<LabelCount> {
    let mut rows = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect::<Vec<_>>();
    rows.sort_by(|left, right| right.count.cmp(&left.count));
    rows.truncate(limit);
    rows
}
