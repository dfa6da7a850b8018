use super::{Tracker, invalid_input, not_found, require_user};
use crate::db::{
    CompletedSort, CompletedTaskPage, CompletedTaskQuery, DEFAULT_PAGE_SIZE, NewTask, TaskCategory,
    TaskPriority, TaskRow,
};
use crate::engine::MutationOutcome;
use crate::engine::challenge::RandomSource;
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct TaskCompletion {
    pub task: TaskRow,
    pub outcome: MutationOutcome,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CompletionCounts {
    pub this_week: u32,
    pub this_month: u32,
}

/// Completed-task listing filter with calendar dates; converted to instants by the day policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompletedFilter {
    pub search: Option<String>,
    pub category: Option<TaskCategory>,
    pub priority: Option<TaskPriority>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub sort: Option<CompletedSort>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl<R: RandomSource> Tracker<R> {
    pub fn create_task(&self, user_id: &str, task: &NewTask, now: DateTime<Utc>) -> Result<TaskRow> {
        let user_id = require_user(user_id)?;
        if task.title.trim().is_empty() {
            return Err(invalid_input("task title must not be empty"));
        }
        self.database.create_task(user_id, task, now)
    }

    pub fn pending_tasks(&self, user_id: &str) -> Result<Vec<TaskRow>> {
        self.database.pending_tasks(require_user(user_id)?)
    }

    /// Marks a task done. `completed_at` defaults to `now` and may be backdated, never future.
    pub fn complete_task(
        &mut self,
        user_id: &str,
        task_id: i64,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<TaskCompletion> {
        let user_id = require_user(user_id)?.to_string();
        let completed_at = completed_at.unwrap_or(now);
        if completed_at > now {
            return Err(invalid_input("completion time cannot be in the future"));
        }

        match self.database.task(&user_id, task_id)? {
            None => return Err(not_found(format!("task {task_id}"))),
            Some(task) if task.status != "pending" => {
                return Err(invalid_input(format!("task {task_id} is already done")));
            }
            Some(_) => {}
        }

        let outcome = self
            .engine()
            .complete_task(&user_id, task_id, completed_at, now)?;
        let task = self
            .database
            .task(&user_id, task_id)?
            .ok_or_else(|| not_found(format!("task {task_id}")))?;

        Ok(TaskCompletion { task, outcome })
    }

    pub fn restore_task(&mut self, user_id: &str, task_id: i64) -> Result<()> {
        let user_id = require_user(user_id)?.to_string();
        if !self.database.restore_task(&user_id, task_id)? {
            return Err(not_found(format!("completed task {task_id}")));
        }
        Ok(())
    }

    pub fn delete_task(&mut self, user_id: &str, task_id: i64) -> Result<()> {
        let user_id = require_user(user_id)?.to_string();
        if !self.database.delete_task(&user_id, task_id)? {
            return Err(not_found(format!("task {task_id}")));
        }
        Ok(())
    }

    pub fn completed_tasks(
        &self,
        user_id: &str,
        filter: &CompletedFilter,
    ) -> Result<CompletedTaskPage> {
        let policy = self.policy();
        let query = CompletedTaskQuery {
            search: filter.search.clone(),
            category: filter.category,
            priority: filter.priority,
            completed_from: filter.from.map(|date| policy.start_of_day(date)),
            completed_to: filter.to.map(|date| policy.end_of_day(date)),
            sort: filter.sort.unwrap_or_default(),
            page: filter.page.unwrap_or(1),
            page_size: filter.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        };

        self.database.completed_tasks(require_user(user_id)?, &query)
    }

    /// Completions in the current week (Monday start) and calendar month, up to `now`.
    pub fn completion_counts(&self, user_id: &str, now: DateTime<Utc>) -> Result<CompletionCounts> {
        let user_id = require_user(user_id)?;
        let today = self.today(now);
        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let month_start = today.with_day(1).unwrap_or(today);
        let end = self.policy().end_of_day(today);

        Ok(CompletionCounts {
            this_week: self.database.completed_between(
                user_id,
                self.policy().start_of_day(week_start),
                end,
            )?,
            this_month: self.database.completed_between(
                user_id,
                self.policy().start_of_day(month_start),
                end,
            )?,
        })
    }
}
