//! Reconciliation between Jira issues and Google Tasks.
//!
//! The reconciler only talks to the two systems through [`IssueTracker`] and
//! [`TaskService`], so it runs the same against the HTTP clients in `api` and
//! against in-memory fakes in tests.

pub mod matching;
pub mod reconciler;
pub mod throttle;

use crate::models::issue::JiraIssue;
use crate::models::task::{Task, TaskDraft, TaskList};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Every issue assigned to the current user, in server order.
    async fn fetch_assigned_issues(&self) -> Result<Vec<JiraIssue>>;

    /// Sets only the due date of one issue.
    async fn set_due_date(&self, issue_key: &str, due: NaiveDate) -> Result<()>;
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>>;

    /// Every task of one list, each tagged with that list's id.
    async fn list_tasks(&self, tasklist_id: &str) -> Result<Vec<Task>>;

    async fn create_task(&self, tasklist_id: &str, draft: &TaskDraft) -> Result<()>;

    async fn complete_task(
        &self,
        tasklist_id: &str,
        task_id: &str,
        completed_at: DateTime<FixedOffset>,
    ) -> Result<()>;

    async fn update_due_date(&self, tasklist_id: &str, task_id: &str, due: NaiveDate) -> Result<()>;
}
