//! How a Jira issue finds its Google task.
//!
//! The only link between the two systems is the task title: `[KEY] summary`.
//! Renaming a task in Google or the issue in Jira breaks the link and the next
//! run creates a fresh task.

use crate::models::issue::JiraIssue;
use crate::models::task::Task;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::HashMap;

/// Title of the task mirroring `issue`.
pub fn task_title(issue: &JiraIssue) -> String {
    format!("[{}] {}", issue.key, issue.fields.summary)
}

/// Issue description followed by a link back to the issue.
pub fn task_notes(issue: &JiraIssue, jira_url: &str) -> String {
    format!(
        "{}\n\n{}/browse/{}",
        issue.fields.description.as_deref().unwrap_or_default(),
        jira_url,
        issue.key
    )
}

/// Tasks grouped by exact title, in fetch order.
pub struct TaskIndex<'a> {
    by_title: HashMap<&'a str, Vec<&'a Task>>,
}

#[derive(Debug)]
pub struct TaskMatch<'a> {
    pub task: &'a Task,
    /// Further tasks with the same title that were passed over.
    pub duplicates: usize,
}

impl<'a> TaskIndex<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        let mut by_title: HashMap<&'a str, Vec<&'a Task>> = HashMap::new();
        for task in tasks {
            by_title.entry(task.title.as_str()).or_default().push(task);
        }
        Self { by_title }
    }

    /// Case-sensitive exact match; the first fetched task wins.
    pub fn lookup(&self, title: &str) -> Option<TaskMatch<'a>> {
        let candidates = self.by_title.get(title)?;
        let task: &'a Task = *candidates.first()?;
        Some(TaskMatch {
            task,
            duplicates: candidates.len() - 1,
        })
    }
}

/// Day-granular comparison. Each timestamp contributes the date it carries in
/// its own offset; an absent Jira date never matches.
pub fn same_day(jira_due: Option<NaiveDate>, task_due: &DateTime<FixedOffset>) -> bool {
    jira_due == Some(task_due.date_naive())
}
