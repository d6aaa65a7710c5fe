use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskList {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "needsAction")]
    NeedsAction,
    #[serde(rename = "completed")]
    Completed,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    #[allow(dead_code)]
    pub completed: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub due: Option<DateTime<FixedOffset>>,

    /// Id of the list this task was fetched from. Not part of the wire format.
    #[serde(skip)]
    pub list_id: String,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListsPage {
    #[serde(default)]
    pub items: Vec<TaskList>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksPage {
    #[serde(default)]
    pub items: Vec<Task>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Everything needed to insert a task mirroring one Jira issue.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub notes: String,
    pub resolved: bool,
    pub resolution_date: Option<DateTime<FixedOffset>>,
    pub due: Option<NaiveDate>,
}

impl TaskDraft {
    /// Completion timestamp for the new task. Only set when the issue is
    /// resolved and Jira reported when.
    pub fn completed_at(&self) -> Option<DateTime<FixedOffset>> {
        if self.resolved {
            self.resolution_date
        } else {
            None
        }
    }
}

/// `YYYY-MM-DDTHH:MM:SS+HH:MM`, seconds precision with an explicit offset.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Google Tasks stores due dates as midnight UTC; the time part is ignored.
pub fn format_due(date: NaiveDate) -> String {
    format!("{}T00:00:00+00:00", date.format("%Y-%m-%d"))
}
