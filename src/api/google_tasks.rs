use crate::errors::google_status_error;
use crate::models::task::{
    format_due, format_timestamp, Task, TaskDraft, TaskList, TaskListsPage, TasksPage,
};
use crate::sync::TaskService;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, warn};

pub const TASKS_API: &str = "https://tasks.googleapis.com/tasks/v1";

/// Only the first page of task lists is read.
const LISTS_PAGE_SIZE: u32 = 10;
const TASKS_PAGE_SIZE: u32 = 10;

pub struct GoogleTasksClient {
    client: Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct InsertTaskPayload {
    title: String,
    notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due: Option<String>,
}

impl From<&TaskDraft> for InsertTaskPayload {
    fn from(draft: &TaskDraft) -> Self {
        let completed = draft.completed_at().map(|ts| format_timestamp(&ts));
        Self {
            title: draft.title.clone(),
            notes: draft.notes.clone(),
            status: completed.as_ref().map(|_| "completed"),
            completed,
            due: draft.due.map(format_due),
        }
    }
}

impl GoogleTasksClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(TASKS_API.to_string(), access_token)
    }

    pub fn with_base_url(base_url: String, access_token: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            access_token,
        }
    }

    pub async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        let url = format!("{}/users/@me/lists", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("maxResults", LISTS_PAGE_SIZE.to_string())])
            .send()
            .await
            .context("Failed to list Google task lists")?;

        let page = ensure_success(response)
            .await?
            .json::<TaskListsPage>()
            .await
            .context("Failed to parse task lists response")?;

        if page.next_page_token.is_some() {
            warn!("More than {} task lists; only the first page is used", LISTS_PAGE_SIZE);
        }

        Ok(page.items)
    }

    /// Every task in the list, following page tokens until the last page.
    pub async fn list_tasks(&self, tasklist_id: &str) -> Result<Vec<Task>> {
        let url = format!(
            "{}/lists/{}/tasks",
            self.base_url,
            urlencoding::encode(tasklist_id)
        );

        let mut tasks = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("maxResults", TASKS_PAGE_SIZE.to_string()),
                ("showHidden", "true".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&query)
                .send()
                .await
                .with_context(|| format!("Failed to list tasks of list {}", tasklist_id))?;

            let page = ensure_success(response)
                .await?
                .json::<TasksPage>()
                .await
                .context("Failed to parse tasks response")?;

            debug!(tasklist_id, received = page.items.len(), "Fetched task page");

            tasks.extend(page.items.into_iter().map(|mut task| {
                task.list_id = tasklist_id.to_string();
                task
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(tasks)
    }

    pub async fn create_task(&self, tasklist_id: &str, draft: &TaskDraft) -> Result<()> {
        let url = format!(
            "{}/lists/{}/tasks",
            self.base_url,
            urlencoding::encode(tasklist_id)
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&InsertTaskPayload::from(draft))
            .send()
            .await
            .with_context(|| format!("Failed to send task creation request: {}", draft.title))?;

        ensure_success(response).await?;

        Ok(())
    }

    pub async fn complete_task(
        &self,
        tasklist_id: &str,
        task_id: &str,
        completed_at: DateTime<FixedOffset>,
    ) -> Result<()> {
        let body = serde_json::json!({
            "status": "completed",
            "completed": format_timestamp(&completed_at),
        });

        self.patch_task(tasklist_id, task_id, &body).await
    }

    pub async fn update_due_date(&self, tasklist_id: &str, task_id: &str, due: NaiveDate) -> Result<()> {
        let body = serde_json::json!({ "due": format_due(due) });

        self.patch_task(tasklist_id, task_id, &body).await
    }

    async fn patch_task(&self, tasklist_id: &str, task_id: &str, body: &serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/lists/{}/tasks/{}",
            self.base_url,
            urlencoding::encode(tasklist_id),
            urlencoding::encode(task_id)
        );

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send update for task {}", task_id))?;

        ensure_success(response).await?;

        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    Err(google_status_error(status, text).into())
}

#[async_trait]
impl TaskService for GoogleTasksClient {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        GoogleTasksClient::list_task_lists(self).await
    }

    async fn list_tasks(&self, tasklist_id: &str) -> Result<Vec<Task>> {
        GoogleTasksClient::list_tasks(self, tasklist_id).await
    }

    async fn create_task(&self, tasklist_id: &str, draft: &TaskDraft) -> Result<()> {
        GoogleTasksClient::create_task(self, tasklist_id, draft).await
    }

    async fn complete_task(
        &self,
        tasklist_id: &str,
        task_id: &str,
        completed_at: DateTime<FixedOffset>,
    ) -> Result<()> {
        GoogleTasksClient::complete_task(self, tasklist_id, task_id, completed_at).await
    }

    async fn update_due_date(&self, tasklist_id: &str, task_id: &str, due: NaiveDate) -> Result<()> {
        GoogleTasksClient::update_due_date(self, tasklist_id, task_id, due).await
    }
}
