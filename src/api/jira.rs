use crate::errors::jira_status_error;
use crate::models::issue::{JiraIssue, SearchResponse, SEARCH_FIELDS};
use crate::sync::IssueTracker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use tracing::debug;

/// Issues requested per search call.
pub const PAGE_SIZE: u32 = 50;

pub struct JiraClient {
    client: Client,
    base_url: String,
    username: String,
    api_key: String,
    excluded_projects: Vec<String>,
}

impl JiraClient {
    pub fn new(base_url: String, username: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            username,
            api_key,
            excluded_projects: Vec::new(),
        }
    }

    pub fn with_excluded_projects(mut self, projects: Vec<String>) -> Self {
        self.excluded_projects = projects;
        self
    }

    /// Issues assigned to the authenticated user outside the excluded projects.
    pub fn jql(&self) -> String {
        if self.excluded_projects.is_empty() {
            "assignee = currentUser()".to_string()
        } else {
            format!(
                "assignee = currentUser() and project NOT IN ({})",
                self.excluded_projects.join(", ")
            )
        }
    }

    /// One page of the offset-paged `/rest/api/2/search` endpoint. Jira Cloud
    /// deprecates it in favour of token-paged `/search/jql`; Data Center and
    /// legacy Cloud instances still serve it.
    pub async fn search_page(&self, start_at: u32) -> Result<SearchResponse> {
        let url = format!("{}/rest/api/2/search", self.base_url);

        let body = serde_json::json!({
            "jql": self.jql(),
            "startAt": start_at,
            "maxResults": PAGE_SIZE,
            "fields": SEARCH_FIELDS,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&body)
            .send()
            .await
            .context("Failed to send search request to Jira")?;

        let response = ensure_success(response).await?;

        let page = response
            .json::<SearchResponse>()
            .await
            .context("Failed to parse Jira search response")?;

        Ok(page)
    }

    /// Walks every search page, in server order, until the offset passes the
    /// reported total.
    pub async fn fetch_assigned_issues(&self) -> Result<Vec<JiraIssue>> {
        let mut issues = Vec::new();
        let mut start_at = 0;

        loop {
            let page = self.search_page(start_at).await?;
            debug!(start_at = page.start_at, total = page.total, received = page.issues.len(), "Fetched Jira page");

            let total = page.total;
            issues.extend(page.issues);
            start_at += PAGE_SIZE;

            if start_at > total {
                break;
            }
        }

        Ok(issues)
    }

    pub async fn set_due_date(&self, issue_key: &str, due: NaiveDate) -> Result<()> {
        let url = format!(
            "{}/rest/api/2/issue/{}",
            self.base_url,
            urlencoding::encode(issue_key)
        );

        let body = serde_json::json!({
            "fields": {
                "duedate": due.format("%Y-%m-%d").to_string()
            }
        });

        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send due date update for {}", issue_key))?;

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
    Err(jira_status_error(status, text).into())
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn fetch_assigned_issues(&self) -> Result<Vec<JiraIssue>> {
        JiraClient::fetch_assigned_issues(self).await
    }

    async fn set_due_date(&self, issue_key: &str, due: NaiveDate) -> Result<()> {
        JiraClient::set_due_date(self, issue_key, due).await
    }
}
