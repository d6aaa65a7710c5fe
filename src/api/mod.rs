pub mod google_tasks;
pub mod jira;
pub mod oauth;
