use colored::*;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum SyncError {
    // Configuration errors
    ConfigMissing(&'static str),
    ConfigInvalid(String),
    CredentialsNotFound(PathBuf),

    // Google authorization errors
    AuthorizationFailed(String),

    // Jira errors
    JiraAuthFailed(u16),
    JiraApiError(u16, String),

    // Google Tasks errors
    GoogleAuthFailed(u16),
    GoogleApiError(u16, String),
    NoTaskLists,
    TaskListNotFound(String),

    // Network errors
    NetworkError(String),

    // Generic error
    Other(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration errors
            SyncError::ConfigMissing(var) => {
                write!(f, "{}\n", format!("{} is not set", var).red().bold())?;
                write!(f, "   {}\n\n", "All Jira settings are required before a sync can run".dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Export it: {}\n", format!("export {}=...", var).green())?;
                write!(f, "   2. Or add it to ~/.config/jira-tasks-sync/config.toml")
            }
            SyncError::ConfigInvalid(msg) => {
                write!(f, "{}\n", "Invalid configuration".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   Check ~/.config/jira-tasks-sync/config.toml or the file passed with --config")
            }
            SyncError::CredentialsNotFound(path) => {
                write!(f, "{}\n", "Google client credentials not found".red().bold())?;
                write!(f, "   {}\n\n", format!("Looked for {}", path.display()).dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Create an OAuth client (Desktop app) in the Google Cloud console\n")?;
                write!(f, "   2. Download it as {}", "credentials.json".green())
            }

            SyncError::AuthorizationFailed(msg) => {
                write!(f, "{}\n", "Google authorization failed".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Delete token.json\n")?;
                write!(f, "   2. Run again and paste a fresh authorization code")
            }

            // Jira errors
            SyncError::JiraAuthFailed(status) => {
                write!(f, "{}\n", format!("Jira authentication failed ({})", status).red().bold())?;
                write!(f, "   {}\n\n", "Your API token may have expired or is invalid".dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Generate new token: {}\n", "https://id.atlassian.com/manage-profile/security/api-tokens".cyan())?;
                write!(f, "   2. Update {} and {}", "JIRA_USERNAME".green(), "JIRA_API_KEY".green())
            }
            SyncError::JiraApiError(status, msg) => {
                write!(f, "{}\n", format!("Jira API error ({})", status).red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   Try again or check your network connection")
            }

            // Google Tasks errors
            SyncError::GoogleAuthFailed(status) => {
                write!(f, "{}\n", format!("Google Tasks authentication failed ({})", status).red().bold())?;
                write!(f, "   {}\n\n", "The stored token was rejected".dimmed())?;
                write!(f, "   To fix: delete token.json and authorize again")
            }
            SyncError::GoogleApiError(status, msg) => {
                write!(f, "{}\n", format!("Google Tasks API error ({})", status).red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   Try again in a moment")
            }
            SyncError::NoTaskLists => {
                write!(f, "{}\n", "No task lists found".red().bold())?;
                write!(f, "   {}", "Create a list in Google Tasks first".dimmed())
            }
            SyncError::TaskListNotFound(id) => {
                write!(f, "{}\n", format!("Task list '{}' not found", id).red().bold())?;
                write!(f, "   {}\n\n", "The configured list is not among your Google task lists".dimmed())?;
                write!(f, "   Check {} or --tasklist", "GOOGLE_TASKLIST_ID".green())
            }

            // Network errors
            SyncError::NetworkError(msg) => {
                write!(f, "{}\n", "Network error".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check your internet connection\n")?;
                write!(f, "   2. Verify you can reach Jira and Google\n")?;
                write!(f, "   3. Try again in a moment")
            }

            // Generic
            SyncError::Other(msg) => {
                write!(f, "{}\n", "Error".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
        }
    }
}

impl std::error::Error for SyncError {}

impl From<::config::ConfigError> for SyncError {
    fn from(err: ::config::ConfigError) -> Self {
        SyncError::ConfigInvalid(err.to_string())
    }
}

// Typed errors pass through untouched; transport failures become network errors.
impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
            if reqwest_err.is_timeout() || reqwest_err.is_connect() {
                return SyncError::NetworkError(format!("{:#}", err));
            }
        }
        match err.downcast::<SyncError>() {
            Ok(sync_err) => sync_err,
            Err(other) => SyncError::Other(format!("{:#}", other)),
        }
    }
}

/// Maps a non-success Jira status to the matching error.
pub fn jira_status_error(status: u16, body: String) -> SyncError {
    match status {
        401 | 403 => SyncError::JiraAuthFailed(status),
        _ => SyncError::JiraApiError(status, body),
    }
}

/// Maps a non-success Google status to the matching error.
pub fn google_status_error(status: u16, body: String) -> SyncError {
    match status {
        401 | 403 => SyncError::GoogleAuthFailed(status),
        _ => SyncError::GoogleApiError(status, body),
    }
}
