use crate::errors::SyncError;
use crate::sync::reconciler::DueDateSource;
use anyhow::Result;
use ::config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub jira_url: String,
    #[serde(default)]
    pub jira_username: String,
    #[serde(default)]
    pub jira_api_key: String,

    /// Google task list that receives new tasks. Falls back to the first list.
    #[serde(default)]
    pub tasklist_id: Option<String>,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default = "default_excluded_projects")]
    pub excluded_projects: Vec<String>,

    /// Side that wins a due-date disagreement on an existing task.
    #[serde(default)]
    pub due_date_source: DueDateSource,

    /// Pause before every task creation, in milliseconds.
    #[serde(default = "default_create_delay_ms")]
    pub create_delay_ms: u64,

    // GOOGLE_TASKLIST_ID, folded into `tasklist_id` on load
    #[serde(default)]
    google_tasklist_id: Option<String>,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_excluded_projects() -> Vec<String> {
    vec!["HELP".to_string(), "EXHELP".to_string()]
}

fn default_create_delay_ms() -> u64 {
    1000
}

impl Settings {
    /// Loads settings from the config file (the given one, or the default
    /// location if it exists) overlaid with the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_from(config_file, None)
    }

    fn load_from(config_file: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        match config_file {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Ok(default_path) = Self::config_path() {
                    builder = builder.add_source(
                        File::from(default_path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::default()
                .source(env)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("excluded_projects"),
        );

        let mut settings: Settings = builder
            .build()
            .map_err(SyncError::from)?
            .try_deserialize()
            .map_err(SyncError::from)?;

        if let Some(id) = settings.google_tasklist_id.take() {
            settings.tasklist_id = Some(id);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&mut self) -> Result<()> {
        self.jira_url = self.jira_url.trim().trim_end_matches('/').to_string();

        if self.jira_url.is_empty() {
            return Err(SyncError::ConfigMissing("JIRA_URL").into());
        }
        if self.jira_username.trim().is_empty() {
            return Err(SyncError::ConfigMissing("JIRA_USERNAME").into());
        }
        if self.jira_api_key.trim().is_empty() {
            return Err(SyncError::ConfigMissing("JIRA_API_KEY").into());
        }
        if !self.jira_url.starts_with("http://") && !self.jira_url.starts_with("https://") {
            return Err(SyncError::ConfigInvalid(format!(
                "JIRA_URL must start with http:// or https:// (got '{}')",
                self.jira_url
            ))
            .into());
        }

        self.tasklist_id = self
            .tasklist_id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(())
    }

    pub fn create_delay(&self) -> Duration {
        Duration::from_millis(self.create_delay_ms)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| SyncError::ConfigInvalid("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("jira-tasks-sync"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
