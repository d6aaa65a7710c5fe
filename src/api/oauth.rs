//! Google OAuth for an installed application.
//!
//! Credentials come from the client secret file exported by the Google Cloud
//! console. The token file holds the access and refresh tokens; it is written
//! after the first interactive authorization and refreshed in place when the
//! access token is about to expire.

use crate::errors::SyncError;
use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";

/// Refresh when the access token has less than this left.
const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecrets {
    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    pub fn expires_soon(&self, now_ms: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => expiry <= now_ms + EXPIRY_MARGIN_MS,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self
                .expires_in
                .map(|secs| Utc::now().timestamp_millis() + secs * 1000),
        }
    }
}

pub struct GoogleAuthenticator {
    client: Client,
    secrets: ClientSecrets,
    token_path: PathBuf,
    token_url: String,
}

impl GoogleAuthenticator {
    pub fn new(secrets: ClientSecrets, token_path: PathBuf) -> Self {
        Self {
            client: Client::new(),
            secrets,
            token_path,
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn from_files(credentials_path: &Path, token_path: &Path) -> Result<Self> {
        let secrets = load_client_secrets(credentials_path)?;
        Ok(Self::new(secrets, token_path.to_path_buf()))
    }

    #[cfg(test)]
    pub fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }

    /// A usable access token: the stored one, a refreshed one, or one
    /// obtained by asking the user to authorize in the browser.
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.usable_stored_token().await? {
            return Ok(token.access_token);
        }

        let token = self.authorize_interactively().await?;
        Ok(token.access_token)
    }

    /// The stored token if it is still valid or could be refreshed.
    async fn usable_stored_token(&self) -> Result<Option<StoredToken>> {
        let Some(stored) = load_token(&self.token_path) else {
            return Ok(None);
        };

        if !stored.expires_soon(Utc::now().timestamp_millis()) {
            debug!("Using stored Google access token");
            return Ok(Some(stored));
        }

        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            warn!("Stored Google token expired and has no refresh token");
            return Ok(None);
        };

        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                save_token(&self.token_path, &refreshed)?;
                info!("Refreshed Google access token");
                Ok(Some(refreshed))
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Could not refresh Google access token");
                Ok(None)
            }
        }
    }

    pub fn authorization_url(&self) -> Result<String> {
        let url = Url::parse_with_params(
            AUTH_URL,
            [
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", self.secrets.redirect_uri()),
                ("response_type", "code"),
                ("scope", TASKS_SCOPE),
                ("access_type", "offline"),
            ],
        )
        .context("Failed to build authorization URL")?;

        Ok(url.to_string())
    }

    async fn authorize_interactively(&self) -> Result<StoredToken> {
        let auth_url = self.authorization_url()?;

        println!("{}", "Authorize this app by visiting this url:".bold());
        println!("  {}", auth_url.bright_cyan());
        println!();
        if open::that(&auth_url).is_err() {
            debug!("Could not open a browser for the authorization URL");
        }

        let code: String = dialoguer::Input::new()
            .with_prompt("Enter the code from that page here")
            .interact_text()
            .context("Failed to read authorization code")?;

        let token = self.exchange_code(code.trim()).await?;
        save_token(&self.token_path, &token)?;
        println!(
            "{}",
            format!("Token stored to {}", self.token_path.display()).green()
        );

        Ok(token)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.secrets.redirect_uri()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Failed to send token exchange request")?;

        let token = parse_token_response(response).await?;
        Ok(token.into_stored(None))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        let token = parse_token_response(response).await?;
        Ok(token.into_stored(Some(refresh_token)))
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(SyncError::AuthorizationFailed(format!("HTTP {}: {}", status, text.trim())).into());
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .context("Failed to parse token response")?;

    Ok(token)
}

pub fn load_client_secrets(path: &Path) -> Result<ClientSecrets> {
    if !path.exists() {
        return Err(SyncError::CredentialsNotFound(path.to_path_buf()).into());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let file: CredentialsFile = serde_json::from_str(&content)
        .map_err(|e| SyncError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;

    file.installed.or(file.web).ok_or_else(|| {
        SyncError::ConfigInvalid(format!(
            "{} has neither an 'installed' nor a 'web' client",
            path.display()
        ))
        .into()
    })
}

/// Reads the token file. A missing or unreadable file means "authorize again".
pub fn load_token(path: &Path) -> Option<StoredToken> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable token file");
            None
        }
    }
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create token directory")?;
    }

    let content = serde_json::to_string(token).context("Failed to serialize token")?;
    std::fs::write(path, content).context("Failed to write token file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}
