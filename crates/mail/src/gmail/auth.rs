//! Gmail credential refresh
//!
//! Implements the [`TokenProvider`] contract over Google's OAuth2 token
//! endpoint. The interactive consent flow is owned by the enclosing
//! application; this provider only loads the stored credential and
//! exchanges the refresh token for fresh access tokens.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::GmailCredentials;
use crate::mailbox::{AuthFailedError, TokenProvider};

/// Token filename in the Mailbuddy config directory
const TOKEN_FILE: &str = "gmail-tokens.json";

/// Validity buffer: treat tokens expiring within 5 minutes as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Refresh-token based credential provider for Gmail
pub struct GmailTokenProvider {
    credentials: GmailCredentials,
    token_path: PathBuf,
    /// Serializes refresh attempts so concurrent callers don't both hit
    /// the token endpoint for the same expired credential
    refresh_lock: Mutex<()>,
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl GmailTokenProvider {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Create a provider storing tokens in the Mailbuddy config directory
    pub fn new(credentials: GmailCredentials) -> Result<Self> {
        let token_path =
            config::config_path(TOKEN_FILE).context("Could not determine config directory")?;
        Ok(Self::with_token_path(credentials, token_path))
    }

    /// Create a provider with an explicit token file path
    pub fn with_token_path(credentials: GmailCredentials, token_path: PathBuf) -> Self {
        Self {
            credentials,
            token_path,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Check whether a stored credential exists at all
    pub fn has_stored_credential(&self) -> bool {
        self.load_token().is_ok()
    }

    fn load_token(&self) -> Result<StoredToken> {
        let content = fs::read_to_string(&self.token_path)
            .with_context(|| format!("Failed to read token file: {}", self.token_path.display()))?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(token)
    }

    fn save_token(&self, token: &TokenResponse, fallback_refresh: Option<&str>) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredToken {
            access_token: token.access_token.clone(),
            // Google omits the refresh token on refresh responses
            refresh_token: token
                .refresh_token
                .clone()
                .or_else(|| fallback_refresh.map(|s| s.to_string())),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        };

        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.token_path, content)
            .with_context(|| format!("Failed to write token file: {}", self.token_path.display()))?;
        Ok(())
    }

    fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL).send_form([
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        match response {
            Ok(mut resp) => resp
                .body_mut()
                .read_json()
                .context("Failed to parse refresh token response"),
            // 400 invalid_grant means the refresh token itself was revoked
            // or expired; only a full reconnect can fix that.
            Err(ureq::Error::StatusCode(code)) if code == 400 || code == 401 => {
                Err(anyhow::Error::new(AuthFailedError)
                    .context("Token endpoint rejected the refresh credential"))
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to reach token endpoint")),
        }
    }
}

impl TokenProvider for GmailTokenProvider {
    fn access_token(&self) -> Result<String> {
        let token = self
            .load_token()
            .map_err(|e| e.context(AuthFailedError))
            .context("No stored Gmail credential; account must be connected first")?;

        if let Some(expires_at) = token.expires_at {
            let now = chrono::Utc::now().timestamp();
            if expires_at > now + EXPIRY_BUFFER_SECS {
                return Ok(token.access_token);
            }
        }

        self.refresh_access_token()
    }

    fn refresh_access_token(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());

        let token = self
            .load_token()
            .map_err(|e| e.context(AuthFailedError))
            .context("No stored Gmail credential to refresh")?;

        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            anyhow::Error::new(AuthFailedError).context("Stored credential has no refresh token")
        })?;

        log::debug!("[GMAIL] Refreshing access token");
        let fresh = self.exchange_refresh_token(refresh_token)?;
        self.save_token(&fresh, Some(refresh_token))?;
        Ok(fresh.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::is_auth_failed;
    use tempfile::TempDir;

    fn provider_in(dir: &TempDir) -> GmailTokenProvider {
        let creds = GmailCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        };
        GmailTokenProvider::with_token_path(creds, dir.path().join("tokens.json"))
    }

    #[test]
    fn test_missing_token_file_is_auth_failure() {
        let dir = TempDir::new().unwrap();
        let provider = provider_in(&dir);
        let err = provider.access_token().unwrap_err();
        assert!(is_auth_failed(&err));
    }

    #[test]
    fn test_valid_stored_token_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let provider = provider_in(&dir);

        let stored = StoredToken {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        };
        fs::write(
            dir.path().join("tokens.json"),
            serde_json::to_string(&stored).unwrap(),
        )
        .unwrap();

        assert_eq!(provider.access_token().unwrap(), "tok");
    }

    #[test]
    fn test_expired_token_without_refresh_token_fails() {
        let dir = TempDir::new().unwrap();
        let provider = provider_in(&dir);

        let stored = StoredToken {
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: Some(chrono::Utc::now().timestamp() - 10),
        };
        fs::write(
            dir.path().join("tokens.json"),
            serde_json::to_string(&stored).unwrap(),
        )
        .unwrap();

        let err = provider.access_token().unwrap_err();
        assert!(is_auth_failed(&err));
    }
}
