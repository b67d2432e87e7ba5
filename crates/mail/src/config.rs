//! Configuration for the sync engine
//!
//! Two pieces: Gmail OAuth credentials (Google Cloud Console format or
//! environment variables) and sync tuning knobs with sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Credentials filename in the Mailbuddy config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Tuning filename in the Mailbuddy config directory
const TUNING_FILE: &str = "sync-tuning.json";

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials from the config file, falling back to environment
    /// variables (GMAIL_CLIENT_ID / GMAIL_CLIENT_SECRET)
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }
        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Support both "installed" (desktop) and "web" credential types
    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }
}

/// Tuning knobs for sync passes
///
/// All values have defaults matching the Gmail API's sweet spots; a
/// sync-tuning.json in the config directory overrides them per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncTuning {
    /// Listing/history page size (Gmail caps this at 500)
    pub page_size: usize,
    /// Stub rows persisted per storage batch
    pub stub_batch_size: usize,
    /// Full-content fetches issued concurrently per batch
    pub fetch_batch_size: usize,
    /// How many recent messages get full content after a full sync
    pub backfill_limit: usize,
    /// Attempts per listing/feed call before the pass aborts
    pub max_call_attempts: u32,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            page_size: 500,
            stub_batch_size: 500,
            fetch_batch_size: 50,
            backfill_limit: 50,
            max_call_attempts: 3,
        }
    }
}

impl SyncTuning {
    /// Load tuning from the config directory, defaults if absent
    pub fn load() -> Result<Self> {
        config::load_json_or_default(TUNING_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_credentials() {
        let json = r#"{
            "installed": {
                "client_id": "test-client-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn test_parse_web_credentials() {
        let json = r#"{
            "web": {
                "client_id": "web-client-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-client-id.apps.googleusercontent.com");
    }

    #[test]
    fn test_invalid_credentials_json() {
        let json = r#"{ "other": {} }"#;
        assert!(GmailCredentials::from_json(json).is_err());
    }

    #[test]
    fn test_tuning_defaults() {
        let tuning = SyncTuning::default();
        assert_eq!(tuning.page_size, 500);
        assert_eq!(tuning.fetch_batch_size, 50);
        assert_eq!(tuning.backfill_limit, 50);
        assert_eq!(tuning.max_call_attempts, 3);
    }

    #[test]
    fn test_tuning_partial_override() {
        let tuning: SyncTuning = serde_json::from_str(r#"{"backfillLimit": 10}"#).unwrap();
        assert_eq!(tuning.backfill_limit, 10);
        assert_eq!(tuning.page_size, 500);
    }
}
