//! Server configuration fetch and local persistence.
//!
//! The importer is configured once by fetching credentials from the media
//! server with a short-lived setup token; the result (plus any stored
//! OAuth tokens) is kept in an owner-only JSON file next to the job
//! checkpoint.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Errors from configuration handling.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("data directory not available")]
    NoDataDir,
}

/// OAuth client credentials issued by the server operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Full importer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub server_url: String,
    pub api_key: String,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_token_expiry: Option<DateTime<Utc>>,
}

impl Config {
    /// Returns `true` if source store tokens are stored.
    pub fn has_source_tokens(&self) -> bool {
        self.source_access_token.is_some()
    }
}

/// Fetches configuration from the media server using a setup token.
pub async fn fetch_from_server(server_url: &str, token: &str) -> Result<Config, ConfigError> {
    let url = format!(
        "{}/api/importer/config/{}",
        server_url.trim_end_matches('/'),
        token
    );
    let resp = reqwest::get(&url).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ConfigError::Server {
            status: status.as_u16(),
            body,
        });
    }

    let config: Config = resp.json().await?;
    info!(server = %config.server_url, "fetched importer configuration");
    Ok(config)
}

/// Persists the configuration as an owner-only JSON file.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default platform location.
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = shoebox_state::app_data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(Self::new(dir.join("config.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration; missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Config>, ConfigError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config: Config = serde_json::from_str(&data)?;
        debug!(path = ?self.path, "loaded configuration");
        Ok(Some(config))
    }

    /// Writes the configuration to disk.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.path, json)?;
        restrict_file(&self.path)?;
        debug!(path = ?self.path, "persisted configuration");
        Ok(())
    }
}

/// Returns the directory downloads land in, creating it if needed.
pub fn download_dir() -> Result<PathBuf, ConfigError> {
    let dir = shoebox_state::app_data_dir()
        .ok_or(ConfigError::NoDataDir)?
        .join("downloads");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store() -> (tempfile::TempDir, ConfigStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(tmp.path().join("cfg").join("config.json"));
        (tmp, store)
    }

    fn sample_config() -> Config {
        Config {
            server_url: "https://photos.example".into(),
            api_key: "key-123".into(),
            oauth: OAuthConfig {
                client_id: "cid".into(),
                client_secret: "secret".into(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn load_missing_is_none() {
        let (_tmp, store) = test_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_tmp, store) = test_store();
        let mut config = sample_config();
        config.source_access_token = Some("at".into());
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), config);
    }

    #[test]
    fn has_source_tokens() {
        let mut config = sample_config();
        assert!(!config.has_source_tokens());
        config.source_access_token = Some("at".into());
        assert!(config.has_source_tokens());
    }

    #[tokio::test]
    async fn fetch_from_server_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/importer/config/tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "serverUrl": "https://photos.example",
                "apiKey": "key-123",
                "oauth": {"clientId": "cid", "clientSecret": "secret"}
            })))
            .mount(&server)
            .await;

        let config = fetch_from_server(&server.uri(), "tok-1").await.unwrap();
        assert_eq!(config, sample_config());
    }

    #[tokio::test]
    async fn fetch_from_server_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/importer/config/expired"))
            .respond_with(ResponseTemplate::new(404).set_body_string("unknown token"))
            .mount(&server)
            .await;

        let err = fetch_from_server(&server.uri(), "expired").await.unwrap_err();
        assert!(matches!(err, ConfigError::Server { status: 404, .. }));
    }
}
