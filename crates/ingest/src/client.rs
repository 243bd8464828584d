//! Ingestion service API client.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::multipart;
use tracing::debug;

use crate::IngestError;

/// Uploads of large media can be slow; each call gets a generous fixed
/// ceiling rather than a short default.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Device identifier reported alongside every asset.
const DEVICE_ID: &str = "shoebox";

/// Result of a single asset upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The destination accepted the asset.
    Uploaded,
    /// The destination already holds this asset. Success, not failure.
    Duplicate,
}

/// API-key client for the media ingestion service.
pub struct IngestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IngestClient {
    /// Creates a client for `server_url` authenticated by `api_key`.
    pub fn new(server_url: &str, api_key: &str) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Uploads one asset.
    ///
    /// `external_id` is the stable content-derived identifier the
    /// destination uses for deduplication.
    pub async fn upload_asset(
        &self,
        file_name: &str,
        data: Vec<u8>,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
        external_id: &str,
    ) -> Result<UploadOutcome, IngestError> {
        let part = multipart::Part::bytes(data).file_name(file_name.to_string());
        let form = multipart::Form::new()
            .part("assetData", part)
            .text("deviceAssetId", external_id.to_string())
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", created_at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .text("fileModifiedAt", modified_at.to_rfc3339_opts(SecondsFormat::Secs, true));

        let resp = self
            .http
            .post(format!("{}/api/assets", self.base_url))
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!(file_name, external_id, "asset uploaded");
            return Ok(UploadOutcome::Uploaded);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or(body);

        if message.contains("duplicate") {
            debug!(file_name, external_id, "asset already present at destination");
            return Ok(UploadOutcome::Duplicate);
        }

        Err(IngestError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
