//! Source store API client.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RANGE};
use tracing::debug;

use crate::types::FileListPage;
use crate::{DriveError, DriveFile};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Query matching archive-export files: takeout zips or Takeout folders.
const TAKEOUT_QUERY: &str = "(name contains 'takeout' and mimeType = 'application/zip') \
     or (name contains 'Takeout' and mimeType = 'application/vnd.google-apps.folder')";

/// How the store answered a ranged fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    /// 200: the whole object from byte 0.
    Full,
    /// 206: the requested range.
    Partial,
}

/// An open ranged download: the response classification plus its body.
pub struct RangeDownload {
    pub status: RangeStatus,
    pub stream: BoxStream<'static, Result<Bytes, DriveError>>,
}

impl std::fmt::Debug for RangeDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeDownload")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Bearer-token client for the source object store.
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
}

impl DriveClient {
    /// Creates a client from an already-acquired access token.
    pub fn new(access_token: &str) -> Result<Self, DriveError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| DriveError::Api {
                status: 0,
                body: "access token is not a valid header value".into(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom base URL (for testing against a local server).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Lists archive-export files, following pagination to the end.
    pub async fn list_takeout_archives(&self) -> Result<Vec<DriveFile>, DriveError> {
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q".to_string(), TAKEOUT_QUERY.to_string()),
                ("fields".to_string(), "files(id,name,size,mimeType),nextPageToken".to_string()),
                ("pageSize".to_string(), "100".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken".to_string(), token.clone()));
            }

            let resp = self
                .http
                .get(format!("{}/files", self.base_url))
                .query(&params)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DriveError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: FileListPage = resp.json().await?;
            all.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(archives = all.len(), "listed source archives");
        Ok(all)
    }

    /// Opens a download of `file_id` starting at byte `start`.
    ///
    /// The Range header is omitted entirely at `start == 0`. Only full
    /// (200) and partial (206) responses are accepted; the caller decides
    /// whether a full response honors its request.
    pub async fn fetch_range(&self, file_id: &str, start: u64) -> Result<RangeDownload, DriveError> {
        let mut req = self
            .http
            .get(format!("{}/files/{}", self.base_url, file_id))
            .query(&[("alt", "media")]);
        if start > 0 {
            req = req.header(RANGE, format!("bytes={start}-"));
        }

        let resp = req.send().await?;
        let status = match resp.status() {
            StatusCode::OK => RangeStatus::Full,
            StatusCode::PARTIAL_CONTENT => RangeStatus::Partial,
            other => {
                let body = resp.text().await.unwrap_or_default();
                return Err(DriveError::Api {
                    status: other.as_u16(),
                    body,
                });
            }
        };

        debug!(file_id, start, ?status, "opened ranged download");
        Ok(RangeDownload {
            status,
            stream: resp.bytes_stream().map_err(DriveError::Http).boxed(),
        })
    }
}
