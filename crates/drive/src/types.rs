//! Wire types for the source store API.

use serde::{Deserialize, Deserializer};

/// A candidate archive in the remote store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    /// The API reports size as a decimal string; folders omit it entirely.
    #[serde(default, deserialize_with = "size_from_string")]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

fn size_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.and_then(|s| s.parse().ok()).unwrap_or(0))
}

/// One page of a file listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileListPage {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}
