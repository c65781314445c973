//! B2 API types
//!
//! Models for Backblaze B2 API responses and request options.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Numeric field as it appears on the wire
#[derive(Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(u64),
    Text(String),
}

/// Sizes and timestamps come back as numbers, numeric strings
/// ("1536964279000"), or null on folder/hide entries; null reads as 0.
fn deserialize_lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireNumber>::deserialize(deserializer)? {
        None => Ok(0),
        Some(WireNumber::Number(n)) => Ok(n),
        Some(WireNumber::Text(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Deserialize `fileInfo`, treating null as an empty map
fn deserialize_file_info<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A stored file as returned by listing and upload calls
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Opaque file ID (null for folder entries)
    #[serde(default)]
    pub file_id: Option<String>,
    /// Full file path within the bucket
    pub file_name: String,
    /// Content type (MIME type, null for folder entries)
    #[serde(default)]
    pub content_type: Option<String>,
    /// File size in bytes (0 for folders)
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub content_length: u64,
    /// Upload timestamp in milliseconds since epoch
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub upload_timestamp: u64,
    /// User-supplied metadata
    #[serde(default, deserialize_with = "deserialize_file_info")]
    pub file_info: HashMap<String, String>,
    /// Action type: "upload", "folder", "hide", "start"
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub content_sha1: Option<String>,
}

fn default_action() -> String {
    "upload".to_string()
}

impl File {
    /// Check if this entry represents a directory
    pub fn is_directory(&self) -> bool {
        self.action == "folder" || self.file_name.ends_with('/')
    }

    /// Get the base name (last component of path)
    pub fn base_name(&self) -> &str {
        let name = self.file_name.trim_end_matches('/');
        name.rsplit('/').next().unwrap_or(name)
    }
}

/// Response from b2_list_file_names API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    /// Files in this page
    pub files: Vec<File>,
    /// Cursor for the next page (None if no more files)
    #[serde(default)]
    pub next_file_name: Option<String>,
}

/// Acknowledgment of a deleted file version
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFile {
    pub file_id: String,
    pub file_name: String,
}

/// Downloaded file content together with the response headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub content: Vec<u8>,
    /// Response headers, names lower-cased
    pub headers: HashMap<String, String>,
}

impl DownloadedFile {
    /// Look up a response header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A bucket owned by the authorized account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_id: String,
    pub bucket_name: String,
    /// "allPublic", "allPrivate", "snapshot", ...
    #[serde(default)]
    pub bucket_type: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Response from b2_list_buckets API
#[derive(Debug, Deserialize)]
pub(crate) struct ListBucketsResponse {
    pub buckets: Vec<Bucket>,
}

/// Per-request overrides for downloads.
///
/// Values are forwarded verbatim; none are validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOverrides {
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub expires: Option<String>,
    pub cache_control: Option<String>,
    pub content_encoding: Option<String>,
    pub content_type: Option<String>,
    /// SSE-C algorithm, required for files stored with customer-managed keys
    pub server_side_encryption: Option<String>,
}

impl DownloadOverrides {
    /// Query parameters for the overrides that are set, in B2 naming
    pub fn query_params(&self) -> Vec<(&'static str, &str)> {
        [
            ("b2ContentDisposition", &self.content_disposition),
            ("b2ContentLanguage", &self.content_language),
            ("b2Expires", &self.expires),
            ("b2CacheControl", &self.cache_control),
            ("b2ContentEncoding", &self.content_encoding),
            ("b2ContentType", &self.content_type),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}
