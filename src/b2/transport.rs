//! B2 transport layer
//!
//! [`Transport`] is the seam between the client logic and the network.
//! [`HttpTransport`] implements it against the B2 native API with reqwest:
//! it authorizes lazily, builds requests, and maps non-2xx responses to
//! [`B2Error::Backend`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::errors::B2Error;
use super::types::{
    Bucket, DeletedFile, DownloadOverrides, DownloadedFile, File, ListBucketsResponse,
    ListFilesResponse,
};
use crate::config::B2Config;

/// Request header carrying the SSE-C algorithm on downloads
const SSE_C_ALGORITHM_HEADER: &str = "X-Bz-Server-Side-Encryption-Customer-Algorithm";

/// Raw B2 operations used by [`crate::B2Client`]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page of file names
    async fn list_file_names(
        &self,
        bucket_id: &str,
        start_file_name: Option<&str>,
        max_file_count: u32,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListFilesResponse, B2Error>;

    async fn upload_file(
        &self,
        content: &[u8],
        content_type: &str,
        file_name: &str,
        bucket_id: &str,
    ) -> Result<File, B2Error>;

    async fn delete_file(&self, file_name: &str, file_id: &str) -> Result<DeletedFile, B2Error>;

    async fn download_file_by_id(
        &self,
        file_id: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error>;

    async fn download_file_by_name(
        &self,
        file_name: &str,
        bucket_name: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error>;

    /// All buckets of the authorized account
    async fn list_buckets(&self) -> Result<Vec<Bucket>, B2Error>;

    /// Release any held connection resources
    async fn close(&self) {}
}

/// Response from b2_authorize_account API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    authorization_token: String,
    api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInfo {
    storage_api: StorageApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageApiInfo {
    api_url: String,
    download_url: String,
}

/// Request body for b2_list_file_names API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest<'a> {
    bucket_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_file_name: Option<&'a str>,
    max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<&'a str>,
}

/// Upload URL from B2 (for uploading files)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrl {
    upload_url: String,
    authorization_token: String,
}

/// An authorized connection to B2
struct Session {
    http: Client,
    account_id: String,
    auth_token: String,
    api_url: String,
    download_url: String,
}

/// reqwest-backed transport for the B2 native API
///
/// The HTTP client and the authorization are created on first use and
/// dropped by [`Transport::close`] or when the transport itself is dropped.
/// A closed transport re-authorizes on its next request.
pub struct HttpTransport {
    config: B2Config,
    /// Caller-supplied HTTP client, reused across sessions
    supplied_client: Option<Client>,
    session: Mutex<Option<Arc<Session>>>,
}

impl HttpTransport {
    pub fn new(config: B2Config) -> Self {
        Self {
            config,
            supplied_client: None,
            session: Mutex::new(None),
        }
    }

    /// Use an existing reqwest client instead of building one
    pub fn with_http_client(config: B2Config, http: Client) -> Self {
        Self {
            config,
            supplied_client: Some(http),
            session: Mutex::new(None),
        }
    }

    /// Whether a session is currently held
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Return the current session, authorizing first if there is none.
    ///
    /// The lock is held across authorization so concurrent first requests
    /// share one `b2_authorize_account` call.
    async fn session(&self) -> Result<Arc<Session>, B2Error> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(self.authorize().await?);
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn authorize(&self) -> Result<Session, B2Error> {
        info!(key_id = %self.config.key_id, "Authorizing with B2 API...");

        let http = match &self.supplied_client {
            Some(client) => client.clone(),
            None => Client::builder()
                .timeout(self.config.request_timeout)
                .build()?,
        };

        // Create Basic Auth header
        let credentials = format!("{}:{}", self.config.key_id, self.config.key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        let auth_header = format!("Basic {}", encoded);

        let response = http
            .get(&self.config.auth_url)
            .header("Authorization", &auth_header)
            .send()
            .await?;

        let auth_response: AuthorizeAccountResponse = parse_json(response).await?;
        let storage = auth_response.api_info.storage_api;
        debug!(api_url = %storage.api_url, download_url = %storage.download_url, "B2 authorization successful");

        Ok(Session {
            http,
            account_id: auth_response.account_id,
            auth_token: auth_response.authorization_token,
            api_url: storage.api_url,
            download_url: storage.download_url,
        })
    }

    /// POST a JSON body to a `b2api/v2` method and parse the JSON reply
    async fn post_api<B, T>(&self, session: &Session, method: &str, body: &B) -> Result<T, B2Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/b2api/v2/{}", session.api_url, method);
        let response = session
            .http
            .post(&url)
            .header("Authorization", &session.auth_token)
            .json(body)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn download(
        &self,
        session: &Session,
        url: &str,
        params: &[(&str, &str)],
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.extend(overrides.query_params());

        let mut request = session
            .http
            .get(url)
            .header("Authorization", &session.auth_token)
            .query(&query);
        if let Some(algorithm) = &overrides.server_side_encryption {
            request = request.header(SSE_C_ALGORITHM_HEADER, algorithm);
        }

        let response = check_status(request.send().await?).await?;
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let content = response.bytes().await?.to_vec();

        Ok(DownloadedFile { content, headers })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_file_names(
        &self,
        bucket_id: &str,
        start_file_name: Option<&str>,
        max_file_count: u32,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListFilesResponse, B2Error> {
        let session = self.session().await?;
        let request = ListFileNamesRequest {
            bucket_id,
            start_file_name,
            max_file_count,
            prefix,
            delimiter,
        };
        debug!(bucket_id = bucket_id, start = ?start_file_name, max = max_file_count, "Listing files from B2");
        self.post_api(&session, "b2_list_file_names", &request).await
    }

    async fn upload_file(
        &self,
        content: &[u8],
        content_type: &str,
        file_name: &str,
        bucket_id: &str,
    ) -> Result<File, B2Error> {
        let session = self.session().await?;

        // Upload URLs are valid for 24 hours; one per upload keeps this simple
        let upload_url: UploadUrl = self
            .post_api(
                &session,
                "b2_get_upload_url",
                &serde_json::json!({ "bucketId": bucket_id }),
            )
            .await?;
        debug!(url = %upload_url.upload_url, "Got B2 upload URL");

        let mut hasher = Sha1::new();
        hasher.update(content);
        let hash = format!("{:x}", hasher.finalize());

        let response = session
            .http
            .post(&upload_url.upload_url)
            .header("Authorization", &upload_url.authorization_token)
            .header("X-Bz-File-Name", encode_file_name(file_name))
            .header("Content-Type", content_type)
            .header("X-Bz-Content-Sha1", &hash)
            .body(content.to_vec())
            .send()
            .await?;

        parse_json(response).await
    }

    async fn delete_file(&self, file_name: &str, file_id: &str) -> Result<DeletedFile, B2Error> {
        let session = self.session().await?;
        self.post_api(
            &session,
            "b2_delete_file_version",
            &serde_json::json!({
                "fileName": file_name,
                "fileId": file_id
            }),
        )
        .await
    }

    async fn download_file_by_id(
        &self,
        file_id: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error> {
        let session = self.session().await?;
        let url = format!("{}/b2api/v2/b2_download_file_by_id", session.download_url);
        self.download(&session, &url, &[("fileId", file_id)], overrides)
            .await
    }

    async fn download_file_by_name(
        &self,
        file_name: &str,
        bucket_name: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error> {
        let session = self.session().await?;
        let url = format!(
            "{}/file/{}/{}",
            session.download_url,
            bucket_name,
            encode_file_name(file_name)
        );
        self.download(&session, &url, &[], overrides).await
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, B2Error> {
        let session = self.session().await?;
        let response: ListBucketsResponse = self
            .post_api(
                &session,
                "b2_list_buckets",
                &serde_json::json!({ "accountId": session.account_id }),
            )
            .await?;
        Ok(response.buckets)
    }

    async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            debug!("Released B2 session");
        }
    }
}

/// Percent-encode a file name, keeping `/` separators readable
fn encode_file_name(file_name: &str) -> String {
    file_name
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turn a non-2xx response into a backend error
async fn check_status(response: Response) -> Result<Response, B2Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(status = status.as_u16(), error = %e, "Failed to read B2 error body");
            String::new()
        }
    };
    Err(B2Error::from_status(status.as_u16(), &body))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, B2Error> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| B2Error::Decode(e.to_string()))
}
