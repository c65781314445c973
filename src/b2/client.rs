//! Backblaze B2 API Client
//!
//! Public surface over a [`Transport`]. Two pieces of logic live here:
//! the paged file listing, which aggregates pages up to a result cap, and
//! the bucket cache, which resolves bucket names to IDs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, info, trace};

use super::errors::B2Error;
use super::transport::{HttpTransport, Transport};
use super::types::{Bucket, DeletedFile, DownloadOverrides, DownloadedFile, File};
use crate::config::B2Config;

/// Result cap used when the caller gives none (or zero)
pub const DEFAULT_MAX_FILE_COUNT: u32 = 100;

/// Largest page the B2 API returns per b2_list_file_names call
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Bucket list snapshot with a name index built at population time
#[derive(Debug)]
struct BucketIndex {
    buckets: Vec<Bucket>,
    by_name: HashMap<String, usize>,
}

impl BucketIndex {
    fn new(buckets: Vec<Bucket>) -> Self {
        let mut by_name = HashMap::with_capacity(buckets.len());
        for (i, bucket) in buckets.iter().enumerate() {
            // First occurrence wins, same as a linear scan
            by_name.entry(bucket.bucket_name.clone()).or_insert(i);
        }
        Self { buckets, by_name }
    }

    fn get(&self, name: &str) -> Option<&Bucket> {
        self.by_name.get(name).map(|&i| &self.buckets[i])
    }
}

/// B2 API client
///
/// Owns its transport and a bucket cache. The cache is filled by the first
/// call that needs it and is never refreshed automatically; use
/// [`B2Client::refresh_buckets`] or a new client to see bucket changes.
pub struct B2Client<T: Transport = HttpTransport> {
    transport: T,
    /// Single entry keyed by `()`; concurrent first lookups share one fetch
    buckets: Cache<(), Arc<BucketIndex>>,
}

impl B2Client<HttpTransport> {
    /// Create a client that talks to B2 over HTTP.
    ///
    /// No request is made until the first operation.
    pub fn new(config: B2Config) -> Self {
        Self::with_transport(HttpTransport::new(config))
    }
}

impl<T: Transport> B2Client<T> {
    pub fn with_transport(transport: T) -> Self {
        let buckets = Cache::builder().name("bucket_cache").build();
        Self { transport, buckets }
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// List file names in a bucket, following pagination cursors.
    ///
    /// # Arguments
    /// * `bucket_id` - Bucket to list
    /// * `start_file_name` - First file name to return (inclusive if it exists)
    /// * `max_file_count` - Total result cap; `None` or `0` means 100
    /// * `prefix` - Only return names starting with this prefix
    /// * `delimiter` - Collapse names below the first delimiter into folders
    ///
    /// # Returns
    /// Entries in listing order. Pages are requested until the cap is met or
    /// the listing ends. The last page is kept whole, so the result can hold
    /// more entries than the cap.
    pub async fn list_file_names(
        &self,
        bucket_id: &str,
        start_file_name: Option<&str>,
        max_file_count: Option<u32>,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<Vec<File>, B2Error> {
        let cap = match max_file_count {
            None | Some(0) => DEFAULT_MAX_FILE_COUNT,
            Some(n) => n,
        } as usize;

        let mut files: Vec<File> = Vec::new();
        let mut cursor = start_file_name.map(String::from);
        let mut page_size = page_size_for(cap);

        loop {
            debug!(bucket_id = bucket_id, start = ?cursor, page_size = page_size, "Requesting file page");

            let page = self
                .transport
                .list_file_names(bucket_id, cursor.as_deref(), page_size, prefix, delimiter)
                .await?;

            let stalled = page.files.is_empty() && page.next_file_name == cursor;
            files.extend(page.files);
            cursor = page.next_file_name;

            if stalled {
                debug!(bucket_id = bucket_id, start = ?cursor, "Listing cursor did not advance, stopping");
                break;
            }
            if files.len() >= cap || cursor.is_none() {
                break;
            }
            page_size = page_size_for(cap - files.len());
        }

        debug!(bucket_id = bucket_id, count = files.len(), "Listed files from B2");
        Ok(files)
    }

    /// Upload a file to a bucket given by ID or by name.
    ///
    /// `bucket_id` wins when both are given and no lookup happens. A name
    /// alone is resolved through the bucket cache first.
    pub async fn upload_file(
        &self,
        content: &[u8],
        content_type: &str,
        file_name: &str,
        bucket_id: Option<&str>,
        bucket_name: Option<&str>,
    ) -> Result<File, B2Error> {
        let bucket_id = match (bucket_id, bucket_name) {
            (Some(id), _) => id.to_string(),
            (None, Some(name)) => self.get_bucket_from_name(name).await?.bucket_id,
            (None, None) => {
                return Err(B2Error::InvalidArgument(
                    "either bucket_id or bucket_name is required".to_string(),
                ))
            }
        };

        info!(
            file = file_name,
            size = content.len(),
            content_type = content_type,
            bucket_id = %bucket_id,
            "Uploading file to B2"
        );

        let file = self
            .transport
            .upload_file(content, content_type, file_name, &bucket_id)
            .await?;

        info!(file = file_name, file_id = ?file.file_id, "File uploaded to B2");
        Ok(file)
    }

    /// Delete a file version
    pub async fn delete_file(&self, file_name: &str, file_id: &str) -> Result<DeletedFile, B2Error> {
        info!(file = file_name, file_id = file_id, "Deleting file from B2");
        let deleted = self.transport.delete_file(file_name, file_id).await?;
        info!(file = file_name, "File deleted from B2");
        Ok(deleted)
    }

    pub async fn download_file_by_id(
        &self,
        file_id: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error> {
        let file = self.transport.download_file_by_id(file_id, overrides).await?;
        debug!(file_id = file_id, size = file.content.len(), "Downloaded file from B2");
        Ok(file)
    }

    pub async fn download_file_by_name(
        &self,
        file_name: &str,
        bucket_name: &str,
        overrides: &DownloadOverrides,
    ) -> Result<DownloadedFile, B2Error> {
        let file = self
            .transport
            .download_file_by_name(file_name, bucket_name, overrides)
            .await?;
        debug!(file = file_name, bucket = bucket_name, size = file.content.len(), "Downloaded file from B2");
        Ok(file)
    }

    /// List all buckets of the account, from cache after the first call
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, B2Error> {
        Ok(self.bucket_index().await?.buckets.clone())
    }

    /// Resolve a bucket name (exact, case-sensitive) to its bucket
    pub async fn get_bucket_from_name(&self, bucket_name: &str) -> Result<Bucket, B2Error> {
        self.bucket_index()
            .await?
            .get(bucket_name)
            .cloned()
            .ok_or_else(|| B2Error::BucketNotFound(bucket_name.to_string()))
    }

    /// Drop the cached bucket list and fetch it again
    pub async fn refresh_buckets(&self) -> Result<Vec<Bucket>, B2Error> {
        self.invalidate_buckets().await;
        self.list_buckets().await
    }

    /// Drop the cached bucket list; the next lookup refetches
    pub async fn invalidate_buckets(&self) {
        self.buckets.invalidate(&()).await;
        debug!("Invalidated bucket cache");
    }

    /// Release the transport's connection resources.
    ///
    /// Safe to call more than once. The bucket cache is kept.
    pub async fn close(&self) {
        self.transport.close().await;
        debug!("B2 client closed");
    }

    /// Run `body` with this client and close it afterwards, whatever the
    /// body returns.
    pub async fn scoped<F, Fut, R, E>(self, body: F) -> Result<R, E>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let client = Arc::new(self);
        let result = body(Arc::clone(&client)).await;
        client.close().await;
        result
    }

    async fn bucket_index(&self) -> Result<Arc<BucketIndex>, B2Error> {
        if let Some(index) = self.buckets.get(&()).await {
            trace!(buckets = index.buckets.len(), "Bucket cache HIT");
            return Ok(index);
        }

        self.buckets
            .try_get_with((), async {
                debug!("Bucket cache MISS, listing buckets");
                let buckets = self.transport.list_buckets().await?;
                info!(count = buckets.len(), "Listed buckets from B2");
                Ok::<_, B2Error>(Arc::new(BucketIndex::new(buckets)))
            })
            .await
            .map_err(|e| (*e).clone())
    }
}

fn page_size_for(remaining: usize) -> u32 {
    remaining.min(MAX_PAGE_SIZE as usize) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::b2::types::ListFilesResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory transport serving a sorted file list in pages
    #[derive(Default)]
    struct MockTransport {
        files: Vec<String>,
        /// Entries returned per page regardless of the requested size
        fixed_page: Option<usize>,
        /// 1-based page request that fails
        fail_on_page: Option<usize>,
        buckets: Vec<Bucket>,
        bucket_delay: Option<Duration>,
        /// Number of leading list_buckets calls that fail
        failing_bucket_calls: usize,
        /// Answer every page with no entries and the requested cursor
        stuck_cursor: bool,
        page_requests: Mutex<Vec<(Option<String>, u32)>>,
        bucket_calls: AtomicUsize,
        uploads: Mutex<Vec<String>>,
        closed: AtomicUsize,
    }

    impl MockTransport {
        fn with_files(count: usize) -> Self {
            Self {
                files: (0..count).map(|i| format!("file-{:05}", i)).collect(),
                ..Default::default()
            }
        }

        fn with_buckets(buckets: &[(&str, &str)]) -> Self {
            Self {
                buckets: buckets
                    .iter()
                    .map(|(name, id)| Bucket {
                        bucket_id: id.to_string(),
                        bucket_name: name.to_string(),
                        bucket_type: "allPrivate".to_string(),
                        account_id: None,
                    })
                    .collect(),
                ..Default::default()
            }
        }

        fn page_sizes(&self) -> Vec<u32> {
            self.page_requests
                .lock()
                .unwrap()
                .iter()
                .map(|(_, size)| *size)
                .collect()
        }
    }

    fn file(name: &str) -> File {
        File {
            file_id: Some(format!("id-{}", name)),
            file_name: name.to_string(),
            content_type: Some("text/plain".to_string()),
            content_length: 1,
            upload_timestamp: 0,
            file_info: HashMap::new(),
            action: "upload".to_string(),
            bucket_id: None,
            account_id: None,
            content_sha1: None,
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn list_file_names(
            &self,
            _bucket_id: &str,
            start_file_name: Option<&str>,
            max_file_count: u32,
            _prefix: Option<&str>,
            _delimiter: Option<&str>,
        ) -> Result<ListFilesResponse, B2Error> {
            let page_number = {
                let mut requests = self.page_requests.lock().unwrap();
                requests.push((start_file_name.map(String::from), max_file_count));
                requests.len()
            };
            if self.fail_on_page == Some(page_number) {
                return Err(B2Error::from_status(
                    503,
                    r#"{"status": 503, "code": "service_unavailable", "message": "busy"}"#,
                ));
            }
            if self.stuck_cursor {
                return Ok(ListFilesResponse {
                    files: Vec::new(),
                    next_file_name: start_file_name.map(String::from),
                });
            }

            let start = start_file_name
                .map(|s| self.files.partition_point(|f| f.as_str() < s))
                .unwrap_or(0);
            let take = self.fixed_page.unwrap_or(max_file_count as usize);
            let end = (start + take).min(self.files.len());

            Ok(ListFilesResponse {
                files: self.files[start..end].iter().map(|n| file(n)).collect(),
                next_file_name: self.files.get(end).cloned(),
            })
        }

        async fn upload_file(
            &self,
            _content: &[u8],
            _content_type: &str,
            file_name: &str,
            bucket_id: &str,
        ) -> Result<File, B2Error> {
            self.uploads.lock().unwrap().push(bucket_id.to_string());
            let mut uploaded = file(file_name);
            uploaded.bucket_id = Some(bucket_id.to_string());
            Ok(uploaded)
        }

        async fn delete_file(
            &self,
            file_name: &str,
            file_id: &str,
        ) -> Result<DeletedFile, B2Error> {
            Ok(DeletedFile {
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
            })
        }

        async fn download_file_by_id(
            &self,
            file_id: &str,
            overrides: &DownloadOverrides,
        ) -> Result<DownloadedFile, B2Error> {
            let mut headers = HashMap::new();
            if let Some(ct) = &overrides.content_type {
                headers.insert("content-type".to_string(), ct.clone());
            }
            Ok(DownloadedFile {
                content: file_id.as_bytes().to_vec(),
                headers,
            })
        }

        async fn download_file_by_name(
            &self,
            file_name: &str,
            bucket_name: &str,
            _overrides: &DownloadOverrides,
        ) -> Result<DownloadedFile, B2Error> {
            Ok(DownloadedFile {
                content: format!("{}/{}", bucket_name, file_name).into_bytes(),
                headers: HashMap::new(),
            })
        }

        async fn list_buckets(&self) -> Result<Vec<Bucket>, B2Error> {
            let call = self.bucket_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failing_bucket_calls {
                return Err(B2Error::from_status(
                    500,
                    r#"{"status": 500, "code": "internal_error", "message": "boom"}"#,
                ));
            }
            if let Some(delay) = self.bucket_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.buckets.clone())
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_list_default_cap() {
        let client = B2Client::with_transport(MockTransport::with_files(500));

        let files = client
            .list_file_names("b1", None, None, None, None)
            .await
            .unwrap();
        assert_eq!(files.len(), 100);
        assert_eq!(client.transport().page_sizes(), vec![100]);

        let client = B2Client::with_transport(MockTransport::with_files(500));
        let files = client
            .list_file_names("b1", None, Some(0), None, None)
            .await
            .unwrap();
        assert_eq!(files.len(), 100);
        assert_eq!(client.transport().page_sizes(), vec![100]);
    }

    #[tokio::test]
    async fn test_list_stops_once_cap_reached() {
        let mut transport = MockTransport::with_files(100);
        transport.fixed_page = Some(7);
        let client = B2Client::with_transport(transport);

        let files = client
            .list_file_names("b1", None, Some(20), None, None)
            .await
            .unwrap();

        // 7 + 7 + 7: the last page is kept whole
        assert_eq!(files.len(), 21);
        assert_eq!(client.transport().page_sizes(), vec![20, 13, 6]);
        assert_eq!(files[0].file_name, "file-00000");
        assert_eq!(files[20].file_name, "file-00020");
    }

    #[tokio::test]
    async fn test_list_threads_cursor() {
        let mut transport = MockTransport::with_files(30);
        transport.fixed_page = Some(10);
        let client = B2Client::with_transport(transport);

        client
            .list_file_names("b1", Some("file-00005"), Some(25), None, None)
            .await
            .unwrap();

        let requests = client.transport().page_requests.lock().unwrap().clone();
        let starts: Vec<Option<String>> = requests.into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            starts,
            vec![
                Some("file-00005".to_string()),
                Some("file-00015".to_string()),
                Some("file-00025".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_stops_on_null_cursor() {
        let mut transport = MockTransport::with_files(12);
        transport.fixed_page = Some(5);
        let client = B2Client::with_transport(transport);

        let files = client
            .list_file_names("b1", None, Some(1000), None, None)
            .await
            .unwrap();

        assert_eq!(files.len(), 12);
        assert_eq!(client.transport().page_sizes().len(), 3);
    }

    #[tokio::test]
    async fn test_list_empty_bucket() {
        let client = B2Client::with_transport(MockTransport::with_files(0));
        let files = client
            .list_file_names("b1", None, Some(10), None, None)
            .await
            .unwrap();
        assert!(files.is_empty());
        assert_eq!(client.transport().page_sizes(), vec![10]);
    }

    #[tokio::test]
    async fn test_list_clamps_page_size() {
        let client = B2Client::with_transport(MockTransport::with_files(25_000));

        let files = client
            .list_file_names("b1", None, Some(50_000), None, None)
            .await
            .unwrap();

        assert_eq!(files.len(), 25_000);
        let sizes = client.transport().page_sizes();
        assert_eq!(sizes, vec![10_000, 10_000, 10_000]);
        assert!(sizes.iter().all(|&s| s <= MAX_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_list_error_on_second_page() {
        let mut transport = MockTransport::with_files(50);
        transport.fixed_page = Some(10);
        transport.fail_on_page = Some(2);
        let client = B2Client::with_transport(transport);

        let err = client
            .list_file_names("b1", None, Some(30), None, None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert!(matches!(err, B2Error::Backend { ref code, .. } if code == "service_unavailable"));
        assert_eq!(client.transport().page_sizes().len(), 2);
    }

    #[tokio::test]
    async fn test_list_buckets_cached() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1"), ("b", "2")]));

        let first = client.list_buckets().await.unwrap();
        let second = client.list_buckets().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_bucket_names() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1"), ("b", "2")]));

        assert_eq!(client.get_bucket_from_name("a").await.unwrap().bucket_id, "1");
        assert_eq!(client.get_bucket_from_name("b").await.unwrap().bucket_id, "2");
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 1);

        let err = client.get_bucket_from_name("c").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("c"));

        // Case-sensitive
        assert!(client.get_bucket_from_name("A").await.unwrap_err().is_not_found());
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_lookup_fetches_once() {
        let mut transport = MockTransport::with_buckets(&[("a", "1"), ("b", "2")]);
        transport.bucket_delay = Some(Duration::from_millis(20));
        let client = Arc::new(B2Client::with_transport(transport));

        let tasks: Vec<_> = ["a", "b", "a", "b"]
            .into_iter()
            .map(|name| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.get_bucket_from_name(name).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_buckets_refetches() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1")]));

        client.list_buckets().await.unwrap();
        client.refresh_buckets().await.unwrap();
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 2);

        client.invalidate_buckets().await;
        client.get_bucket_from_name("a").await.unwrap();
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_bucket_fetch_is_not_cached() {
        let mut transport = MockTransport::with_buckets(&[("a", "1")]);
        transport.failing_bucket_calls = 1;
        let client = B2Client::with_transport(transport);

        let err = client.get_bucket_from_name("a").await.unwrap_err();
        assert!(matches!(err, B2Error::Backend { status: 500, ref code, .. } if code == "internal_error"));
        assert!(!err.is_not_found());

        assert_eq!(client.get_bucket_from_name("a").await.unwrap().bucket_id, "1");
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upload_surfaces_bucket_fetch_error() {
        let mut transport = MockTransport::with_buckets(&[("a", "1")]);
        transport.failing_bucket_calls = 1;
        let client = B2Client::with_transport(transport);

        let err = client
            .upload_file(b"x", "text/plain", "x.txt", None, Some("a"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert!(client.transport().uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_stops_when_cursor_stalls() {
        let mut transport = MockTransport::with_files(10);
        transport.stuck_cursor = true;
        let client = B2Client::with_transport(transport);

        let files = client
            .list_file_names("b1", Some("file-00003"), Some(50), None, None)
            .await
            .unwrap();

        assert!(files.is_empty());
        assert_eq!(client.transport().page_sizes(), vec![50]);
    }

    #[tokio::test]
    async fn test_upload_prefers_bucket_id() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1")]));

        let file = client
            .upload_file(b"x", "text/plain", "x.txt", Some("explicit"), Some("a"))
            .await
            .unwrap();

        assert_eq!(file.bucket_id.as_deref(), Some("explicit"));
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_resolves_bucket_name() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1"), ("b", "2")]));

        client
            .upload_file(b"x", "text/plain", "x.txt", None, Some("b"))
            .await
            .unwrap();
        client
            .upload_file(b"y", "text/plain", "y.txt", None, Some("a"))
            .await
            .unwrap();

        let uploads = client.transport().uploads.lock().unwrap().clone();
        assert_eq!(uploads, vec!["2".to_string(), "1".to_string()]);
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upload_unknown_bucket_name() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1")]));

        let err = client
            .upload_file(b"x", "text/plain", "x.txt", None, Some("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, B2Error::BucketNotFound(ref name) if name == "missing"));
        assert!(client.transport().uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_requires_bucket() {
        let client = B2Client::with_transport(MockTransport::default());

        let err = client
            .upload_file(b"x", "text/plain", "x.txt", None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, B2Error::InvalidArgument(_)));
        assert_eq!(client.transport().bucket_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_and_download_pass_through() {
        let client = B2Client::with_transport(MockTransport::default());

        let deleted = client.delete_file("a.txt", "4_a").await.unwrap();
        assert_eq!(deleted.file_id, "4_a");
        assert_eq!(deleted.file_name, "a.txt");

        let overrides = DownloadOverrides {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };
        let by_id = client.download_file_by_id("4_a", &overrides).await.unwrap();
        assert_eq!(by_id.content, b"4_a");
        assert_eq!(by_id.header("Content-Type"), Some("application/json"));

        let by_name = client
            .download_file_by_name("a.txt", "bucket", &DownloadOverrides::default())
            .await
            .unwrap();
        assert_eq!(by_name.content, b"bucket/a.txt");
    }

    #[tokio::test]
    async fn test_scoped_closes_on_body_error() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1")]));
        let held = Arc::new(Mutex::new(None));

        let result: Result<(), B2Error> = client
            .scoped(|client| {
                *held.lock().unwrap() = Some(Arc::clone(&client));
                async move {
                    client.get_bucket_from_name("nope").await?;
                    Ok(())
                }
            })
            .await;

        assert!(result.unwrap_err().is_not_found());
        let client = held.lock().unwrap().take().unwrap();
        assert_eq!(client.transport().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_closes_transport() {
        let client = B2Client::with_transport(MockTransport::with_buckets(&[("a", "1")]));

        let (id, transport_closed) = client
            .scoped(|client| async move {
                let id = client.get_bucket_from_name("a").await?.bucket_id;
                Ok::<_, B2Error>((id, Arc::clone(&client)))
            })
            .await
            .map(|(id, client)| (id, client.transport().closed.load(Ordering::SeqCst)))
            .unwrap();

        assert_eq!(id, "1");
        assert_eq!(transport_closed, 1);
    }
}
