//! Async client for the Backblaze B2 native API.
//!
//! [`B2Client`] lists files across pages up to a result cap, resolves bucket
//! names through a per-client cache, and uploads, deletes and downloads files
//! through a [`Transport`]. [`HttpTransport`] is the reqwest implementation.

pub mod b2;
pub mod config;

pub use b2::{
    B2Client, B2Error, Bucket, DeletedFile, DownloadOverrides, DownloadedFile, File,
    HttpTransport, ListFilesResponse, Transport,
};
pub use config::B2Config;
