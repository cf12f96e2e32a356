//! Package download over HTTP.

use crate::utils::{Result, SyncError};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches package bytes from the time-limited URL handed out by the service.
#[derive(Debug, Clone)]
pub struct PackageDownloader {
    client: reqwest::Client,
}

impl PackageDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    /// Download the package at `url`, following redirects.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        debug!("Downloading package from {}", redact_query(url));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SyncError::Network(format!(
                "HTTP {} while downloading {}",
                response.status(),
                redact_query(url)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::Network(format!("download interrupted: {e}")))?;

        info!("Downloaded package ({} bytes)", bytes.len());
        Ok(bytes)
    }
}

/// Presigned URLs carry credentials in the query string; keep them out of logs.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
