//! Document retrieval for the "show/reopen motion" commands.
//!
//! Fetching is only a side effect of presentation, never part of scoring: a
//! timeout or network failure is reported and the session stays where it
//! was so the user can retry.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::error::Error;

#[async_trait]
pub trait DocumentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        let fail = |reason: String| Error::FetchFailure { url: url.to_string(), reason };
        let parsed = Url::parse(url).map_err(|err| fail(err.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| fail(err.to_string()))?;
        let bytes = response.bytes().await.map_err(|err| fail(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Write the fetched document to the configured output path.
pub fn store_document(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

/// Hand the stored document to the platform's default viewer.
pub fn open_document(path: &Path) -> std::io::Result<()> {
    if cfg!(target_os = "linux") {
        Command::new("xdg-open").arg(path).spawn()?;
    } else if cfg!(target_os = "macos") {
        Command::new("open").arg(path).spawn()?;
    } else {
        Command::new("cmd").args(["/C", "start", ""]).arg(path).spawn()?;
    }
    Ok(())
}
