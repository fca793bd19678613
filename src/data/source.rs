//! Fetching the daily dataset from a URL or a local file.

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::domain::{DataSource, DEFAULT_SOURCE_URL};
use crate::error::AppError;

/// Environment variable that overrides the default source.
pub const SOURCE_ENV: &str = "COV_DATA_SOURCE";

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Blocking reader for a [`DataSource`].
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::load(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Read the whole source into memory.
    #[tracing::instrument(skip(self, source), fields(source = %source.describe()))]
    pub fn fetch(&self, source: &DataSource) -> Result<Vec<u8>, AppError> {
        let started = Instant::now();
        let bytes = match source {
            DataSource::Url(url) => self.fetch_url(url)?,
            DataSource::Path(path) => std::fs::read(path).map_err(|e| {
                AppError::load(format!("Failed to read dataset '{}': {e}", path.display()))
            })?,
        };
        info!(
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset fetched"
        );
        Ok(bytes)
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, AppError> {
        debug!(url, "Requesting dataset");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| AppError::load(format!("Dataset request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::load(format!(
                "Dataset request failed with status {}.",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .map_err(|e| AppError::load(format!("Failed to read dataset response: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Resolve the source: explicit flag, then `COV_DATA_SOURCE` (also from `.env`),
/// then the public tracker snapshot.
pub fn resolve_source(flag: Option<&str>) -> DataSource {
    dotenvy::dotenv().ok();
    if let Some(raw) = flag.map(str::trim).filter(|s| !s.is_empty()) {
        return DataSource::parse(raw);
    }
    match std::env::var(SOURCE_ENV) {
        Ok(raw) if !raw.trim().is_empty() => DataSource::parse(&raw),
        _ => DataSource::parse(DEFAULT_SOURCE_URL),
    }
}
