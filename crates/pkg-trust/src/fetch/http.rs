//! HTTP downloader: status mapping and retry.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::types::FetchConfig;

use super::Downloader;

const USER_AGENT_VALUE: &str = concat!("pkg-trust/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP(S) downloader with retry on transient failures.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    max_retries: u32,
}

impl HttpDownloader {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut retries = 0;

        loop {
            match self.fetch_once(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let backoff = backoff_for(&e, retries);

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying download"
                    );

                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().map_err(network)?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);

            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }

        let bytes = response.bytes().map_err(network)?;
        Ok(bytes.to_vec())
    }
}

fn backoff_for(err: &FetchError, retries: u32) -> Duration {
    match err {
        FetchError::Status {
            retry_after: Some(retry_after),
            ..
        } => {
            let capped = (*retry_after).min(Duration::from_secs(30));
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            let jittered_ms = ((capped.as_millis() as f64) * jitter_factor).round() as u64;
            Duration::from_millis(jittered_ms.max(100))
        }
        _ => {
            let base_backoff = Duration::from_secs(1 << retries.min(5));
            let base_backoff = base_backoff.min(Duration::from_secs(30));
            let jittered_ms = rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
            Duration::from_millis(jittered_ms.max(10))
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        debug!(url, destination = %destination.display(), "downloading");

        let bytes = self.fetch_bytes(url)?;
        std::fs::write(destination, &bytes).map_err(|e| FetchError::Io {
            url: url.to_string(),
            path: destination.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(url, bytes = bytes.len(), "download complete");
        Ok(())
    }
}
