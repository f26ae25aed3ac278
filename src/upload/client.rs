//! HTTP upload of the obfuscated payload

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info};

use super::obfuscate::OccupancyPayload;
use crate::config::UploadConfig;

/// Bearer token for the ingestion endpoint.
pub const AUTH_TOKEN_ENV: &str = "UPLOAD_AUTH_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to write payload copy to {}: {}", .0.display(), .1)]
    PayloadCopy(PathBuf, #[source] std::io::Error),
}

pub struct UploadClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    payload_path: Option<PathBuf>,
}

impl UploadClient {
    pub fn new(config: &UploadConfig, token: Option<String>) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.trim().to_string(),
            token: token.filter(|t| !t.is_empty()),
            payload_path: config.payload_path.clone(),
        })
    }

    /// Build from config, taking the token from `$UPLOAD_AUTH_TOKEN`.
    pub fn from_env(config: &UploadConfig) -> Result<Self, UploadError> {
        Self::new(config, std::env::var(AUTH_TOKEN_ENV).ok())
    }

    /// Send the payload and return a status code: 0 on success, 1 on failure.
    pub async fn send(&self, payload: &OccupancyPayload) -> i32 {
        match self.try_send(payload).await {
            Ok(()) => {
                info!(endpoint = %self.endpoint, "Occupancy payload uploaded");
                0
            }
            Err(e) => {
                error!(error = %e, "Failed to upload occupancy payload");
                1
            }
        }
    }

    pub async fn try_send(&self, payload: &OccupancyPayload) -> Result<(), UploadError> {
        if let Some(path) = &self.payload_path {
            write_copy(path, payload)?;
        }
        if self.endpoint.is_empty() {
            debug!("No upload endpoint configured, skipping HTTP post");
            return Ok(());
        }

        let mut request = self.http.post(&self.endpoint).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(UploadError::ServerError(resp.status()))
        }
    }
}

fn write_copy(path: &Path, payload: &OccupancyPayload) -> Result<(), UploadError> {
    let json = serde_json::to_string_pretty(payload)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| UploadError::PayloadCopy(path.to_path_buf(), e))?;
    }
    std::fs::write(path, json).map_err(|e| UploadError::PayloadCopy(path.to_path_buf(), e))?;
    debug!(path = %path.display(), "Wrote payload copy");
    Ok(())
}
