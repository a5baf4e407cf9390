//! Real-Debrid REST client

use super::traits::AcquisitionClient;
use crate::config::{AcquisitionConfig, RetryConfig};
use crate::retry::with_retry;
use crate::types::{AcquisitionId, AcquisitionInfo, AcquisitionStatus, MediaMember};
use crate::utils::is_media_file;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use std::path::Path;

const SERVICE: &str = "real-debrid";

#[derive(Debug, Deserialize)]
struct AddMagnetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    id: String,
    status: String,
    #[serde(default)]
    files: Vec<TorrentFile>,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    id: u64,
    path: String,
    #[serde(default)]
    selected: u8,
}

/// Map a Real-Debrid status string to an [`AcquisitionStatus`]
///
/// `queued` only means "not cached" once files have been selected; before
/// that it is an ordinary waiting state.
pub fn map_status(raw: &str, files_selected: bool) -> AcquisitionStatus {
    match raw {
        "downloaded" => AcquisitionStatus::Ready,
        "queued" if files_selected => AcquisitionStatus::Unavailable,
        "error" | "dead" | "magnet_error" | "virus" => AcquisitionStatus::Error,
        _ => AcquisitionStatus::Pending,
    }
}

/// [`AcquisitionClient`] backed by the Real-Debrid API
pub struct RealDebridClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl RealDebridClient {
    /// Create a client from configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("debridarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            retry: config.retry.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            service: SERVICE.to_string(),
            status,
            body,
        })
    }

    async fn add_magnet(&self, link: &str) -> Result<AcquisitionId> {
        let response = self
            .http
            .post(self.url("/torrents/addMagnet"))
            .bearer_auth(&self.token)
            .form(&[("magnet", link)])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let added: AddMagnetResponse = response.json().await?;
        Ok(AcquisitionId::new(added.id))
    }

    async fn torrent_info(&self, id: &AcquisitionId) -> Result<TorrentInfo> {
        let response = self
            .http
            .get(self.url(&format!("/torrents/info/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AcquisitionClient for RealDebridClient {
    async fn submit(&self, link: &str) -> Result<AcquisitionId> {
        let result = with_retry(&self.retry, || self.add_magnet(link)).await;

        match result {
            Ok(id) => {
                tracing::info!(acquisition_id = %id, "link submitted");
                Ok(id)
            }
            // The service looked at the link and said no
            Err(Error::Api { status, body, .. }) if (400..500).contains(&status) => {
                Err(Error::Submission {
                    link: link.to_string(),
                    reason: format!("HTTP {}: {}", status, body),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn poll(&self, id: &AcquisitionId) -> Result<AcquisitionInfo> {
        let info = with_retry(&self.retry, || self.torrent_info(id)).await?;

        let files_selected = info.files.iter().any(|f| f.selected == 1);
        let status = map_status(&info.status, files_selected);

        let media_members = info
            .files
            .iter()
            .filter(|f| {
                let lower = f.path.to_lowercase();
                is_media_file(Path::new(&lower)) && !lower.contains("sample")
            })
            .filter_map(|f| {
                let name = Path::new(f.path.trim_start_matches('/')).file_name()?;
                Some(MediaMember {
                    id: f.id,
                    name: name.to_string_lossy().to_lowercase(),
                })
            })
            .collect();

        tracing::debug!(
            acquisition_id = %id,
            raw_status = %info.status,
            status = ?status,
            "polled acquisition"
        );

        Ok(AcquisitionInfo {
            id: AcquisitionId::new(info.id),
            status,
            raw_status: info.status,
            media_members,
        })
    }

    async fn select_files(&self, id: &AcquisitionId, file_ids: &[u64]) -> Result<()> {
        let files = file_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let files_ref = files.as_str();
        with_retry(&self.retry, move || async move {
            let response = self
                .http
                .post(self.url(&format!("/torrents/selectFiles/{}", id)))
                .bearer_auth(&self.token)
                .form(&[("files", files_ref)])
                .send()
                .await?;
            Self::expect_success(response).await?;
            Ok::<(), Error>(())
        })
        .await?;

        tracing::debug!(acquisition_id = %id, files = %files, "selected files");
        Ok(())
    }

    async fn cancel(&self, id: &AcquisitionId) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/torrents/delete/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::expect_success(response).await?;
        tracing::info!(acquisition_id = %id, "acquisition removed");
        Ok(())
    }
}
