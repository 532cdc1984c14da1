//! Typed HTTP client for the catalog and download-execution services.
//!
//! Thin wrapper: every method maps one service endpoint, decodes the
//! response, and exposes streaming bodies as explicit pull streams. The
//! actual transfer work happens on the service side; this client never
//! moves media bytes.

use std::io;
use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;

use crate::ingest::{self, IngestError, ItemRecord};
use crate::relay::{self, ProgressEvent, RelayError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Download submission payload, field names as the service expects them.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub video_urls: Vec<String>,
    pub save_path: String,
    pub quality: String,
    pub video_format: String,
    pub audio_format: String,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub concurrent_downloads: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub download_id: String,
    #[serde(default)]
    pub total: u64,
}

/// Incremental catalog chunks decoded from an NDJSON response body.
pub type CatalogStream = Pin<Box<dyn Stream<Item = Result<Vec<ItemRecord>, IngestError>> + Send>>;

/// Decoded progress events from an SSE response body.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProgressEvent, RelayError>> + Send>>;

pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Non-2xx responses carry an `{"error": ...}` body when the service
    /// rejects a request; surface that message when present.
    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        #[derive(Deserialize)]
        struct ErrBody {
            #[serde(default)]
            error: String,
        }
        let message = resp
            .json::<ErrBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_default();
        Err(ServiceError::Rejected {
            status: status.as_u16(),
            message: if message.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request rejected")
                    .to_string()
            } else {
                message
            },
        })
    }

    /// Opens the channel-enumeration stream.
    pub async fn open_catalog_by_channel(
        &self,
        channel_url: &str,
    ) -> Result<CatalogStream, ServiceError> {
        let resp = self
            .http
            .post(self.endpoint("/api/load_videos_by_user"))
            .json(&serde_json::json!({ "channel_url": channel_url }))
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(catalog_stream(resp))
    }

    /// Opens the metadata stream for an explicit newline-delimited URL list.
    pub async fn open_catalog_by_urls(&self, urls: &str) -> Result<CatalogStream, ServiceError> {
        let resp = self
            .http
            .post(self.endpoint("/api/load_videos_by_list"))
            .json(&serde_json::json!({ "urls": urls }))
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(catalog_stream(resp))
    }

    pub async fn submit_download(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ServiceError> {
        let resp = self
            .http
            .post(self.endpoint("/api/download_videos"))
            .json(request)
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(resp.json::<SubmitResponse>().await?)
    }

    /// Subscribes to the progress feed for a submitted job.
    pub async fn open_progress(&self, download_id: &str) -> Result<EventStream, ServiceError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("/api/download_progress/{}", download_id)))
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(Box::pin(resp.bytes_stream().eventsource().map(
            |ev| match ev {
                Ok(ev) => relay::decode_event(&ev.data),
                Err(e) => Err(RelayError::Transport(e.to_string())),
            },
        )))
    }

    /// Best-effort stop signal to the service side.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let resp = self
            .http
            .post(self.endpoint("/api/download/stop"))
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }

    /// Asks the service host to open a directory chooser. `None` means the
    /// user cancelled; the caller keeps its current destination.
    pub async fn choose_directory(&self) -> Result<Option<String>, ServiceError> {
        let resp = self
            .http
            .post(self.endpoint("/api/choose-directory"))
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        #[derive(Deserialize)]
        struct DirResponse {
            #[serde(default)]
            path: Option<String>,
        }
        let body = resp.json::<DirResponse>().await?;
        Ok(body.path.filter(|p| !p.trim().is_empty()))
    }
}

/// Frames an NDJSON response body into decoded record chunks. Blank lines
/// are skipped; a read error surfaces as a transport failure.
fn catalog_stream(resp: reqwest::Response) -> CatalogStream {
    let bytes = resp
        .bytes_stream()
        .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let lines = BufReader::new(StreamReader::new(bytes)).lines();
    Box::pin(futures::stream::unfold(lines, |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some((ingest::decode_catalog_line(&line), lines));
                }
                Ok(None) => return None,
                Err(e) => return Some((Err(IngestError::Transport(e.to_string())), lines)),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = ServiceClient::new("http://127.0.0.1:5000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(
            client.endpoint("/api/download/stop"),
            "http://127.0.0.1:5000/api/download/stop"
        );
    }

    #[test]
    fn submit_request_serializes_service_field_names() {
        let req = SubmitRequest {
            video_urls: vec!["u1".into()],
            save_path: "/tmp/media".into(),
            quality: "best".into(),
            video_format: "MP4".into(),
            audio_format: "MP3".into(),
            video_enabled: true,
            audio_enabled: false,
            concurrent_downloads: 3,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["video_urls"][0], "u1");
        assert_eq!(value["concurrent_downloads"], 3);
        assert_eq!(value["audio_enabled"], false);
    }
}
