//! Progress relay consumer: reconciles item status from the job's event feed.
//!
//! Given a submitted job, [`run_relay`] pulls decoded server-sent events and
//! drives registry transitions. Events are applied in arrival order; the
//! job's completed counter is reconciled from each event's own value so
//! reordered or lost events cannot skew it. A `progress` event only touches
//! items whose URL matches and whose id was submitted with this job, which
//! keeps a URL reappearing in a later job from contaminating this one.

use std::collections::HashSet;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::ServiceError;
use crate::registry::{ItemRegistry, ItemStatus};

/// One in-flight download batch, addressed by the service's opaque handle.
#[derive(Debug, Clone)]
pub struct Job {
    pub download_id: String,
    /// Deduplicated URLs submitted to the execution service.
    pub target_urls: Vec<String>,
    /// Registry ids covered by this job; the cross-job guard for events.
    pub item_ids: HashSet<u64>,
    pub total: u64,
    /// Monotonically non-decreasing, reconciled from event counters.
    pub completed: u64,
    /// Execution-side concurrency limit carried by the submission (1-10).
    pub concurrency: u8,
}

/// Success/failure of one URL as reported by the service. The wire value
/// `success` maps to `Success`; anything else ("error", "Cancelled", ...)
/// is a failure. No status-string sniffing beyond this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Success,
    Failure,
}

impl<'de> Deserialize<'de> for TransferOutcome {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw.eq_ignore_ascii_case("success") {
            TransferOutcome::Success
        } else {
            TransferOutcome::Failure
        })
    }
}

/// Decoded event from the progress subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Informational. A per-URL form moves the matching items to
    /// `Downloading`; the service may never emit it.
    Started {
        #[serde(default)]
        total: u64,
        #[serde(default)]
        url: Option<String>,
    },
    Progress {
        url: String,
        status: TransferOutcome,
        #[serde(default)]
        message: String,
        #[serde(default)]
        filename: String,
        #[serde(default)]
        completed: u64,
        #[serde(default)]
        total: u64,
    },
    /// Terminal: the job finished; closes the subscription.
    Completed {
        #[serde(default)]
        total: u64,
        #[serde(default)]
        completed: u64,
    },
    /// Terminal: the job failed as a whole.
    Error {
        #[serde(default)]
        error: String,
    },
}

/// Decodes one SSE data payload. The service answers an unknown download id
/// with a bare `{"error": ...}` object, which is folded into `Error`.
pub fn decode_event(data: &str) -> Result<ProgressEvent, RelayError> {
    match serde_json::from_str::<ProgressEvent>(data) {
        Ok(event) => Ok(event),
        Err(primary) => {
            #[derive(Deserialize)]
            struct BareError {
                error: String,
            }
            serde_json::from_str::<BareError>(data)
                .map(|b| ProgressEvent::Error { error: b.error })
                .map_err(|_| RelayError::Decode(primary.to_string()))
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// Opening the subscription was rejected outright.
    #[error("progress subscription failed: {0}")]
    Request(#[from] ServiceError),
    /// The subscription transport broke; items keep their last-known status.
    #[error("progress stream connection lost: {0}")]
    Transport(String),
    #[error("undecodable progress event: {0}")]
    Decode(String),
}

/// What to do with the job's non-terminal items when the stream reports a
/// job-level error. The service historically leaves them unresolved (ready
/// for a user-initiated retry); `MarkFailed` forces a terminal state instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobErrorPolicy {
    #[default]
    LeaveUnresolved,
    MarkFailed,
}

/// How the relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    Completed,
    JobFailed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub end: RelayEnd,
    pub completed: u64,
    pub total: u64,
}

/// Per-URL outcome notification for a live display.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub url: String,
    pub outcome: TransferOutcome,
    pub message: String,
    pub filename: String,
    pub completed: u64,
    pub total: u64,
}

/// Applies `status` to every item of this job whose URL matches. Returns the
/// count changed; 0 means the URL is outside this job (or already terminal).
fn apply_to_job_items(
    registry: &ItemRegistry,
    job: &Job,
    url: &str,
    status: ItemStatus,
) -> usize {
    let ids: Vec<u64> = registry
        .ids_with_url(url)
        .into_iter()
        .filter(|id| job.item_ids.contains(id))
        .collect();
    if ids.is_empty() {
        return 0;
    }
    registry.set_status_for_ids(&ids, status)
}

/// Consumes the event stream for `job` until a terminal event, a transport
/// failure, or cancellation. Stream exhaustion without a terminal event is
/// a connectivity failure. On cancellation the caller owns the `Stopped`
/// sweep; this function just stops pulling and releases the subscription.
pub async fn run_relay<S>(
    registry: &ItemRegistry,
    job: &mut Job,
    mut events: S,
    cancel: &CancellationToken,
    policy: JobErrorPolicy,
    updates: Option<&mpsc::Sender<ProgressUpdate>>,
) -> Result<RelayReport, RelayError>
where
    S: Stream<Item = Result<ProgressEvent, RelayError>> + Unpin,
{
    loop {
        let next = tokio::select! {
            // Biased: cancellation wins over a ready event.
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(download_id = %job.download_id, "progress relay cancelled");
                return Ok(RelayReport {
                    end: RelayEnd::Cancelled,
                    completed: job.completed,
                    total: job.total,
                });
            }
            next = events.next() => next,
        };

        let Some(event) = next else {
            return Err(RelayError::Transport(
                "stream ended before job completion".into(),
            ));
        };

        match event? {
            ProgressEvent::Started { total, url } => {
                tracing::debug!(download_id = %job.download_id, total, "job started");
                if let Some(url) = url {
                    apply_to_job_items(registry, job, &url, ItemStatus::Downloading);
                }
            }
            ProgressEvent::Progress {
                url,
                status,
                message,
                filename,
                completed,
                total,
            } => {
                let item_status = match status {
                    TransferOutcome::Success => ItemStatus::Completed,
                    TransferOutcome::Failure => ItemStatus::Failed {
                        message: if message.is_empty() {
                            "download failed".to_string()
                        } else {
                            message.clone()
                        },
                    },
                };
                let changed = apply_to_job_items(registry, job, &url, item_status);
                if changed == 0 {
                    tracing::debug!(%url, "progress event for url outside this job");
                }
                // The event's counter is authoritative; monotonic max tolerates
                // reordering, the clamp keeps completed <= total.
                job.completed = job.completed.max(completed).min(job.total);
                tracing::debug!(
                    download_id = %job.download_id,
                    %url,
                    outcome = ?status,
                    completed = job.completed,
                    total = job.total,
                    "progress applied"
                );
                if let Some(tx) = updates {
                    let _ = tx.try_send(ProgressUpdate {
                        url,
                        outcome: status,
                        message,
                        filename,
                        completed: job.completed,
                        total: if total == 0 { job.total } else { total },
                    });
                }
            }
            ProgressEvent::Completed { completed, .. } => {
                job.completed = job.completed.max(completed).min(job.total);
                tracing::info!(
                    download_id = %job.download_id,
                    completed = job.completed,
                    total = job.total,
                    "job completed"
                );
                return Ok(RelayReport {
                    end: RelayEnd::Completed,
                    completed: job.completed,
                    total: job.total,
                });
            }
            ProgressEvent::Error { error } => {
                tracing::warn!(download_id = %job.download_id, %error, "job failed");
                if policy == JobErrorPolicy::MarkFailed {
                    let ids: Vec<u64> = job.item_ids.iter().copied().collect();
                    registry.set_status_for_ids(
                        &ids,
                        ItemStatus::Failed {
                            message: error.clone(),
                        },
                    );
                }
                return Ok(RelayReport {
                    end: RelayEnd::JobFailed(error),
                    completed: job.completed,
                    total: job.total,
                });
            }
        }
    }
}
