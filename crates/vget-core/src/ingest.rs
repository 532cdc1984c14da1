//! Catalog ingest pipeline: incremental population of the item registry.
//!
//! The catalog service answers with line-delimited JSON; each line is one
//! record, an array of records, or a structured error. [`run_ingest`]
//! pulls decoded chunks from an explicit stream, appends them to the
//! registry as they arrive (partial results are visible immediately), and
//! raises a first-results signal distinct from fetch completion.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::ServiceError;
use crate::metrics::Metric;
use crate::registry::{ItemDraft, ItemRegistry};

/// One catalog record as delivered by the service. The service's own `id`
/// and `status` fields are ignored; the registry assigns both.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
    pub url: String,
    #[serde(default, alias = "title")]
    pub caption: String,
    #[serde(default)]
    pub comments: Metric,
    #[serde(default)]
    pub likes: Metric,
    #[serde(default)]
    pub views: Metric,
    #[serde(default)]
    pub collects: Metric,
    #[serde(default)]
    pub shares: Metric,
}

impl From<ItemRecord> for ItemDraft {
    fn from(r: ItemRecord) -> Self {
        ItemDraft {
            url: r.url.trim().to_string(),
            caption: r.caption.trim().to_string(),
            comments: r.comments,
            likes: r.likes,
            views: r.views,
            collects: r.collects,
            shares: r.shares,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// The catalog request itself was rejected (connect/status failure).
    #[error("catalog request failed: {0}")]
    Request(#[from] ServiceError),
    /// The response stream broke mid-transfer.
    #[error("catalog stream transport failure: {0}")]
    Transport(String),
    /// The service reported a structured error record.
    #[error("catalog service error: {0}")]
    Service(String),
    /// A line was not a record, a record array, or an error record.
    #[error("undecodable catalog record: {0}")]
    Decode(String),
    /// Rejected locally before any network call.
    #[error("no channel URL or video URLs provided")]
    EmptyInput,
    /// The channel reference is not an absolute http(s) URL.
    #[error("invalid channel URL: {0}")]
    InvalidChannelUrl(String),
}

#[derive(Debug, Deserialize)]
struct ErrorRecord {
    error: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogLine {
    Failure(ErrorRecord),
    Batch(Vec<ItemRecord>),
    Single(ItemRecord),
}

/// Decodes one NDJSON line into a chunk of records.
pub fn decode_catalog_line(line: &str) -> Result<Vec<ItemRecord>, IngestError> {
    match serde_json::from_str::<CatalogLine>(line) {
        Ok(CatalogLine::Failure(rec)) if rec.error => Err(IngestError::Service(rec.message)),
        Ok(CatalogLine::Failure(_)) => Ok(Vec::new()),
        Ok(CatalogLine::Batch(records)) => Ok(records),
        Ok(CatalogLine::Single(record)) => Ok(vec![record]),
        Err(e) => Err(IngestError::Decode(e.to_string())),
    }
}

/// Ingest progress as observed from outside: the first-results signal is
/// distinct from the terminal complete signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Idle,
    Fetching,
    FirstResults,
    Complete,
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub appended: usize,
    pub chunks: usize,
    /// True when the stop signal aborted the subscription; already-appended
    /// items stay in the registry.
    pub cancelled: bool,
}

/// Drives an ingest to completion: pulls chunks, appends them to the
/// registry, and publishes phase changes. A mid-stream error halts the
/// ingest and is surfaced, with partial results left in place (not rolled
/// back). Cancellation is observed at the next pull.
pub async fn run_ingest<S>(
    registry: &ItemRegistry,
    mut chunks: S,
    phase: &watch::Sender<IngestPhase>,
    cancel: &CancellationToken,
) -> Result<IngestSummary, IngestError>
where
    S: Stream<Item = Result<Vec<ItemRecord>, IngestError>> + Unpin,
{
    let mut summary = IngestSummary::default();
    let _ = phase.send(IngestPhase::Fetching);

    loop {
        let next = tokio::select! {
            // Biased: a fired token beats a ready chunk, so nothing is
            // appended once a stop has swept the registry.
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(appended = summary.appended, "catalog ingest cancelled");
                summary.cancelled = true;
                break;
            }
            next = chunks.next() => next,
        };

        match next {
            None => break,
            Some(Err(e)) => {
                tracing::warn!(appended = summary.appended, error = %e, "catalog ingest halted");
                return Err(e);
            }
            Some(Ok(records)) => {
                if records.is_empty() {
                    continue;
                }
                let drafts = records.into_iter().map(ItemDraft::from).collect();
                summary.appended += registry.append(drafts);
                summary.chunks += 1;
                if summary.chunks == 1 {
                    let _ = phase.send(IngestPhase::FirstResults);
                }
            }
        }
    }

    let _ = phase.send(IngestPhase::Complete);
    tracing::info!(
        appended = summary.appended,
        chunks = summary.chunks,
        cancelled = summary.cancelled,
        "catalog ingest finished"
    );
    Ok(summary)
}
