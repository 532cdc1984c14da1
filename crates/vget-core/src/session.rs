//! Session: one coordinator object owning all per-user state.
//!
//! Registry, selection, settings, stop controller, and the active-job
//! marker live here and are passed by reference into the drivers; nothing
//! in the core is ambient/global. One ingest subscription and one progress
//! subscription are managed at a time.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::client::{ServiceClient, ServiceError};
use crate::config::DownloadSettings;
use crate::control::StopController;
use crate::dispatch::{self, DispatchError};
use crate::ingest::{self, IngestError, IngestPhase, IngestSummary};
use crate::registry::ItemRegistry;
use crate::relay::{self, JobErrorPolicy, ProgressUpdate, RelayError, RelayReport};
use crate::selection::SelectionSet;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// A relay is already consuming a progress subscription; the session
    /// runs one job at a time.
    #[error("a download job is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Relay(#[from] RelayError),
}

pub struct Session {
    registry: Arc<ItemRegistry>,
    selection: Mutex<SelectionSet>,
    client: ServiceClient,
    settings: Mutex<DownloadSettings>,
    control: StopController,
    phase: watch::Sender<IngestPhase>,
    /// Handle of the job whose relay is currently running, if any.
    active: Mutex<Option<String>>,
    policy: JobErrorPolicy,
}

impl Session {
    pub fn new(client: ServiceClient, settings: DownloadSettings) -> Self {
        let (phase, _) = watch::channel(IngestPhase::Idle);
        Self {
            registry: Arc::new(ItemRegistry::new()),
            selection: Mutex::new(SelectionSet::new()),
            client,
            settings: Mutex::new(settings),
            control: StopController::new(),
            phase,
            active: Mutex::new(None),
            policy: JobErrorPolicy::default(),
        }
    }

    pub fn with_error_policy(mut self, policy: JobErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    /// Observer for the ingest phase; `FirstResults` fires as soon as the
    /// first chunk lands, before `Complete`.
    pub fn ingest_phase(&self) -> watch::Receiver<IngestPhase> {
        self.phase.subscribe()
    }

    pub fn settings(&self) -> DownloadSettings {
        self.settings.lock().unwrap().clone()
    }

    pub fn set_settings(&self, settings: DownloadSettings) {
        *self.settings.lock().unwrap() = settings;
    }

    pub fn active_download(&self) -> Option<String> {
        self.active.lock().unwrap().clone()
    }

    // Selection passthroughs; the set itself stays private so every
    // mutation goes through the failed-item guard.

    pub fn toggle_selection(&self, id: u64) -> bool {
        self.selection.lock().unwrap().toggle(id, &self.registry)
    }

    pub fn select_ids(&self, ids: impl IntoIterator<Item = u64>) -> usize {
        self.selection
            .lock()
            .unwrap()
            .select_many(ids, &self.registry)
    }

    /// Bulk-select every item currently in the registry.
    pub fn select_all(&self) -> usize {
        let ids: Vec<u64> = self.registry.snapshot().iter().map(|i| i.id).collect();
        self.select_ids(ids)
    }

    pub fn deselect_ids(&self, ids: impl IntoIterator<Item = u64>) {
        self.selection.lock().unwrap().deselect_many(ids);
    }

    pub fn clear_selection(&self) {
        self.selection.lock().unwrap().clear();
    }

    pub fn selected_ids(&self) -> Vec<u64> {
        self.selection.lock().unwrap().ids()
    }

    /// Enumerates a channel into the registry. Clears previous results and
    /// selection first; partial results stay visible while the fetch runs.
    pub async fn fetch_channel(&self, channel_url: &str) -> Result<IngestSummary, IngestError> {
        let trimmed = channel_url.trim();
        if trimmed.is_empty() {
            return Err(IngestError::EmptyInput);
        }
        match url::Url::parse(trimmed) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(IngestError::InvalidChannelUrl(trimmed.to_string())),
        }

        self.begin_fetch();
        let cancel = self.control.arm();
        tracing::info!(channel = trimmed, "fetching channel catalog");
        let chunks = self.client.open_catalog_by_channel(trimmed).await?;
        ingest::run_ingest(&self.registry, chunks, &self.phase, &cancel).await
    }

    /// Loads metadata for an explicit newline-delimited URL list.
    pub async fn fetch_urls(&self, url_list: &str) -> Result<IngestSummary, IngestError> {
        let count = url_list.lines().filter(|l| !l.trim().is_empty()).count();
        if count == 0 {
            return Err(IngestError::EmptyInput);
        }

        self.begin_fetch();
        let cancel = self.control.arm();
        tracing::info!(urls = count, "fetching catalog from url list");
        let chunks = self.client.open_catalog_by_urls(url_list).await?;
        ingest::run_ingest(&self.registry, chunks, &self.phase, &cancel).await
    }

    fn begin_fetch(&self) {
        self.selection.lock().unwrap().clear();
        self.registry.replace_all(Vec::new());
        let _ = self.phase.send(IngestPhase::Idle);
    }

    /// Dispatches the current selection as one job and relays its progress
    /// to completion. `updates` receives per-URL outcomes for live display.
    pub async fn download_selected(
        &self,
        updates: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<RelayReport, DownloadError> {
        if self.active.lock().unwrap().is_some() {
            return Err(DownloadError::AlreadyRunning);
        }
        let cancel = self.control.arm();
        let selected = self.selected_ids();
        let plan = dispatch::plan(&self.registry, selected)?;
        let settings = self.settings();
        let mut job = dispatch::submit(&self.client, &self.registry, plan, &settings).await?;

        *self.active.lock().unwrap() = Some(job.download_id.clone());
        let result = match self.client.open_progress(&job.download_id).await {
            Ok(events) => {
                relay::run_relay(
                    &self.registry,
                    &mut job,
                    events,
                    &cancel,
                    self.policy,
                    updates.as_ref(),
                )
                .await
            }
            Err(e) => Err(RelayError::Request(e)),
        };
        // Terminal bookkeeping: the dispatch marker is cleared however the
        // relay ended.
        *self.active.lock().unwrap() = None;
        Ok(result?)
    }

    /// User stop: cancels in-flight ingest/relay, notifies the service
    /// (best-effort), clears the selection, and sweeps every non-terminal
    /// item to `Stopped`. Idempotent. Returns the count of items swept.
    pub async fn stop(&self) -> usize {
        self.control.stop();
        if let Err(e) = self.client.stop().await {
            tracing::warn!(error = %e, "stop notification to service failed");
        }
        self.clear_selection();
        *self.active.lock().unwrap() = None;
        let swept = self.registry.stop_all();
        tracing::info!(swept, "stop applied");
        swept
    }

    /// Service-side directory chooser; on success the save path is updated,
    /// on cancel or failure the existing destination is kept.
    pub async fn choose_save_path(&self) -> Result<Option<String>, ServiceError> {
        match self.client.choose_directory().await? {
            Some(path) => {
                self.settings.lock().unwrap().save_path = path.clone();
                tracing::info!(%path, "save path updated from directory chooser");
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ItemDraft, ItemStatus};

    // Points at a closed port; service calls fail fast and stop() must not
    // depend on their success.
    fn offline_session() -> Session {
        let client = ServiceClient::new("http://127.0.0.1:9").unwrap();
        Session::new(client, DownloadSettings::default())
    }

    fn seed(session: &Session, urls: &[&str]) {
        session.registry().append(
            urls.iter()
                .map(|u| ItemDraft {
                    url: u.to_string(),
                    ..ItemDraft::default()
                })
                .collect(),
        );
    }

    #[tokio::test]
    async fn stop_sweeps_in_flight_items_and_clears_selection() {
        let session = offline_session();
        seed(&session, &["u1", "u2"]);
        session.select_all();
        session
            .registry()
            .set_status_for_ids(&[1], ItemStatus::Downloading);
        session
            .registry()
            .set_status_for_ids(&[2], ItemStatus::Queued);

        let swept = session.stop().await;
        assert_eq!(swept, 2);
        assert_eq!(
            session.registry().get(1).unwrap().status,
            ItemStatus::Stopped
        );
        assert_eq!(
            session.registry().get(2).unwrap().status,
            ItemStatus::Stopped
        );
        assert!(session.selected_ids().is_empty());
    }

    #[tokio::test]
    async fn stop_twice_matches_stop_once() {
        let session = offline_session();
        seed(&session, &["u1"]);
        session.select_all();

        session.stop().await;
        let after_first = session.registry().snapshot();
        let swept_again = session.stop().await;

        assert_eq!(swept_again, 0);
        let after_second = session.registry().snapshot();
        assert_eq!(after_first.len(), after_second.len());
        for (a, b) in after_first.iter().zip(after_second.iter()) {
            assert_eq!(a.status, b.status);
        }
        assert!(session.selected_ids().is_empty());
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected_before_any_network_call() {
        let session = offline_session();
        assert!(matches!(
            session.fetch_channel("   ").await,
            Err(IngestError::EmptyInput)
        ));
        assert!(matches!(
            session.fetch_urls("\n  \n").await,
            Err(IngestError::EmptyInput)
        ));
        assert!(matches!(
            session.fetch_channel("not a url").await,
            Err(IngestError::InvalidChannelUrl(_))
        ));
    }

    #[tokio::test]
    async fn empty_selection_is_a_local_noop() {
        let session = offline_session();
        seed(&session, &["u1"]);
        let err = session.download_selected(None).await.unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Dispatch(DispatchError::NothingToDownload)
        ));
        // No dispatch marker, no status mutation.
        assert!(session.active_download().is_none());
        assert_eq!(session.registry().get(1).unwrap().status, ItemStatus::Ready);
    }

    #[tokio::test]
    async fn failed_submission_leaves_statuses_untouched() {
        let session = offline_session();
        seed(&session, &["u1", "u2"]);
        session.select_all();

        let err = session.download_selected(None).await.unwrap_err();
        assert!(matches!(err, DownloadError::Dispatch(DispatchError::Submit(_))));
        assert_eq!(session.registry().get(1).unwrap().status, ItemStatus::Ready);
        assert_eq!(session.registry().get(2).unwrap().status, ItemStatus::Ready);
    }
}
