//! Batch dispatcher: turns the selection into one submitted download job.
//!
//! Planning resolves selected ids to items, skips anything already
//! completed (re-download is disallowed, not re-queued), and deduplicates
//! URLs so the execution service sees each unique URL exactly once. Items
//! move to `Queued` only after the submission succeeds; a failed
//! submission leaves every status untouched.

use std::collections::HashSet;

use thiserror::Error;

use crate::client::{ServiceClient, ServiceError, SubmitRequest};
use crate::config::DownloadSettings;
use crate::registry::{ItemRegistry, ItemStatus};
use crate::relay::Job;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Nothing eligible: empty selection, or everything already completed.
    /// Reported locally, before any network call.
    #[error("nothing to download")]
    NothingToDownload,
    #[error("download submission failed: {0}")]
    Submit(#[from] ServiceError),
}

/// Resolved dispatch target: eligible item ids plus their deduplicated URLs.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub item_ids: Vec<u64>,
    pub target_urls: Vec<String>,
}

/// Resolves the selection against the registry. Completed items are
/// excluded; duplicate URLs collapse to one entry in first-seen order.
pub fn plan(
    registry: &ItemRegistry,
    selected: impl IntoIterator<Item = u64>,
) -> Result<DispatchPlan, DispatchError> {
    let mut item_ids = Vec::new();
    let mut target_urls = Vec::new();
    let mut seen = HashSet::new();

    for id in selected {
        let Some(item) = registry.get(id) else {
            continue;
        };
        if item.status == ItemStatus::Completed {
            tracing::debug!(id, url = %item.url, "skipping already-completed item");
            continue;
        }
        item_ids.push(id);
        if seen.insert(item.url.clone()) {
            target_urls.push(item.url);
        }
    }

    if target_urls.is_empty() {
        return Err(DispatchError::NothingToDownload);
    }
    Ok(DispatchPlan {
        item_ids,
        target_urls,
    })
}

/// Submits the plan as one job. On success the planned items are marked
/// `Queued` immediately, before any event arrives, and the returned [`Job`]
/// carries the service's handle for the progress subscription.
pub async fn submit(
    client: &ServiceClient,
    registry: &ItemRegistry,
    plan: DispatchPlan,
    settings: &DownloadSettings,
) -> Result<Job, DispatchError> {
    let request = SubmitRequest {
        video_urls: plan.target_urls.clone(),
        save_path: settings.save_path.clone(),
        quality: settings.quality.clone(),
        video_format: settings.video_format.clone(),
        audio_format: settings.audio_format.clone(),
        video_enabled: settings.video_enabled,
        audio_enabled: settings.audio_enabled,
        concurrent_downloads: settings.clamped_concurrency(),
    };

    let response = client.submit_download(&request).await?;
    let total = plan.target_urls.len() as u64;
    if response.total != 0 && response.total != total {
        tracing::warn!(
            reported = response.total,
            submitted = total,
            "service disagrees on job size"
        );
    }

    registry.set_status_for_ids(&plan.item_ids, ItemStatus::Queued);
    tracing::info!(
        download_id = %response.download_id,
        urls = total,
        concurrency = request.concurrent_downloads,
        "download job submitted"
    );

    Ok(Job {
        download_id: response.download_id,
        item_ids: plan.item_ids.into_iter().collect(),
        total,
        completed: 0,
        concurrency: request.concurrent_downloads,
        target_urls: plan.target_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ItemDraft;

    fn registry_with(urls: &[&str]) -> ItemRegistry {
        let reg = ItemRegistry::new();
        reg.append(
            urls.iter()
                .map(|u| ItemDraft {
                    url: u.to_string(),
                    ..ItemDraft::default()
                })
                .collect(),
        );
        reg
    }

    #[test]
    fn duplicate_urls_collapse_to_one_target() {
        let reg = registry_with(&["A", "A", "B"]);
        let plan = plan(&reg, [1, 2, 3]).unwrap();
        assert_eq!(plan.target_urls, vec!["A", "B"]);
        assert_eq!(plan.item_ids, vec![1, 2, 3]);
    }

    #[test]
    fn completed_items_are_never_redispatched() {
        let reg = registry_with(&["A", "B"]);
        reg.set_status_for_ids(&[1], ItemStatus::Queued);
        reg.set_status_for_ids(&[1], ItemStatus::Completed);

        let plan = plan(&reg, [1, 2]).unwrap();
        assert_eq!(plan.target_urls, vec!["B"]);
        assert_eq!(plan.item_ids, vec![2]);
    }

    #[test]
    fn empty_or_fully_completed_selection_is_a_local_noop() {
        let reg = registry_with(&["A"]);
        assert!(matches!(
            plan(&reg, []),
            Err(DispatchError::NothingToDownload)
        ));

        reg.set_status_for_ids(&[1], ItemStatus::Queued);
        reg.set_status_for_ids(&[1], ItemStatus::Completed);
        assert!(matches!(
            plan(&reg, [1]),
            Err(DispatchError::NothingToDownload)
        ));
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let reg = registry_with(&["A"]);
        let plan = plan(&reg, [1, 42]).unwrap();
        assert_eq!(plan.item_ids, vec![1]);
    }
}
