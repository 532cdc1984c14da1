//! Item registry: ordered catalog items and the per-item status machine.
//!
//! The registry is the single writer-synchronization point of the core.
//! Ingest appends and progress events mutate status through it; every
//! other component only reads snapshots. Mutations are serialized by an
//! internal lock so interleaved ingest/progress activity stays consistent.

use std::sync::RwLock;

use crate::metrics::Metric;

/// Per-item lifecycle: `Ready → Queued → Downloading → {Completed, Failed, Stopped}`.
///
/// Terminal states are immutable; only a full [`ItemRegistry::replace_all`]
/// (a fresh fetch) returns items to `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Initial state, assigned at ingest.
    Ready,
    /// A job containing this item's URL was submitted.
    Queued,
    /// The execution service reported a per-URL start (optional signal).
    Downloading,
    /// A progress event reported success for this URL.
    Completed,
    /// A progress event reported failure; carries the service's message.
    Failed { message: String },
    /// Force-set by a user stop for every non-terminal item.
    Stopped,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed { .. } | ItemStatus::Stopped
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemStatus::Failed { .. })
    }

    /// Position along the lifecycle; transitions may never decrease it.
    fn rank(&self) -> u8 {
        match self {
            ItemStatus::Ready => 0,
            ItemStatus::Queued => 1,
            ItemStatus::Downloading => 2,
            ItemStatus::Completed | ItemStatus::Failed { .. } | ItemStatus::Stopped => 3,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Ready => write!(f, "ready"),
            ItemStatus::Queued => write!(f, "queued"),
            ItemStatus::Downloading => write!(f, "downloading"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Failed { message } => write!(f, "failed: {}", message),
            ItemStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// One catalog entry. `id` is assigned at ingest and orders the display;
/// `url` is the correlation key for progress events (the execution service
/// addresses work by URL, and two items may share one).
#[derive(Debug, Clone)]
pub struct Item {
    pub id: u64,
    pub url: String,
    pub caption: String,
    pub comments: Metric,
    pub likes: Metric,
    pub views: Metric,
    pub collects: Metric,
    pub shares: Metric,
    pub status: ItemStatus,
}

/// Item fields known before the registry assigns an id.
#[derive(Debug, Clone, Default)]
pub struct ItemDraft {
    pub url: String,
    pub caption: String,
    pub comments: Metric,
    pub likes: Metric,
    pub views: Metric,
    pub collects: Metric,
    pub shares: Metric,
}

#[derive(Default)]
struct Inner {
    items: Vec<Item>,
    next_id: u64,
}

impl Inner {
    fn push(&mut self, draft: ItemDraft) {
        self.next_id += 1;
        self.items.push(Item {
            id: self.next_id,
            url: draft.url,
            caption: draft.caption,
            comments: draft.comments,
            likes: draft.likes,
            views: draft.views,
            collects: draft.collects,
            shares: draft.shares,
            status: ItemStatus::Ready,
        });
    }
}

/// In-memory ordered collection of items; owns all status mutations.
#[derive(Default)]
pub struct ItemRegistry {
    inner: RwLock<Inner>,
}

/// A transition is admissible only forward along the lifecycle, never out
/// of a terminal state, and never back to `Ready`.
fn admissible(from: &ItemStatus, to: &ItemStatus) -> bool {
    if from.is_terminal() || matches!(to, ItemStatus::Ready) {
        return false;
    }
    to.rank() >= from.rank()
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards current contents and installs a new sequence, every item
    /// `Ready` with ids reassigned from 1. Used when a fresh fetch begins.
    pub fn replace_all(&self, drafts: Vec<ItemDraft>) {
        let mut inner = self.inner.write().unwrap();
        inner.items.clear();
        inner.next_id = 0;
        for draft in drafts {
            inner.push(draft);
        }
    }

    /// Appends items in order, assigning sequential ids. Returns the count
    /// appended. Used for incremental ingest chunks.
    pub fn append(&self, drafts: Vec<ItemDraft>) -> usize {
        let mut inner = self.inner.write().unwrap();
        let added = drafts.len();
        for draft in drafts {
            inner.push(draft);
        }
        added
    }

    /// Moves every item whose `url` matches to `status` (duplicates included).
    /// Inadmissible transitions are skipped; returns the count changed.
    pub fn set_status_by_url(&self, url: &str, status: ItemStatus) -> usize {
        let mut inner = self.inner.write().unwrap();
        let mut changed = 0;
        for item in inner.items.iter_mut().filter(|i| i.url == url) {
            if admissible(&item.status, &status) {
                item.status = status.clone();
                changed += 1;
            } else {
                tracing::debug!(id = item.id, from = %item.status, to = %status, "transition rejected");
            }
        }
        changed
    }

    /// Moves the given items to `status`; used for locally-originated
    /// transitions (e.g. marking queued at dispatch) where id is the key.
    pub fn set_status_for_ids(&self, ids: &[u64], status: ItemStatus) -> usize {
        let mut inner = self.inner.write().unwrap();
        let mut changed = 0;
        for item in inner.items.iter_mut().filter(|i| ids.contains(&i.id)) {
            if admissible(&item.status, &status) {
                item.status = status.clone();
                changed += 1;
            } else {
                tracing::debug!(id = item.id, from = %item.status, to = %status, "transition rejected");
            }
        }
        changed
    }

    /// Forces every non-terminal item to `Stopped`. Returns the count swept.
    /// Because `Stopped` is terminal, no later event can undo the sweep.
    pub fn stop_all(&self) -> usize {
        let mut inner = self.inner.write().unwrap();
        let mut swept = 0;
        for item in inner.items.iter_mut() {
            if !item.status.is_terminal() {
                item.status = ItemStatus::Stopped;
                swept += 1;
            }
        }
        swept
    }

    pub fn get(&self, id: u64) -> Option<Item> {
        self.inner
            .read()
            .unwrap()
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    /// Ids of every item with this URL, in insertion order.
    pub fn ids_with_url(&self, url: &str) -> Vec<u64> {
        self.inner
            .read()
            .unwrap()
            .items
            .iter()
            .filter(|i| i.url == url)
            .map(|i| i.id)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Item> {
        self.inner.read().unwrap().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
