//! Selection set: the item ids chosen for download.
//!
//! Independent of any display filtering; supports toggle, bulk select of
//! visible items, and bulk clear. Items in a failed status are refused so
//! a dispatch never picks up known-bad entries.

use std::collections::BTreeSet;

use crate::registry::ItemRegistry;

#[derive(Debug, Default)]
pub struct SelectionSet {
    ids: BTreeSet<u64>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the selection state of one item. Unknown ids and items in a
    /// failed status are ignored. Returns whether the item is now selected.
    pub fn toggle(&mut self, id: u64, registry: &ItemRegistry) -> bool {
        if self.ids.remove(&id) {
            return false;
        }
        match registry.get(id) {
            Some(item) if !item.status.is_failed() => self.ids.insert(id),
            _ => false,
        }
    }

    /// Bulk-selects the given (visible) ids, skipping failed items.
    /// Returns the count newly selected.
    pub fn select_many(&mut self, ids: impl IntoIterator<Item = u64>, registry: &ItemRegistry) -> usize {
        let mut added = 0;
        for id in ids {
            match registry.get(id) {
                Some(item) if !item.status.is_failed() => {
                    if self.ids.insert(id) {
                        added += 1;
                    }
                }
                _ => {}
            }
        }
        added
    }

    /// Bulk-deselects the given (visible) ids.
    pub fn deselect_many(&mut self, ids: impl IntoIterator<Item = u64>) {
        for id in ids {
            self.ids.remove(&id);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Selected ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.ids.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ItemDraft, ItemStatus};

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
    fn toggle_selects_and_deselects() {
        let reg = registry_with(&["u1"]);
        let mut sel = SelectionSet::new();

        assert!(sel.toggle(1, &reg));
        assert!(sel.contains(1));
        assert!(!sel.toggle(1, &reg));
        assert!(sel.is_empty());
    }

    #[test]
    fn failed_items_are_refused() {
        let reg = registry_with(&["u1", "u2"]);
        reg.set_status_for_ids(&[1], ItemStatus::Queued);
        reg.set_status_for_ids(
            &[1],
            ItemStatus::Failed {
                message: "boom".into(),
            },
        );

        let mut sel = SelectionSet::new();
        assert!(!sel.toggle(1, &reg));
        assert_eq!(sel.select_many([1, 2], &reg), 1);
        assert_eq!(sel.ids(), vec![2]);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let reg = registry_with(&["u1"]);
        let mut sel = SelectionSet::new();
        assert!(!sel.toggle(99, &reg));
        assert_eq!(sel.select_many([99], &reg), 0);
    }

    #[test]
    fn bulk_select_and_clear() {
        let reg = registry_with(&["a", "b", "c"]);
        let mut sel = SelectionSet::new();
        assert_eq!(sel.select_many([1, 2, 3], &reg), 3);
        assert_eq!(sel.select_many([1, 2, 3], &reg), 0);

        sel.deselect_many([2]);
        assert_eq!(sel.ids(), vec![1, 3]);

        sel.clear();
        assert!(sel.is_empty());
    }
}
