//! Several persist items behind one state container
//!
//! Each slice belongs to exactly one item, so the manager can route a full
//! state snapshot to the items that track it.

use crate::SliceMap;
use crate::error::{PersistError, Result};
use crate::item::{HydrationReport, PersistItem};
use crate::scheduler::WriteTicket;
use futures::future::{join_all, try_join_all};
use std::collections::HashSet;
use tracing::info;

pub struct PersistManager {
    items: Vec<PersistItem>,
}

impl PersistManager {
    /// Fails when two items share a storage key or a slice name
    pub fn new(items: impl IntoIterator<Item = PersistItem>) -> Result<Self> {
        let items: Vec<PersistItem> = items.into_iter().collect();
        let mut keys = HashSet::new();
        let mut slices = HashSet::new();

        for item in &items {
            if !keys.insert(item.key().to_string()) {
                return Err(PersistError::InvalidConfig(format!(
                    "storage key '{}' used by more than one item",
                    item.key()
                )));
            }
            for name in item.slice_names() {
                if !slices.insert(name.to_string()) {
                    return Err(PersistError::DuplicateSlice(name.to_string()));
                }
            }
        }

        Ok(Self { items })
    }

    pub fn items(&self) -> &[PersistItem] {
        &self.items
    }

    pub fn item(&self, key: &str) -> Option<&PersistItem> {
        self.items.iter().find(|item| item.key() == key)
    }

    /// Hydrate every item concurrently; reports follow item order
    pub async fn init(&self) -> Vec<HydrationReport> {
        let reports = join_all(self.items.iter().map(|item| item.init())).await;

        let restored: usize = reports.iter().map(HydrationReport::restored).sum();
        info!(
            "Hydrated {} slices across {} persist items",
            restored,
            self.items.len()
        );

        reports
    }

    /// Restored slices of every item, merged
    pub fn collect(&self) -> SliceMap {
        self.items.iter().flat_map(|item| item.collect()).collect()
    }

    /// Route slice values to their owning items
    ///
    /// Returns one ticket per item that received at least one slice.
    pub fn update(&self, slices: &SliceMap) -> Vec<WriteTicket> {
        self.items
            .iter()
            .filter_map(|item| {
                let owned: SliceMap = slices
                    .iter()
                    .filter(|(name, _)| item.is_registered(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();

                (!owned.is_empty()).then(|| item.update(owned))
            })
            .collect()
    }

    pub async fn flush(&self) -> Result<()> {
        try_join_all(self.items.iter().map(|item| item.flush())).await?;
        Ok(())
    }

    pub fn shutdown(&self) {
        for item in &self.items {
            item.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SliceDescriptor;
    use crate::engine::{MemoryStorage, StorageEngine};
    use crate::item::DocumentStatus;
    use serde_json::json;
    use std::sync::Arc;

    fn item(key: &str, storage: Arc<MemoryStorage>, slices: &[&str]) -> PersistItem {
        PersistItem::builder(key, storage)
            .version(1)
            .slices(slices.iter().map(|name| SliceDescriptor::new(*name)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_shared_slice() {
        let storage = Arc::new(MemoryStorage::new());
        let result = PersistManager::new([
            item("a", storage.clone(), &["counter"]),
            item("b", storage, &["counter"]),
        ]);

        assert_eq!(
            result.err(),
            Some(PersistError::DuplicateSlice("counter".to_string()))
        );
    }

    #[test]
    fn test_rejects_shared_key() {
        let storage = Arc::new(MemoryStorage::new());
        let result = PersistManager::new([
            item("a", storage.clone(), &["one"]),
            item("a", storage, &["two"]),
        ]);

        assert!(matches!(result, Err(PersistError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_routes_updates_and_merges_collect() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = PersistManager::new([
            item("prefs", storage.clone(), &["theme"]),
            item("session", storage.clone(), &["user", "cart"]),
        ])
        .unwrap();

        let reports = manager.init().await;
        assert!(reports.iter().all(|r| r.status == DocumentStatus::Missing));

        let mut slices = SliceMap::new();
        slices.insert("theme".to_string(), json!("dark"));
        slices.insert("user".to_string(), json!({ "id": 7 }));
        slices.insert("unknown".to_string(), json!(true));

        let tickets = manager.update(&slices);
        assert_eq!(tickets.len(), 2);
        for ticket in tickets {
            ticket.wait().await.unwrap();
        }

        let prefs = storage.get_item("prefs").await.unwrap().unwrap();
        let session = storage.get_item("session").await.unwrap().unwrap();
        assert!(prefs.contains("theme") && !prefs.contains("user"));
        assert!(session.contains("user") && !session.contains("theme"));

        // A fresh manager over the same storage sees both items
        let restored = PersistManager::new([
            item("prefs", storage.clone(), &["theme"]),
            item("session", storage, &["user", "cart"]),
        ])
        .unwrap();
        restored.init().await;

        let mut expected = slices.clone();
        expected.remove("unknown");
        assert_eq!(restored.collect(), expected);
        assert!(restored.item("session").is_some());
        assert!(restored.item("nope").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_item() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = PersistManager::new([
            item("a", storage.clone(), &["one"]),
            item("b", storage, &["two"]),
        ])
        .unwrap();

        manager.flush().await.unwrap();
        manager.shutdown();
        assert!(manager.items().iter().all(PersistItem::is_closed));
    }
}
