//! Persist items over the file engine

mod common;

#[cfg(test)]
mod tests {
    use super::common::{NOW, slices};
    use serde_json::json;
    use slicekeep::{
        DocumentStatus, FileStorage, ManualClock, PersistConfig, PersistItem, SliceDescriptor,
        SliceOutcomeKind, StorageEngine,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn item(storage: Arc<FileStorage>, clock: ManualClock) -> PersistItem {
        PersistItem::builder("app/state", storage)
            .version(2)
            .slices([
                SliceDescriptor::new("settings"),
                SliceDescriptor::new("history").version(1),
            ])
            .clock(clock)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path().join("store")));
        let clock = ManualClock::new(NOW);

        let first = item(storage.clone(), clock.clone());
        assert_eq!(first.init().await.status, DocumentStatus::Missing);

        first
            .update(slices(&[
                ("settings", json!({ "theme": "dark", "volume": 7 })),
                ("history", json!(["a", "b"])),
            ]))
            .wait()
            .await
            .unwrap();
        first.shutdown();

        assert_eq!(storage.keys().await.unwrap(), vec!["app/state"]);

        // A new item over the same directory, an hour later
        clock.advance(Duration::from_secs(3600));
        let second = item(Arc::new(FileStorage::new(dir.path().join("store"))), clock);
        let report = second.init().await;

        assert_eq!(report.status, DocumentStatus::Loaded);
        assert_eq!(report.slices["settings"], SliceOutcomeKind::Valid);
        assert_eq!(report.slices["history"], SliceOutcomeKind::Valid);
        assert_eq!(
            second.collect(),
            slices(&[
                ("settings", json!({ "theme": "dark", "volume": 7 })),
                ("history", json!(["a", "b"])),
            ])
        );
    }

    #[tokio::test]
    async fn test_stale_temp_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));

        let writer = item(storage.clone(), ManualClock::new(NOW));
        writer
            .update(slices(&[("settings", json!(1))]))
            .wait()
            .await
            .unwrap();

        // Leftover from an interrupted write
        std::fs::write(dir.path().join("app%2Fstate.json.tmp"), "{\"v\":2,\"d\":{").unwrap();

        let reader = item(storage.clone(), ManualClock::new(NOW));
        assert_eq!(reader.init().await.status, DocumentStatus::Loaded);
        assert_eq!(reader.collect(), slices(&[("settings", json!(1))]));

        storage.clear().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_item_forgets_state() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));

        let writer = item(storage.clone(), ManualClock::new(NOW));
        writer
            .update(slices(&[("history", json!([]))]))
            .wait()
            .await
            .unwrap();

        storage.remove_item("app/state").await.unwrap();
        // Removing twice is fine
        storage.remove_item("app/state").await.unwrap();

        let reader = item(storage, ManualClock::new(NOW));
        assert_eq!(reader.init().await.status, DocumentStatus::Missing);
        assert!(reader.collect().is_empty());
    }

    #[tokio::test]
    async fn test_config_with_file_engine() {
        let dir = TempDir::new().unwrap();
        let yaml = format!(
            "key: prefs\nversion: 1\nengine:\n  type: file\n  path: {}\nslices:\n  - name: theme\n",
            dir.path().display()
        );
        let config = PersistConfig::from_yaml(&yaml).unwrap();

        let item = config.builder(config.open_engine()).build().unwrap();
        item.init().await;
        item.update(slices(&[("theme", json!("light"))]))
            .wait()
            .await
            .unwrap();

        let stored = FileStorage::new(dir.path())
            .get_item("prefs")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.starts_with(r#"{"v":1,"d":{"theme":"#));

        let reopened = config.builder(config.open_engine()).build().unwrap();
        reopened.init().await;
        assert_eq!(reopened.collect(), slices(&[("theme", json!("light"))]));
    }
}
