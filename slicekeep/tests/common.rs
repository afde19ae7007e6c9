//! Shared helpers for slicekeep integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use slicekeep::{MemoryStorage, PersistDocument, PersistError, SliceMap, SliceRecord, StorageEngine};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const NOW: u64 = 1_700_000_000_000;

/// Route library logs to the test harness (`RUST_LOG=slicekeep=debug`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Memory storage that counts writes and can be told to fail or stall
#[derive(Default)]
pub struct TestStorage {
    inner: MemoryStorage,
    writes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
}

impl TestStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// Store a document without counting it as a write
    pub async fn seed(&self, key: &str, doc: &PersistDocument) {
        seed(&self.inner, key, doc).await;
    }

    pub async fn raw(&self, key: &str) -> Option<String> {
        self.inner.get_item(key).await.unwrap()
    }

    /// Stored document, parsed
    pub async fn document(&self, key: &str) -> Option<PersistDocument> {
        let raw = self.inner.get_item(key).await.unwrap()?;
        Some(PersistDocument::parse(&raw).unwrap())
    }
}

#[async_trait]
impl StorageEngine for TestStorage {
    async fn get_item(&self, key: &str) -> slicekeep::Result<Option<String>> {
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistError::Storage("read refused".to_string()));
        }
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> slicekeep::Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(PersistError::Storage("write refused".to_string()))
        } else {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_item(key, value).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn remove_item(&self, key: &str) -> slicekeep::Result<()> {
        self.inner.remove_item(key).await
    }

    async fn clear(&self) -> slicekeep::Result<()> {
        self.inner.clear().await
    }
}

pub fn slices(pairs: &[(&str, Value)]) -> SliceMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Document with one JSON-encoded record per `(name, version, age, state)`
pub fn document(version: u32, records: &[(&str, u32, u64, Value)]) -> PersistDocument {
    let mut doc = PersistDocument::new(version);
    for (name, slice_version, age, state) in records {
        doc.insert(
            *name,
            SliceRecord::new(NOW - age, *slice_version, state.to_string()),
        );
    }
    doc
}

pub async fn seed(storage: &dyn StorageEngine, key: &str, doc: &PersistDocument) {
    storage.set_item(key, &doc.to_json().unwrap()).await.unwrap();
}
