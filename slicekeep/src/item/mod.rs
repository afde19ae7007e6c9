//! Persist item: one storage key, many versioned slices
//!
//! Lifecycle:
//! 1. [`PersistItem::init`] reads and validates the stored document once
//! 2. [`PersistItem::collect`] hands the restored slices to the state container
//! 3. [`PersistItem::update`] buffers live slice values and schedules a
//!    debounced write of the complete document

use crate::SliceMap;
use crate::clock::{Clock, SystemClock};
use crate::document::{PersistDocument, SliceRecord, StoredDocument};
use crate::engine::StorageEngine;
use crate::error::{PersistError, Result};
use crate::scheduler::{WriteScheduler, WriteTicket};
use crate::slice::SliceDescriptor;
use crate::validate::{self, SliceOutcome, SliceOutcomeKind};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};


/// What `init()` found at the storage key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Nothing stored yet
    Missing,
    /// The engine failed to read
    Unreadable,
    /// Stored value is not a persist document
    Corrupt,
    /// Written under another document version, discarded whole
    VersionMismatch { stored: u32, expected: u32 },
    /// Document accepted; see per-slice outcomes
    Loaded,
}

/// Summary of one hydration pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    pub status: DocumentStatus,
    /// Outcome per registered slice (only when the document was loaded)
    pub slices: BTreeMap<String, SliceOutcomeKind>,
    /// Stored slices with no registration, dropped
    pub dropped: Vec<String>,
}

impl HydrationReport {
    fn document(status: DocumentStatus) -> Self {
        Self {
            status,
            slices: BTreeMap::new(),
            dropped: Vec::new(),
        }
    }

    /// Number of slices restored
    pub fn restored(&self) -> usize {
        self.slices
            .values()
            .filter(|kind| **kind == SliceOutcomeKind::Valid)
            .count()
    }
}

struct ItemInner {
    key: String,
    version: u32,
    slices: BTreeMap<String, SliceDescriptor>,
    max_age: Option<Duration>,
    debounce: Duration,
    engine: Arc<dyn StorageEngine>,
    clock: Arc<dyn Clock>,
    hydrated: RwLock<SliceMap>,
    /// Last written (or hydrated) record of every slice
    tracked: Mutex<BTreeMap<String, SliceRecord>>,
    scheduler: WriteScheduler,
    /// Serializes storage access: init's read and every flush's write
    io_lock: tokio::sync::Mutex<()>,
    report: OnceCell<HydrationReport>,
}

/// Persists a set of slices under one storage key
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PersistItem {
    inner: Arc<ItemInner>,
}

impl PersistItem {
    pub fn builder(key: impl Into<String>, engine: Arc<dyn StorageEngine>) -> PersistItemBuilder {
        PersistItemBuilder::new(key, engine)
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    /// Registered slice names, sorted
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.inner.slices.keys().map(String::as_str)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.slices.contains_key(name)
    }

    /// Read and validate the stored document
    ///
    /// Only the first call touches storage; later calls return the same
    /// report. A flush that runs first performs this read itself and `init()`
    /// returns its report. Never fails: unreadable, corrupt, stale or expired
    /// data all degrade to "not hydrated".
    pub async fn init(&self) -> HydrationReport {
        self.inner.ensure_hydrated().await.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.report.initialized()
    }

    /// Slices restored by `init()`
    pub fn collect(&self) -> SliceMap {
        self.inner.hydrated.read().clone()
    }

    /// Deserialize one restored slice into a concrete type
    pub fn collect_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let hydrated = self.inner.hydrated.read();
        let Some(value) = hydrated.get(name) else {
            return Ok(None);
        };

        T::deserialize(value)
            .map(Some)
            .map_err(|e| PersistError::Decode {
                slice: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Buffer current slice values and schedule a debounced write
    ///
    /// Slices missing from `slices` keep their stored record. Values for
    /// unregistered names are ignored; an update with nothing registered
    /// resolves at once without a write. Must be called inside a tokio runtime.
    pub fn update(&self, slices: SliceMap) -> WriteTicket {
        let slices: SliceMap = slices
            .into_iter()
            .filter(|(name, _)| {
                let registered = self.is_registered(name);
                if !registered {
                    debug!("Ignoring update for unregistered slice '{}'", name);
                }
                registered
            })
            .collect();

        if slices.is_empty() {
            if self.is_closed() {
                return WriteTicket::ready(Err(PersistError::Closed));
            }
            return WriteTicket::ready(Ok(()));
        }

        let scheduled = self.inner.scheduler.schedule(slices);
        if scheduled.armed {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_timer().await });
        }

        scheduled.ticket
    }

    /// Write pending updates now instead of waiting for the timer
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush_pending().await
    }

    pub fn is_pending(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// The document the next write would store (pending updates excluded)
    pub fn document(&self) -> PersistDocument {
        self.inner.document()
    }

    /// Stop scheduling writes
    ///
    /// Buffered updates whose timer has not fired are dropped and their
    /// tickets fail with [`PersistError::Closed`]. A write already handed to
    /// the engine completes.
    pub fn shutdown(&self) {
        if let Some(pending) = self.inner.scheduler.close() {
            debug!(
                "Discarding {} buffered slices for '{}' on shutdown",
                pending.buffer.len(),
                self.inner.key
            );
            pending.resolve(&Err(PersistError::Closed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.scheduler.is_closed()
    }
}

impl std::fmt::Debug for PersistItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistItem")
            .field("key", &self.inner.key)
            .field("version", &self.inner.version)
            .field("slices", &self.inner.slices.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ItemInner {
    fn effective_max_age(&self, descriptor: &SliceDescriptor) -> Option<Duration> {
        descriptor.max_age.or(self.max_age)
    }

    async fn ensure_hydrated(&self) -> &HydrationReport {
        self.report.get_or_init(|| self.hydrate()).await
    }

    async fn hydrate(&self) -> HydrationReport {
        let _io = self.io_lock.lock().await;

        let raw = match self.engine.get_item(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted state at '{}'", self.key);
                return HydrationReport::document(DocumentStatus::Missing);
            }
            Err(e) => {
                warn!("Failed to read persisted state at '{}': {}", self.key, e);
                return HydrationReport::document(DocumentStatus::Unreadable);
            }
        };

        let document = match StoredDocument::parse(&raw) {
            Ok(document) => document,
            Err(e) => {
                error!("Discarding persisted state at '{}': {}", self.key, e);
                return HydrationReport::document(DocumentStatus::Corrupt);
            }
        };

        if document.version != self.version {
            debug!(
                "Persist version changed at '{}' ({} -> {}), discarding",
                self.key, document.version, self.version
            );
            return HydrationReport::document(DocumentStatus::VersionMismatch {
                stored: document.version,
                expected: self.version,
            });
        }

        let now = self.clock.now_millis();
        let mut report = HydrationReport::document(DocumentStatus::Loaded);
        let mut hydrated = SliceMap::new();
        let mut restored = Vec::new();

        for (name, descriptor) in &self.slices {
            let (outcome, record) = match document.record(name).transpose() {
                Ok(record) => {
                    let max_age = self.effective_max_age(descriptor);
                    let outcome = validate::evaluate(descriptor, record.as_ref(), max_age, now);
                    (outcome, record)
                }
                Err(e) => (SliceOutcome::Corrupt(e), None),
            };
            report.slices.insert(name.clone(), outcome.kind());

            match (outcome, record) {
                (SliceOutcome::Valid(value), Some(record)) => {
                    hydrated.insert(name.clone(), value);
                    restored.push((name.clone(), record));
                }
                (SliceOutcome::Stale { stored, expected }, _) => {
                    debug!(
                        "Slice '{}' written with version {}, expected {}",
                        name, stored, expected
                    );
                }
                (SliceOutcome::Expired { age_millis, max_age_millis }, _) => {
                    debug!(
                        "Slice '{}' expired ({}ms old, max {}ms)",
                        name, age_millis, max_age_millis
                    );
                }
                (SliceOutcome::Corrupt(e), _) => error!("{}", e),
                _ => {}
            }
        }

        for name in document.names() {
            if !self.slices.contains_key(name) {
                debug!("Dropping unregistered slice '{}' from '{}'", name, self.key);
                report.dropped.push(name.to_string());
            }
        }

        *self.hydrated.write() = hydrated;

        let mut tracked = self.tracked.lock();
        for (name, record) in restored {
            tracked.entry(name).or_insert(record);
        }
        drop(tracked);

        info!(
            "Hydrated {}/{} slices from '{}'",
            report.restored(),
            self.slices.len(),
            self.key
        );

        report
    }

    async fn run_timer(self: Arc<Self>) {
        let mut closed = self.scheduler.closed_signal();

        tokio::select! {
            _ = tokio::time::sleep(self.debounce) => {}
            // Shutdown already resolved the buffered tickets
            _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => return,
        }

        // Failures reach the tickets; nothing to do with them here
        let _ = self.flush_pending().await;
    }

    async fn flush_pending(&self) -> Result<()> {
        if !self.scheduler.is_pending() {
            return Ok(());
        }

        // Stored records of slices not in the buffer must be carried forward
        self.ensure_hydrated().await;
        let _io = self.io_lock.lock().await;

        let Some(mut pending) = self.scheduler.take() else {
            return Ok(());
        };

        let result = self.write(std::mem::take(&mut pending.buffer)).await;
        let observed = pending.resolve(&result);

        match &result {
            Ok(()) => debug!("Flushed '{}' ({} waiting updates)", self.key, observed),
            Err(e) if observed == 0 => error!("Failed to persist '{}': {}", self.key, e),
            Err(e) => debug!("Failed to persist '{}': {}", self.key, e),
        }

        result
    }

    /// Refresh tracked records from `buffer` and store the full document
    async fn write(&self, buffer: SliceMap) -> Result<()> {
        let raw = {
            let now = self.clock.now_millis();
            let mut tracked = self.tracked.lock();

            for (name, value) in buffer {
                let Some(descriptor) = self.slices.get(&name) else {
                    continue;
                };

                let payload = match descriptor.encode(&value) {
                    Ok(payload) => payload,
                    Err(e) => {
                        let e = PersistError::Encode {
                            slice: name,
                            reason: e.to_string(),
                        };
                        error!("{}", e);
                        continue;
                    }
                };

                // Same bytes, same schema, still fresh: keep the old timestamp
                if let Some(existing) = tracked.get(&name) {
                    let expired =
                        validate::is_expired(existing, self.effective_max_age(descriptor), now);
                    if existing.payload == payload
                        && existing.version == descriptor.version
                        && !expired
                    {
                        continue;
                    }
                }

                tracked.insert(name, SliceRecord::new(now, descriptor.version, payload));
            }

            Self::assemble(self.version, &tracked).to_json()?
        };

        self.engine.set_item(&self.key, &raw).await
    }

    fn document(&self) -> PersistDocument {
        Self::assemble(self.version, &self.tracked.lock())
    }

    fn assemble(version: u32, tracked: &BTreeMap<String, SliceRecord>) -> PersistDocument {
        let mut document = PersistDocument::new(version);
        for (name, record) in tracked {
            document.insert(name.clone(), record.clone());
        }
        document
    }
}

/// Builder for [`PersistItem`]
pub struct PersistItemBuilder {
    key: String,
    engine: Arc<dyn StorageEngine>,
    version: u32,
    slices: Vec<SliceDescriptor>,
    max_age: Option<Duration>,
    debounce: Duration,
    clock: Arc<dyn Clock>,
}

impl PersistItemBuilder {
    pub fn new(key: impl Into<String>, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            key: key.into(),
            engine,
            version: 0,
            slices: Vec::new(),
            max_age: None,
            debounce: Duration::ZERO,
            clock: Arc::new(SystemClock),
        }
    }

    /// Top-level document version; changing it invalidates stored data
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn slice(mut self, slice: SliceDescriptor) -> Self {
        self.slices.push(slice);
        self
    }

    pub fn slices(mut self, slices: impl IntoIterator<Item = SliceDescriptor>) -> Self {
        self.slices.extend(slices);
        self
    }

    /// Default expiry for slices without their own
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Fixed trailing write window
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<PersistItem> {
        if self.key.is_empty() {
            return Err(PersistError::InvalidConfig(
                "storage key must not be empty".to_string(),
            ));
        }

        let mut slices = BTreeMap::new();
        for slice in self.slices {
            if slices.contains_key(&slice.name) {
                return Err(PersistError::DuplicateSlice(slice.name));
            }
            slices.insert(slice.name.clone(), slice);
        }

        Ok(PersistItem {
            inner: Arc::new(ItemInner {
                key: self.key,
                version: self.version,
                slices,
                max_age: self.max_age,
                debounce: self.debounce,
                engine: self.engine,
                clock: self.clock,
                hydrated: RwLock::new(SliceMap::new()),
                tracked: Mutex::new(BTreeMap::new()),
                scheduler: WriteScheduler::new(),
                io_lock: tokio::sync::Mutex::new(()),
                report: OnceCell::new(),
            }),
        })
    }
}
