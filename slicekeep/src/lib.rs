//! # slicekeep
//!
//! Versioned, debounced persistence of application state slices.
//!
//! A [`PersistItem`] owns one storage key. Several independently versioned
//! slices are bundled into a single stored [`PersistDocument`], restored
//! selectively on startup and written back with a bounded write frequency.
//!
//! ## Features
//!
//! - **Selective hydration**: stale, expired or corrupt slices are dropped
//!   one by one, siblings survive
//! - **Document gate**: bumping the top-level version invalidates everything
//! - **Debounced writes**: rapid updates coalesce into one `set_item`
//! - **Pluggable storage**: any async `get/set/remove/clear` backend
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use slicekeep::{MemoryStorage, PersistItem, SliceDescriptor, SliceMap};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let item = PersistItem::builder("app-state", Arc::new(MemoryStorage::new()))
//!         .version(1)
//!         .slice(SliceDescriptor::new("counter"))
//!         .build()?;
//!
//!     item.init().await;
//!     let restored = item.collect();
//!     println!("restored: {:?}", restored);
//!
//!     let mut slices = SliceMap::new();
//!     slices.insert("counter".to_string(), json!({ "count": 15 }));
//!     item.update(slices).wait().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod item;
pub mod manager;
pub mod scheduler;
pub mod slice;
pub mod validate;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{JsonCodec, SliceCodec, SliceDecoder};
pub use config::{EngineConfig, PersistConfig, SliceConfig};
pub use document::{PersistDocument, SliceRecord, StoredDocument};
pub use engine::{FileStorage, MemoryStorage, StorageEngine};
pub use error::{PersistError, Result};
pub use item::{DocumentStatus, HydrationReport, PersistItem, PersistItemBuilder};
pub use manager::PersistManager;
pub use scheduler::WriteTicket;
pub use slice::SliceDescriptor;
pub use validate::{SliceOutcome, SliceOutcomeKind};

/// Slice name to slice state, as exchanged with the state container
pub type SliceMap = std::collections::HashMap<String, serde_json::Value>;
