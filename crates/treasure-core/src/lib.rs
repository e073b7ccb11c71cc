//! Treasure Core - Shared reward markers with at-most-once claims
//!
//! Treasure Core keeps a fast in-process index of reward markers consistent
//! with one persistent store shared by many server processes, and grants each
//! marker's reward to a given actor at most once, even when two processes
//! race to grant it.
//!
//! # Architecture
//!
//! ```text
//! interaction / command
//!        │
//!        ▼
//! ┌──────────────┐   put/remove   ┌──────────────┐
//! │ MarkerService│───────────────▶│ RewardCache  │◀──── Reconciler (every N s)
//! └──────┬───────┘                └──────────────┘            │
//!        │ claim                                               │ load_all
//!        ▼                                                     │
//! ┌────────────────┐  has/insert  ┌──────────────┐            │
//! │ClaimCoordinator│─────────────▶│ StoreHandle  │◀───────────┘
//! └────────────────┘              └──────┬───────┘
//!                                        ▼
//!                                dyn MarkerStore (SQLite, shared)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use treasure_core::store::{SqliteStore, StoreHandle, StoreSettings};
//! use treasure_core::{Actor, BlockLocation, ClaimCoordinator, MarkerService, RewardCache};
//!
//! # async fn example() -> treasure_core::Result<()> {
//! let settings = StoreSettings::default();
//! let store = StoreHandle::from_settings(Arc::new(SqliteStore::open(&settings)?), &settings);
//! let service = MarkerService::new(
//!     Arc::new(RewardCache::new()),
//!     store.clone(),
//!     ClaimCoordinator::new(store),
//! );
//! service.load().await?;
//!
//! let gold = service
//!     .create("gold1", BlockLocation::new("overworld", 10, 64, -5), "give %player% gold")
//!     .await?;
//! let outcome = service.claim(&Actor::new("u1", "Steve"), &gold).await;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod cache;
pub mod claims;
pub mod error;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod task;
pub mod types;

// Re-export commonly used types
pub use cache::RewardCache;
pub use claims::{ClaimCoordinator, ClaimOutcome};
pub use error::{Result, ResultExt, TreasureError};
pub use reconcile::{sync_interval, CacheEvent, ReconcileReport, Reconciler};
pub use service::MarkerService;
pub use store::{MarkerStore, StoreHandle};
pub use task::PeriodicTask;
pub use types::{Actor, ActorId, BlockLocation, ClaimEntry, Marker, Timestamp};

/// Version of Treasure Core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
