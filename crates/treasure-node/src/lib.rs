//! Treasure Node - Process host for Treasure Hunt
//!
//! Wires `treasure-core` into one running server process: configuration,
//! the shared SQLite store, selection sessions for placing markers, and
//! interaction dispatch that turns block use into creation or claims.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     Treasure Node                      │
//! ├────────────────────────────────────────────────────────┤
//! │  block use / disconnect         operator commands      │
//! │          │                              │              │
//! │  ┌───────▼────────────┐     ┌───────────▼──────────┐   │
//! │  │ InteractionHandler │────▶│   SelectionTracker   │   │
//! │  └───────┬────────────┘     └──────────────────────┘   │
//! │          │                                             │
//! │  ┌───────▼────────┐    ┌────────────┐                  │
//! │  │ MarkerService  │◀───│ Reconciler │  every N seconds │
//! │  └───────┬────────┘    └─────┬──────┘                  │
//! │          └──────────┬────────┘                         │
//! │              ┌──────▼──────┐                           │
//! │              │ SqliteStore │  shared with other nodes  │
//! │              └─────────────┘                           │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod interaction;
pub mod node;
pub mod selection;

pub use config::{NodeConfig, NodeSettings};
pub use error::{NodeError, Result};
pub use interaction::{ActionExecutor, InteractionHandler, InteractionOutcome, LoggingExecutor};
pub use node::Node;
pub use selection::{SelectionExpired, SelectionSession, SelectionTracker};

/// Node version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "treasure-node.toml";
