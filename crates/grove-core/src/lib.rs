//! # grove-core
//!
//! Persistent, hierarchical long-term memory engine for AI agents.
//!
//! Each agent owns a single file-backed [`storage::Store`] of *entries*
//! organized as forests of labelled trees. The engine covers:
//!
//! - The on-disk relational schema and its migrations ([`storage`]).
//! - Identifier assignment and the tab-indented tree parser ([`tree`]).
//! - The bulk-read selector: grouping, scoring, slot allocation, link
//!   resolution, obsolete/irrelevant filtering ([`selector`]).
//! - The session cache, with Fibonacci-decay suppression and slot
//!   budgeting ([`session_cache`]).
//! - Obsolete-chain resolution, bidirectional auto-linking, access-count
//!   transfer ([`obsolete`]).
//! - Time-weighted access scoring ([`scoring`]).
//! - Role-gated filtering for a shared knowledge store ([`role`]).
//! - Markdown/native export and import with ID remapping ([`exchange`]).
//!
//! The JSON-RPC tool surface, CLI parsing, and process wiring live in the
//! separate `grove-mcp` adapter crate; this crate has no transport
//! dependencies and exposes only synchronous, blocking calls.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use grove_core::{Config, Role, Store, WriteInput};
//!
//! let store = Store::open(None, Config::default())?;
//! let (id, _created_at) = store.write(
//!     WriteInput {
//!         prefix: "L".to_string(),
//!         content: "Always restart the server after rebuilding\n\tHolds stale artifacts".to_string(),
//!         links: vec![],
//!         min_role: None,
//!         favorite: false,
//!         pinned: false,
//!         active: true,
//!         secret: false,
//!         tags: vec![],
//!     },
//!     Role::Al,
//! )?;
//! println!("wrote {id}");
//! # Ok::<(), grove_core::StoreError>(())
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod exchange;
pub mod obsolete;
pub mod role;
pub mod scoring;
pub mod selector;
pub mod session_cache;
pub mod storage;
pub mod tree;

pub use config::{BulkReadV2Config, Config};
pub use entry::{
    child_id, depth_of, format_root_id, header_id, is_root_id, parent_id_of, parse_root_id,
    root_id_of, seq_of, Entry, EntryView, LinkedEntry, Node, NodeView, Promotion, ReadOptions,
    RootView, UpdateInput, WriteInput,
};
pub use error::{Result, StoreError};
pub use obsolete::{extract_correction_ref, resolve, ObsoleteResolution};
pub use role::Role;
pub use scoring::{effective_date, time_weighted_score};
pub use selector::{plan_bulk_read, BulkReadPlan, PrefixGroup};
pub use session_cache::{Mode, SessionCache};
pub use storage::{
    AuditRecord, BulkReadGroup, BulkReadResult, CompactRoot, HotNode, IdReadResult, ImportReport,
    Stats, Store,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Config, Entry, EntryView, Node, ReadOptions, Role, SessionCache, Store, StoreError,
        UpdateInput, WriteInput,
    };
}
