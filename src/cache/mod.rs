//! Page cache subsystem.
//!
//! # Data Flow
//! ```text
//! /fetch handler
//!     → store.rs lookup (fresh entry? return it)
//!     → upstream fetch on miss or refresh
//!     → store.rs store (best effort; failure logged by caller)
//! ```
//!
//! # Design Decisions
//! - Key is a pure function of the resolved URL, so only idempotent GETs
//!   are ever cached
//! - Reads fail open; cache problems only ever cost a re-fetch
//! - No locking: last writer wins

pub mod store;

pub use store::{CacheEntry, CacheError, CacheStore};
