//! Upstream origin subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamConfig
//!     → target.rs (ProxyTarget: base URL, fixed headers, timeout, redirects, TLS flag)
//!     → client.rs (lazily built pooled reqwest client, one per process)
//!     → types.rs (ProxyRequest in, UpstreamResponse / UpstreamError out)
//! ```
//!
//! # Design Decisions
//! - One client owned by the server state and injected where needed
//! - Every network-level failure becomes `UpstreamError::Unreachable`
//! - No retries: a failed call is reported once, immediately

pub mod client;
pub mod target;
pub mod types;

pub use client::UpstreamClient;
pub use target::ProxyTarget;
pub use types::{
    FailureKind, ProxyBody, ProxyRequest, UpstreamError, UpstreamResponse, UpstreamResult,
};
