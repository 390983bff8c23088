//! Reverse proxy for a single fixed upstream origin.
//!
//! Forwards requests with header and body translation, caches pages on
//! disk, rewrites links for browsing and reports the structure of the
//! origin's pages.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
