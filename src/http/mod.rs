//! HTTP front subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → server.rs (Axum setup, middleware)
//!     → handlers.rs (route dispatch)
//!     → request.rs (translate to an upstream call)
//!     → [upstream client, or cache hit for /fetch]
//!     → response.rs (strip framing headers, static cache header)
//!     → rewrite.rs (/view only: point links back at the proxy)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod rewrite;
pub mod server;

pub use error::{ErrorCode, ProxyError};
pub use request::{translate, BodyMode, InboundRequest, TranslateError};
pub use response::ProxyResponse;
pub use server::{AppState, HttpServer};
