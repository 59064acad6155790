//! # Restkit Core
//!
//! Typed runtime behind generated REST API clients.
//!
//! ## Overview
//!
//! Generated code describes each HTTP endpoint once, as an
//! [`OperationDescriptor`], and groups them in a [`ResourceNamespace`]. This
//! crate does everything else:
//!
//! - **Dispatch** of positional or options-object call arguments
//! - **Transport** over a swappable [`HttpClient`] (reqwest by default)
//! - **Schema validation** that collects every field-level issue
//! - **Query caching** with in-flight deduplication and typed invalidation
//! - **Pagination envelope** decoding shared by all list endpoints
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`args`] | Call-argument normalization |
//! | [`cache`] | Query cache, cache keys and hook handles |
//! | [`client`] | API client and the process-wide default |
//! | [`config`] | Client configuration and per-call options |
//! | [`diagnostics`] | Validation failure sinks |
//! | [`error`] | Error taxonomy |
//! | [`fetcher`] | Validated operation entry points |
//! | [`http_client`] | HTTP client abstraction |
//! | [`namespace`] | Resource namespaces and prepared calls |
//! | [`operation`] | Operation descriptors and invalidation targets |
//! | [`pagination`] | Pagination envelope |
//! | [`retry`] | Retry policy |
//! | [`schema`] | Runtime schema validation |
//! | [`throttling`] | Client-side rate limiting |
//! | [`transport`] | HTTP dispatch |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restkit_core::{
//!     configure, ClientConfig, Field, HttpMethod, OperationDescriptor, ParamSpec,
//!     ResourceNamespace, Shape,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     configure(ClientConfig::new("http://127.0.0.1:8000")?);
//!
//!     let products = ResourceNamespace::new("products").operation(
//!         OperationDescriptor::new("products", "list", HttpMethod::Get, "/shop/products/")
//!             .param(ParamSpec::query("page", Shape::integer().min(1.0)))
//!             .paginated(Shape::object([Field::required("id", Shape::integer())])),
//!     );
//!
//!     let page = products.fetcher("list")?.fetch(json!({"page": 2}), None).await?;
//!     println!("{}", page["count"]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ QueryHandle     │  subscribe / load / revalidate / mutate
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fetcher         │────▶│ QueryCache       │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ PreparedCall    │────▶│ Transport        │
//! │ (args, path)    │     │ retry / throttle │
//! └─────────────────┘     └────────┬─────────┘
//!          │                       ▼
//!          ▼              ┌──────────────────┐
//! ┌─────────────────┐     │ HttpClient       │
//! │ Schema / Page   │     │ (reqwest/record) │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every fallible entry point returns [`ApiError`]:
//!
//! ```rust
//! use restkit_core::{ApiError, ErrorKind};
//!
//! fn handle_error(error: &ApiError) {
//!     match error.kind() {
//!         ErrorKind::Transport => {
//!             // Network failure, non-2xx status or timeout
//!         }
//!         ErrorKind::Validation => {
//!             // Response did not match the declared shape
//!         }
//!         ErrorKind::Argument | ErrorKind::Config => {
//!             // Caller bug
//!         }
//!     }
//! }
//! ```

pub mod args;
pub mod cache;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod namespace;
pub mod operation;
pub mod pagination;
pub mod retry;
pub mod schema;
pub mod throttling;
pub mod transport;

// Call arguments
pub use args::{normalize, CallArgs, ParamMap};

// Caching and hooks
pub use cache::{CacheKey, QueryCache, QueryHandle, QueryState, QueryStatus, Subscription};

// Clients
pub use client::{
    configure, default_client, reset_default_client, resolve_client, set_default_client,
    ApiClient,
};

// Configuration
pub use config::{CallOptions, ClientConfig};

// Diagnostics
pub use diagnostics::{CollectingSink, DiagnosticSink, NoopSink, TracingSink, ValidationDiagnostic};

// Error types
pub use error::{
    ApiError, ArgumentError, ConfigError, ErrorKind, OperationMeta, PathSegment, TransportError,
    TransportErrorKind, ValidationError, ValidationIssue,
};

// Fetchers
pub use fetcher::Fetcher;

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    RecordingHttpClient, ReqwestHttpClient,
};

// Namespaces
pub use namespace::{PreparedCall, ResourceNamespace};

// Operation descriptors
pub use operation::{
    InvalidationTarget, OperationDescriptor, OperationKind, ParamLocation, ParamMatch, ParamSpec,
};

// Pagination
pub use pagination::{envelope_shape, Page};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Schema validation
pub use schema::{Field, Shape};

// Throttling
pub use throttling::{RateLimit, Throttle};

// Transport
pub use transport::{SendOptions, Transport};
