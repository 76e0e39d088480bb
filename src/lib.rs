//! Declarative async API fetching, inspired by TanStack Query.
//!
//! The central type is [`Query<T>`](query::Query): a per-subscription fetch
//! controller that turns a [`QueryOptions`](query::QueryOptions) description
//! into managed state, layering response caching, request deduplication,
//! retry, pagination, and optimistic mutation on top of a single logical
//! request.
//!
//! Shared machinery (the response cache and the in-flight registry) lives in
//! an explicitly constructed [`QueryClient`](client::QueryClient); the actual
//! HTTP work goes through the [`Transport`](api::Transport) trait, implemented
//! for production by [`HttpTransport`](api::HttpTransport).
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(QueryClientConfig::default());
//! let transport = Arc::new(HttpTransport::new(ApiConfig::from_env())?);
//!
//! let mut query: Query<PaginatedResponse<Item>> = Query::new(
//!   client.clone(),
//!   transport,
//!   QueryOptions::get("/items").with_stale_time(Duration::from_secs(30)),
//! );
//!
//! // Start fetching
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!   // State changed, trigger re-render
//! }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod query;

pub use api::{ApiResponse, HttpTransport, PaginatedResponse, Transport};
pub use client::{QueryClient, QueryClientConfig};
pub use config::ApiConfig;
pub use error::{ApiError, FieldError};
pub use event::ApiEvent;
pub use query::{
  Method, OptimisticConfig, PaginationConfig, Query, QueryOptions, QueryState, RetryPolicy,
};
