//! The transport layer: everything that actually touches HTTP.
//!
//! The fetch controller only ever talks to the [`Transport`] trait, which
//! returns parsed JSON bodies or normalized [`ApiError`](crate::error::ApiError)s.
//! [`HttpTransport`] is the production implementation over reqwest; tests
//! substitute a scripted mock.

mod client;
mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{HttpTransport, Transport};
pub use types::{ApiResponse, Method, PaginatedResponse};
