//! Pagination state and page-merge helpers.
//!
//! Two modes share one controller:
//! - Paged: each page change replaces the data wholesale; `has_next` comes
//!   from the `totalPages` field of the last response.
//! - Infinite scroll: `load_more` appends the new page's items at the tail;
//!   the end of data is signalled by the first page shorter than the
//!   configured page size, never by a server-side total.

use serde_json::Value;

/// Pagination settings of a query. Presence of this config enables
/// pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
  pub initial_page: u64,
  pub page_size: usize,
  pub infinite_scroll: bool,
}

impl PaginationConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append-only accumulation instead of page replacement.
  pub fn infinite(mut self) -> Self {
    self.infinite_scroll = true;
    self
  }

  pub fn with_initial_page(mut self, initial_page: u64) -> Self {
    self.initial_page = initial_page.max(1);
    self
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      initial_page: 1,
      page_size: 10,
      infinite_scroll: false,
    }
  }
}

/// Live pagination state of one subscription.
#[derive(Debug, Clone)]
pub(crate) struct Paginator {
  pub page: u64,
  pub page_size: usize,
  pub infinite_scroll: bool,
  /// Whether another page may exist (infinite scroll only)
  pub has_more: bool,
  pub is_fetching_more: bool,
  /// `totalPages` from the most recent response (paged mode only)
  pub total_pages: Option<u64>,
}

impl Paginator {
  pub fn new(config: &PaginationConfig) -> Self {
    Self {
      page: config.initial_page.max(1),
      page_size: config.page_size,
      infinite_scroll: config.infinite_scroll,
      has_more: true,
      is_fetching_more: false,
      total_pages: None,
    }
  }

  pub fn has_next(&self) -> bool {
    self.total_pages.is_some_and(|total| total > self.page)
  }

  pub fn has_previous(&self) -> bool {
    self.page > 1
  }
}

/// Number of items in a page body's `data` array.
pub(crate) fn page_len(value: &Value) -> Option<usize> {
  value.get("data")?.as_array().map(|items| items.len())
}

/// `totalPages` as reported by a paginated response body.
pub(crate) fn total_pages(value: &Value) -> Option<u64> {
  value.get("totalPages")?.as_u64()
}

/// Merge a newly fetched page onto the accumulated body.
///
/// The new page wins every field; the `data` arrays are concatenated with
/// the previous items first, so fetch order is preserved and new items land
/// at the tail.
pub(crate) fn merge_pages(previous: &Value, next: &Value) -> Value {
  let mut merged = next.clone();

  let prev_items = previous.get("data").and_then(Value::as_array);
  let next_items = next.get("data").and_then(Value::as_array);

  if let (Some(prev_items), Some(next_items)) = (prev_items, next_items) {
    let mut combined = prev_items.clone();
    combined.extend(next_items.iter().cloned());
    merged["data"] = Value::Array(combined);
  }

  merged
}
