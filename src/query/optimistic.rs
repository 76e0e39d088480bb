//! Optimistic mutation support: projections and rollback snapshots.

use std::sync::Arc;

use serde_json::Value;

/// Computes the projected result of a mutation from the current data and the
/// mutation payload, before the network call resolves.
pub type UpdateFn<T> = Arc<dyn Fn(Option<&T>, Option<&Value>) -> T + Send + Sync>;

/// Optimistic update settings of a query. Presence of this config enables
/// the optimistic path on `mutate`.
#[derive(Clone)]
pub struct OptimisticConfig<T> {
  pub update_data: UpdateFn<T>,
  /// Restore the pre-mutation snapshot when the mutation fails
  pub rollback_on_error: bool,
}

impl<T> OptimisticConfig<T> {
  pub fn new<F>(update_data: F) -> Self
  where
    F: Fn(Option<&T>, Option<&Value>) -> T + Send + Sync + 'static,
  {
    Self {
      update_data: Arc::new(update_data),
      rollback_on_error: false,
    }
  }

  pub fn with_rollback(mut self, rollback_on_error: bool) -> Self {
    self.rollback_on_error = rollback_on_error;
    self
  }
}

impl<T> std::fmt::Debug for OptimisticConfig<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OptimisticConfig")
      .field("rollback_on_error", &self.rollback_on_error)
      .finish_non_exhaustive()
  }
}

/// The data value captured immediately before a projection is applied.
///
/// Held until the write settles: taken back for rollback on failure,
/// discarded on success.
#[derive(Debug)]
pub(crate) struct Snapshot<T> {
  previous: Option<Option<T>>,
}

// Not derived: T need not be Default for an empty snapshot
impl<T> Default for Snapshot<T> {
  fn default() -> Self {
    Self { previous: None }
  }
}

impl<T: Clone> Snapshot<T> {
  pub fn capture(&mut self, current: &Option<T>) {
    self.previous = Some(current.clone());
  }

  /// The captured value, for restoring on a failed write.
  pub fn take(&mut self) -> Option<Option<T>> {
    self.previous.take()
  }

  pub fn discard(&mut self) {
    self.previous = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_snapshot_roundtrip() {
    let mut snapshot: Snapshot<u32> = Snapshot::default();
    snapshot.capture(&Some(5));
    assert_eq!(snapshot.take(), Some(Some(5)));
    // Taken once; nothing left to roll back to
    assert_eq!(snapshot.take(), None);
  }

  #[test]
  fn test_snapshot_captures_absence() {
    let mut snapshot: Snapshot<u32> = Snapshot::default();
    snapshot.capture(&None);
    // Rolling back to "no data yet" is a valid restore
    assert_eq!(snapshot.take(), Some(None));
  }

  #[test]
  fn test_discard() {
    let mut snapshot: Snapshot<u32> = Snapshot::default();
    snapshot.capture(&Some(1));
    snapshot.discard();
    assert_eq!(snapshot.take(), None);
  }
}
