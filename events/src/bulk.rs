//! Partial-failure bulk execution
//!
//! One generic walker serves every bulk endpoint: each target id is
//! attempted independently, failures are captured per item, and a single
//! bad id never aborts the batch. Only an empty id list is rejected
//! upfront, before any item runs.

use serde::Serialize;
use tracing::debug;

use crate::error::{EventError, Result};

/// A single failed item in a bulk operation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailure {
    /// The target id that failed
    pub id: String,
    /// Human-readable reason
    pub reason: String,
}

/// Outcome of a bulk operation: disjoint success and failure lists, in
/// input order. An id never appears in both.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BulkFailure>,
}

impl<T> BulkOutcome<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            succeeded: Vec::with_capacity(capacity),
            failed: Vec::new(),
        }
    }

    /// Check if all items were processed successfully
    pub fn all_successful(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply `op` to each target id independently.
///
/// Per-item errors are recovered into the failure list with the item's
/// id and the error's display form; successes carry the post-mutation
/// value. Items are processed sequentially, in input order.
pub async fn apply_bulk<T, F, Fut>(target_ids: &[String], op: F) -> Result<BulkOutcome<T>>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    if target_ids.is_empty() {
        return Err(EventError::Validation(
            "target id list must not be empty".to_string(),
        ));
    }

    let mut outcome = BulkOutcome::with_capacity(target_ids.len());

    for id in target_ids {
        match op(id.clone()).await {
            Ok(value) => outcome.succeeded.push(value),
            Err(e) => outcome.failed.push(BulkFailure {
                id: id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    debug!(
        "Bulk operation finished: {} succeeded, {} failed",
        outcome.succeeded.len(),
        outcome.failed.len()
    );

    Ok(outcome)
}
