// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::operation::OperationView;

/// Lifecycle of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    /// No resource has answered yet and resources or outstanding attempts remain.
    Pending,
    /// A resource answered successfully.
    Completed,
    /// Every resource was exhausted, or the query was aborted.
    Failed,
}

impl QueryState {
    /// Returns `true` once the query can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Point-in-time view of a query.
///
/// Snapshots are immutable. Take a new one through [`QueryTracker::status`] or
/// [`Query::status`][crate::Query::status] to observe progress.
///
/// The counters always satisfy `queries_pending <= queries_sent <= resources.len()`.
#[derive(Debug)]
pub struct QueryStatus<P> {
    pub(crate) state: QueryState,
    pub(crate) payload: Arc<P>,
    pub(crate) queries_sent: usize,
    pub(crate) queries_pending: usize,
}

impl<P> QueryStatus<P> {
    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Returns the payload the query was dispatched with.
    #[must_use]
    pub fn payload(&self) -> &Arc<P> {
        &self.payload
    }

    /// Returns how many attempts have been sent so far.
    #[must_use]
    pub fn queries_sent(&self) -> usize {
        self.queries_sent
    }

    /// Returns how many sent attempts have not resolved yet.
    #[must_use]
    pub fn queries_pending(&self) -> usize {
        self.queries_pending
    }
}

impl<P> Clone for QueryStatus<P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            payload: Arc::clone(&self.payload),
            queries_sent: self.queries_sent,
            queries_pending: self.queries_pending,
        }
    }
}

/// Cloneable accessor for the status of a single query.
///
/// A tracker stays valid after the [`Query`][crate::Query] it came from has been awaited,
/// and is also handed to transports through [`Attempt::tracker`][crate::Attempt::tracker].
pub struct QueryTracker<P> {
    pub(crate) operation: Arc<dyn OperationView<P>>,
}

impl<P> QueryTracker<P> {
    /// Returns a snapshot of the query status.
    ///
    /// Never blocks on I/O and has no side effects.
    #[must_use]
    pub fn status(&self) -> QueryStatus<P> {
        self.operation.status()
    }

    /// Aborts the query if it is still pending.
    ///
    /// Every outstanding attempt is cancelled and the query resolves with
    /// [`QueryError::Aborted`][crate::QueryError::Aborted]. Has no effect on a query that
    /// already completed or failed.
    pub fn abort(&self) {
        self.operation.abort();
    }

    /// Returns `true` if both trackers observe the same query.
    #[must_use]
    pub fn same_query(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.operation, &other.operation)
    }
}

impl<P> Clone for QueryTracker<P> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<P> Debug for QueryTracker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTracker").finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!QueryState::Pending.is_terminal());
        assert!(QueryState::Completed.is_terminal());
        assert!(QueryState::Failed.is_terminal());
    }

    #[test]
    fn status_accessors() {
        let status = QueryStatus {
            state: QueryState::Pending,
            payload: Arc::new("payload"),
            queries_sent: 2,
            queries_pending: 1,
        };
        let copy = status.clone();

        assert_eq!(copy.state(), QueryState::Pending);
        assert_eq!(**copy.payload(), "payload");
        assert!(Arc::ptr_eq(copy.payload(), status.payload()));
        assert_eq!(copy.queries_sent(), 2);
        assert_eq!(copy.queries_pending(), 1);
    }
}
