// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::operation::Outcome;
use crate::{QueryError, QueryStatus, QueryTracker};

/// Handle to one dispatched query.
///
/// Await the query to receive its single outcome: the data of the first resource that
/// answered, or a [`QueryError`] once every resource was exhausted or the query was aborted.
///
/// The query keeps running when this handle is dropped. Call [`abort`][Query::abort] to stop
/// it early.
#[must_use = "a query does nothing useful unless its outcome is awaited or its status observed"]
pub struct Query<P, T, E> {
    receiver: oneshot::Receiver<Outcome<T, E>>,
    tracker: QueryTracker<P>,
}

impl<P, T, E> Query<P, T, E> {
    pub(crate) fn new(receiver: oneshot::Receiver<Outcome<T, E>>, tracker: QueryTracker<P>) -> Self {
        Self { receiver, tracker }
    }

    /// Returns a snapshot of the query status.
    ///
    /// On a current-thread runtime, a query observed right after
    /// [`dispatch`][crate::Failover::dispatch] returns, before the caller yields, is pending with
    /// no attempt sent yet. On a multi-thread runtime the first attempt may already be out.
    #[must_use]
    pub fn status(&self) -> QueryStatus<P> {
        self.tracker.status()
    }

    /// Returns a cloneable tracker that outlives this handle.
    #[must_use]
    pub fn tracker(&self) -> QueryTracker<P> {
        self.tracker.clone()
    }

    /// Aborts the query if it is still pending.
    ///
    /// The query then resolves to [`QueryError::Aborted`].
    pub fn abort(&self) {
        self.tracker.abort();
    }
}

impl<P, T, E> Future for Query<P, T, E> {
    type Output = Result<T, QueryError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender only goes away without an outcome if the runtime dropped the driver.
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(QueryError::Aborted)))
    }
}

impl<P, T, E> Debug for Query<P, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("state", &self.status().state()).finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::operation::Context as OperationContext;
    use crate::operation::Operation;
    use crate::telemetry::TelemetryHelper;
    use crate::{FailoverConfig, QueryState};

    fn query() -> (Arc<Operation<u8, u8, u8>>, Query<u8, u8, u8>, oneshot::Sender<Outcome<u8, u8>>) {
        let context = OperationContext {
            config: Arc::new(FailoverConfig::new(["a"])),
            index: Arc::default(),
            on_index_update: None,
            telemetry: TelemetryHelper::default(),
        };
        let (sender, receiver) = oneshot::channel();
        let (spare_sender, spare_receiver) = oneshot::channel();
        let operation = Operation::new(context, Arc::new(1), vec![0], sender);
        let tracker = QueryTracker {
            operation: Arc::clone(&operation) as _,
        };
        drop(receiver);

        (operation, Query::new(spare_receiver, tracker), spare_sender)
    }

    #[tokio::test]
    async fn resolves_with_sent_outcome() {
        let (_operation, query, sender) = query();
        sender.send(Ok(9)).unwrap();

        assert_eq!(query.await.unwrap(), 9);
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_aborted() {
        let (_operation, query, sender) = query();
        drop(sender);

        assert!(query.await.unwrap_err().is_aborted());
    }

    #[test]
    fn status_and_abort_go_through_tracker() {
        let (_operation, query, _sender) = query();

        assert_eq!(query.status().state(), QueryState::Pending);
        assert_eq!(**query.status().payload(), 1);
        assert!(query.tracker().same_query(&query.tracker()));
        assert_eq!(format!("{query:?}"), "Query { state: Pending, .. }");

        query.abort();
        assert_eq!(query.status().state(), QueryState::Failed);
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Query<String, String, String>: Send, Sync, Unpin, Debug);
    }
}
