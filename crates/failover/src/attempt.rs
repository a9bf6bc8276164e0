// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::time::Instant;

use crate::QueryTracker;
use crate::callbacks::CancelHook;
use crate::operation::{Operation, Resolution};

/// Lifecycle of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    /// Handed to the transport and waiting for an answer.
    Sent,
    /// The transport reported a result that the query accepted.
    Succeeded,
    /// The transport reported an error, or dropped the attempt without answering.
    Failed,
    /// No answer arrived within the timeout. The attempt was cancelled.
    TimedOut,
    /// Another attempt answered first. The attempt was cancelled.
    Superseded,
    /// The query was aborted. The attempt was cancelled.
    Aborted,
}

/// One outstanding try of a query against a single resource.
///
/// The engine hands an `Attempt` to the [`Transport`][crate::Transport], which then owns it and
/// must answer through exactly one of [`succeed`][Attempt::succeed] or [`fail`][Attempt::fail].
/// Both consume the handle. Dropping the handle without answering counts as a failure with no
/// error detail.
///
/// The engine may cancel an attempt that it no longer needs: when it times out, when another
/// attempt answers first, or when the query is aborted. Register an
/// [`on_cancel`][Attempt::on_cancel] hook to release the underlying work (close the connection,
/// abort the task). The hook runs at most once.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use failover::Attempt;
///
/// fn send(resource: &str, payload: &Arc<String>, attempt: Attempt<String, String, std::io::Error>) {
///     let request = format!("GET {resource}/{payload}");
///     attempt.on_cancel(|| { /* close the connection */ });
///     // ... issue the request, then later:
///     attempt.succeed(request);
/// }
/// ```
pub struct Attempt<P, T, E> {
    operation: Arc<Operation<P, T, E>>,
    sequence_index: usize,
    resource_index: usize,
    sent_at: Instant,
    resolved: bool,
}

impl<P, T, E> Attempt<P, T, E> {
    pub(crate) fn new(operation: Arc<Operation<P, T, E>>, sequence_index: usize, resource_index: usize) -> Self {
        Self {
            operation,
            sequence_index,
            resource_index,
            sent_at: Instant::now(),
            resolved: false,
        }
    }

    /// Returns the identifier of the resource this attempt targets.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.operation
            .config()
            .resources()
            .get(self.resource_index)
            .map_or("", String::as_str)
    }

    /// Returns the position of the resource within the configured resources.
    #[must_use]
    pub fn resource_index(&self) -> usize {
        self.resource_index
    }

    /// Returns the 0-based position of this attempt in the order attempts were sent.
    #[must_use]
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Returns the payload of the query.
    #[must_use]
    pub fn payload(&self) -> &Arc<P> {
        self.operation.payload()
    }

    /// Returns when the attempt was sent.
    #[must_use]
    pub fn sent_at(&self) -> Instant {
        self.sent_at
    }

    /// Returns the current lifecycle state of this attempt.
    #[must_use]
    pub fn status(&self) -> AttemptState {
        self.operation
            .attempt_state(self.sequence_index)
            .unwrap_or(AttemptState::Sent)
    }

    /// Returns `true` once the engine cancelled this attempt.
    ///
    /// Transports that poll instead of registering a hook can use this to stop early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.status(),
            AttemptState::TimedOut | AttemptState::Superseded | AttemptState::Aborted
        )
    }

    /// Registers the hook invoked when the engine cancels this attempt.
    ///
    /// Registering again replaces the previous hook. If the attempt was already cancelled,
    /// the hook runs immediately on the calling thread.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        self.operation.register_cancel(self.sequence_index, CancelHook::new(hook));
    }

    /// Reports a successful answer.
    ///
    /// The first success completes the query and cancels every other outstanding attempt.
    /// A success after this attempt timed out is only honored when
    /// [`with_accept_late_data`][crate::FailoverConfig::with_accept_late_data] is set and the
    /// query is still pending; otherwise `data` is dropped.
    pub fn succeed(mut self, data: T) {
        self.resolved = true;
        self.operation.resolve(self.sequence_index, Resolution::Succeeded(data));
    }

    /// Reports a failed answer.
    ///
    /// The error is remembered and surfaced through
    /// [`QueryError::last_error`][crate::QueryError::last_error] if no resource succeeds.
    /// Failing does not speed up rotation; the next resource is still tried on schedule.
    pub fn fail(mut self, error: E) {
        self.resolved = true;
        self.operation.resolve(self.sequence_index, Resolution::Failed(error));
    }
}

impl<P, T, E> Attempt<P, T, E>
where
    P: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Returns a tracker for the query this attempt belongs to.
    #[must_use]
    pub fn tracker(&self) -> QueryTracker<P> {
        QueryTracker {
            operation: Arc::clone(&self.operation) as _,
        }
    }

    /// Returns a check telling whether this attempt, once timed out, may still complete the query
    /// with a late answer.
    pub(crate) fn late_answer_check(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let operation = Arc::clone(&self.operation);
        let sequence_index = self.sequence_index;

        move || operation.awaits_late_answer(sequence_index)
    }
}

impl<P, T, E> Drop for Attempt<P, T, E> {
    fn drop(&mut self) {
        if !self.resolved {
            self.operation.resolve(self.sequence_index, Resolution::Abandoned);
        }
    }
}

impl<P, T, E> Debug for Attempt<P, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("resource", &self.resource())
            .field("resource_index", &self.resource_index)
            .field("sequence_index", &self.sequence_index)
            .finish_non_exhaustive()
    }
}
