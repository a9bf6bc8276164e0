// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{AbortHandle, Abortable};
use tokio::runtime::Handle;

use crate::Attempt;

/// Sends one attempt of a query to one resource.
///
/// The engine calls [`send`][Transport::send] once per attempt, from the task that drives the
/// query. Implementations must not block: start the work and return, then answer through the
/// [`Attempt`] handle whenever the resource responds.
///
/// Closures with the matching signature implement this trait, so most callers never implement
/// it by hand:
///
/// ```
/// use std::sync::Arc;
/// use failover::{Attempt, Transport};
///
/// fn assert_transport<T: Transport<String, String, std::io::Error>>(_: T) {}
///
/// assert_transport(|resource: &str, payload: &Arc<String>, attempt: Attempt<String, String, std::io::Error>| {
///     attempt.succeed(format!("{resource}:{payload}"));
/// });
/// ```
///
/// For transports written as `async` functions see [`from_async`].
pub trait Transport<P, T, E>: Send + Sync + 'static {
    /// Starts an attempt against `resource`.
    fn send(&self, resource: &str, payload: &Arc<P>, attempt: Attempt<P, T, E>);
}

impl<P, T, E, F> Transport<P, T, E> for F
where
    F: Fn(&str, &Arc<P>, Attempt<P, T, E>) + Send + Sync + 'static,
{
    fn send(&self, resource: &str, payload: &Arc<P>, attempt: Attempt<P, T, E>) {
        self(resource, payload, attempt);
    }
}

/// Transport that runs an `async` function for every attempt.
///
/// Created by [`from_async`]. Each attempt is spawned as its own task on the runtime that
/// sends it. Cancelling the attempt aborts the task, dropping the in-flight future.
///
/// When [`with_accept_late_data`][crate::FailoverConfig::with_accept_late_data] is set, an
/// attempt that merely timed out is left running so its answer can still complete the query.
/// Such a task runs until its future resolves, even if the query ends first.
pub struct AsyncTransport<F, Fut> {
    send: F,
    runtime: Option<Handle>,
    _future: PhantomData<fn() -> Fut>,
}

/// Adapts an `async` function into a [`Transport`].
///
/// The function receives the resource identifier and the query payload and resolves to the
/// attempt's answer.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use failover::{Failover, FailoverConfig, transport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let failover = Failover::new(FailoverConfig::new(["primary", "secondary"])).unwrap();
///
/// let send = transport::from_async(|resource: String, payload: Arc<u32>| async move {
///     Ok::<_, std::io::Error>(format!("{resource} answered {payload}"))
/// });
///
/// let answer = failover.dispatch(42, send).await.unwrap();
/// assert_eq!(answer, "primary answered 42");
/// # }
/// ```
pub fn from_async<P, T, E, F, Fut>(send: F) -> AsyncTransport<F, Fut>
where
    F: Fn(String, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    AsyncTransport {
        send,
        runtime: None,
        _future: PhantomData,
    }
}

impl<F, Fut> AsyncTransport<F, Fut> {
    /// Spawns attempts on `runtime` instead of the runtime that sends them.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl<P, T, E, F, Fut> Transport<P, T, E> for AsyncTransport<F, Fut>
where
    P: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(String, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn send(&self, resource: &str, payload: &Arc<P>, attempt: Attempt<P, T, E>) {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let awaits_late_answer = attempt.late_answer_check();
        attempt.on_cancel(move || {
            if !awaits_late_answer() {
                abort_handle.abort();
            }
        });

        let work = Abortable::new((self.send)(resource.to_string(), Arc::clone(payload)), abort_registration);
        let task = async move {
            // An aborted future drops the attempt unanswered, which the engine ignores for
            // attempts it already cancelled.
            if let Ok(result) = work.await {
                match result {
                    Ok(data) => attempt.succeed(data),
                    Err(error) => attempt.fail(error),
                }
            }
        };

        match &self.runtime {
            Some(runtime) => drop(runtime.spawn(task)),
            None => drop(tokio::spawn(task)),
        }
    }
}

impl<F, Fut> Debug for AsyncTransport<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransport").field("runtime", &self.runtime).finish_non_exhaustive()
    }
}
