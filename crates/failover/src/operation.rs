// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

use crate::callbacks::{CancelHook, OnIndexUpdate};
use crate::telemetry::{EventKind, TelemetryHelper};
use crate::{Attempt, AttemptState, FailoverConfig, IndexUpdateArgs, QueryError, QueryState, QueryStatus};

pub(crate) type Outcome<T, E> = Result<T, QueryError<E>>;

/// Status surface of an operation with the result and error types erased.
pub(crate) trait OperationView<P>: Send + Sync {
    fn status(&self) -> QueryStatus<P>;

    fn abort(&self);
}

/// Per-dispatch state inherited from the [`Failover`][crate::Failover] that started it.
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) config: Arc<FailoverConfig>,
    pub(crate) index: Arc<AtomicUsize>,
    pub(crate) on_index_update: Option<OnIndexUpdate>,
    pub(crate) telemetry: TelemetryHelper,
}

/// How a transport finished an attempt.
pub(crate) enum Resolution<T, E> {
    Succeeded(T),
    Failed(E),
    /// The attempt handle was dropped without an answer.
    Abandoned,
}

/// What the scheduler should do after asking for the next attempt.
pub(crate) enum Launch<P, T, E> {
    Sent(Attempt<P, T, E>),
    /// Every resource has been tried.
    Exhausted,
    /// The operation already completed or failed.
    Terminal,
}

/// One dispatch across the resource pool.
///
/// All transitions happen under `state`. Anything that calls out of the engine (cancel hooks,
/// the index callback, result delivery) is collected into [`Effects`] and run after the lock is
/// released, so callers can re-enter the operation from inside those callbacks.
pub(crate) struct Operation<P, T, E> {
    context: Context,
    payload: Arc<P>,
    order: Vec<usize>,
    state: Mutex<State<T, E>>,
    stop: Notify,
}

struct State<T, E> {
    status: QueryState,
    attempts: Vec<Slot>,
    pending: usize,
    last_error: Option<E>,
    done: Option<oneshot::Sender<Outcome<T, E>>>,
}

struct Slot {
    resource_index: usize,
    state: AttemptState,
    on_cancel: Option<CancelHook>,
}

impl Slot {
    fn is_cancelled(&self) -> bool {
        matches!(
            self.state,
            AttemptState::TimedOut | AttemptState::Superseded | AttemptState::Aborted
        )
    }
}

impl<P, T, E> Operation<P, T, E> {
    pub(crate) fn new(context: Context, payload: Arc<P>, order: Vec<usize>, done: oneshot::Sender<Outcome<T, E>>) -> Arc<Self> {
        Arc::new(Self {
            context,
            payload,
            state: Mutex::new(State {
                status: QueryState::Pending,
                attempts: Vec::with_capacity(order.len()),
                pending: 0,
                last_error: None,
                done: Some(done),
            }),
            order,
            stop: Notify::new(),
        })
    }

    pub(crate) fn payload(&self) -> &Arc<P> {
        &self.payload
    }

    pub(crate) fn config(&self) -> &FailoverConfig {
        &self.context.config
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.lock().status.is_terminal()
    }

    /// Resolves once the operation reached a terminal state.
    pub(crate) async fn stopped(&self) {
        self.stop.notified().await;
    }

    /// Sends the next resource in the attempt order, if any is left.
    pub(crate) fn begin_attempt(self: &Arc<Self>) -> Launch<P, T, E> {
        let (sequence_index, resource_index) = {
            let mut state = self.state.lock();

            if state.status.is_terminal() {
                return Launch::Terminal;
            }

            let sequence_index = state.attempts.len();
            let Some(&resource_index) = self.order.get(sequence_index) else {
                return Launch::Exhausted;
            };

            state.attempts.push(Slot {
                resource_index,
                state: AttemptState::Sent,
                on_cancel: None,
            });
            state.pending += 1;

            (sequence_index, resource_index)
        };

        self.context
            .telemetry
            .report(EventKind::Attempt, Some(sequence_index), Some(resource_index));

        Launch::Sent(Attempt::new(Arc::clone(self), sequence_index, resource_index))
    }

    /// Applies the answer reported for the attempt at `sequence_index`.
    pub(crate) fn resolve(&self, sequence_index: usize, resolution: Resolution<T, E>) {
        let mut effects = Effects::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(slot) = state.attempts.get_mut(sequence_index) else {
                return;
            };

            match resolution {
                Resolution::Succeeded(data) => {
                    let accepted = state.status == QueryState::Pending
                        && match slot.state {
                            AttemptState::Sent => true,
                            AttemptState::TimedOut => self.context.config.accept_late_data(),
                            _ => false,
                        };

                    if !accepted {
                        return;
                    }

                    if slot.state == AttemptState::Sent {
                        state.pending -= 1;
                    }
                    slot.state = AttemptState::Succeeded;
                    slot.on_cancel = None;
                    let resource_index = slot.resource_index;

                    state.status = QueryState::Completed;
                    for other in state.attempts.iter_mut().filter(|other| other.state == AttemptState::Sent) {
                        other.state = AttemptState::Superseded;
                        effects.hooks.extend(other.on_cancel.take());
                    }
                    state.pending = 0;

                    let attempts = state.attempts.len();
                    if attempts > 1 {
                        effects.index_update = Some(IndexUpdateArgs { resource_index, attempts });
                    }
                    effects.events.push((EventKind::Completed, Some(sequence_index), Some(resource_index)));
                    effects.finish(state, Ok(data));
                }
                Resolution::Failed(_) | Resolution::Abandoned if slot.state != AttemptState::Sent => {}
                Resolution::Failed(error) => {
                    slot.state = AttemptState::Failed;
                    slot.on_cancel = None;
                    state.pending -= 1;
                    state.last_error = Some(error);
                    self.fail_if_drained(state, &mut effects);
                }
                Resolution::Abandoned => {
                    slot.state = AttemptState::Failed;
                    slot.on_cancel = None;
                    state.pending -= 1;
                    self.fail_if_drained(state, &mut effects);
                }
            }
        }

        effects.apply(self);
    }

    /// Declares the attempt at `sequence_index` lost.
    ///
    /// A timeout never fails the operation on its own; that is left to [`expire`][Self::expire].
    pub(crate) fn time_out(&self, sequence_index: usize) {
        let mut effects = Effects::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(slot) = state.attempts.get_mut(sequence_index) else {
                return;
            };

            if slot.state != AttemptState::Sent {
                return;
            }

            slot.state = AttemptState::TimedOut;
            effects.hooks.extend(slot.on_cancel.take());
            effects.events.push((EventKind::Timeout, Some(sequence_index), Some(slot.resource_index)));
            state.pending -= 1;
        }

        effects.apply(self);
    }

    /// Fails the operation once the exhaustion deadline elapsed.
    ///
    /// Attempts that are still outstanding are timed out first, in the order they were sent.
    pub(crate) fn expire(&self) {
        let mut effects = Effects::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.status.is_terminal() {
                return;
            }

            for (sequence_index, slot) in state.attempts.iter_mut().enumerate() {
                if slot.state == AttemptState::Sent {
                    slot.state = AttemptState::TimedOut;
                    effects.hooks.extend(slot.on_cancel.take());
                    effects.events.push((EventKind::Timeout, Some(sequence_index), Some(slot.resource_index)));
                }
            }
            state.pending = 0;

            self.exhaust(state, &mut effects);
        }

        effects.apply(self);
    }

    /// Registers the hook invoked when the attempt at `sequence_index` is cancelled.
    ///
    /// A hook registered after the attempt was already cancelled runs right away. A hook
    /// registered after the attempt resolved on its own is dropped.
    pub(crate) fn register_cancel(&self, sequence_index: usize, hook: CancelHook) {
        let run_now = {
            let mut state = self.state.lock();
            match state.attempts.get_mut(sequence_index) {
                Some(slot) if slot.state == AttemptState::Sent => {
                    slot.on_cancel = Some(hook);
                    None
                }
                Some(slot) if slot.is_cancelled() => Some(hook),
                _ => None,
            }
        };

        if let Some(hook) = run_now {
            hook.call();
        }
    }

    /// Returns `true` while a late answer from the timed-out attempt at `sequence_index` can
    /// still complete the operation.
    pub(crate) fn awaits_late_answer(&self, sequence_index: usize) -> bool {
        let state = self.state.lock();

        self.context.config.accept_late_data()
            && state.status == QueryState::Pending
            && state
                .attempts
                .get(sequence_index)
                .is_some_and(|slot| slot.state == AttemptState::TimedOut)
    }

    pub(crate) fn attempt_state(&self, sequence_index: usize) -> Option<AttemptState> {
        self.state.lock().attempts.get(sequence_index).map(|slot| slot.state)
    }

    fn fail_if_drained(&self, state: &mut State<T, E>, effects: &mut Effects<T, E>) {
        if state.status == QueryState::Pending && state.attempts.len() == self.order.len() && state.pending == 0 {
            self.exhaust(state, effects);
        }
    }

    fn exhaust(&self, state: &mut State<T, E>, effects: &mut Effects<T, E>) {
        state.status = QueryState::Failed;
        effects.events.push((EventKind::Exhausted, None, None));

        let error = QueryError::Exhausted {
            attempts: state.attempts.len(),
            last_error: state.last_error.take(),
        };
        effects.finish(state, Err(error));
    }
}

impl<P, T, E> OperationView<P> for Operation<P, T, E>
where
    P: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn status(&self) -> QueryStatus<P> {
        let state = self.state.lock();

        QueryStatus {
            state: state.status,
            payload: Arc::clone(&self.payload),
            queries_sent: state.attempts.len(),
            queries_pending: state.pending,
        }
    }

    fn abort(&self) {
        let mut effects = Effects::new();

        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            if state.status.is_terminal() {
                return;
            }

            for slot in state.attempts.iter_mut().filter(|slot| slot.state == AttemptState::Sent) {
                slot.state = AttemptState::Aborted;
                effects.hooks.extend(slot.on_cancel.take());
            }
            state.pending = 0;
            state.status = QueryState::Failed;
            effects.events.push((EventKind::Aborted, None, None));
            effects.finish(state, Err(QueryError::Aborted));
        }

        effects.apply(self);
    }
}

impl<P, T, E> Debug for Operation<P, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("order", &self.order)
            .field("status", &self.state.lock().status)
            .finish_non_exhaustive()
    }
}

/// Work that must run once the state lock is released.
struct Effects<T, E> {
    events: Vec<(EventKind, Option<usize>, Option<usize>)>,
    hooks: Vec<CancelHook>,
    index_update: Option<IndexUpdateArgs>,
    done: Option<(oneshot::Sender<Outcome<T, E>>, Outcome<T, E>)>,
    stop: bool,
}

impl<T, E> Effects<T, E> {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            hooks: Vec::new(),
            index_update: None,
            done: None,
            stop: false,
        }
    }

    fn finish(&mut self, state: &mut State<T, E>, outcome: Outcome<T, E>) {
        self.stop = true;
        self.done = state.done.take().map(|sender| (sender, outcome));
    }

    fn apply<P>(self, operation: &Operation<P, T, E>) {
        for (kind, attempt_index, resource_index) in self.events {
            operation.context.telemetry.report(kind, attempt_index, resource_index);
        }

        for hook in self.hooks {
            hook.call();
        }

        if let Some(args) = self.index_update {
            operation.context.index.store(args.resource_index, Ordering::Release);
            if let Some(callback) = &operation.context.on_index_update {
                callback.call(args);
            }
        }

        if self.stop {
            operation.stop.notify_one();
        }

        if let Some((sender, outcome)) = self.done {
            // The caller may have dropped the query; the outcome is simply discarded then.
            let _ = sender.send(outcome);
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    type TestOperation = Operation<&'static str, u32, &'static str>;

    fn operation(config: FailoverConfig) -> (Arc<TestOperation>, oneshot::Receiver<Outcome<u32, &'static str>>, Arc<AtomicUsize>) {
        let len = config.resources().len();
        let index = Arc::new(AtomicUsize::new(0));
        let context = Context {
            config: Arc::new(config),
            index: Arc::clone(&index),
            on_index_update: None,
            telemetry: TelemetryHelper::default(),
        };
        let (sender, receiver) = oneshot::channel();

        (Operation::new(context, Arc::new("payload"), (0..len).collect(), sender), receiver, index)
    }

    fn launch(operation: &Arc<TestOperation>) -> Attempt<&'static str, u32, &'static str> {
        match operation.begin_attempt() {
            Launch::Sent(attempt) => attempt,
            Launch::Exhausted => panic!("unexpected exhaustion"),
            Launch::Terminal => panic!("unexpected terminal operation"),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        (calls, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn fresh_operation_is_idle() {
        let (operation, _receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        let status = operation.status();

        assert_eq!(status.state(), QueryState::Pending);
        assert_eq!(status.queries_sent(), 0);
        assert_eq!(status.queries_pending(), 0);
        assert_eq!(**status.payload(), "payload");
    }

    #[test]
    fn launches_in_order_until_exhausted() {
        let (operation, _receiver, _) = operation(FailoverConfig::new(["a", "b"]));

        let first = launch(&operation);
        let second = launch(&operation);
        assert_eq!(first.resource(), "a");
        assert_eq!(second.resource(), "b");
        assert!(matches!(operation.begin_attempt(), Launch::Exhausted));

        let status = operation.status();
        assert_eq!(status.queries_sent(), 2);
        assert_eq!(status.queries_pending(), 2);
    }

    #[test]
    fn success_supersedes_the_rest() {
        let (operation, mut receiver, index) = operation(FailoverConfig::new(["a", "b"]));
        let first = launch(&operation);
        let second = launch(&operation);
        let (cancelled, hook) = counter();
        first.on_cancel(hook);

        second.succeed(7);

        assert_eq!(receiver.try_recv().unwrap().unwrap(), 7);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(first.status(), AttemptState::Superseded);
        assert_eq!(index.load(Ordering::SeqCst), 1);
        assert!(operation.is_terminal());
        assert!(matches!(operation.begin_attempt(), Launch::Terminal));

        let status = operation.status();
        assert_eq!(status.state(), QueryState::Completed);
        assert_eq!(status.queries_pending(), 0);
    }

    #[test]
    fn failure_with_resources_left_keeps_pending() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        launch(&operation).fail("boom");

        assert!(receiver.try_recv().is_err());
        assert_eq!(operation.status().state(), QueryState::Pending);
        assert_eq!(operation.status().queries_pending(), 0);
    }

    #[test]
    fn last_failure_exhausts_immediately() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        launch(&operation).fail("first");
        drop(launch(&operation));

        let error = receiver.try_recv().unwrap().unwrap_err();
        assert!(matches!(error, QueryError::Exhausted { attempts: 2, last_error: Some("first") }));
        assert_eq!(operation.status().state(), QueryState::Failed);
    }

    #[test]
    fn timeout_alone_does_not_fail() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a"]));
        let attempt = launch(&operation);
        let (cancelled, hook) = counter();
        attempt.on_cancel(hook);

        operation.time_out(0);
        operation.time_out(0);

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.status(), AttemptState::TimedOut);
        assert!(receiver.try_recv().is_err());
        assert_eq!(operation.status().queries_pending(), 0);
        assert_eq!(operation.status().queries_sent(), 1);

        operation.expire();
        assert!(receiver.try_recv().unwrap().unwrap_err().is_exhausted());
    }

    #[test]
    fn late_data_is_discarded_by_default() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a"]));
        let attempt = launch(&operation);
        operation.time_out(0);

        attempt.succeed(1);

        assert!(receiver.try_recv().is_err());
        assert_eq!(operation.status().state(), QueryState::Pending);
    }

    #[test]
    fn late_data_is_accepted_when_enabled() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a"]).with_accept_late_data(true));
        let attempt = launch(&operation);
        operation.time_out(0);

        attempt.succeed(1);

        assert_eq!(receiver.try_recv().unwrap().unwrap(), 1);
        assert_eq!(operation.status().state(), QueryState::Completed);
        assert_eq!(operation.status().queries_pending(), 0);
    }

    #[test]
    fn terminal_operation_is_never_resurrected() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a"]).with_accept_late_data(true));
        let attempt = launch(&operation);
        operation.time_out(0);
        operation.expire();

        attempt.succeed(1);

        assert!(receiver.try_recv().unwrap().is_err());
        assert_eq!(operation.status().state(), QueryState::Failed);
    }

    #[test]
    fn expire_times_out_outstanding_attempts_in_order() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = launch(&operation);
        let second = launch(&operation);
        for attempt in [&first, &second] {
            let order = Arc::clone(&order);
            let resource = attempt.resource().to_string();
            attempt.on_cancel(move || order.lock().push(resource));
        }

        operation.expire();
        operation.expire();

        assert_eq!(*order.lock(), vec!["a".to_string(), "b".to_string()]);
        assert!(receiver.try_recv().unwrap().unwrap_err().is_exhausted());
        assert_eq!(second.status(), AttemptState::TimedOut);
    }

    #[test]
    fn abort_cancels_outstanding_attempts() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        let attempt = launch(&operation);
        let (cancelled, hook) = counter();
        attempt.on_cancel(hook);

        operation.abort();
        operation.abort();

        assert!(receiver.try_recv().unwrap().unwrap_err().is_aborted());
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.status(), AttemptState::Aborted);
        assert_eq!(operation.status().queries_pending(), 0);
    }

    #[test]
    fn hook_registered_after_cancel_runs_immediately() {
        let (operation, _receiver, _) = operation(FailoverConfig::new(["a"]));
        let attempt = launch(&operation);
        operation.time_out(0);

        let (cancelled, hook) = counter();
        attempt.on_cancel(hook);

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_registered_after_resolution_is_dropped() {
        let (operation, _receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        launch(&operation).fail("boom");

        let (cancelled, hook) = counter();
        operation.register_cancel(0, CancelHook::new(hook));

        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callbacks_may_reenter_the_operation() {
        let (operation, mut receiver, _) = operation(FailoverConfig::new(["a", "b"]));
        let first = launch(&operation);
        let second = launch(&operation);
        let operation_clone = Arc::clone(&operation);
        first.on_cancel(move || {
            assert_eq!(operation_clone.status().state(), QueryState::Completed);
        });

        second.succeed(3);

        assert_eq!(receiver.try_recv().unwrap().unwrap(), 3);
    }

    #[rstest::rstest]
    #[case::late_data_accepted(true, true)]
    #[case::late_data_discarded(false, false)]
    fn timed_out_attempt_awaits_late_answer(#[case] accept_late_data: bool, #[case] expected: bool) {
        let (operation, _receiver, _) = operation(FailoverConfig::new(["a", "b"]).with_accept_late_data(accept_late_data));
        let attempt = launch(&operation);
        let check = attempt.late_answer_check();
        assert!(!check());

        operation.time_out(0);
        assert_eq!(check(), expected);

        operation.abort();
        assert!(!check());
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(TestOperation: Send, Sync, Debug);
    }
}
