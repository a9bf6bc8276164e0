// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval, sleep, sleep_until};

use crate::Transport;
use crate::operation::{Launch, Operation, OperationView};

/// What woke the driver up.
enum Wakeup {
    /// The operation reached a terminal state.
    Stopped,
    /// The rotation interval ticked.
    Rotate,
    /// The attempt with this sequence index ran out of time.
    AttemptExpired(usize),
    /// The exhaustion deadline elapsed.
    DeadlineElapsed,
}

/// Runs the timers of one operation until it reaches a terminal state.
///
/// The rotation interval launches one attempt per tick, the first one immediately. Every
/// launched attempt arms its own timeout. Once a tick finds no resource left to try, rotation
/// stops and a single exhaustion deadline of the same timeout is armed; when it elapses the
/// operation fails.
///
/// Dropping the returned future before the operation finished, for example because the runtime
/// shut down, aborts the operation so the caller is not left waiting. This holds even if the
/// future was never polled.
pub(crate) fn drive<P, T, E, S>(operation: Arc<Operation<P, T, E>>, transport: S) -> impl Future<Output = ()>
where
    P: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
    S: Transport<P, T, E>,
{
    let guard = AbortOnDrop(Arc::clone(&operation) as Arc<dyn OperationView<P>>);

    async move {
        run(&operation, &transport).await;
        drop(guard);
    }
}

async fn run<P, T, E, S>(operation: &Arc<Operation<P, T, E>>, transport: &S)
where
    P: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
    S: Transport<P, T, E>,
{
    let timeout = operation.config().timeout();
    let mut rotation = Some(interval(operation.config().rotate()));
    if let Some(rotation) = &mut rotation {
        rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }
    let mut expiries = FuturesUnordered::new();
    let mut deadline: Option<Pin<Box<Sleep>>> = None;

    loop {
        let wakeup = tokio::select! {
            biased;
            () = operation.stopped() => Wakeup::Stopped,
            Some(sequence_index) = expiries.next(), if !expiries.is_empty() => Wakeup::AttemptExpired(sequence_index),
            () = tick(&mut rotation) => Wakeup::Rotate,
            () = elapsed(&mut deadline) => Wakeup::DeadlineElapsed,
        };

        match wakeup {
            Wakeup::Stopped => break,
            Wakeup::Rotate => match operation.begin_attempt() {
                Launch::Sent(attempt) => {
                    expiries.push(expire_after(attempt.sequence_index(), attempt.sent_at() + timeout));
                    let resource_index = attempt.resource_index();
                    let resource = operation
                        .config()
                        .resources()
                        .get(resource_index)
                        .map_or("", String::as_str);
                    transport.send(resource, operation.payload(), attempt);
                }
                Launch::Exhausted => {
                    rotation = None;
                    deadline = Some(Box::pin(sleep(timeout)));
                }
                Launch::Terminal => break,
            },
            Wakeup::AttemptExpired(sequence_index) => operation.time_out(sequence_index),
            Wakeup::DeadlineElapsed => {
                operation.expire();
                break;
            }
        }

        if operation.is_terminal() {
            break;
        }
    }
}

async fn expire_after(sequence_index: usize, deadline: Instant) -> usize {
    sleep_until(deadline).await;
    sequence_index
}

#[cfg_attr(test, mutants::skip)] // causes test timeouts
async fn tick(rotation: &mut Option<Interval>) {
    match rotation {
        Some(rotation) => {
            rotation.tick().await;
        }
        None => pending().await,
    }
}

#[cfg_attr(test, mutants::skip)] // causes test timeouts
async fn elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(deadline) => deadline.as_mut().await,
        None => pending().await,
    }
}

struct AbortOnDrop<P>(Arc<dyn OperationView<P>>);

impl<P> Drop for AbortOnDrop<P> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
