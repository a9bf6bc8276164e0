// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::callbacks::OnIndexUpdate;
use crate::constants::DEFAULT_NAME;
use crate::operation::{Context, Operation};
use crate::order::attempt_order;
use crate::rnd::Rnd;
use crate::telemetry::TelemetryHelper;
use crate::{ConfigError, FailoverConfig, IndexUpdateArgs, Query, QueryTracker, Transport, driver};

/// Dispatches queries across a pool of redundant resources.
///
/// A `Failover` holds a validated [`FailoverConfig`] and the position of the resource to try
/// first. Every call to [`dispatch`][Failover::dispatch] starts an independent query that
/// tries the resources one after another, on the configured rotation interval, until one of
/// them answers or all of them are exhausted.
///
/// When a query succeeds on a resource other than the one it tried first, that resource
/// becomes the starting point of later queries, so a pool keeps using the mirror that last
/// worked. Clones share this position.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use failover::{Attempt, Failover, FailoverConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = FailoverConfig::new(["https://mirror-a.example.com", "https://mirror-b.example.com"])
///     .with_timeout(Duration::from_secs(2))
///     .with_rotate(Duration::from_millis(250));
///
/// let failover = Failover::new(config)
///     .unwrap()
///     .name("mirror_pool")
///     .on_index_update(|args| println!("switched to resource {}", args.resource_index()));
///
/// let query = failover.dispatch("/status".to_string(), |resource: &str, path: &Arc<String>, attempt: Attempt<String, String, String>| {
///     attempt.succeed(format!("{resource}{path}"));
/// });
///
/// assert_eq!(query.await.unwrap(), "https://mirror-a.example.com/status");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Failover {
    config: Arc<FailoverConfig>,
    index: Arc<AtomicUsize>,
    on_index_update: Option<OnIndexUpdate>,
    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(dead_code, reason = "only read when logs or metrics are used")
    )]
    name: Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
    #[cfg_attr(not(any(feature = "logs", test)), expect(dead_code, reason = "only read when logs are used"))]
    logs_enabled: bool,
    runtime: Option<Handle>,
    rnd: Rnd,
}

impl Failover {
    /// Creates a failover pool from `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration cannot drive a query, see
    /// [`FailoverConfig::validate`].
    pub fn new(config: FailoverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let start_index = config.start_index() % config.resources().len();

        Ok(Self {
            config: Arc::new(config),
            index: Arc::new(AtomicUsize::new(start_index)),
            on_index_update: None,
            name: Cow::Borrowed(DEFAULT_NAME),
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            logs_enabled: false,
            runtime: None,
            rnd: Rnd::default(),
        })
    }

    /// Sets the name reported with telemetry. Prefer `snake_case`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables metrics reporting with the given OpenTelemetry meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::telemetry::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Enables structured logging of query events.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Registers a callback invoked when a query succeeds after more than one attempt.
    ///
    /// The callback receives the position of the resource that answered. It is invoked at
    /// most once per query, after superseded attempts were cancelled and before the query
    /// resolves. It must not block.
    #[must_use]
    pub fn on_index_update(mut self, callback: impl Fn(IndexUpdateArgs) + Send + Sync + 'static) -> Self {
        self.on_index_update = Some(OnIndexUpdate::new(callback));
        self
    }

    /// Spawns query drivers on `runtime` instead of the runtime `dispatch` is called from.
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Returns the configuration this pool was created with.
    #[must_use]
    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Returns the position of the resource the next query tries first.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Sets the position of the resource the next query tries first.
    ///
    /// The index wraps around the number of resources.
    pub fn set_index(&self, index: usize) {
        self.index.store(index % self.config.resources().len(), Ordering::Release);
    }

    /// Starts a query for `payload`, sending attempts through `transport`.
    ///
    /// Returns right away without sending anything. The first attempt goes out on the first
    /// tick of the rotation interval, inside a task spawned for this query. On a current-thread
    /// runtime that task cannot run before the caller yields, so the status of a fresh query
    /// always reads pending with nothing sent.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime and no runtime was configured through
    /// [`runtime`][Failover::runtime].
    pub fn dispatch<P, T, E>(&self, payload: P, transport: impl Transport<P, T, E>) -> Query<P, T, E>
    where
        P: Send + Sync + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let order = attempt_order(self.config.resources().len(), self.index(), self.config.random(), &self.rnd);
        let (sender, receiver) = oneshot::channel();
        let operation = Operation::new(self.create_context(), Arc::new(payload), order, sender);
        let tracker = QueryTracker {
            operation: Arc::clone(&operation) as _,
        };

        let driver = driver::drive(operation, transport);
        match &self.runtime {
            Some(runtime) => drop(runtime.spawn(driver)),
            None => drop(tokio::spawn(driver)),
        }

        Query::new(receiver, tracker)
    }

    fn create_context(&self) -> Context {
        Context {
            config: Arc::clone(&self.config),
            index: Arc::clone(&self.index),
            on_index_update: self.on_index_update.clone(),
            telemetry: self.create_telemetry(),
        }
    }

    #[cfg_attr(
        not(any(feature = "metrics", feature = "logs", test)),
        expect(clippy::unused_self, reason = "unused when logs nor metrics are used")
    )]
    fn create_telemetry(&self) -> TelemetryHelper {
        TelemetryHelper {
            #[cfg(any(feature = "metrics", feature = "logs", test))]
            name: self.name.clone(),
            #[cfg(any(feature = "metrics", test))]
            event_reporter: self.meter.as_ref().map(crate::telemetry::metrics::create_event_counter),
            #[cfg(any(feature = "logs", test))]
            logs_enabled: self.logs_enabled,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }
}
