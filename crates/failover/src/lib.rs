// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(
    not(all(feature = "logs", feature = "metrics")),
    expect(
        rustdoc::broken_intra_doc_links,
        reason = "telemetry switches only exist when their features are enabled"
    )
)]

//! Dispatch one request across a pool of redundant resources.
//!
//! Some APIs are served by several mirrors, any of which may be unreachable, slow or briefly
//! inconsistent. This crate hides that behind a single call: a [`Failover`] sends the query to
//! the preferred resource and, if no answer arrives within the rotation interval, sends it to
//! the next one as well, and so on until one of them answers or every one has been tried.
//! The caller receives exactly one outcome.
//!
//! The crate does not know how to talk to a resource. A [`Transport`] does: the engine hands
//! it one [`Attempt`] per resource and the transport answers through that handle. Plain
//! closures and `async` functions (see [`transport::from_async`]) work as transports.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use failover::{Failover, FailoverConfig, QueryState, transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = FailoverConfig::new(["https://api1.example.com", "https://api2.example.com"])
//!     .with_timeout(Duration::from_secs(5))
//!     .with_rotate(Duration::from_millis(750));
//!
//! let failover = Failover::new(config).unwrap();
//!
//! let query = failover.dispatch(
//!     "/v1/icons".to_string(),
//!     transport::from_async(|resource: String, path: Arc<String>| async move {
//!         // Issue the actual request here.
//!         Ok::<_, std::io::Error>(format!("{resource}{path}"))
//!     }),
//! );
//!
//! let tracker = query.tracker();
//! let body = query.await.unwrap();
//!
//! assert_eq!(body, "https://api1.example.com/v1/icons");
//! assert_eq!(tracker.status().state(), QueryState::Completed);
//! assert_eq!(tracker.status().queries_sent(), 1);
//! # }
//! ```
//!
//! # How a Query Runs
//!
//! - The resources are tried in order starting at [`Failover::index`], wrapping around. With
//!   [`FailoverConfig::with_random`] every resource except the first is shuffled.
//! - One attempt is launched per rotation tick, the first one immediately. Attempts that are
//!   already out keep running; a failed attempt does not make the next one go out sooner.
//! - An attempt that does not answer within the timeout is cancelled. Its answer is ignored
//!   unless [`FailoverConfig::with_accept_late_data`] is set.
//! - The first success completes the query and cancels every attempt still in flight.
//! - Once every resource was tried, the query fails when the last outstanding attempt failed,
//!   or one timeout after rotation ran out of resources, whichever comes first.
//! - When the winning resource is not the one tried first, the
//!   [`on_index_update`][Failover::on_index_update] callback fires and later queries start
//!   from that resource.
//!
//! Progress is observable at any time through [`Query::status`] or a [`QueryTracker`].
//!
//! # Features
//!
//! - `logs`: Enables [`Failover::enable_logs`], which emits a `tracing` event per query event.
//! - `metrics`: Enables [`Failover::enable_metrics`], which reports query events to an
//!   OpenTelemetry counter. See [`telemetry`] for the attributes.
//! - `serde`: Implements `Serialize` and `Deserialize` for [`FailoverConfig`].

mod args;
mod attempt;
mod callbacks;
mod config;
mod constants;
mod driver;
mod error;
mod failover;
mod operation;
mod order;
mod query;
mod rnd;
mod status;

pub mod telemetry;
pub mod transport;

pub use args::IndexUpdateArgs;
pub use attempt::{Attempt, AttemptState};
pub use config::FailoverConfig;
pub use error::{ConfigError, QueryError};
pub use failover::Failover;
pub use query::Query;
pub use status::{QueryState, QueryStatus, QueryTracker};
pub use transport::Transport;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
pub(crate) mod testing;
