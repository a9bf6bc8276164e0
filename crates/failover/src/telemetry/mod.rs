// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Telemetry keys emitted by the failover engine.
//!
//! With the `logs` feature enabled and [`Failover::enable_logs`][crate::Failover::enable_logs]
//! called, every event is written as a `tracing` event named `failover.event`. With the
//! `metrics` feature enabled and a meter provider configured through
//! [`Failover::enable_metrics`][crate::Failover::enable_metrics], every event increments the
//! `resilience.event` counter.
//!
//! Both carry the attributes below. Names follow the
//! [OpenTelemetry naming guidelines](https://opentelemetry.io/docs/specs/semconv/general/naming/#general-naming-considerations).
//!
//! | Event | When |
//! |-------|------|
//! | `attempt` | An attempt is handed to the transport. |
//! | `timeout` | An attempt did not answer within the timeout. |
//! | `completed` | A resource answered and the query completed. |
//! | `exhausted` | Every resource was tried without success. |
//! | `aborted` | The caller aborted the query. |

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

mod helper;
pub(crate) use helper::{EventKind, TelemetryHelper};

/// Key used to annotate the name of the failover instance that emitted an event.
///
/// Values should be short, preferably in `snake_case`. Examples: `icons_api`, `mirror_pool`.
pub const FAILOVER_NAME: &str = "failover.name";

/// Key used to annotate the specific event being emitted.
pub const EVENT_NAME: &str = "resilience.event.name";

/// Key used to annotate the 0-based sequence number of the attempt an event refers to.
pub const ATTEMPT_INDEX: &str = "resilience.attempt.index";

/// Key used to annotate the position, within the configured resources, of the resource an
/// event refers to.
pub const RESOURCE_INDEX: &str = "failover.resource.index";
