// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Events reported while a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Attempt,
    Timeout,
    Completed,
    Exhausted,
    Aborted,
}

impl EventKind {
    #[cfg(any(feature = "logs", feature = "metrics", test))]
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Attempt => "attempt",
            Self::Timeout => "timeout",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Aborted => "aborted",
        }
    }

    #[cfg(any(feature = "logs", test))]
    fn is_warning(self) -> bool {
        matches!(self, Self::Timeout | Self::Exhausted | Self::Aborted)
    }
}

/// Telemetry sink shared by every query of one [`Failover`][crate::Failover].
#[derive(Debug, Clone, Default)]
pub(crate) struct TelemetryHelper {
    #[cfg(any(feature = "metrics", feature = "logs", test))]
    pub(crate) name: std::borrow::Cow<'static, str>,
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    #[cfg(any(feature = "logs", test))]
    pub(crate) logs_enabled: bool,
}

impl TelemetryHelper {
    #[cfg(test)]
    pub(crate) fn metrics_enabled(&self) -> bool {
        self.event_reporter.is_some()
    }

    #[cfg_attr(
        not(any(feature = "logs", feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs nor metrics are used")
    )]
    pub(crate) fn report(&self, kind: EventKind, attempt_index: Option<usize>, resource_index: Option<usize>) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            if kind.is_warning() {
                tracing::event!(
                    name: "failover.event",
                    tracing::Level::WARN,
                    failover.name = %self.name,
                    resilience.event.name = kind.as_str(),
                    resilience.attempt.index = attempt_index,
                    failover.resource.index = resource_index,
                );
            } else {
                tracing::event!(
                    name: "failover.event",
                    tracing::Level::INFO,
                    failover.name = %self.name,
                    resilience.event.name = kind.as_str(),
                    resilience.attempt.index = attempt_index,
                    failover.resource.index = resource_index,
                );
            }
        }

        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.event_reporter {
            use opentelemetry::KeyValue;

            use super::{ATTEMPT_INDEX, EVENT_NAME, FAILOVER_NAME, RESOURCE_INDEX};

            let mut attributes = vec![
                KeyValue::new(FAILOVER_NAME, self.name.clone()),
                KeyValue::new(EVENT_NAME, kind.as_str()),
            ];
            if let Some(index) = attempt_index {
                attributes.push(KeyValue::new(ATTEMPT_INDEX, i64::try_from(index).unwrap_or(i64::MAX)));
            }
            if let Some(index) = resource_index {
                attributes.push(KeyValue::new(RESOURCE_INDEX, i64::try_from(index).unwrap_or(i64::MAX)));
            }

            reporter.add(1, &attributes);
        }
    }
}
