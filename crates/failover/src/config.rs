// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::ConfigError;
use crate::constants::{DEFAULT_ROTATE, DEFAULT_TIMEOUT};

/// Describes the pool of redundant resources and the timing used to dispatch a query
/// across them.
///
/// A configuration is read-only for the lifetime of a dispatch. It is validated when a
/// [`Failover`][crate::Failover] is created from it.
///
/// # Defaults
///
/// | Parameter | Default Value | Configured By |
/// |-----------|---------------|---------------|
/// | Start index | `0` | [`with_start_index`][FailoverConfig::with_start_index] |
/// | Timeout | 5 seconds | [`with_timeout`][FailoverConfig::with_timeout] |
/// | Rotation interval | 750 milliseconds | [`with_rotate`][FailoverConfig::with_rotate] |
/// | Random order | `false` | [`with_random`][FailoverConfig::with_random] |
/// | Accept late data | `false` | [`with_accept_late_data`][FailoverConfig::with_accept_late_data] |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use failover::FailoverConfig;
///
/// let config = FailoverConfig::new(["https://api1.example.com", "https://api2.example.com"])
///     .with_timeout(Duration::from_secs(2))
///     .with_rotate(Duration::from_millis(500));
///
/// assert_eq!(config.resources().len(), 2);
/// assert_eq!(config.start_index(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FailoverConfig {
    resources: Vec<String>,
    start_index: usize,
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    timeout: Duration,
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    rotate: Duration,
    random: bool,
    accept_late_data: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            start_index: 0,
            timeout: DEFAULT_TIMEOUT,
            rotate: DEFAULT_ROTATE,
            random: false,
            accept_late_data: false,
        }
    }
}

impl FailoverConfig {
    /// Creates a configuration for the given resources, in preference order.
    #[must_use]
    pub fn new<I, S>(resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the position in the resource list to try first.
    ///
    /// The index wraps around the number of resources.
    ///
    /// **Default**: 0
    #[must_use]
    pub fn with_start_index(mut self, index: usize) -> Self {
        self.start_index = index;
        self
    }

    /// Sets how long a single attempt may stay unanswered before it is declared lost.
    ///
    /// Once every resource has been tried, the same duration is also the grace period
    /// after which the whole query fails.
    ///
    /// **Default**: 5 seconds
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the interval between launching successive attempts.
    ///
    /// **Default**: 750 milliseconds
    #[must_use]
    pub fn with_rotate(mut self, rotate: Duration) -> Self {
        self.rotate = rotate;
        self
    }

    /// Randomizes the order of every resource except the starting one.
    ///
    /// **Default**: false
    #[must_use]
    pub fn with_random(mut self, random: bool) -> Self {
        self.random = random;
        self
    }

    /// Accepts data that arrives after the attempt has timed out, as long as the query
    /// has not reached a terminal state yet.
    ///
    /// **Default**: false
    #[must_use]
    pub fn with_accept_late_data(mut self, accept: bool) -> Self {
        self.accept_late_data = accept;
        self
    }

    /// Returns the resources in preference order.
    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Returns the configured start index, before wrapping.
    #[must_use]
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the rotation interval.
    #[must_use]
    pub fn rotate(&self) -> Duration {
        self.rotate
    }

    /// Returns whether the attempt order is randomized.
    #[must_use]
    pub fn random(&self) -> bool {
        self.random
    }

    /// Returns whether late data is accepted.
    #[must_use]
    pub fn accept_late_data(&self) -> bool {
        self.accept_late_data
    }

    /// Checks that the configuration can drive a dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoResources`] when the resource list is empty and
    /// [`ConfigError::ZeroRotate`] when the rotation interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resources.is_empty() {
            return Err(ConfigError::NoResources);
        }

        if self.rotate.is_zero() {
            return Err(ConfigError::ZeroRotate);
        }

        Ok(())
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
