// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Error returned when a [`FailoverConfig`][crate::FailoverConfig] cannot drive a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The resource list is empty, so there is nothing to send a query to.
    #[error("at least one resource is required")]
    NoResources,

    /// The rotation interval is zero, which would launch every attempt at once in a busy loop.
    #[error("rotation interval must be greater than zero")]
    ZeroRotate,
}

/// Error delivered by a [`Query`][crate::Query] that did not complete successfully.
///
/// Per-resource failures are not aggregated. Callers that need diagnostics for each
/// resource should record them in their [`Transport`][crate::Transport].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError<E> {
    /// Every resource was tried and none of them produced a result.
    #[error("no resource answered after {attempts} attempts")]
    Exhausted {
        /// Number of attempts that were sent.
        attempts: usize,
        /// Error reported by the most recent attempt that failed explicitly, if any.
        last_error: Option<E>,
    },

    /// The query was aborted before any resource answered.
    #[error("query was aborted")]
    Aborted,
}

impl<E> QueryError<E> {
    /// Returns `true` if the query failed because every resource was exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Returns `true` if the query was aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns the last explicit error reported by a transport, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { last_error, .. } => last_error.as_ref(),
            Self::Aborted => None,
        }
    }

    /// Consumes the error and returns the last explicit transport error, if any.
    #[must_use]
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } => last_error,
            Self::Aborted => None,
        }
    }
}
