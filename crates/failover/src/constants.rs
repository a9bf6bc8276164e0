// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default per-attempt timeout: 5 seconds.
///
/// Long enough for a slow mirror on a congested link to answer, short enough that a
/// dead mirror does not hold the caller for long once rotation has run out of resources.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default interval between launching successive attempts: 750 milliseconds.
///
/// A healthy resource normally answers well within this window, so in the common case
/// only a single attempt is ever sent.
pub(crate) const DEFAULT_ROTATE: Duration = Duration::from_millis(750);

/// Default name used for telemetry when none is configured.
pub(crate) const DEFAULT_NAME: &str = "default";
