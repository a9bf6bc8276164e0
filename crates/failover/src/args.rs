// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Arguments for the [`on_index_update`][crate::Failover::on_index_update] callback function.
///
/// Provides context when a query succeeded on a resource other than the one it tried first.
#[derive(Debug)]
pub struct IndexUpdateArgs {
    pub(crate) resource_index: usize,
    pub(crate) attempts: usize,
}

impl IndexUpdateArgs {
    /// Returns the position, within the configured resources, of the resource that answered.
    #[must_use]
    pub fn resource_index(&self) -> usize {
        self.resource_index
    }

    /// Returns how many attempts were sent before the query completed. Always greater than one.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_update_args() {
        let args = IndexUpdateArgs {
            resource_index: 3,
            attempts: 2,
        };

        assert_eq!(args.resource_index(), 3);
        assert_eq!(args.attempts(), 2);
    }
}
