// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

/// Non-cryptographic random number generator used to shuffle resources.
///
/// This RNG is **NOT cryptographically secure**. Spreading load across mirrors does not
/// need cryptographic guarantees, so a lightweight generator is enough.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Test(std::sync::Arc<dyn Fn(usize) -> usize + Send + Sync>),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Test(_) => write!(f, "Test"),
        }
    }
}

impl Rnd {
    #[cfg(test)]
    pub fn new_function<F>(f: F) -> Self
    where
        F: Fn(usize) -> usize + Send + Sync + 'static,
    {
        Self::Test(std::sync::Arc::new(f))
    }

    /// Returns a value in `0..bound`. `bound` must be non-zero.
    pub fn next_below(&self, bound: usize) -> usize {
        match self {
            Self::Real => fastrand::usize(..bound),
            #[cfg(test)]
            Self::Test(generator) => generator(bound) % bound,
        }
    }
}
