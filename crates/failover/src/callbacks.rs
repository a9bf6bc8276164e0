// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::IndexUpdateArgs;

#[derive(Clone)]
pub(crate) struct OnIndexUpdate(Arc<dyn Fn(IndexUpdateArgs) + Send + Sync>);

impl OnIndexUpdate {
    pub(crate) fn new(f: impl Fn(IndexUpdateArgs) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, args: IndexUpdateArgs) {
        (self.0)(args);
    }
}

impl std::fmt::Debug for OnIndexUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnIndexUpdate").finish()
    }
}

/// Hook registered through [`Attempt::on_cancel`][crate::Attempt::on_cancel].
pub(crate) struct CancelHook(Box<dyn FnOnce() + Send>);

impl CancelHook {
    pub(crate) fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn call(self) {
        (self.0)();
    }
}

impl std::fmt::Debug for CancelHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHook").finish()
    }
}
