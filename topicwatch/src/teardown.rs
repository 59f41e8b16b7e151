//! Ordered release of fabric handles.
//!
//! Handles are pushed in the order they are acquired and released in the
//! reverse order. A failed release is logged and the remaining releases
//! still run. An unreleased stack releases itself on drop, so early returns
//! and panics on the startup path still close everything.

use topicwatch_core::error::Result as FabricResult;
use tracing::{debug, warn, Span};

type Release = Box<dyn FnOnce() -> FabricResult<()>>;

/// Stack of pending release actions.
pub struct Teardown {
    actions: Vec<(&'static str, Release)>,
    span: Span,
}

impl Teardown {
    pub fn new(span: Span) -> Self {
        Self {
            actions: Vec::new(),
            span,
        }
    }

    /// Record how to release a handle that was just acquired.
    pub fn push(
        &mut self,
        label: &'static str,
        release: impl FnOnce() -> FabricResult<()> + 'static,
    ) {
        self.actions.push((label, Box::new(release)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every release action, newest first. Returns how many failed.
    pub fn release_all(&mut self) -> usize {
        let _entered = self.span.enter();
        let mut failed = 0;
        while let Some((label, release)) = self.actions.pop() {
            match release() {
                Ok(()) => debug!("closed {label}"),
                Err(e) => {
                    failed += 1;
                    warn!("failed to close {label}: {e}");
                }
            }
        }
        failed
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            self.release_all();
        }
    }
}
