// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scheduling collaborator.
//!
//! A [`Proxy`] receives one-way signals from the main-side tree and decides
//! when the next frame runs. Stratum never blocks on it; every method
//! returns immediately.

use alloc::sync::Arc;

use crate::copy_request::TaskRunner;

/// One-way signals from the main-side tree to the scheduler.
///
/// Every method defaults to a no-op so test doubles only override what they
/// count.
pub trait Proxy {
    /// A commit is needed.
    fn set_needs_commit(&mut self) {}

    /// Layers need painting, but the property trees are otherwise current.
    fn set_needs_update_layers(&mut self) {}

    /// The next commit must not activate before the committed side has drawn.
    fn set_next_commit_waits_for_activation(&mut self) {}

    /// Asks for [`LayerTreeHost::trigger_prepaint`] to run after `delay_ms`.
    ///
    /// [`LayerTreeHost::trigger_prepaint`]: crate::host::LayerTreeHost::trigger_prepaint
    fn post_delayed_prepaint(&mut self, delay_ms: u64) {
        _ = delay_ms;
    }

    /// Cancels a prepaint posted earlier, if it has not fired yet.
    fn cancel_prepaint(&mut self) {}

    /// The runner relayed copy requests post their results to.
    ///
    /// Without one, relayed results are delivered on whichever timeline
    /// produced them.
    fn main_thread_task_runner(&self) -> Option<Arc<dyn TaskRunner>> {
        None
    }
}

/// A [`Proxy`] that ignores every signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProxy;

impl Proxy for NullProxy {}
