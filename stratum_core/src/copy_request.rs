// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Requests to read back a layer subtree's rendered output.
//!
//! The readback itself happens outside this crate. A [`CopyOutputRequest`]
//! carries an optional area, an optional source token used to deduplicate
//! requests from the same client, and a one-shot callback. A request that is
//! dropped without a result answers with an empty one, so a callback always
//! runs exactly once.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Rect, Size};

use crate::math::intersect_rects;

/// Pixels produced for a copy request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyOutputResult {
    /// Size of the copied region, in physical pixels.
    pub size: Size,
    /// Tightly packed RGBA8 rows; empty for an empty result.
    pub pixels: Vec<u8>,
}

impl CopyOutputResult {
    /// A result carrying no pixels.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the result carries no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// One-shot completion callback of a [`CopyOutputRequest`].
pub type CopyCallback = Box<dyn FnOnce(CopyOutputResult) + Send>;

/// Runs tasks on the main timeline.
///
/// Results of copy requests are produced on the committed side; relayed
/// requests hop back through this hook before invoking the caller's callback.
pub trait TaskRunner: Send + Sync {
    /// Schedules `task` to run on the main timeline.
    fn post_task(&self, task: Box<dyn FnOnce() + Send>);
}

/// A pending readback.
pub struct CopyOutputRequest {
    source: Option<u64>,
    area: Option<Rect>,
    callback: Option<CopyCallback>,
}

impl fmt::Debug for CopyOutputRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOutputRequest")
            .field("source", &self.source)
            .field("area", &self.area)
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

impl CopyOutputRequest {
    /// Creates a request answered through `callback`.
    pub fn new(callback: impl FnOnce(CopyOutputResult) + Send + 'static) -> Self {
        Self {
            source: None,
            area: None,
            callback: Some(Box::new(callback)),
        }
    }

    /// Tags the request with a source token. A newer request with the same
    /// token replaces an older one still queued on the layer.
    #[must_use]
    pub fn with_source(mut self, source: u64) -> Self {
        self.source = Some(source);
        self
    }

    /// Limits the copy to `area`, in layer space.
    #[must_use]
    pub fn with_area(mut self, area: Rect) -> Self {
        self.area = Some(area);
        self
    }

    /// The source token, if any.
    #[must_use]
    pub fn source(&self) -> Option<u64> {
        self.source
    }

    /// The requested area, if any.
    #[must_use]
    pub fn area(&self) -> Option<Rect> {
        self.area
    }

    /// Whether an area was set.
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.area.is_some()
    }

    /// Whether the request has already been answered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback.is_none()
    }

    /// Answers the request.
    pub fn send_result(mut self, result: CopyOutputResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// Answers the request with an empty result.
    pub fn send_empty_result(self) {
        self.send_result(CopyOutputResult::empty());
    }

    /// Wraps this request for hand-off to the committed side.
    ///
    /// The returned request keeps the source token and the area (clamped to
    /// `bounds`); its result is posted through `runner` and delivered to this
    /// request on the main timeline.
    #[must_use]
    pub fn relay(self, runner: Arc<dyn TaskRunner>, bounds: Rect) -> Self {
        let source = self.source;
        let area = self.area.map(|area| intersect_rects(area, bounds));
        let mut relayed = Self::new(move |result| {
            runner.post_task(Box::new(move || self.send_result(result)));
        });
        relayed.source = source;
        relayed.area = area;
        relayed
    }
}

impl Drop for CopyOutputRequest {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(CopyOutputResult::empty());
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct QueueRunner(Mutex<Vec<Box<dyn FnOnce() + Send>>>);

    impl TaskRunner for QueueRunner {
        fn post_task(&self, task: Box<dyn FnOnce() + Send>) {
            self.0.lock().expect("lock").push(task);
        }
    }

    impl QueueRunner {
        fn run_all(&self) {
            let tasks: Vec<_> = self.0.lock().expect("lock").drain(..).collect();
            for task in tasks {
                task();
            }
        }
    }

    #[test]
    fn dropped_request_answers_empty() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        drop(CopyOutputRequest::new(move |r| *sink.lock().expect("lock") = Some(r)));
        assert_eq!(*seen.lock().expect("lock"), Some(CopyOutputResult::empty()));
    }

    #[test]
    fn relay_posts_to_runner_and_clamps_area() {
        let runner = Arc::new(QueueRunner::default());
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let request = CopyOutputRequest::new(move |r: CopyOutputResult| {
            *sink.lock().expect("lock") = Some(r.size);
        })
        .with_source(7)
        .with_area(Rect::new(-10.0, -10.0, 50.0, 50.0));
        let relayed = request.relay(runner.clone(), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(relayed.source(), Some(7));
        assert_eq!(relayed.area(), Some(Rect::new(0.0, 0.0, 20.0, 20.0)));

        relayed.send_result(CopyOutputResult {
            size: Size::new(20.0, 20.0),
            pixels: alloc::vec![0; 20 * 20 * 4],
        });
        // Nothing reaches the caller until the main timeline runs the task.
        assert!(seen.lock().expect("lock").is_none());
        runner.run_all();
        assert_eq!(*seen.lock().expect("lock"), Some(Size::new(20.0, 20.0)));
    }
}
