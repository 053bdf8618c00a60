// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-wide configuration.

/// Configuration of a [`LayerTreeHost`](crate::host::LayerTreeHost).
///
/// Settings are fixed for the lifetime of the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerTreeSettings {
    /// Layers may render into non-root surfaces. When off, every layer draws
    /// straight into the root surface and clips are resolved in screen space.
    pub can_render_to_separate_surface: bool,
    /// The embedder allows GPU rasterization once the content is suitable.
    pub gpu_rasterization_enabled: bool,
    /// GPU rasterization is used regardless of content suitability.
    pub gpu_rasterization_forced: bool,
    /// Delay before a deferred prepaint fires, in milliseconds.
    pub prepaint_delay_ms: u64,
    /// Recompute property trees from scratch after each update and compare.
    pub verify_property_trees: bool,
    /// Cull back-facing layers while building the main-side update list.
    pub use_main_thread_backface_culling: bool,
}

impl Default for LayerTreeSettings {
    fn default() -> Self {
        Self {
            can_render_to_separate_surface: true,
            gpu_rasterization_enabled: false,
            gpu_rasterization_forced: false,
            prepaint_delay_ms: 100,
            verify_property_trees: false,
            use_main_thread_backface_culling: true,
        }
    }
}
