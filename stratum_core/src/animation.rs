// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The animation collaborator.
//!
//! Curve evaluation lives outside this crate. The layer tree only asks a
//! [`MutatorHost`] whether an element may animate (to decide which property
//! nodes must exist) and receives the evaluated values through
//! [`LayerTree::set_element_opacity_mutated`] and its siblings.
//!
//! [`LayerTree::set_element_opacity_mutated`]: crate::layer_tree::LayerTree::set_element_opacity_mutated

use core::fmt;

use crate::layer::ElementId;

/// Which animation state an `*_is_animating_changed` notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimationChangeType {
    /// Whether an animation may run.
    Potential,
    /// Whether an animation is running right now.
    Running,
    /// Both of the above changed to the same value.
    Both,
}

impl AnimationChangeType {
    /// Whether the potential-animation state is affected.
    #[inline]
    #[must_use]
    pub const fn affects_potential(self) -> bool {
        matches!(self, Self::Potential | Self::Both)
    }

    /// Whether the currently-running state is affected.
    #[inline]
    #[must_use]
    pub const fn affects_running(self) -> bool {
        matches!(self, Self::Running | Self::Both)
    }
}

/// Per-element animation queries and registration.
///
/// All queries default to "nothing animates" so a host without animations can
/// use [`NoopMutatorHost`].
pub trait MutatorHost: fmt::Debug {
    /// An element entered the layer tree.
    fn register_element(&mut self, element: ElementId) {
        _ = element;
    }

    /// An element left the layer tree.
    fn unregister_element(&mut self, element: ElementId) {
        _ = element;
    }

    /// Any animation, of any property, is attached to the element.
    fn has_any_animation(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// Some animation targets the element's transform.
    fn has_any_transform_animation(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// A transform animation may run.
    fn has_potential_transform_animation(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// A transform animation is running.
    fn is_animating_transform(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// An opacity animation may run.
    fn has_potential_opacity_animation(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// An opacity animation is running.
    fn is_animating_opacity(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// A filter animation may run.
    fn has_potential_filter_animation(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// A filter animation is running.
    fn is_animating_filter(&self, element: ElementId) -> bool {
        _ = element;
        false
    }

    /// Every transform animation on the element is a pure translation.
    fn has_only_translation_transforms(&self, element: ElementId) -> bool {
        _ = element;
        true
    }

    /// No transform animation on the element ever rotates or skews.
    fn animations_preserve_axis_alignment(&self, element: ElementId) -> bool {
        _ = element;
        true
    }
}

/// A [`MutatorHost`] with no animations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMutatorHost;

impl MutatorHost for NoopMutatorHost {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_flags() {
        assert!(AnimationChangeType::Potential.affects_potential());
        assert!(!AnimationChangeType::Potential.affects_running());
        assert!(AnimationChangeType::Running.affects_running());
        assert!(AnimationChangeType::Both.affects_potential());
        assert!(AnimationChangeType::Both.affects_running());
    }

    #[test]
    fn noop_host_reports_static_content() {
        let host = NoopMutatorHost;
        let e = ElementId(3);
        assert!(!host.has_any_animation(e));
        assert!(!host.has_potential_opacity_animation(e));
        assert!(host.has_only_translation_transforms(e));
        assert!(host.animations_preserve_axis_alignment(e));
    }
}
