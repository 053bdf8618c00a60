// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Painting the layers of the update list.

use kurbo::Rect;

use super::LayerTree;
use crate::layer::{LayerKind, PaintContext, PaintProperties, UiResourceId};
use crate::math::union_rects;

/// What painting one layer reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct LayerPaint {
    /// New content was produced.
    pub(crate) updated: bool,
    pub(crate) gpu_suitable: bool,
    /// Another pass is wanted soon.
    pub(crate) needs_more_updates: bool,
}

impl LayerTree {
    /// Paints every slot of `update_list`, with mutation locked out for the
    /// duration.
    pub(crate) fn paint_layer_contents(&mut self, update_list: &[u32]) -> (usize, LayerPaint) {
        self.in_paint_layer_contents = true;
        let mut summary = LayerPaint {
            gpu_suitable: true,
            ..LayerPaint::default()
        };
        let mut painted = 0;
        for &idx in update_list {
            self.save_paint_properties(idx);
        }
        for &idx in update_list {
            let result = self.update_layer(idx);
            if result.updated {
                painted += 1;
            }
            summary.updated |= result.updated;
            summary.gpu_suitable &= result.gpu_suitable;
            summary.needs_more_updates |= result.needs_more_updates;
        }
        self.in_paint_layer_contents = false;
        (painted, summary)
    }

    /// Snapshots what the commit will push for `idx`.
    fn save_paint_properties(&mut self, idx: u32) {
        let i = idx as usize;
        self.store.state[i].paint_properties = PaintProperties {
            bounds: self.store.inputs[i].bounds,
            source_frame_number: Some(self.source_frame_number),
        };
    }

    fn update_layer(&mut self, idx: u32) -> LayerPaint {
        let i = idx as usize;
        let ctx = PaintContext {
            source_frame_number: self.source_frame_number,
            bounds: self.store.inputs[i].bounds,
            update_rect: self.store.inputs[i].update_rect,
            visible_layer_rect: self.store.state[i].visible_layer_rect,
            screen_space_transform: self.main_screen_space_transform(idx),
            device_scale_factor: self.device_scale_factor,
        };

        let counter = &mut self.next_ui_resource_id;
        let mut next_resource_id = || {
            let id = UiResourceId(*counter);
            *counter += 1;
            id
        };
        let kind = &mut self.store.kind[i];
        let mut needs_push = false;
        let updated = match kind {
            LayerKind::Basic => false,
            LayerKind::Content(painter) => painter.update(&ctx),
            LayerKind::PaintedScrollbar(scrollbar) => {
                let update = scrollbar.update(&ctx, &mut next_resource_id);
                if update.needs_display {
                    let inputs = &mut self.store.inputs[i];
                    inputs.update_rect = union_rects(
                        inputs.update_rect,
                        Rect::from_origin_size((0.0, 0.0), inputs.bounds),
                    );
                }
                needs_push = update.needs_push;
                update.updated
            }
        };
        let kind = &self.store.kind[i];
        let result = LayerPaint {
            updated,
            gpu_suitable: kind.is_suitable_for_gpu_rasterization(),
            needs_more_updates: kind.needs_more_updates(),
        };
        if needs_push || updated {
            self.set_needs_push_properties(idx);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use kurbo::{Point, Size};

    use crate::animation::NoopMutatorHost;
    use crate::layer::{ContentPainter, LayerKeyAllocator, PaintContext};
    use crate::layer_tree::LayerTree;
    use crate::proxy::NullProxy;

    #[derive(Debug)]
    struct CountingPainter {
        calls: Arc<AtomicUsize>,
        gpu: bool,
    }

    impl ContentPainter for CountingPainter {
        fn update(&mut self, ctx: &PaintContext) -> bool {
            assert_eq!(ctx.bounds, Size::new(40.0, 40.0), "painted with the layer bounds");
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn is_suitable_for_gpu_rasterization(&self) -> bool {
            self.gpu
        }
    }

    #[test]
    fn painting_snapshots_bounds_and_reports_suitability() {
        let mut t = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        t.set_viewport_size(Size::new(100.0, 100.0));
        let root = t.create_layer();
        t.set_bounds(root, Size::new(100.0, 100.0));
        t.set_root_layer(Some(root));
        let calls = Arc::new(AtomicUsize::new(0));
        let content = t.create_content_layer(Box::new(CountingPainter {
            calls: Arc::clone(&calls),
            gpu: false,
        }));
        t.add_child(root, content);
        t.set_bounds(content, Size::new(40.0, 40.0));
        t.set_position(content, Point::new(10.0, 10.0));
        t.set_is_drawable(content, true);

        t.build_property_trees();
        let list = t.find_layers_that_need_updates(true);
        assert_eq!(list, [content.idx]);
        t.compute_visible_rects(&list);
        let (painted, summary) = t.paint_layer_contents(&list);
        assert_eq!(painted, 1);
        assert!(summary.updated);
        assert!(!summary.gpu_suitable, "one unsuitable layer taints the frame");
        assert!(!t.in_paint_layer_contents(), "paint lock released");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(t.layer(content).paint_properties().source_frame_number, Some(0));
        assert_eq!(t.layer(content).paint_properties().bounds, Size::new(40.0, 40.0));
    }
}
