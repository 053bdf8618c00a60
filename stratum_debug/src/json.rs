// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON snapshots of property trees and committed layer trees.
//!
//! The snapshots are plain [`Value`]s meant for diffing and for loading into
//! ad-hoc viewers; they are not a stable serialization format and cannot be
//! read back.

use std::io::{self, Write};

use serde_json::{Value, json};

use stratum_core::impl_tree::{DrawProperties, LayerImpl, LayerTreeImpl, RenderSurface};
use stratum_core::layer::LayerKey;
use stratum_core::property_trees::{
    ClipNode, ClipTree, EffectNode, EffectTree, INVALID_NODE_ID, NodeId, PropertyTrees,
    ScrollNode, ScrollTree, TransformNode, TransformTree,
};
use stratum_core::transform::Transform3d;

use kurbo::{Rect, Size, Vec2};

/// Snapshot of all four trees.
#[must_use]
pub fn property_trees_to_json(trees: &PropertyTrees) -> Value {
    json!({
        "sequence_number": trees.sequence_number,
        "needs_rebuild": trees.needs_rebuild,
        "non_root_surfaces_enabled": trees.non_root_surfaces_enabled,
        "is_main_thread": trees.is_main_thread,
        "is_active": trees.is_active,
        "transform_tree": transform_tree_to_json(&trees.transform_tree),
        "effect_tree": effect_tree_to_json(&trees.effect_tree),
        "clip_tree": clip_tree_to_json(&trees.clip_tree),
        "scroll_tree": scroll_tree_to_json(&trees.scroll_tree),
    })
}

/// Snapshot of the transform tree, one object per node.
#[must_use]
pub fn transform_tree_to_json(tree: &TransformTree) -> Value {
    Value::Array(tree.iter().map(transform_node).collect())
}

/// Snapshot of the effect tree, one object per node.
#[must_use]
pub fn effect_tree_to_json(tree: &EffectTree) -> Value {
    Value::Array(tree.iter().map(effect_node).collect())
}

/// Snapshot of the clip tree, one object per node.
#[must_use]
pub fn clip_tree_to_json(tree: &ClipTree) -> Value {
    Value::Array(tree.iter().map(clip_node).collect())
}

/// Snapshot of the scroll tree: its nodes and the base scroll offsets.
#[must_use]
pub fn scroll_tree_to_json(tree: &ScrollTree) -> Value {
    let offsets: Vec<Value> = tree
        .scroll_offsets()
        .map(|(key, offset)| json!({ "layer": key.0, "offset": vec2(offset) }))
        .collect();
    json!({
        "nodes": tree.iter().map(scroll_node).collect::<Vec<_>>(),
        "scroll_offsets": offsets,
    })
}

/// Snapshot of a committed tree: scalars, layers in tree order, the draw
/// list and the render surfaces of the last draw-properties update.
#[must_use]
pub fn layer_tree_impl_to_json(tree: &LayerTreeImpl) -> Value {
    let layers: Vec<Value> = tree
        .layers_in_tree_order()
        .into_iter()
        .filter_map(|key| tree.layer(key))
        .map(layer_impl)
        .collect();
    let (min_scale, max_scale) = tree.page_scale_limits();
    let (top_height, top_ratio) = tree.top_controls();
    let viewport = tree.viewport_layers();
    json!({
        "source_frame_number": tree.source_frame_number(),
        "device_viewport_size": size(tree.device_viewport_size()),
        "device_scale_factor": tree.device_scale_factor(),
        "painted_device_scale_factor": tree.painted_device_scale_factor(),
        "page_scale_factor": tree.page_scale_factor(),
        "page_scale_limits": [min_scale, max_scale],
        "top_controls": { "height": top_height, "shown_ratio": top_ratio },
        "bottom_controls_height": tree.bottom_controls_height(),
        "elastic_overscroll": vec2(tree.elastic_overscroll()),
        "background_color": tree.background_color().0,
        "has_transparent_background": tree.has_transparent_background(),
        "use_gpu_rasterization": tree.use_gpu_rasterization(),
        "viewport_layers": {
            "page_scale": key(viewport.page_scale),
            "inner_viewport_scroll": key(viewport.inner_viewport_scroll),
            "outer_viewport_scroll": key(viewport.outer_viewport_scroll),
            "overscroll_elasticity": key(viewport.overscroll_elasticity),
        },
        "layers": layers,
        "draw_list": tree.draw_list().iter().map(|k| k.0).collect::<Vec<_>>(),
        "render_surfaces": tree.render_surfaces().iter().map(render_surface).collect::<Vec<_>>(),
        "property_trees": property_trees_to_json(tree.property_trees()),
    })
}

/// Writes `value` as pretty-printed JSON.
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn write_pretty<W: Write>(value: &Value, writer: W) -> io::Result<()> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn transform_node(n: &TransformNode) -> Value {
    json!({
        "id": n.id,
        "parent_id": node_id(n.parent_id),
        "owner": n.owner.0,
        "source_node_id": node_id(n.source_node_id),
        "local": matrix(&n.local),
        "to_parent": matrix(&n.to_parent),
        "to_screen": matrix(&n.to_screen),
        "source_offset": vec2(n.source_offset),
        "scroll_offset": vec2(n.scroll_offset),
        "sorting_context_id": n.sorting_context_id,
        "is_invertible": n.is_invertible,
        "ancestors_are_invertible": n.ancestors_are_invertible,
        "flattens_inherited_transform": n.flattens_inherited_transform,
        "node_and_ancestors_are_flat": n.node_and_ancestors_are_flat,
        "scrolls": n.scrolls,
        "has_potential_animation": n.has_potential_animation,
        "transform_changed": n.transform_changed,
    })
}

fn effect_node(n: &EffectNode) -> Value {
    json!({
        "id": n.id,
        "parent_id": node_id(n.parent_id),
        "owner": n.owner.0,
        "opacity": n.opacity,
        "screen_space_opacity": n.screen_space_opacity,
        "blend_mode": format!("{:?}", n.blend_mode),
        "filters": format!("{:?}", n.filters),
        "has_render_surface": n.has_render_surface,
        "surface_is_clipped": n.surface_is_clipped,
        "has_copy_request": n.has_copy_request,
        "num_copy_requests_in_subtree": n.num_copy_requests_in_subtree,
        "is_drawn": n.is_drawn,
        "hidden_by_backface_visibility": n.hidden_by_backface_visibility,
        "transform_id": node_id(n.transform_id),
        "clip_id": node_id(n.clip_id),
        "target_id": node_id(n.target_id),
        "surface_contents_scale": vec2(n.surface_contents_scale),
        "effect_changed": n.effect_changed,
    })
}

fn clip_node(n: &ClipNode) -> Value {
    json!({
        "id": n.id,
        "parent_id": node_id(n.parent_id),
        "owner": n.owner.0,
        "clip_type": format!("{:?}", n.clip_type),
        "clip": rect(n.clip),
        "clip_in_target_space": rect(n.clip_in_target_space),
        "combined_clip_in_target_space": rect(n.combined_clip_in_target_space),
        "transform_id": node_id(n.transform_id),
        "target_transform_id": node_id(n.target_transform_id),
        "target_effect_id": node_id(n.target_effect_id),
        "layers_are_clipped": n.layers_are_clipped,
        "target_is_clipped": n.target_is_clipped,
        "resets_clip": n.resets_clip,
    })
}

fn scroll_node(n: &ScrollNode) -> Value {
    json!({
        "id": n.id,
        "parent_id": node_id(n.parent_id),
        "owner": n.owner.0,
        "scrollable": n.scrollable,
        "main_thread_scrolling_reasons": n.main_thread_scrolling_reasons.0,
        "scroll_clip_layer_bounds": size(n.scroll_clip_layer_bounds),
        "bounds": size(n.bounds),
        "user_scrollable": [n.user_scrollable_horizontal, n.user_scrollable_vertical],
        "transform_id": node_id(n.transform_id),
    })
}

fn layer_impl(l: &LayerImpl) -> Value {
    json!({
        "key": l.key().0,
        "parent": key(l.parent()),
        "children": l.children().iter().map(|k| k.0).collect::<Vec<_>>(),
        "mask_layer": key(l.mask_layer()),
        "replica_layer": key(l.replica_layer()),
        "bounds": size(l.bounds()),
        "opacity": l.opacity(),
        "draws_content": l.draws_content(),
        "is_mask": l.is_mask(),
        "transform_tree_index": node_id(l.transform_tree_index()),
        "effect_tree_index": node_id(l.effect_tree_index()),
        "clip_tree_index": node_id(l.clip_tree_index()),
        "scroll_tree_index": node_id(l.scroll_tree_index()),
        "offset_to_transform_parent": vec2(l.offset_to_transform_parent()),
        "update_rect": rect(l.update_rect()),
        "layer_property_changed": l.layer_property_changed(),
        "draw_properties": draw_properties(l.draw_properties()),
    })
}

fn draw_properties(p: &DrawProperties) -> Value {
    json!({
        "target_space_transform": matrix(&p.target_space_transform),
        "screen_space_transform": matrix(&p.screen_space_transform),
        "opacity": p.opacity,
        "visible_layer_rect": rect(p.visible_layer_rect),
        "clip_rect": rect(p.clip_rect),
        "is_clipped": p.is_clipped,
        "drawable_content_rect": rect(p.drawable_content_rect),
    })
}

fn render_surface(s: &RenderSurface) -> Value {
    json!({
        "effect_id": s.effect_id,
        "owner": s.owner.0,
        "draw_opacity": s.draw_opacity,
        "draw_transform": matrix(&s.draw_transform),
        "screen_space_transform": matrix(&s.screen_space_transform),
        "is_clipped": s.is_clipped,
        "clip_rect": rect(s.clip_rect),
        "replica_draw_transform": s.replica_draw_transform.as_ref().map(matrix),
    })
}

// -- value helpers --------------------------------------------------------

/// `null` for the invalid id, the id otherwise.
fn node_id(id: NodeId) -> Value {
    if id == INVALID_NODE_ID { Value::Null } else { json!(id) }
}

fn key(key: Option<LayerKey>) -> Value {
    key.map_or(Value::Null, |k| json!(k.0))
}

fn matrix(t: &Transform3d) -> Value {
    json!(t.cols)
}

fn rect(r: Rect) -> Value {
    json!([r.x0, r.y0, r.x1, r.y1])
}

fn size(s: Size) -> Value {
    json!([s.width, s.height])
}

fn vec2(v: Vec2) -> Value {
    json!([v.x, v.y])
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Size};
    use stratum_core::animation::NoopMutatorHost;
    use stratum_core::host::LayerTreeHost;
    use stratum_core::impl_tree::LayerTreeImpl;
    use stratum_core::layer::LayerKeyAllocator;
    use stratum_core::layer_tree::LayerTree;
    use stratum_core::proxy::NullProxy;
    use stratum_core::settings::LayerTreeSettings;

    use super::*;

    fn committed_tree() -> LayerTreeImpl {
        let tree = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        let mut host = LayerTreeHost::with_layer_tree(LayerTreeSettings::default(), tree);
        let t = host.layer_tree_mut();
        t.set_viewport_size(Size::new(200.0, 100.0));
        let root = t.create_layer();
        t.set_bounds(root, Size::new(200.0, 100.0));
        t.set_root_layer(Some(root));
        let child = t.create_layer();
        t.add_child(root, child);
        t.set_bounds(child, Size::new(20.0, 20.0));
        t.set_position(child, Point::new(5.0, 5.0));
        t.set_is_drawable(child, true);
        t.set_opacity(child, 0.5);

        let mut impl_tree = LayerTreeImpl::new();
        host.commit(&mut impl_tree);
        impl_tree.update_draw_properties(true);
        impl_tree
    }

    #[test]
    fn committed_tree_dump_lists_layers_in_tree_order() {
        let tree = committed_tree();
        let value = layer_tree_impl_to_json(&tree);
        let layers = value["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0]["key"], 1);
        assert_eq!(layers[0]["parent"], Value::Null);
        assert_eq!(layers[1]["key"], 2);
        assert_eq!(layers[1]["opacity"], 0.5);
        assert_eq!(layers[1]["draw_properties"]["drawable_content_rect"], json!([5.0, 5.0, 25.0, 25.0]));
        assert_eq!(value["draw_list"], json!([2]));
        assert_eq!(value["device_viewport_size"], json!([200.0, 100.0]));
    }

    #[test]
    fn property_tree_dump_has_one_entry_per_node() {
        let tree = committed_tree();
        let trees = tree.property_trees();
        let value = property_trees_to_json(trees);
        assert_eq!(value["transform_tree"].as_array().unwrap().len(), trees.transform_tree.len());
        assert_eq!(value["clip_tree"].as_array().unwrap().len(), trees.clip_tree.len());
        assert_eq!(value["effect_tree"][0]["parent_id"], Value::Null, "sentinel has no parent");
        assert_eq!(value["is_active"], true);
    }

    #[test]
    fn pretty_output_parses_back() {
        let value = layer_tree_impl_to_json(&committed_tree());
        let mut out = Vec::new();
        write_pretty(&value, &mut out).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, value);
    }
}
