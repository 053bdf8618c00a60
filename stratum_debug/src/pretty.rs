// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use stratum_core::trace::{
    CommitFinishedEvent, CommitKind, CommitRequestedEvent, DamageRect, LayerPushed,
    PrepaintPostedEvent, PrepaintTriggeredEvent, PropertyTreesRebuiltEvent,
    PropertyTreesUpdatedEvent, TraceSink, UpdateLayersEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn kind_name(kind: CommitKind) -> &'static str {
    match kind {
        CommitKind::Full => "full",
        CommitKind::NoRebuild => "no-rebuild",
        CommitKind::FullTreeSync => "full-tree-sync",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_commit_requested(&mut self, e: &CommitRequestedEvent) {
        let _ = writeln!(self.writer, "[commit:requested] kind={}", kind_name(e.kind));
    }

    fn on_property_trees_rebuilt(&mut self, e: &PropertyTreesRebuiltEvent) {
        let _ = writeln!(
            self.writer,
            "[trees:rebuilt] seq={} transform={} clip={} effect={} scroll={}",
            e.sequence_number, e.transform_nodes, e.clip_nodes, e.effect_nodes, e.scroll_nodes,
        );
    }

    fn on_property_trees_updated(&mut self, e: &PropertyTreesUpdatedEvent) {
        let _ = writeln!(self.writer, "[trees:updated] seq={}", e.sequence_number);
    }

    fn on_update_layers(&mut self, e: &UpdateLayersEvent) {
        let gpu = if e.gpu_suitable { "suitable" } else { "unsuitable" };
        let _ = writeln!(
            self.writer,
            "[update] frame={} visited={} painted={} gpu={gpu}",
            e.source_frame_number, e.layers_visited, e.layers_painted,
        );
    }

    fn on_commit_finished(&mut self, e: &CommitFinishedEvent) {
        let _ = writeln!(
            self.writer,
            "[commit:finished] frame={} pushed={}",
            e.source_frame_number, e.layers_pushed,
        );
    }

    fn on_prepaint_posted(&mut self, e: &PrepaintPostedEvent) {
        let _ = writeln!(self.writer, "[prepaint:posted] delay={}ms", e.delay_ms);
    }

    fn on_prepaint_triggered(&mut self, e: &PrepaintTriggeredEvent) {
        let _ = writeln!(self.writer, "[prepaint:fired] frame={}", e.source_frame_number);
    }

    fn on_layers_pushed(&mut self, source_frame_number: u64, layers: &[LayerPushed]) {
        let _ = writeln!(
            self.writer,
            "[layers:pushed] frame={source_frame_number} count={}",
            layers.len(),
        );
        for l in layers {
            let scrollbar = if l.scrollbar { " scrollbar" } else { "" };
            let _ = writeln!(
                self.writer,
                "  layer={} transform={} effect={}{scrollbar}",
                l.layer.0, l.transform_tree_index, l.effect_tree_index,
            );
        }
    }

    fn on_damage_rects(&mut self, source_frame_number: u64, rects: &[DamageRect]) {
        let _ = writeln!(
            self.writer,
            "[damage] frame={source_frame_number} count={}",
            rects.len(),
        );
        for r in rects {
            let _ = writeln!(
                self.writer,
                "  layer={} ({:.1}, {:.1}) {:.1}x{:.1}",
                r.layer.0, r.x, r.y, r.width, r.height,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kurbo::Size;
    use stratum_core::animation::NoopMutatorHost;
    use stratum_core::host::LayerTreeHost;
    use stratum_core::impl_tree::LayerTreeImpl;
    use stratum_core::layer::{LayerKey, LayerKeyAllocator};
    use stratum_core::layer_tree::LayerTree;
    use stratum_core::proxy::NullProxy;
    use stratum_core::settings::LayerTreeSettings;

    use super::*;

    #[test]
    fn pretty_print_writes_one_line_per_event() {
        let mut sink = PrettyPrintSink::with_writer(Vec::new());
        sink.on_commit_requested(&CommitRequestedEvent {
            kind: CommitKind::NoRebuild,
        });
        sink.on_property_trees_rebuilt(&PropertyTreesRebuiltEvent {
            sequence_number: 3,
            transform_nodes: 2,
            clip_nodes: 3,
            effect_nodes: 2,
            scroll_nodes: 2,
        });
        sink.on_update_layers(&UpdateLayersEvent {
            source_frame_number: 7,
            layers_visited: 4,
            layers_painted: 1,
            gpu_suitable: false,
        });

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3, "one line per event");
        assert_eq!(lines[0], "[commit:requested] kind=no-rebuild");
        assert!(lines[1].starts_with("[trees:rebuilt] seq=3"), "{}", lines[1]);
        assert_eq!(lines[2], "[update] frame=7 visited=4 painted=1 gpu=unsuitable");
    }

    #[test]
    fn rich_events_list_each_record() {
        let mut sink = PrettyPrintSink::with_writer(Vec::new());
        sink.on_damage_rects(
            2,
            &[DamageRect {
                layer: LayerKey(5),
                x: 1.0,
                y: 2.0,
                width: 10.0,
                height: 20.0,
            }],
        );
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "[damage] frame=2 count=1\n  layer=5 (1.0, 2.0) 10.0x20.0\n");
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn host_frame_traces_every_stage() {
        let buf = SharedBuf::default();
        let tree = LayerTree::new(Box::new(NullProxy), Box::new(NoopMutatorHost))
            .with_key_allocator(LayerKeyAllocator::sequential(1));
        let mut host = LayerTreeHost::with_layer_tree(LayerTreeSettings::default(), tree);
        host.set_trace_sink(Some(Box::new(PrettyPrintSink::with_writer(buf.clone()))));
        let t = host.layer_tree_mut();
        t.set_viewport_size(Size::new(50.0, 50.0));
        let root = t.create_layer();
        t.set_bounds(root, Size::new(50.0, 50.0));
        t.set_is_drawable(root, true);
        t.set_root_layer(Some(root));

        let mut impl_tree = LayerTreeImpl::new();
        host.commit(&mut impl_tree);

        let out = String::from_utf8(buf.0.borrow().clone()).unwrap();
        for tag in ["[commit:requested]", "[trees:rebuilt]", "[trees:updated]", "[update]", "[layers:pushed]", "[commit:finished]"] {
            assert!(out.contains(tag), "missing {tag} in:\n{out}");
        }
    }
}
