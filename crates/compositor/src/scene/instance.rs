//! Render instances
//!
//! A render instance is the per-output, per-frame face of a scene node. It
//! holds only the node handle and whatever it caches between frames, and
//! reads the node's current state from the [`SceneGraph`] on every call.
//! Instance lists are rebuilt when the tree's children or enabled state
//! change and are otherwise kept across frames.

use std::fmt;
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::geometry::{Point, Rect};
use crate::region::Region;
use crate::render::{
    execute_instructions, schedule_from_list, InstructionList, RenderMapping, RenderTarget, Renderer,
    ScanoutOutput,
};
use crate::scene::{NodeId, NodeKind, SceneGraph};

/// Outcome of a direct scanout attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectScanout {
    /// The instance's buffer is now presented directly
    Success,
    /// The instance is visible on the output and cannot be scanned out, so
    /// nothing behind it can be either
    Occlusion,
    /// The instance does not affect this output
    Skip,
}

pub trait RenderInstance: fmt::Debug {
    fn node(&self) -> NodeId;

    /// Clip `damage` (render space) to this instance, record instructions,
    /// and remove any area this instance covers opaquely.
    fn schedule_instructions(
        &mut self,
        scene: &SceneGraph,
        target: &RenderTarget,
        damage: &mut Region,
        instructions: &mut InstructionList,
    );

    /// Draw exactly `region` (render space)
    fn render(&mut self, scene: &SceneGraph, target: &RenderTarget, region: &Region, renderer: &mut dyn Renderer);

    /// Record what of this instance is visible and remove its opaque area
    /// from `visible`
    fn compute_visibility(&mut self, scene: &SceneGraph, visible: &mut Region);

    fn try_scanout(&mut self, scene: &SceneGraph, output: &mut dyn ScanoutOutput) -> DirectScanout {
        let _ = (scene, output);
        DirectScanout::Skip
    }

    /// Push the nodes of visible client surfaces, for frame callbacks
    fn collect_visible(&self, _out: &mut Vec<NodeId>) {}
}

fn occlusion_or_skip(bbox: &Rect, output: &dyn ScanoutOutput) -> DirectScanout {
    if bbox.overlaps(&output.layout_geometry()) {
        DirectScanout::Occlusion
    } else {
        DirectScanout::Skip
    }
}

struct BufferContent<'a> {
    buffer: Option<&'a Rc<Buffer>>,
    opaque_region: &'a Region,
}

fn buffer_content(scene: &SceneGraph, node: NodeId) -> Option<BufferContent<'_>> {
    match scene.kind(node)? {
        NodeKind::Surface(s) => Some(BufferContent {
            buffer: s.buffer.as_ref(),
            opaque_region: &s.opaque_region,
        }),
        NodeKind::Snapshot(s) => Some(BufferContent {
            buffer: s.buffer.as_ref(),
            opaque_region: &s.opaque_region,
        }),
        _ => None,
    }
}

/// Instance for live surfaces and snapshots
#[derive(Debug)]
pub struct BufferInstance {
    node: NodeId,
    /// Live surfaces can be scanned out and get frame callbacks
    live: bool,
    last_visibility: Region,
}

impl BufferInstance {
    pub fn new(node: NodeId, live: bool) -> Self {
        Self {
            node,
            live,
            last_visibility: Region::new(),
        }
    }

    pub fn last_visibility(&self) -> &Region {
        &self.last_visibility
    }

    /// Opaque area in render space, empty if it may not be trusted
    fn opaque_area(&self, scene: &SceneGraph, target_alpha: f32, bbox: &Rect) -> Region {
        if !scene.opaque_optimizations() || target_alpha < 1.0 {
            return Region::new();
        }
        match buffer_content(scene, self.node) {
            Some(BufferContent {
                buffer: Some(_),
                opaque_region,
                ..
            }) => opaque_region
                .translated(scene.render_space_offset(self.node))
                .intersect_rect(bbox),
            _ => Region::new(),
        }
    }
}

impl RenderInstance for BufferInstance {
    fn node(&self) -> NodeId {
        self.node
    }

    fn schedule_instructions(
        &mut self,
        scene: &SceneGraph,
        target: &RenderTarget,
        damage: &mut Region,
        instructions: &mut InstructionList,
    ) {
        let bbox = scene.render_space_box(self.node);
        let ours = damage.intersect_rect(&bbox);
        if ours.is_empty() {
            return;
        }
        instructions.push(target, ours);
        let opaque = self.opaque_area(scene, target.alpha(), &bbox);
        damage.subtract_with(&opaque);
    }

    fn render(&mut self, scene: &SceneGraph, target: &RenderTarget, region: &Region, renderer: &mut dyn Renderer) {
        // A destroyed buffer draws nothing; whoever dropped it damaged the area.
        let Some(BufferContent {
            buffer: Some(buffer), ..
        }) = buffer_content(scene, self.node)
        else {
            return;
        };
        let dst = target.to_layout(&scene.render_space_box(self.node));
        let clip = target.clip_to_layout(region);
        renderer.draw_buffer(target, buffer, dst, &clip, target.alpha());
    }

    fn compute_visibility(&mut self, scene: &SceneGraph, visible: &mut Region) {
        let bbox = scene.render_space_box(self.node);
        self.last_visibility = visible.intersect_rect(&bbox);
        if !self.last_visibility.is_empty() {
            let opaque = self.opaque_area(scene, 1.0, &bbox);
            visible.subtract_with(&opaque);
        }
    }

    fn try_scanout(&mut self, scene: &SceneGraph, output: &mut dyn ScanoutOutput) -> DirectScanout {
        let bbox = scene.render_space_box(self.node);
        if !bbox.overlaps(&output.layout_geometry()) {
            return DirectScanout::Skip;
        }
        if !self.live {
            return DirectScanout::Occlusion;
        }
        let Some(surface) = scene.surface(self.node) else {
            return DirectScanout::Skip;
        };
        let Some(buffer) = surface.buffer.clone() else {
            return DirectScanout::Skip;
        };
        if bbox != output.layout_geometry() {
            return DirectScanout::Occlusion;
        }
        if surface.buffer_scale != output.scale() || surface.buffer_transform != output.transform() {
            return DirectScanout::Occlusion;
        }
        let full = Rect::from_loc_size(Point::ORIGIN, surface.size);
        if !surface.opaque_region.contains_rect(&full) {
            return DirectScanout::Occlusion;
        }
        if output.scanout(&buffer) {
            tracing::debug!(target: "wayscene::scanout", node = %self.node, buffer = buffer.id.0, "scanned out surface");
            DirectScanout::Success
        } else {
            DirectScanout::Occlusion
        }
    }

    fn collect_visible(&self, out: &mut Vec<NodeId>) {
        if self.live && !self.last_visibility.is_empty() {
            out.push(self.node);
        }
    }
}

/// Instance for solid colour leaves
#[derive(Debug)]
pub struct SolidInstance {
    node: NodeId,
}

impl SolidInstance {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }

    fn opaque(&self, scene: &SceneGraph, alpha: f32) -> bool {
        scene.opaque_optimizations()
            && alpha >= 1.0
            && matches!(scene.kind(self.node), Some(NodeKind::Solid(s)) if s.color.is_opaque())
    }
}

impl RenderInstance for SolidInstance {
    fn node(&self) -> NodeId {
        self.node
    }

    fn schedule_instructions(
        &mut self,
        scene: &SceneGraph,
        target: &RenderTarget,
        damage: &mut Region,
        instructions: &mut InstructionList,
    ) {
        let bbox = scene.render_space_box(self.node);
        let ours = damage.intersect_rect(&bbox);
        if ours.is_empty() {
            return;
        }
        instructions.push(target, ours);
        if self.opaque(scene, target.alpha()) {
            damage.subtract_rect(&bbox);
        }
    }

    fn render(&mut self, scene: &SceneGraph, target: &RenderTarget, region: &Region, renderer: &mut dyn Renderer) {
        let Some(NodeKind::Solid(solid)) = scene.kind(self.node) else {
            return;
        };
        let dst = target.to_layout(&scene.render_space_box(self.node));
        let clip = target.clip_to_layout(region);
        renderer.draw_solid(target, dst, &clip, solid.color.with_alpha(target.alpha()));
    }

    fn compute_visibility(&mut self, scene: &SceneGraph, visible: &mut Region) {
        if self.opaque(scene, 1.0) {
            visible.subtract_rect(&scene.render_space_box(self.node));
        }
    }

    fn try_scanout(&mut self, scene: &SceneGraph, output: &mut dyn ScanoutOutput) -> DirectScanout {
        occlusion_or_skip(&scene.render_space_box(self.node), output)
    }
}

/// Instance for transformer nodes.
///
/// Children are drawn in a sub-pass in the node's content space; the
/// sub-pass target maps that space through the transformer stack.
#[derive(Debug)]
pub struct TransformerInstance {
    node: NodeId,
    children: Vec<Box<dyn RenderInstance>>,
}

impl TransformerInstance {
    pub fn new(node: NodeId, children: Vec<Box<dyn RenderInstance>>) -> Self {
        Self { node, children }
    }

    fn mapping(&self, scene: &SceneGraph) -> Option<RenderMapping> {
        Some(RenderMapping {
            stack: scene.transformers(self.node)?.clone(),
            content: scene.local_box(self.node),
            offset: scene.render_space_offset(self.node),
        })
    }
}

impl RenderInstance for TransformerInstance {
    fn node(&self) -> NodeId {
        self.node
    }

    fn schedule_instructions(
        &mut self,
        scene: &SceneGraph,
        target: &RenderTarget,
        damage: &mut Region,
        instructions: &mut InstructionList,
    ) {
        let ours = damage.intersect_rect(&scene.render_space_box(self.node));
        if !ours.is_empty() {
            instructions.push(target, ours);
        }
    }

    fn render(&mut self, scene: &SceneGraph, target: &RenderTarget, region: &Region, renderer: &mut dyn Renderer) {
        let Some(mapping) = self.mapping(scene) else {
            return;
        };
        let mut child_damage = Region::from_rect(mapping.content);
        let child_target = target.nested(mapping, region);
        let mut list = InstructionList::new();
        schedule_from_list(&mut self.children, scene, &child_target, &mut child_damage, &mut list);
        execute_instructions(&mut self.children, list, scene, renderer);
    }

    fn compute_visibility(&mut self, scene: &SceneGraph, visible: &mut Region) {
        let bbox = scene.render_space_box(self.node);
        let mut child_visible = if visible.overlaps_rect(&bbox) {
            Region::from_rect(scene.local_box(self.node))
        } else {
            Region::new()
        };
        for child in &mut self.children {
            child.compute_visibility(scene, &mut child_visible);
        }
    }

    fn try_scanout(&mut self, scene: &SceneGraph, output: &mut dyn ScanoutOutput) -> DirectScanout {
        occlusion_or_skip(&scene.render_space_box(self.node), output)
    }

    fn collect_visible(&self, out: &mut Vec<NodeId>) {
        for child in &self.children {
            child.collect_visible(out);
        }
    }
}
