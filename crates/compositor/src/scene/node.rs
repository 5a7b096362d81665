//! Node kinds and leaf content
//!
//! Instead of a class hierarchy, a node is a tagged [`NodeKind`]. Leaf kinds
//! share the [`NodeContent`] interface and may expose the optional pointer
//! and keyboard capabilities. Plugins add their own leaves through
//! [`NodeKind::Custom`].

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use smithay::utils::Transform;

use crate::buffer::{Buffer, Color};
use crate::geometry::{PointF, Rect, Size};
use crate::region::Region;
use crate::scene::instance::{BufferInstance, RenderInstance, SolidInstance};
use crate::scene::transform::TransformerStack;
use crate::scene::NodeId;

/// Layers directly under the scene root, back to front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layer {
    Background,
    Workspace,
    Top,
    Overlay,
}

impl Layer {
    /// Front-to-back, matching the order of the root's children
    pub const FRONT_TO_BACK: [Layer; 4] = [Layer::Overlay, Layer::Top, Layer::Workspace, Layer::Background];
}

/// Leaf content of a scene node
pub trait NodeContent: fmt::Debug {
    /// Extents in the node's own coordinate space
    fn bounding_box(&self) -> Rect;

    fn stringify(&self) -> String;

    fn render_instance(&self, node: NodeId) -> Box<dyn RenderInstance>;

    /// Whether the node takes input at `local` (node coordinates)
    fn accepts_input(&self, _local: PointF) -> bool {
        false
    }

    fn pointer_interaction(&mut self) -> Option<&mut dyn PointerInteraction> {
        None
    }

    fn keyboard_interaction(&mut self) -> Option<&mut dyn KeyboardInteraction> {
        None
    }
}

/// Pointer capability of a node
pub trait PointerInteraction {
    fn handle_pointer_enter(&mut self, at: PointF);
    fn handle_pointer_motion(&mut self, at: PointF);
    fn handle_pointer_button(&mut self, button: u32, pressed: bool);
    fn handle_pointer_leave(&mut self);
}

/// Keyboard capability of a node
pub trait KeyboardInteraction {
    fn handle_keyboard_enter(&mut self);
    fn handle_keyboard_leave(&mut self);
    fn handle_keyboard_key(&mut self, key: u32, pressed: bool);
}

/// Input delivered to a surface, drained by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerEnter { at: PointF },
    PointerMotion { at: PointF },
    PointerButton { button: u32, pressed: bool },
    PointerLeave,
    KeyboardEnter,
    KeyboardLeave,
    Key { key: u32, pressed: bool },
}

/// A client surface with its committed buffer
#[derive(Debug, Clone)]
pub struct SurfaceNode {
    pub buffer: Option<Rc<Buffer>>,
    /// Logical size of the surface
    pub size: Size,
    /// Surface-local region the client promises to be opaque
    pub opaque_region: Region,
    /// Surface-local input region, `None` accepts input everywhere
    pub input_region: Option<Region>,
    pub buffer_scale: f64,
    pub buffer_transform: Transform,
    pending_input: Vec<InputEvent>,
}

impl Default for SurfaceNode {
    fn default() -> Self {
        Self {
            buffer: None,
            size: Size::default(),
            opaque_region: Region::new(),
            input_region: None,
            buffer_scale: 1.0,
            buffer_transform: Transform::Normal,
            pending_input: Vec::new(),
        }
    }
}

impl SurfaceNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a buffer. The surface takes the buffer's size.
    pub fn attach(&mut self, buffer: Option<Rc<Buffer>>) {
        self.size = buffer.as_ref().map(|b| b.size).unwrap_or_default();
        self.buffer = buffer;
    }

    pub fn take_input_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.pending_input)
    }

    fn local_box(&self) -> Rect {
        Rect::from_loc_size(Default::default(), self.size)
    }
}

impl NodeContent for SurfaceNode {
    fn bounding_box(&self) -> Rect {
        self.local_box()
    }

    fn stringify(&self) -> String {
        match &self.buffer {
            Some(buffer) => format!("surface {}x{} buffer={}", self.size.w, self.size.h, buffer.id.0),
            None => "surface (no buffer)".to_string(),
        }
    }

    fn render_instance(&self, node: NodeId) -> Box<dyn RenderInstance> {
        Box::new(BufferInstance::new(node, true))
    }

    fn accepts_input(&self, local: PointF) -> bool {
        if self.buffer.is_none() || !self.local_box().contains_pointf(local) {
            return false;
        }
        self.input_region
            .as_ref()
            .map_or(true, |region| region.contains_pointf(local))
    }

    fn pointer_interaction(&mut self) -> Option<&mut dyn PointerInteraction> {
        Some(self)
    }

    fn keyboard_interaction(&mut self) -> Option<&mut dyn KeyboardInteraction> {
        Some(self)
    }
}

impl PointerInteraction for SurfaceNode {
    fn handle_pointer_enter(&mut self, at: PointF) {
        self.pending_input.push(InputEvent::PointerEnter { at });
    }

    fn handle_pointer_motion(&mut self, at: PointF) {
        self.pending_input.push(InputEvent::PointerMotion { at });
    }

    fn handle_pointer_button(&mut self, button: u32, pressed: bool) {
        self.pending_input.push(InputEvent::PointerButton { button, pressed });
    }

    fn handle_pointer_leave(&mut self) {
        self.pending_input.push(InputEvent::PointerLeave);
    }
}

impl KeyboardInteraction for SurfaceNode {
    fn handle_keyboard_enter(&mut self) {
        self.pending_input.push(InputEvent::KeyboardEnter);
    }

    fn handle_keyboard_leave(&mut self) {
        self.pending_input.push(InputEvent::KeyboardLeave);
    }

    fn handle_keyboard_key(&mut self, key: u32, pressed: bool) {
        self.pending_input.push(InputEvent::Key { key, pressed });
    }
}

/// Last-good contents of a surface, kept alive after the client is gone
#[derive(Debug, Clone)]
pub struct SnapshotNode {
    pub buffer: Option<Rc<Buffer>>,
    pub size: Size,
    pub opaque_region: Region,
}

impl SnapshotNode {
    pub fn capture(surface: &SurfaceNode) -> Self {
        Self {
            buffer: surface.buffer.clone(),
            size: surface.size,
            opaque_region: surface.opaque_region.clone(),
        }
    }
}

impl NodeContent for SnapshotNode {
    fn bounding_box(&self) -> Rect {
        Rect::from_loc_size(Default::default(), self.size)
    }

    fn stringify(&self) -> String {
        format!("snapshot {}x{}", self.size.w, self.size.h)
    }

    fn render_instance(&self, node: NodeId) -> Box<dyn RenderInstance> {
        Box::new(BufferInstance::new(node, false))
    }
}

/// A rectangle of solid colour
#[derive(Debug, Clone)]
pub struct SolidNode {
    pub size: Size,
    pub color: Color,
}

impl NodeContent for SolidNode {
    fn bounding_box(&self) -> Rect {
        Rect::from_loc_size(Default::default(), self.size)
    }

    fn stringify(&self) -> String {
        format!("solid {}x{}", self.size.w, self.size.h)
    }

    fn render_instance(&self, node: NodeId) -> Box<dyn RenderInstance> {
        Box::new(SolidInstance::new(node))
    }

    fn accepts_input(&self, local: PointF) -> bool {
        self.bounding_box().contains_pointf(local)
    }
}

/// What a node is
#[derive(Debug)]
pub enum NodeKind {
    Root,
    Layer(Layer),
    /// Plain container, used for views and plugin-owned groups
    Floating,
    /// Container whose children are mapped through a transformer stack
    Transformed(TransformerStack),
    Surface(SurfaceNode),
    Snapshot(SnapshotNode),
    Solid(SolidNode),
    Custom(Box<dyn NodeContent>),
}

impl NodeKind {
    pub fn is_inner(&self) -> bool {
        matches!(
            self,
            NodeKind::Root | NodeKind::Layer(_) | NodeKind::Floating | NodeKind::Transformed(_)
        )
    }

    /// Leaf content, if this is a leaf
    pub fn content(&self) -> Option<&dyn NodeContent> {
        match self {
            NodeKind::Surface(s) => Some(s),
            NodeKind::Snapshot(s) => Some(s),
            NodeKind::Solid(s) => Some(s),
            NodeKind::Custom(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut dyn NodeContent> {
        match self {
            NodeKind::Surface(s) => Some(s),
            NodeKind::Snapshot(s) => Some(s),
            NodeKind::Solid(s) => Some(s),
            NodeKind::Custom(c) => Some(c.as_mut()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Layer(_) => "layer",
            NodeKind::Floating => "floating",
            NodeKind::Transformed(_) => "transformed",
            NodeKind::Surface(_) => "surface",
            NodeKind::Snapshot(_) => "snapshot",
            NodeKind::Solid(_) => "solid",
            NodeKind::Custom(_) => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_input_respects_input_region() {
        let mut surface = SurfaceNode::new();
        surface.attach(Some(Buffer::shared(Size::new(100, 100), Color::BLACK)));
        assert!(surface.accepts_input(PointF::new(90.0, 90.0)));
        surface.input_region = Some(Region::from_rect(Rect::new(0, 0, 50, 50)));
        assert!(!surface.accepts_input(PointF::new(90.0, 90.0)));
        assert!(surface.accepts_input(PointF::new(10.0, 10.0)));
    }

    #[test]
    fn surface_without_buffer_takes_no_input() {
        let surface = SurfaceNode::new();
        assert!(!surface.accepts_input(PointF::new(0.0, 0.0)));
    }

    #[test]
    fn snapshot_keeps_buffer_alive() {
        let mut surface = SurfaceNode::new();
        surface.attach(Some(Buffer::shared(Size::new(10, 20), Color::BLACK)));
        let snapshot = SnapshotNode::capture(&surface);
        surface.attach(None);
        assert!(snapshot.buffer.is_some());
        assert_eq!(snapshot.bounding_box(), Rect::new(0, 0, 10, 20));
    }

    #[test]
    fn pointer_events_queue_until_drained() {
        let mut surface = SurfaceNode::new();
        surface.handle_pointer_enter(PointF::new(1.0, 2.0));
        surface.handle_pointer_button(0x110, true);
        assert_eq!(surface.take_input_events().len(), 2);
        assert!(surface.take_input_events().is_empty());
    }
}
