//! Retained scene graph
//!
//! # Responsibilities
//!
//! - Ownership of every node in one arena, with exclusive parent links
//! - Enable counting, offsets and transformer stacks
//! - Damage propagation from a node up to root (layout) space
//! - Render instance generation and input hit-testing
//!
//! # NOT Responsible For
//!
//! - Painting (see `render/`)
//! - Deciding when instances are rebuilt (see `output.rs`, which consumes
//!   the accumulated [`UpdateFlags`])
//!
//! Children are stored front to back: index 0 is drawn last and receives
//! input first.

pub mod instance;
pub mod node;
pub mod transform;

use serde_json::json;

use crate::arena::Arena;
use crate::geometry::{Point, PointF, Rect};
use crate::region::Region;

pub use instance::{BufferInstance, DirectScanout, RenderInstance, SolidInstance, TransformerInstance};
pub use node::{
    InputEvent, KeyboardInteraction, Layer, NodeContent, NodeKind, PointerInteraction, SnapshotNode,
    SolidNode, SurfaceNode,
};
pub use transform::{Transform2D, TransformerStack, TRANSFORMER_2D, TRANSFORMER_HIGHLEVEL};

crate::arena_id!(
    /// Handle to a scene node
    NodeId,
    "node"
);

bitflags::bitflags! {
    /// What changed in the tree since the last frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateFlags: u32 {
        /// Children were added, removed or reordered
        const CHILDREN_LIST = 1;
        /// A node's enabled state flipped
        const ENABLED = 2;
        /// Offsets, sizes or transformers changed
        const GEOMETRY = 4;
        const INPUT_STATE = 8;
    }
}

impl UpdateFlags {
    /// Changes that invalidate the render instance lists
    pub fn needs_instance_rebuild(self) -> bool {
        self.intersects(UpdateFlags::CHILDREN_LIST | UpdateFlags::ENABLED)
    }

    /// Changes that invalidate visibility
    pub fn needs_visibility(self) -> bool {
        self.needs_instance_rebuild() || self.contains(UpdateFlags::GEOMETRY)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("stale node handle {0}")]
    StaleNode(NodeId),
    #[error("node {child} is already a child of {parent}")]
    AlreadyParented { child: NodeId, parent: NodeId },
    #[error("node {0} cannot have children")]
    NotInner(NodeId),
    #[error("inserting {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
    #[error("node {0} is structural")]
    Structural(NodeId),
    #[error("node {0} is not attached to a parent")]
    NotAttached(NodeId),
    #[error("node {node} is not a {expected} node")]
    WrongKind { node: NodeId, expected: &'static str },
}

/// A node in the tree
#[derive(Debug)]
pub struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Enabled while positive
    enable_count: i32,
    offset: Point,
    structure: bool,
    kind: NodeKind,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children, front to back
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_count > 0
    }

    pub fn enable_count(&self) -> i32 {
        self.enable_count
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    /// Structural nodes (root and layers) can never be detached
    pub fn is_structure(&self) -> bool {
        self.structure
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

/// The scene tree plus the damage and updates accumulated since the last
/// frame
pub struct SceneGraph {
    nodes: Arena<NodeId, Node>,
    root: NodeId,
    /// Indexed back to front, see [`Layer`]
    layers: [NodeId; 4],
    damage: Region,
    updates: UpdateFlags,
    opaque_optimizations: bool,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn layer_slot(layer: Layer) -> usize {
    match layer {
        Layer::Background => 0,
        Layer::Workspace => 1,
        Layer::Top => 2,
        Layer::Overlay => 3,
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let structural = |kind| Node {
            parent: None,
            children: Vec::new(),
            enable_count: 1,
            offset: Point::ORIGIN,
            structure: true,
            kind,
        };
        let root = nodes.insert(structural(NodeKind::Root));
        let mut layers = [root; 4];
        let mut root_children = Vec::with_capacity(4);
        for layer in Layer::FRONT_TO_BACK {
            let mut node = structural(NodeKind::Layer(layer));
            node.parent = Some(root);
            let id = nodes.insert(node);
            layers[layer_slot(layer)] = id;
            root_children.push(id);
        }
        if let Some(root_node) = nodes.get_mut(root) {
            root_node.children = root_children;
        }
        Self {
            nodes,
            root,
            layers,
            damage: Region::new(),
            updates: UpdateFlags::empty(),
            opaque_optimizations: true,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn layer(&self, layer: Layer) -> NodeId {
        self.layers[layer_slot(layer)]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn opaque_optimizations(&self) -> bool {
        self.opaque_optimizations
    }

    /// Whether opaque regions may shrink damage and visibility
    pub fn set_opaque_optimizations(&mut self, enabled: bool) {
        self.opaque_optimizations = enabled;
    }

    // ========== Lookup ==========

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn get(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes.get(id).ok_or(SceneError::StaleNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::StaleNode(id))
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|n| &n.kind)
    }

    /// Raw access to a node's kind. Callers must damage what they change.
    pub fn kind_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(id).map(|n| &mut n.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn surface(&self, id: NodeId) -> Option<&SurfaceNode> {
        match self.kind(id) {
            Some(NodeKind::Surface(s)) => Some(s),
            _ => None,
        }
    }

    pub fn surface_mut(&mut self, id: NodeId) -> Option<&mut SurfaceNode> {
        match self.kind_mut(id) {
            Some(NodeKind::Surface(s)) => Some(s),
            _ => None,
        }
    }

    pub fn transformers(&self, id: NodeId) -> Option<&TransformerStack> {
        match self.kind(id) {
            Some(NodeKind::Transformed(stack)) => Some(stack),
            _ => None,
        }
    }

    // ========== Tree structure ==========

    /// Create a detached, enabled node
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(Node {
            parent: None,
            children: Vec::new(),
            enable_count: 1,
            offset: Point::ORIGIN,
            structure: false,
            kind,
        })
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let parent_node = self.get(parent)?;
        if !parent_node.kind.is_inner() {
            return Err(SceneError::NotInner(parent));
        }
        let child_node = self.get(child)?;
        if let Some(existing) = child_node.parent {
            return Err(SceneError::AlreadyParented { child, parent: existing });
        }
        if child == self.root {
            return Err(SceneError::Structural(child));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(SceneError::Cycle { parent, child });
            }
            cursor = self.parent(id);
        }
        Ok(())
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, front: bool) -> Result<(), SceneError> {
        self.check_insert(parent, child)?;
        let parent_node = self.get_mut(parent)?;
        if front {
            parent_node.children.insert(0, child);
        } else {
            parent_node.children.push(child);
        }
        self.get_mut(child)?.parent = Some(parent);
        self.updates |= UpdateFlags::CHILDREN_LIST;
        self.damage_whole(child);
        Ok(())
    }

    /// Insert `child` as the frontmost child of `parent`
    pub fn add_front(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.insert_child(parent, child, true)
    }

    /// Insert `child` as the backmost child of `parent`
    pub fn add_back(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.insert_child(parent, child, false)
    }

    /// Detach `child` from its parent, damaging what it covered.
    ///
    /// Returns the former parent.
    pub fn remove_child(&mut self, child: NodeId) -> Result<NodeId, SceneError> {
        let node = self.get(child)?;
        if node.structure {
            return Err(SceneError::Structural(child));
        }
        let parent = node.parent.ok_or(SceneError::NotAttached(child))?;
        self.damage_whole(child);
        self.get_mut(parent)?.children.retain(|&c| c != child);
        self.get_mut(child)?.parent = None;
        self.updates |= UpdateFlags::CHILDREN_LIST;
        Ok(parent)
    }

    /// Move `child` under `new_parent`, at the front or back
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId, front: bool) -> Result<(), SceneError> {
        if self.parent(child) == Some(new_parent) {
            return if front { self.raise_to_front(child) } else { Ok(()) };
        }
        self.check_reparent(child, new_parent)?;
        if self.get(child)?.parent.is_some() {
            self.remove_child(child)?;
        }
        self.insert_child(new_parent, child, front)
    }

    fn check_reparent(&self, child: NodeId, new_parent: NodeId) -> Result<(), SceneError> {
        if !self.get(new_parent)?.kind.is_inner() {
            return Err(SceneError::NotInner(new_parent));
        }
        let mut cursor = Some(new_parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(SceneError::Cycle { parent: new_parent, child });
            }
            cursor = self.parent(id);
        }
        Ok(())
    }

    pub fn raise_to_front(&mut self, child: NodeId) -> Result<(), SceneError> {
        let parent = self.get(child)?.parent.ok_or(SceneError::NotAttached(child))?;
        let siblings = &mut self.get_mut(parent)?.children;
        if siblings.first() == Some(&child) {
            return Ok(());
        }
        siblings.retain(|&c| c != child);
        siblings.insert(0, child);
        self.updates |= UpdateFlags::CHILDREN_LIST;
        self.damage_whole(child);
        Ok(())
    }

    /// Detach a node and free it together with its whole subtree
    pub fn destroy(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = self.get(id)?;
        if node.structure {
            return Err(SceneError::Structural(id));
        }
        if node.parent.is_some() {
            self.remove_child(id)?;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    // ========== Enabled state ==========

    /// Take or release one enable reference.
    ///
    /// Damage is emitted before a node is hidden and after it is shown,
    /// so the frame after either change has no stale pixels.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), SceneError> {
        let was_enabled = self.get(id)?.is_enabled();
        if !enabled && self.get(id)?.enable_count == 1 {
            self.damage_whole(id);
        }
        let node = self.get_mut(id)?;
        node.enable_count += if enabled { 1 } else { -1 };
        let count = node.enable_count;
        let now_enabled = node.is_enabled();
        if count < 0 {
            tracing::error!(node = %id, count, "scene node enable count went negative");
        }
        if was_enabled != now_enabled {
            self.updates |= UpdateFlags::ENABLED;
            if now_enabled {
                self.damage_whole(id);
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_enabled)
    }

    /// Enabled, attached to the root, and no ancestor disabled
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                return false;
            };
            if !node.is_enabled() {
                return false;
            }
            if current == self.root {
                return true;
            }
            cursor = node.parent;
        }
        false
    }

    // ========== Geometry ==========

    pub fn offset(&self, id: NodeId) -> Point {
        self.nodes.get(id).map_or(Point::ORIGIN, |n| n.offset)
    }

    /// Move a node within its parent's space
    pub fn set_offset(&mut self, id: NodeId, offset: Point) -> Result<(), SceneError> {
        if self.get(id)?.offset == offset {
            return Ok(());
        }
        self.damage_whole(id);
        self.get_mut(id)?.offset = offset;
        self.updates |= UpdateFlags::GEOMETRY;
        self.damage_whole(id);
        Ok(())
    }

    /// Extents in the node's own coordinate space: the leaf content, or
    /// the union of the enabled children's bounding boxes
    pub fn local_box(&self, id: NodeId) -> Rect {
        let Some(node) = self.nodes.get(id) else {
            return Rect::EMPTY;
        };
        if let Some(content) = node.kind.content() {
            return content.bounding_box();
        }
        node.children
            .iter()
            .filter(|&&c| self.is_enabled(c))
            .fold(Rect::EMPTY, |acc, &c| acc.merge(&self.bounding_box(c)))
    }

    /// Extents in the parent's coordinate space
    pub fn bounding_box(&self, id: NodeId) -> Rect {
        self.map_to_parent(id, &self.local_box(id))
    }

    fn map_to_parent(&self, id: NodeId, rect: &Rect) -> Rect {
        let Some(node) = self.nodes.get(id) else {
            return Rect::EMPTY;
        };
        let mapped = match &node.kind {
            NodeKind::Transformed(stack) if !stack.is_empty() => stack.map_box(&self.local_box(id), rect),
            _ => *rect,
        };
        mapped.translated(node.offset)
    }

    /// Map a rectangle in `id`'s space all the way to layout space
    pub fn map_to_layout(&self, id: NodeId, rect: &Rect) -> Rect {
        let mut current = id;
        let mut r = *rect;
        loop {
            r = self.map_to_parent(current, &r);
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return r,
            }
        }
    }

    /// Bounding box in layout space
    pub fn layout_box(&self, id: NodeId) -> Rect {
        self.map_to_layout(id, &self.local_box(id))
    }

    /// Map a rectangle in `id`'s space into the space the node is
    /// rendered in: layout space, or the content space of the nearest
    /// transformer ancestor
    pub fn map_to_render_space(&self, id: NodeId, rect: &Rect) -> Rect {
        let mut current = id;
        let mut r = *rect;
        loop {
            r = self.map_to_parent(current, &r);
            match self.parent(current) {
                Some(parent) if !matches!(self.kind(parent), Some(NodeKind::Transformed(_))) => {
                    current = parent;
                }
                _ => return r,
            }
        }
    }

    pub fn render_space_box(&self, id: NodeId) -> Rect {
        self.map_to_render_space(id, &self.local_box(id))
    }

    /// Translation from `id`'s space into render space, ignoring `id`'s own
    /// transformers
    pub fn render_space_offset(&self, id: NodeId) -> Point {
        let mut current = id;
        let mut total = Point::ORIGIN;
        loop {
            total = total + self.offset(current);
            match self.parent(current) {
                Some(parent) if !matches!(self.kind(parent), Some(NodeKind::Transformed(_))) => {
                    current = parent;
                }
                _ => return total,
            }
        }
    }

    /// Mutate a transformer node's stack, damaging before and after
    pub fn with_transformers<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut TransformerStack) -> R,
    ) -> Result<R, SceneError> {
        if !matches!(self.get(id)?.kind, NodeKind::Transformed(_)) {
            return Err(SceneError::WrongKind { node: id, expected: "transformed" });
        }
        self.damage_whole(id);
        let result = match &mut self.get_mut(id)?.kind {
            NodeKind::Transformed(stack) => f(stack),
            _ => return Err(SceneError::WrongKind { node: id, expected: "transformed" }),
        };
        self.updates |= UpdateFlags::GEOMETRY;
        self.damage_whole(id);
        Ok(result)
    }

    /// Mutate a leaf's content, damaging its old and new extents
    pub fn update_content<R>(&mut self, id: NodeId, f: impl FnOnce(&mut NodeKind) -> R) -> Result<R, SceneError> {
        let old_box = self.local_box(id);
        self.damage_whole(id);
        let result = f(&mut self.get_mut(id)?.kind);
        if self.local_box(id) != old_box {
            self.updates |= UpdateFlags::GEOMETRY;
        }
        self.damage_whole(id);
        Ok(result)
    }

    // ========== Damage ==========

    /// Damage `region` given in `id`'s coordinate space.
    ///
    /// Dropped if the node or any ancestor is disabled, or the node is not
    /// attached to the root.
    pub fn damage_node(&mut self, id: NodeId, region: &Region) {
        if region.is_empty() {
            return;
        }
        let mut current = id;
        let mut region = region.clone();
        loop {
            let Some(node) = self.nodes.get(current) else {
                return;
            };
            if !node.is_enabled() {
                return;
            }
            if let NodeKind::Transformed(stack) = &node.kind {
                if !stack.is_empty() {
                    let content = self.local_box(current);
                    region = region.iter().map(|r| stack.map_box(&content, r)).collect();
                }
            }
            region.translate(node.offset);
            let parent = node.parent;
            match parent {
                Some(parent) => current = parent,
                None => {
                    if current == self.root {
                        self.damage.union_with(&region);
                    }
                    return;
                }
            }
        }
    }

    pub fn damage_rect(&mut self, id: NodeId, rect: Rect) {
        self.damage_node(id, &Region::from_rect(rect));
    }

    /// Damage everything the node covers
    pub fn damage_whole(&mut self, id: NodeId) {
        let local = self.local_box(id);
        self.damage_rect(id, local);
    }

    /// Damage directly in layout space
    pub fn damage_layout(&mut self, region: &Region) {
        self.damage.union_with(region);
    }

    pub fn pending_damage(&self) -> &Region {
        &self.damage
    }

    pub fn take_damage(&mut self) -> Region {
        std::mem::take(&mut self.damage)
    }

    pub fn pending_updates(&self) -> UpdateFlags {
        self.updates
    }

    pub fn take_updates(&mut self) -> UpdateFlags {
        std::mem::take(&mut self.updates)
    }

    pub fn mark_updated(&mut self, flags: UpdateFlags) {
        self.updates |= flags;
    }

    // ========== Rendering and input ==========

    /// Append render instances for the enabled subtree at `id`, front to back
    pub fn generate_render_instances(&self, id: NodeId, out: &mut Vec<Box<dyn RenderInstance>>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !node.is_enabled() {
            return;
        }
        match &node.kind {
            NodeKind::Transformed(_) => {
                let mut children = Vec::new();
                for &child in &node.children {
                    self.generate_render_instances(child, &mut children);
                }
                out.push(Box::new(TransformerInstance::new(id, children)));
            }
            kind if kind.is_inner() => {
                for &child in &node.children {
                    self.generate_render_instances(child, out);
                }
            }
            kind => {
                if let Some(content) = kind.content() {
                    out.push(content.render_instance(id));
                }
            }
        }
    }

    /// Topmost enabled node accepting input at `p` (layout coordinates),
    /// and the point in that node's space
    pub fn find_node_at(&self, p: PointF) -> Option<(NodeId, PointF)> {
        self.hit_test(self.root, p)
    }

    fn hit_test(&self, id: NodeId, p: PointF) -> Option<(NodeId, PointF)> {
        let node = self.nodes.get(id)?;
        if !node.is_enabled() {
            return None;
        }
        let mut local = PointF::new(p.x - node.offset.x as f64, p.y - node.offset.y as f64);
        if let NodeKind::Transformed(stack) = &node.kind {
            if !stack.is_empty() {
                local = stack.inverse_map_point(&self.local_box(id), local);
            }
        }
        if let Some(content) = node.kind.content() {
            return content.accepts_input(local).then_some((id, local));
        }
        node.children.iter().find_map(|&child| self.hit_test(child, local))
    }

    pub fn pointer_interaction(&mut self, id: NodeId) -> Option<&mut dyn PointerInteraction> {
        self.nodes.get_mut(id)?.kind.content_mut()?.pointer_interaction()
    }

    pub fn keyboard_interaction(&mut self, id: NodeId) -> Option<&mut dyn KeyboardInteraction> {
        self.nodes.get_mut(id)?.kind.content_mut()?.keyboard_interaction()
    }

    /// Structured dump of the subtree at `id`
    pub fn dump(&self, id: NodeId) -> serde_json::Value {
        let Some(node) = self.nodes.get(id) else {
            return serde_json::Value::Null;
        };
        let mut value = json!({
            "id": id.to_string(),
            "kind": node.kind.name(),
            "enable_count": node.enable_count,
            "offset": [node.offset.x, node.offset.y],
            "bbox": self.bounding_box(id),
        });
        match &node.kind {
            NodeKind::Layer(layer) => value["layer"] = json!(layer),
            NodeKind::Transformed(stack) => value["transformers"] = json!(stack),
            kind => {
                if let Some(content) = kind.content() {
                    value["content"] = json!(content.stringify());
                }
            }
        }
        if !node.children.is_empty() {
            value["children"] = node.children.iter().map(|&c| self.dump(c)).collect();
        }
        value
    }
}
