//! Views: the scene-facing half of a toplevel
//!
//! Every view owns a small subtree:
//!
//! ```text
//! root (Floating, in a layer)
//! └── transformed (Transformed, carries animation/plugin transformers)
//!     └── surface_root (Floating, offset = base geometry)
//!         ├── [snapshot, while an unmap animation runs]
//!         └── main_surface (Surface)
//! ```
//!
//! The root is enabled while the view is mapped. Animation hooks take an
//! extra enable reference on it, which keeps a closing or minimizing view
//! visible until its animation ends.

use std::collections::BTreeMap;

use crate::animate::AnimationHook;
use crate::geometry::Rect;
use crate::output::OutputId;
use crate::scene::{Layer, NodeId, NodeKind, SceneError, SceneGraph, SurfaceNode, TransformerStack};
use crate::toplevel::ToplevelId;

crate::arena_id!(
    /// Handle to a view
    ViewId,
    "view"
);

/// Scene nodes belonging to one view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewNodes {
    pub root: NodeId,
    pub transformed: NodeId,
    pub surface_root: NodeId,
    pub main_surface: NodeId,
}

impl ViewNodes {
    /// Build a view subtree in `layer`. The root starts disabled.
    pub fn create(scene: &mut SceneGraph, layer: Layer) -> Result<Self, SceneError> {
        let root = scene.create_node(NodeKind::Floating);
        let transformed = scene.create_node(NodeKind::Transformed(TransformerStack::default()));
        let surface_root = scene.create_node(NodeKind::Floating);
        let main_surface = scene.create_node(NodeKind::Surface(SurfaceNode::new()));

        scene.add_front(surface_root, main_surface)?;
        scene.add_front(transformed, surface_root)?;
        scene.add_front(root, transformed)?;
        scene.set_enabled(root, false)?;
        let layer = scene.layer(layer);
        scene.add_front(layer, root)?;

        Ok(Self {
            root,
            transformed,
            surface_root,
            main_surface,
        })
    }
}

pub struct View {
    pub id: ViewId,
    pub toplevel: ToplevelId,
    pub nodes: ViewNodes,
    pub app_id: String,
    pub title: String,
    /// Output the view is mostly on, updated when the geometry changes
    pub(crate) output: Option<OutputId>,
    pub(crate) mapped: bool,
    pub(crate) minimized: bool,
    pub(crate) always_on_top: bool,
    /// Active animation hooks by key
    pub(crate) hooks: BTreeMap<String, AnimationHook>,
    /// Destroy once the last animation hook ends
    pub(crate) destroy_requested: bool,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("toplevel", &self.toplevel)
            .field("app_id", &self.app_id)
            .field("mapped", &self.mapped)
            .field("minimized", &self.minimized)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl View {
    pub(crate) fn new(id: ViewId, toplevel: ToplevelId, nodes: ViewNodes, app_id: &str) -> Self {
        Self {
            id,
            toplevel,
            nodes,
            app_id: app_id.to_string(),
            title: String::new(),
            output: None,
            mapped: false,
            minimized: false,
            always_on_top: false,
            hooks: BTreeMap::new(),
            destroy_requested: false,
        }
    }

    pub fn output(&self) -> Option<OutputId> {
        self.output
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn is_always_on_top(&self) -> bool {
        self.always_on_top
    }

    pub fn has_hook(&self, key: &str) -> bool {
        self.hooks.contains_key(key)
    }

    pub fn hook(&self, key: &str) -> Option<&AnimationHook> {
        self.hooks.get(key)
    }

    pub fn hook_keys(&self) -> impl Iterator<Item = &str> {
        self.hooks.keys().map(String::as_str)
    }

    /// Visual extents, transformers included
    pub fn bounding_box(&self, scene: &SceneGraph) -> Rect {
        scene.layout_box(self.nodes.root)
    }

    pub fn stringify(&self) -> String {
        format!("{} ({})", self.id, self.app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, Color};
    use crate::geometry::{Point, Size};

    #[test]
    fn subtree_is_built_disabled_in_layer() {
        let mut scene = SceneGraph::new();
        let nodes = ViewNodes::create(&mut scene, Layer::Workspace).unwrap();
        assert_eq!(scene.parent(nodes.root), Some(scene.layer(Layer::Workspace)));
        assert_eq!(scene.parent(nodes.main_surface), Some(nodes.surface_root));
        assert!(!scene.is_enabled(nodes.root));
        assert!(!scene.is_visible(nodes.main_surface));
    }

    #[test]
    fn bounding_box_follows_surface_root_offset() {
        let mut scene = SceneGraph::new();
        let nodes = ViewNodes::create(&mut scene, Layer::Workspace).unwrap();
        scene
            .update_content(nodes.main_surface, |kind| {
                if let NodeKind::Surface(s) = kind {
                    s.attach(Some(Buffer::shared(Size::new(40, 30), Color::BLACK)));
                }
            })
            .unwrap();
        scene.set_offset(nodes.surface_root, Point::new(5, 7)).unwrap();
        let mut arena: crate::arena::Arena<ViewId, ()> = crate::arena::Arena::new();
        let mut toplevels: crate::arena::Arena<ToplevelId, ()> = crate::arena::Arena::new();
        let view = View::new(arena.insert(()), toplevels.insert(()), nodes, "term");
        assert_eq!(view.bounding_box(&scene), Rect::new(5, 7, 40, 30));
    }
}
