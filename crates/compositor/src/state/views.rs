//! View lifecycle and window-management requests
//!
//! Requests only touch pending toplevel state and schedule a transaction;
//! the scene follows once the transaction applies (see `transactions.rs`).
//!
//! A mapped, non-minimized view holds one enable reference on its root
//! node. Animation hooks hold their own, so a view keeps rendering while it
//! animates out.

use crate::geometry::{Edges, Point, Rect, Size};
use crate::plugin::Event;
use crate::scene::{Layer, NodeKind, SceneError};
use crate::toplevel::{Margins, Toplevel, ToplevelClient, ToplevelKind, ToplevelState};
use crate::view::{View, ViewId, ViewNodes};

use super::WayScene;

impl WayScene {
    /// Create an unmapped view for a new client toplevel
    pub fn create_view(
        &mut self,
        kind: ToplevelKind,
        client: Box<dyn ToplevelClient>,
        app_id: &str,
    ) -> Result<ViewId, SceneError> {
        let nodes = ViewNodes::create(&mut self.scene, Layer::Workspace)?;
        let toplevel = self.toplevels.insert_with(|id| Toplevel::new(id, kind, client));
        let view = self.views.insert_with(|id| View::new(id, toplevel, nodes, app_id));
        self.toplevel_views.insert(toplevel, view);
        tracing::debug!(target: "wayscene::views", view = %view, toplevel = %toplevel, app_id, "view created");
        Ok(view)
    }

    /// Change pending state of a view's toplevel and schedule it
    pub fn modify_pending(&mut self, view: ViewId, f: impl FnOnce(&mut ToplevelState)) -> bool {
        let Some(toplevel) = self.views.get(view).map(|v| v.toplevel) else {
            return false;
        };
        let Some(t) = self.toplevels.get_mut(toplevel) else {
            return false;
        };
        f(t.pending_mut());
        self.schedule_toplevel(toplevel);
        true
    }

    /// Map a view. Without a geometry the view keeps its pending position
    /// and takes the size the client last committed.
    pub fn map_view(&mut self, view: ViewId, geometry: Option<Rect>) -> bool {
        let client_size = self.view_toplevel(view).map(|t| t.client_size()).unwrap_or_default();
        self.modify_pending(view, |pending| {
            pending.mapped = true;
            pending.geometry = match geometry {
                Some(g) => g,
                None => {
                    let size = crate::toplevel::expand_size_by_margins(client_size, &pending.margins);
                    Rect::from_loc_size(pending.geometry.loc(), size)
                }
            };
        })
    }

    pub fn unmap_view(&mut self, view: ViewId) -> bool {
        self.modify_pending(view, |pending| pending.mapped = false)
    }

    /// Move and resize (window-management geometry, margins included)
    pub fn set_view_geometry(&mut self, view: ViewId, geometry: Rect) -> bool {
        self.modify_pending(view, |pending| pending.geometry = geometry)
    }

    pub fn move_view(&mut self, view: ViewId, to: Point) -> bool {
        self.modify_pending(view, |pending| {
            pending.geometry = Rect::from_loc_size(to, pending.geometry.size());
        })
    }

    pub fn resize_view(&mut self, view: ViewId, size: Size) -> bool {
        self.modify_pending(view, |pending| {
            pending.geometry = Rect::from_loc_size(pending.geometry.loc(), size);
        })
    }

    pub fn set_tiled(&mut self, view: ViewId, edges: Edges) -> bool {
        self.modify_pending(view, |pending| pending.tiled_edges = edges)
    }

    pub fn set_fullscreen(&mut self, view: ViewId, fullscreen: bool) -> bool {
        self.modify_pending(view, |pending| pending.fullscreen = fullscreen)
    }

    pub fn set_gravity(&mut self, view: ViewId, gravity: Edges) -> bool {
        self.modify_pending(view, |pending| pending.gravity = gravity)
    }

    /// Set decoration margins. The window-management geometry grows so the
    /// client keeps its size.
    pub fn set_margins(&mut self, view: ViewId, margins: Margins) -> bool {
        self.modify_pending(view, |pending| {
            let client = crate::toplevel::shrink_geometry_by_margins(pending.geometry, &pending.margins);
            pending.margins = margins;
            pending.geometry = crate::toplevel::expand_geometry_by_margins(client, &margins);
        })
    }

    /// Minimize or restore. Plugins see the request before the view's root
    /// loses (or regains) its enable reference, so an animation hook can
    /// keep it visible.
    pub fn set_minimized(&mut self, view: ViewId, minimized: bool) {
        let Some(v) = self.views.get(view) else {
            return;
        };
        if v.minimized == minimized || !v.mapped {
            return;
        }
        let root = v.nodes.root;
        self.emit(&Event::MinimizeRequest { view, minimized });
        if let Some(v) = self.views.get_mut(view) {
            v.minimized = minimized;
        }
        if let Err(e) = self.scene.set_enabled(root, !minimized) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to toggle minimized view");
        }
        self.flush_scene_damage();
    }

    /// Keep a view above regular views. Competing callers: last writer wins.
    pub fn set_always_on_top(&mut self, view: ViewId, on_top: bool) {
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        v.always_on_top = on_top;
        let root = v.nodes.root;
        let layer = self.scene.layer(if on_top { Layer::Top } else { Layer::Workspace });
        if self.scene.parent(root) == Some(layer) {
            return;
        }
        if let Err(e) = self.scene.reparent(root, layer, true) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to change view layer");
        }
        self.flush_scene_damage();
    }

    /// Bring a view to the front of its layer
    pub fn raise_view(&mut self, view: ViewId) {
        let Some(root) = self.views.get(view).map(|v| v.nodes.root) else {
            return;
        };
        if let Err(e) = self.scene.raise_to_front(root) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to raise view");
        }
        self.flush_scene_damage();
    }

    /// Topmost view with input at a layout point
    pub fn view_at(&self, p: crate::geometry::PointF) -> Option<ViewId> {
        let (node, _) = self.scene.find_node_at(p)?;
        self.views()
            .find(|v| v.nodes.main_surface == node)
            .map(|v| v.id)
    }

    // ========== Client lifetime ==========

    /// The client object behind a view is gone. Its size is frozen and
    /// the view unmaps through a regular transaction.
    pub fn handle_client_destroyed(&mut self, view: ViewId) {
        let Some(toplevel) = self.views.get(view).map(|v| v.toplevel) else {
            return;
        };
        let Some(t) = self.toplevels.get_mut(toplevel) else {
            return;
        };
        let report_ready = t.handle_client_destroyed();
        tracing::debug!(target: "wayscene::views", view = %view, "client destroyed");
        if report_ready && self.transactions.is_object_committed(toplevel) {
            self.transactions.mark_ready(toplevel);
            self.apply_ready_transactions();
        }
        self.unmap_view(view);
    }

    /// Drop the buffer of the view's main surface, as when a client
    /// destroys its wl_surface
    pub fn destroy_surface(&mut self, view: ViewId) {
        let Some(main) = self.views.get(view).map(|v| v.nodes.main_surface) else {
            return;
        };
        let result = self.scene.update_content(main, |kind| {
            if let NodeKind::Surface(surface) = kind {
                surface.attach(None);
            }
        });
        if let Err(e) = result {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to drop surface");
        }
        self.flush_scene_damage();
    }

    /// Destroy a view once nothing uses it. Views with running animation
    /// hooks are reaped when the last hook ends.
    pub fn destroy_view(&mut self, view: ViewId) {
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        v.destroy_requested = true;
        self.reap_view(view);
    }

    pub(crate) fn reap_view(&mut self, view: ViewId) {
        let Some(v) = self.views.get(view) else {
            return;
        };
        if !v.destroy_requested || !v.hooks.is_empty() {
            return;
        }
        let Some(v) = self.views.remove(view) else {
            return;
        };
        self.transactions.forget_object(v.toplevel);
        self.toplevels.remove(v.toplevel);
        self.toplevel_views.remove(&v.toplevel);
        if let Err(e) = self.scene.destroy(v.nodes.root) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to destroy view nodes");
        }
        self.flush_scene_damage();
        tracing::debug!(target: "wayscene::views", view = %view, "view destroyed");
    }

    // ========== Reactions to applied state ==========

    pub(crate) fn view_did_map(&mut self, view: ViewId) {
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        v.mapped = true;
        v.minimized = false;
        let nodes = v.nodes;
        if !self.scene.is_enabled(nodes.main_surface) {
            let _ = self.scene.set_enabled(nodes.main_surface, true);
        }
        if let Err(e) = self.scene.set_enabled(nodes.root, true) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to enable view");
        }
        self.update_view_output(view);
        tracing::debug!(target: "wayscene::views", view = %view, "view mapped");
        self.emit(&Event::ViewMapped { view });
    }

    pub(crate) fn view_did_unmap(&mut self, view: ViewId) {
        self.emit(&Event::ViewPreUnmap { view });
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        v.mapped = false;
        let was_minimized = std::mem::replace(&mut v.minimized, false);
        let nodes = v.nodes;
        let _ = self.scene.set_enabled(nodes.main_surface, false);
        if !was_minimized {
            if let Err(e) = self.scene.set_enabled(nodes.root, false) {
                tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to disable view");
            }
        }
        tracing::debug!(target: "wayscene::views", view = %view, "view unmapped");
        self.emit(&Event::ViewUnmapped { view });
    }

    /// Recompute which output a view is on
    pub(crate) fn update_view_output(&mut self, view: ViewId) {
        let Some(v) = self.views.get(view) else {
            return;
        };
        let geometry = self
            .toplevels
            .get(v.toplevel)
            .map(|t| t.current().geometry)
            .unwrap_or(Rect::EMPTY);
        let old = v.output;
        let new = self
            .outputs
            .output_for_rect(&geometry)
            .or_else(|| old.filter(|&o| self.outputs.get(o).is_some()))
            .or_else(|| self.outputs.ids().first().copied());
        if old == new {
            return;
        }
        if let Some(v) = self.views.get_mut(view) {
            v.output = new;
        }
        self.retarget_animation_hooks(view, old, new);
        tracing::debug!(target: "wayscene::views", view = %view, ?old, ?new, "view output changed");
        self.emit(&Event::ViewOutputChanged { view, old, new });
    }

    pub(crate) fn update_view_outputs(&mut self) {
        for view in self.views.ids() {
            self.update_view_output(view);
        }
    }
}
