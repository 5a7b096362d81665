//! Transactions: scheduling, commit, apply and client commits
//!
//! Every member of a transaction is applied before control returns to the
//! caller, and damage is routed to outputs only after the last member, so
//! no frame can show a partially applied transaction.

use std::time::Instant;

use crate::plugin::Event;
use crate::scene::{NodeId, NodeKind, UpdateFlags};
use crate::toplevel::{CommitOutcome, SurfaceCommit, ToplevelId};
use crate::txn::{Readiness, Scheduled};
use crate::view::ViewId;

use super::WayScene;

impl WayScene {
    /// Add a toplevel to the transaction being collected. The transaction is
    /// committed on the next idle.
    pub fn schedule_toplevel(&mut self, toplevel: ToplevelId) {
        match self.transactions.schedule_object(toplevel) {
            Scheduled::Collecting(txn) => {
                tracing::trace!(target: "wayscene::txn", toplevel = %toplevel, txn = %txn, "scheduled");
            }
            Scheduled::Queued => {}
        }
        self.flush_requested = true;
    }

    /// Commit the collected transaction, then apply whatever is ready
    pub fn flush_transactions(&mut self) {
        if self.transactions.has_collecting() {
            let objects = self.transactions.collecting_objects().to_vec();
            // Plugins may still adjust pending state, e.g. decoration margins.
            self.emit(&Event::NewTransaction { objects });

            let now = self.now();
            if let Some((txn, objects)) = self.transactions.start_commit(now) {
                for object in objects {
                    let Some(toplevel) = self.toplevels.get_mut(object) else {
                        tracing::warn!(target: "wayscene::txn", txn = %txn, toplevel = %object, "committing a destroyed toplevel");
                        self.transactions.mark_ready(object);
                        continue;
                    };
                    if toplevel.commit() == Readiness::Ready {
                        self.transactions.mark_ready(object);
                    }
                }
            }
        }
        self.apply_ready_transactions();
    }

    /// Apply every transaction that is ready or timed out. Returns how many
    /// were applied.
    pub fn apply_ready_transactions(&mut self) -> usize {
        let now = self.now();
        let done = self.transactions.apply_ready(now);
        for txn in &done {
            for entry in &txn.entries {
                self.apply_toplevel(entry.object, entry.still_pending);
            }
        }
        self.flush_scene_damage();
        if !done.is_empty() && self.transactions.has_collecting() {
            // Objects that were queued behind the applied transactions
            self.flush_requested = true;
        }
        done.len()
    }

    /// When the transaction timeout timer should fire next
    pub fn next_transaction_deadline(&self) -> Option<Instant> {
        self.transactions.next_deadline()
    }

    /// Called by the timeout timer
    pub fn handle_transaction_timeout(&mut self) {
        if self.transactions.has_ready(self.now()) {
            self.apply_ready_transactions();
        }
    }

    /// A client committed its surface
    pub fn client_commit(&mut self, view: ViewId, commit: SurfaceCommit) -> CommitOutcome {
        let Some(v) = self.views.get(view) else {
            return CommitOutcome::Ignored;
        };
        let toplevel_id = v.toplevel;
        let nodes = v.nodes;
        let committed = self.transactions.is_object_committed(toplevel_id);
        let pending = self.transactions.is_object_pending(toplevel_id);
        let Some(toplevel) = self.toplevels.get_mut(toplevel_id) else {
            return CommitOutcome::Ignored;
        };

        let outcome = toplevel.handle_client_commit(commit, committed, pending);
        match outcome {
            CommitOutcome::Ready => {
                self.transactions.mark_ready(toplevel_id);
                self.apply_ready_transactions();
            }
            CommitOutcome::Repaint => {
                let surface = toplevel.take_surface_state();
                let offset = toplevel.surface_offset();
                if let Some(surface) = surface {
                    self.apply_surface_state(nodes.main_surface, surface);
                }
                if let Err(e) = self.scene.set_offset(nodes.surface_root, offset) {
                    tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to move surface");
                }
                self.flush_scene_damage();
            }
            CommitOutcome::ClientResize => self.schedule_toplevel(toplevel_id),
            CommitOutcome::StillWaiting | CommitOutcome::Ignored => {}
        }
        outcome
    }

    fn apply_surface_state(&mut self, node: NodeId, commit: SurfaceCommit) {
        let result = self.scene.update_content(node, |kind| {
            if let NodeKind::Surface(surface) = kind {
                surface.attach(commit.buffer);
                surface.opaque_region = commit.opaque_region;
                surface.input_region = commit.input_region;
                surface.buffer_scale = commit.buffer_scale;
                surface.buffer_transform = commit.buffer_transform;
            }
        });
        if let Err(e) = result {
            tracing::error!(target: "wayscene::views", node = %node, error = %e, "failed to update surface");
        }
    }

    /// Apply one toplevel and update its view to match
    fn apply_toplevel(&mut self, toplevel_id: ToplevelId, still_pending: bool) {
        let Some(view) = self.toplevel_views.get(&toplevel_id).copied() else {
            return;
        };
        let Some(nodes) = self.views.get(view).map(|v| v.nodes) else {
            return;
        };
        let Some(toplevel) = self.toplevels.get_mut(toplevel_id) else {
            return;
        };

        self.scene.damage_whole(nodes.root);
        let applied = toplevel.apply(still_pending);
        let new_state = toplevel.current().clone();
        let offset = toplevel.surface_offset();
        let old_state = applied.old_state;

        if let Some(surface) = applied.surface {
            self.apply_surface_state(nodes.main_surface, surface);
        }
        if let Err(e) = self.scene.set_offset(nodes.surface_root, offset) {
            tracing::error!(target: "wayscene::views", view = %view, error = %e, "failed to move surface");
        }
        tracing::debug!(
            target: "wayscene::txn",
            toplevel = %toplevel_id,
            mapped = new_state.mapped,
            geometry = %new_state.geometry,
            "applied toplevel state"
        );

        if new_state.mapped && !old_state.mapped {
            self.view_did_map(view);
        } else if !new_state.mapped && old_state.mapped {
            self.view_did_unmap(view);
        }

        if new_state.geometry != old_state.geometry {
            self.update_view_output(view);
            self.emit(&Event::ViewGeometryChanged {
                view,
                old: old_state.geometry,
            });
        }
        if new_state.tiled_edges != old_state.tiled_edges {
            self.emit(&Event::TiledChanged {
                view,
                edges: new_state.tiled_edges,
            });
        }
        if new_state.fullscreen != old_state.fullscreen {
            self.emit(&Event::FullscreenChanged {
                view,
                fullscreen: new_state.fullscreen,
            });
        }
        self.emit(&Event::ToplevelApplied { view, old_state });

        self.scene.mark_updated(UpdateFlags::GEOMETRY);
        self.scene.damage_whole(nodes.root);
    }
}
