//! Animation hook lifecycle
//!
//! A hook is stored on its view under a key derived from the effect name
//! (see [`hook_key`]). Starting an animation whose key is already in use
//! rebinds the running hook instead of creating a second one.

use crate::animate::{
    hook_key, AnimationDescription, AnimationHook, AnimationStrategy, AnimationTarget, AnimationType,
};
use crate::output::{EffectHook, EffectPhase, OutputId};
use crate::scene::{NodeId, NodeKind, SceneGraph, SnapshotNode};
use crate::view::{ViewId, ViewNodes};

use super::WayScene;

/// What `start_animation` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationStart {
    /// A new hook was created
    Started,
    /// A hook with the same key was already running and was rebound
    Rebound,
    /// No effect with that name is registered
    UnknownEffect,
    NoView,
}

/// Capture the main surface's contents in a snapshot node placed where the
/// surface is
fn create_snapshot(scene: &mut SceneGraph, nodes: ViewNodes) -> Option<NodeId> {
    let snapshot = SnapshotNode::capture(scene.surface(nodes.main_surface)?);
    let id = scene.create_node(NodeKind::Snapshot(snapshot));
    if let Err(e) = scene.add_front(nodes.surface_root, id) {
        tracing::error!(target: "wayscene::views", error = %e, "failed to insert unmap snapshot");
        let _ = scene.destroy(id);
        return None;
    }
    Some(id)
}

fn remove_snapshot(scene: &mut SceneGraph, snapshot: NodeId) {
    if let Err(e) = scene.destroy(snapshot) {
        tracing::error!(target: "wayscene::views", error = %e, "failed to remove unmap snapshot");
    }
}

impl WayScene {
    /// Start the registered effect `effect` on a view, or rebind the hook
    /// already running under the same key
    pub fn start_animation(
        &mut self,
        view: ViewId,
        effect: &str,
        kind: AnimationType,
        description: AnimationDescription,
    ) -> AnimationStart {
        let key = hook_key(effect, kind);
        if self.views.get(view).is_some_and(|v| v.hooks.contains_key(&key)) {
            self.rebind_animation(view, &key, kind);
            return AnimationStart::Rebound;
        }
        let Some(strategy) = self.effects.get(effect).map(|e| (e.generator)()) else {
            tracing::error!(effect, "unknown animation effect");
            return AnimationStart::UnknownEffect;
        };
        self.start_animation_with(view, effect, strategy, kind, description)
    }

    /// Start an animation with an explicit strategy
    pub fn start_animation_with(
        &mut self,
        view: ViewId,
        effect: &str,
        mut strategy: Box<dyn AnimationStrategy>,
        kind: AnimationType,
        description: AnimationDescription,
    ) -> AnimationStart {
        let key = hook_key(effect, kind);
        let now = self.now();
        let Some(v) = self.views.get(view) else {
            return AnimationStart::NoView;
        };
        if v.hooks.contains_key(&key) {
            self.rebind_animation(view, &key, kind);
            return AnimationStart::Rebound;
        }
        let nodes = v.nodes;
        let output = v.output;

        strategy.init(
            &mut AnimationTarget {
                scene: &mut self.scene,
                view,
                nodes,
                now,
            },
            description,
            kind,
        );
        if let Some(output) = output.and_then(|o| self.outputs.get_mut(o)) {
            output.render.add_effect(
                EffectHook::Animation {
                    view,
                    key: key.clone(),
                },
                EffectPhase::Pre,
            );
            output.render.schedule_repaint();
        }
        if let Err(e) = self.scene.set_enabled(nodes.root, true) {
            tracing::error!(view = %view, error = %e, "failed to enable animated view");
        }
        let snapshot = if kind == AnimationType::UNMAP {
            create_snapshot(&mut self.scene, nodes)
        } else {
            None
        };

        tracing::debug!(view = %view, key, ?kind, duration = ?description.duration, "animation started");
        let hook = AnimationHook {
            effect: effect.to_string(),
            key: key.clone(),
            kind,
            output,
            strategy: Some(strategy),
            snapshot,
            frames: 0,
        };
        if let Some(v) = self.views.get_mut(view) {
            v.hooks.insert(key, hook);
        }
        self.flush_scene_damage();
        AnimationStart::Started
    }

    /// Change the direction of a running hook. A change between hiding and
    /// showing reverses the strategy from where it is.
    fn rebind_animation(&mut self, view: ViewId, key: &str, kind: AnimationType) {
        let now = self.now();
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        let nodes = v.nodes;
        let Some(hook) = v.hooks.get_mut(key) else {
            return;
        };

        if kind == AnimationType::UNMAP {
            if hook.snapshot.is_none() {
                hook.snapshot = create_snapshot(&mut self.scene, nodes);
            }
        } else if let Some(snapshot) = hook.snapshot.take() {
            remove_snapshot(&mut self.scene, snapshot);
        }

        let direction_change = hook.kind.is_hiding() != kind.is_hiding();
        hook.kind = kind;
        if direction_change {
            if let Some(strategy) = hook.strategy.as_mut() {
                strategy.reverse(now);
            }
        }
        tracing::debug!(view = %view, key, ?kind, direction_change, "animation rebound");
        self.flush_scene_damage();
    }

    /// One frame of a hook: damage, step, damage. A finished hook removes
    /// itself.
    pub(crate) fn step_animation(&mut self, view: ViewId, key: &str) {
        let now = self.now();
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        let nodes = v.nodes;
        let Some(hook) = v.hooks.get_mut(key) else {
            return;
        };

        self.scene.damage_whole(nodes.root);
        let running = match hook.strategy.as_mut() {
            Some(strategy) => strategy.step(&mut AnimationTarget {
                scene: &mut self.scene,
                view,
                nodes,
                now,
            }),
            None => false,
        };
        hook.frames += 1;
        self.scene.damage_whole(nodes.root);

        if !running {
            tracing::debug!(view = %view, key, frames = hook.frames, "animation finished");
            self.remove_animation(view, key);
        }
    }

    /// Tear down a hook: leave the render loop, drop the strategy, remove
    /// the snapshot, then release the hook's enable reference on the root
    pub fn remove_animation(&mut self, view: ViewId, key: &str) {
        let now = self.now();
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        let nodes = v.nodes;
        let Some(mut hook) = v.hooks.remove(key) else {
            return;
        };

        if let Some(output) = hook.output.and_then(|o| self.outputs.get_mut(o)) {
            output.render.rem_effect(&EffectHook::Animation {
                view,
                key: key.to_string(),
            });
        }
        if let Some(mut strategy) = hook.strategy.take() {
            strategy.teardown(&mut AnimationTarget {
                scene: &mut self.scene,
                view,
                nodes,
                now,
            });
        }
        if let Some(snapshot) = hook.snapshot.take() {
            remove_snapshot(&mut self.scene, snapshot);
        }
        if let Err(e) = self.scene.set_enabled(nodes.root, false) {
            tracing::error!(view = %view, error = %e, "failed to release animated view");
        }

        self.flush_scene_damage();
        self.reap_view(view);
    }

    /// Move a view's hooks to the render loop of its new output
    pub(crate) fn retarget_animation_hooks(&mut self, view: ViewId, old: Option<OutputId>, new: Option<OutputId>) {
        let Some(v) = self.views.get_mut(view) else {
            return;
        };
        for (key, hook) in v.hooks.iter_mut() {
            let effect = EffectHook::Animation { view, key: key.clone() };
            if let Some(output) = old.and_then(|o| self.outputs.get_mut(o)) {
                output.render.rem_effect(&effect);
            }
            if let Some(output) = new.and_then(|o| self.outputs.get_mut(o)) {
                output.render.add_effect(effect, EffectPhase::Pre);
                output.render.schedule_repaint();
            }
            hook.output = new;
        }
    }

    /// Every running hook, optionally only those driven by `output`
    pub fn animation_hooks(&self, output: Option<OutputId>) -> Vec<(ViewId, String)> {
        self.views
            .iter()
            .flat_map(|(id, v)| {
                v.hooks
                    .values()
                    .filter(move |h| output.is_none() || h.output == output)
                    .map(move |h| (id, h.key.clone()))
            })
            .collect()
    }
}
