//! Painting outputs
//!
//! One frame of an output, in order:
//!
//! 1. `Pre` and `Damage` effect hooks (animations step here)
//! 2. Render instance and visibility refresh
//! 3. Direct scanout, when nothing needs compositing
//! 4. Buffer acquisition and the damage for the buffer's age
//! 5. Render pass, then `Overlay` hooks drawing on top
//! 6. Present, frame callbacks, `Post` hooks

use crate::buffer::Color;
use crate::output::{EffectHook, EffectPhase, FrameOutcome, OutputId};
use crate::plugin::{EffectContext, Event};
use crate::region::Region;
use crate::render::{
    compute_visibility_from_list, run_render_pass, try_scanout_from_list, RenderTarget, Renderer, SoftwareRenderer,
};
use crate::scene::NodeId;

use super::WayScene;

const DAMAGE_DEBUG_COLOR: Color = Color::rgba(1.0, 1.0, 0.0, 0.25);

impl WayScene {
    /// Paint every enabled output
    pub fn paint_all(&mut self) -> Vec<(OutputId, FrameOutcome)> {
        self.outputs
            .ids()
            .into_iter()
            .map(|id| (id, self.paint_output(id)))
            .collect()
    }

    /// Run one frame on an output
    pub fn paint_output(&mut self, id: OutputId) -> FrameOutcome {
        match self.outputs.get(id) {
            Some(output) if output.enabled => {}
            _ => return FrameOutcome::Disabled,
        }
        if self.started_outputs.insert(id) {
            self.emit(&Event::OutputStartRendering { output: id });
        }

        self.flush_scene_damage();
        self.run_effects(id, EffectPhase::Pre);
        self.run_effects(id, EffectPhase::Damage);
        self.flush_scene_damage();

        let direct_scanout = self.config.core.direct_scanout_enabled();
        let no_damage_track = self.config.core.no_damage_track;
        let damage_debug = self.config.core.damage_debug;
        let background = self.background_color();

        let Some(output) = self.outputs.get_mut(id) else {
            return FrameOutcome::Disabled;
        };
        if !output.render.needs_frame() {
            return FrameOutcome::Skipped;
        }
        let geometry = output.geometry();

        // ========== Instances and visibility ==========

        if output.render.instances_dirty {
            output.render.instances.clear();
            self.scene
                .generate_render_instances(self.scene.root(), &mut output.render.instances);
            output.render.instances_dirty = false;
            output.render.visibility_dirty = true;
            tracing::trace!(
                target: "wayscene::render",
                output = %id,
                instances = output.render.instances.len(),
                "regenerated render instances"
            );
        }
        if output.render.visibility_dirty {
            let mut visible = Region::from_rect(geometry);
            compute_visibility_from_list(&mut output.render.instances, &self.scene, &mut visible);
            output.render.visibility_dirty = false;
        }

        // ========== Direct scanout ==========

        if direct_scanout
            && output.render.can_scanout()
            && try_scanout_from_list(&mut output.render.instances, &self.scene, &mut output.scanout_plane)
        {
            output.render.scanout_done();
            let visible = visible_surfaces(&output.render.instances);
            self.send_frame_callbacks(&visible);
            return FrameOutcome::ScannedOut;
        }
        if output.scanout_plane.presented().is_some() {
            tracing::debug!(target: "wayscene::scanout", output = %id, "leaving direct scanout");
            output.scanout_plane.clear();
        }

        // ========== Composite ==========

        let mut buffer = match output.render.swapchain.acquire() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(target: "wayscene::render", output = %id, error = %e, "skipping frame");
                return FrameOutcome::AcquireFailed;
            }
        };
        let mut damage = output.render.frame_damage(buffer.age);
        if no_damage_track {
            damage = Region::from_rect(geometry);
        }
        // Damage added from here on belongs to the next frame.
        output.render.damage_ring.rotate();
        output.render.frame_done();

        let target = RenderTarget::new(geometry, output.scale(), output.transform());
        let inhibited = output.render.is_inhibited();
        let mut renderer = SoftwareRenderer::new(&mut buffer.framebuffer);
        let instructions = run_render_pass(
            &mut output.render.instances,
            &self.scene,
            &target,
            &damage,
            background,
            &mut renderer,
        );
        let visible = visible_surfaces(&output.render.instances);
        if damage_debug {
            tracing::debug!(target: "wayscene::render", output = %id, damage = ?damage.rects(), instructions, "frame damage");
            renderer.draw_solid(&target, geometry, &damage, DAMAGE_DEBUG_COLOR);
        }

        self.run_overlay_effects(id, &target, &mut renderer);
        if inhibited {
            renderer.clear(&target, &Region::from_rect(geometry), Color::BLACK);
        }
        drop(renderer);

        let Some(output) = self.outputs.get_mut(id) else {
            return FrameOutcome::Disabled;
        };
        output.render.swapchain.present(buffer);

        self.send_frame_callbacks(&visible);
        self.run_effects(id, EffectPhase::Post);
        if let Some(output) = self.outputs.get_mut(id) {
            if output.render.redraw_always() {
                output.render.schedule_repaint();
            }
        }
        FrameOutcome::Painted
    }

    /// Run the hooks of a phase that has no renderer
    fn run_effects(&mut self, output: OutputId, phase: EffectPhase) {
        let Some(hooks) = self.outputs.get(output).map(|o| o.render.effects(phase)) else {
            return;
        };
        for hook in hooks {
            // Skip hooks removed by an earlier hook of this run
            if !self.outputs.get(output).is_some_and(|o| o.render.has_effect(&hook)) {
                continue;
            }
            match hook {
                EffectHook::Animation { view, key } => self.step_animation(view, &key),
                EffectHook::Plugin { plugin, token } => {
                    self.with_plugin(plugin, |p, core| {
                        p.run_effect(
                            core,
                            EffectContext {
                                output,
                                phase,
                                token,
                                target: None,
                                renderer: None,
                            },
                        )
                    });
                }
            }
        }
    }

    fn run_overlay_effects(&mut self, output: OutputId, target: &RenderTarget, renderer: &mut dyn Renderer) {
        let Some(hooks) = self.outputs.get(output).map(|o| o.render.effects(EffectPhase::Overlay)) else {
            return;
        };
        for hook in hooks {
            if !self.outputs.get(output).is_some_and(|o| o.render.has_effect(&hook)) {
                continue;
            }
            match hook {
                EffectHook::Animation { view, key } => self.step_animation(view, &key),
                EffectHook::Plugin { plugin, token } => {
                    self.with_plugin(plugin, |p, core| {
                        p.run_effect(
                            core,
                            EffectContext {
                                output,
                                phase: EffectPhase::Overlay,
                                token,
                                target: Some(target),
                                renderer: Some(&mut *renderer),
                            },
                        )
                    });
                }
            }
        }
    }

    fn send_frame_callbacks(&mut self, surfaces: &[NodeId]) {
        let toplevels: Vec<_> = self
            .views
            .iter()
            .filter(|(_, v)| surfaces.contains(&v.nodes.main_surface))
            .map(|(_, v)| v.toplevel)
            .collect();
        for toplevel in toplevels {
            if let Some(t) = self.toplevels.get_mut(toplevel) {
                t.send_frame_done();
            }
        }
    }
}

fn visible_surfaces(instances: &[Box<dyn crate::scene::RenderInstance>]) -> Vec<NodeId> {
    let mut out = Vec::new();
    for instance in instances {
        instance.collect_visible(&mut out);
    }
    out
}
