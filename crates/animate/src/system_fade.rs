//! Fade-in of a whole output when it starts rendering
//!
//! A `Pre` hook damages the output every frame and an `Overlay` hook draws
//! black over the composited scene with alpha going from 1 to 0. The output
//! redraws continuously until the fade is over.

use std::time::Instant;

use compositor::animate::{AnimationDescription, Progression};
use compositor::buffer::Color;
use compositor::output::{EffectHook, EffectPhase, OutputId};
use compositor::plugin::PluginId;
use compositor::region::Region;
use compositor::render::{RenderTarget, Renderer};
use compositor::WayScene;

pub struct SystemFade {
    plugin: PluginId,
    output: OutputId,
    progression: Progression,
    /// Tokens of the damage and overlay hooks
    tokens: [u32; 2],
}

impl SystemFade {
    /// Register the hooks on `output`
    pub fn start(
        core: &mut WayScene,
        plugin: PluginId,
        tokens: [u32; 2],
        output: OutputId,
        description: AnimationDescription,
    ) -> Option<Self> {
        let now = core.now();
        let o = core.outputs.get_mut(output)?;
        o.render.add_effect(EffectHook::Plugin { plugin, token: tokens[0] }, EffectPhase::Pre);
        o.render.add_effect(EffectHook::Plugin { plugin, token: tokens[1] }, EffectPhase::Overlay);
        o.render.set_redraw_always(true);
        tracing::debug!(output = %output, duration = ?description.duration, "system fade started");
        Some(Self {
            plugin,
            output,
            progression: Progression::with_direction(description, now, true),
            tokens,
        })
    }

    pub fn owns(&self, token: u32) -> bool {
        self.tokens.contains(&token)
    }

    /// Opacity of the black overlay at `now`
    pub fn alpha(&self, now: Instant) -> f32 {
        self.progression.progress(now) as f32
    }

    pub fn damage(&self, core: &mut WayScene) {
        if let Some(o) = core.outputs.get_mut(self.output) {
            o.render.damage_whole();
        }
    }

    /// Draw the overlay. Returns false once the fade is over.
    pub fn render(&self, now: Instant, target: &RenderTarget, renderer: &mut dyn Renderer) -> bool {
        let area = Region::from_rect(target.geometry);
        renderer.draw_solid(target, target.geometry, &area, Color::BLACK.with_alpha(self.alpha(now)));
        self.progression.running(now)
    }

    /// Remove the hooks and release redraw-always
    pub fn finish(self, core: &mut WayScene) {
        if let Some(o) = core.outputs.get_mut(self.output) {
            for token in self.tokens {
                o.render.rem_effect(&EffectHook::Plugin {
                    plugin: self.plugin,
                    token,
                });
            }
            o.render.set_redraw_always(false);
            o.render.damage_whole();
        }
        tracing::debug!(output = %self.output, "system fade finished");
    }
}
