//! Animate plugin
//!
//! Chooses an animation for views as they map, unmap, minimize and restore,
//! and fades outputs in when they start rendering.
//!
//! # Responsibilities
//!
//! - Built-in effects (`fade`, `zoom`, `spin`) registered by name
//! - Per-view effect selection: app-id matchers, configured names, `none`
//! - Start-up fade of each output
//! - Dropping hooks of outputs that go away
//!
//! # NOT Responsible For
//!
//! - Hook lifetime, rebinding and snapshots (the core's animation hooks)

pub mod effects;
pub mod system_fade;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use compositor::animate::{hook_key, AnimationDescription, AnimationType};
use compositor::config::{app_id_matches, AnimateConfig};
use compositor::output::{EffectPhase, OutputId};
use compositor::plugin::{EffectContext, Event, Plugin, PluginId};
use compositor::view::ViewId;
use compositor::{AnimationStart, WayScene};

use crate::effects::{describe, register_builtin, BUILTIN_EFFECTS};
use crate::system_fade::SystemFade;

/// Effect name meaning "do not animate"
pub const NO_ANIMATION: &str = "none";

pub struct AnimatePlugin {
    id: Option<PluginId>,
    /// Shared with the duration sources of the registered effects
    options: Rc<RefCell<AnimateConfig>>,
    fades: HashMap<OutputId, SystemFade>,
    next_token: u32,
}

impl Default for AnimatePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimatePlugin {
    pub fn new() -> Self {
        Self {
            id: None,
            options: Rc::new(RefCell::new(AnimateConfig::default())),
            fades: HashMap::new(),
            next_token: 0,
        }
    }

    /// Effect for a view: the fade and zoom matchers win over the
    /// configured name, which only applies to views `enabled_for` matches
    pub fn animation_for(&self, app_id: &str, configured: &str) -> String {
        let options = self.options.borrow();
        if app_id_matches(&options.fade_enabled_for, app_id) {
            "fade".to_string()
        } else if app_id_matches(&options.zoom_enabled_for, app_id) {
            "zoom".to_string()
        } else if app_id_matches(&options.enabled_for, app_id) {
            configured.to_string()
        } else {
            NO_ANIMATION.to_string()
        }
    }

    fn description_for(&self, core: &WayScene, effect: &str) -> AnimationDescription {
        core.effects()
            .get(effect)
            .and_then(|e| (e.default_duration)())
            .unwrap_or_else(|| {
                let options = self.options.borrow();
                describe(&options, options.duration_ms)
            })
    }

    fn animate(&self, core: &mut WayScene, view: ViewId, kind: AnimationType) {
        let Some(app_id) = core.view(view).map(|v| v.app_id.clone()) else {
            return;
        };
        let configured = {
            let options = self.options.borrow();
            if kind.contains(AnimationType::MINIMIZE_STATE) {
                options.minimize_animation.clone()
            } else if kind.is_hiding() {
                options.close_animation.clone()
            } else {
                options.open_animation.clone()
            }
        };
        let effect = self.animation_for(&app_id, &configured);
        if effect == NO_ANIMATION {
            return;
        }
        let description = self.description_for(core, &effect);
        match core.start_animation(view, &effect, kind, description) {
            AnimationStart::Started | AnimationStart::Rebound => {
                tracing::debug!(view = %view, effect, ?kind, "animating view");
            }
            AnimationStart::UnknownEffect => {
                tracing::error!(effect, app_id, "animation not registered, not animating");
            }
            AnimationStart::NoView => {}
        }
    }

    fn start_fade(&mut self, core: &mut WayScene, output: OutputId) {
        let Some(plugin) = self.id else {
            return;
        };
        let duration_ms = self.options.borrow().startup_duration_ms;
        if duration_ms == 0 {
            return;
        }
        let description = describe(&self.options.borrow(), duration_ms);
        let tokens = [self.next_token, self.next_token + 1];
        self.next_token += 2;
        if let Some(fade) = SystemFade::start(core, plugin, tokens, output, description) {
            if let Some(old) = self.fades.insert(output, fade) {
                old.finish(core);
            }
        }
    }

    /// Drop hooks driven by an output that is going away
    fn cleanup_output(&mut self, core: &mut WayScene, output: OutputId) {
        for (view, key) in core.animation_hooks(Some(output)) {
            core.remove_animation(view, &key);
        }
        if let Some(fade) = self.fades.remove(&output) {
            fade.finish(core);
        }
    }
}

impl Plugin for AnimatePlugin {
    fn name(&self) -> &str {
        "animate"
    }

    fn init(&mut self, core: &mut WayScene) {
        self.id = core.current_plugin();
        *self.options.borrow_mut() = core.config().animate.clone();
        register_builtin(core.effects_mut(), &self.options);
    }

    fn handle_event(&mut self, core: &mut WayScene, event: &Event) {
        match event {
            Event::ViewMapped { view } => self.animate(core, *view, AnimationType::MAP),
            Event::ViewPreUnmap { view } => self.animate(core, *view, AnimationType::UNMAP),
            Event::MinimizeRequest { view, minimized } => {
                let kind = if *minimized {
                    AnimationType::MINIMIZE
                } else {
                    AnimationType::RESTORE
                };
                self.animate(core, *view, kind);
            }
            Event::OutputStartRendering { output } => self.start_fade(core, *output),
            Event::OutputRemoved { output } => self.cleanup_output(core, *output),
            Event::ConfigChanged => {
                *self.options.borrow_mut() = core.config().animate.clone();
            }
            _ => {}
        }
    }

    fn run_effect(&mut self, core: &mut WayScene, ctx: EffectContext<'_>) {
        let Some(fade) = self.fades.get(&ctx.output).filter(|f| f.owns(ctx.token)) else {
            return;
        };
        match ctx.phase {
            EffectPhase::Pre => fade.damage(core),
            EffectPhase::Overlay => {
                let (Some(target), Some(renderer)) = (ctx.target, ctx.renderer) else {
                    return;
                };
                if !fade.render(core.now(), target, renderer) {
                    if let Some(fade) = self.fades.remove(&ctx.output) {
                        fade.finish(core);
                    }
                }
            }
            EffectPhase::Damage | EffectPhase::Post => {}
        }
    }

    fn fini(&mut self, core: &mut WayScene) {
        let own_keys: Vec<String> = BUILTIN_EFFECTS
            .iter()
            .flat_map(|name| [hook_key(name, AnimationType::MAP), hook_key(name, AnimationType::MINIMIZE)])
            .collect();
        for (view, key) in core.animation_hooks(None) {
            if own_keys.contains(&key) {
                core.remove_animation(view, &key);
            }
        }
        for (_, fade) in self.fades.drain() {
            fade.finish(core);
        }
        for name in BUILTIN_EFFECTS {
            core.effects_mut().unregister_effect(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_with(f: impl FnOnce(&mut AnimateConfig)) -> AnimatePlugin {
        let plugin = AnimatePlugin::new();
        f(&mut plugin.options.borrow_mut());
        plugin
    }

    #[test]
    fn matchers_take_precedence() {
        let plugin = plugin_with(|o| {
            o.fade_enabled_for = vec!["org.fade.*".into()];
            o.zoom_enabled_for = vec!["zoomer".into()];
            o.enabled_for = vec!["term".into()];
        });
        assert_eq!(plugin.animation_for("org.fade.app", "spin"), "fade");
        assert_eq!(plugin.animation_for("zoomer", "spin"), "zoom");
        assert_eq!(plugin.animation_for("term", "spin"), "spin");
        assert_eq!(plugin.animation_for("other", "spin"), NO_ANIMATION);
    }

    #[test]
    fn default_options_animate_everything() {
        let plugin = AnimatePlugin::new();
        assert_eq!(plugin.animation_for("anything", "fade"), "fade");
    }
}
