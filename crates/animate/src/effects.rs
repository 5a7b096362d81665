//! Built-in view animations
//!
//! Every built-in effect is a single high-level transformer on the view's
//! transformed node whose parameters are a function of eased progress.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use std::time::Instant;

use compositor::animate::{
    AnimationDescription, AnimationStrategy, AnimationTarget, AnimationType, EffectDescription, EffectsRegistry,
    Easing, Progression,
};
use compositor::config::AnimateConfig;
use compositor::scene::{Transform2D, TRANSFORMER_HIGHLEVEL};

/// Names the built-in effects are registered under
pub const BUILTIN_EFFECTS: [&str; 3] = ["fade", "zoom", "spin"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Fade,
    Zoom,
    Spin { rotations: i32 },
}

impl Effect {
    fn transformer_name(self) -> &'static str {
        match self {
            Effect::Fade => "animate-fade",
            Effect::Zoom => "animate-zoom",
            Effect::Spin { .. } => "animate-spin",
        }
    }

    /// Transform at `progress`, where 0 is hidden and 1 fully shown
    pub fn transform(self, progress: f64) -> Transform2D {
        let alpha = progress.clamp(0.0, 1.0) as f32;
        match self {
            Effect::Fade => Transform2D {
                alpha,
                ..Transform2D::default()
            },
            Effect::Zoom => {
                let scale = 0.5 + 0.5 * progress;
                Transform2D {
                    scale_x: scale,
                    scale_y: scale,
                    alpha,
                    ..Transform2D::default()
                }
            }
            Effect::Spin { rotations } => {
                let scale = 0.01 + 0.99 * progress;
                Transform2D {
                    scale_x: scale,
                    scale_y: scale,
                    angle: progress * 2.0 * PI * f64::from(rotations),
                    alpha,
                    ..Transform2D::default()
                }
            }
        }
    }
}

/// Drives one [`Effect`] through a transformer
pub struct TransformerAnimation {
    effect: Effect,
    progression: Option<Progression>,
}

impl TransformerAnimation {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            progression: None,
        }
    }

    /// Current progress, 0 before `init`
    pub fn progress(&self, now: Instant) -> f64 {
        self.progression.map_or(0.0, |p| p.progress(now))
    }
}

impl AnimationStrategy for TransformerAnimation {
    fn init(&mut self, target: &mut AnimationTarget<'_>, description: AnimationDescription, kind: AnimationType) {
        let progression = Progression::with_direction(description, target.now, kind.is_hiding());
        let transform = self.effect.transform(progression.progress(target.now));
        let name = self.effect.transformer_name();
        if let Err(e) = target
            .scene
            .with_transformers(target.nodes.transformed, |stack| stack.add(name, TRANSFORMER_HIGHLEVEL, transform))
        {
            tracing::error!(view = %target.view, error = %e, "failed to add animation transformer");
        }
        self.progression = Some(progression);
    }

    fn step(&mut self, target: &mut AnimationTarget<'_>) -> bool {
        let Some(progression) = self.progression else {
            return false;
        };
        let transform = self.effect.transform(progression.progress(target.now));
        let name = self.effect.transformer_name();
        let updated = target.scene.with_transformers(target.nodes.transformed, |stack| {
            stack.get_mut(name).map(|t| *t = transform).is_some()
        });
        matches!(updated, Ok(true)) && progression.running(target.now)
    }

    fn reverse(&mut self, now: Instant) {
        if let Some(progression) = &mut self.progression {
            progression.reverse(now);
        }
    }

    fn teardown(&mut self, target: &mut AnimationTarget<'_>) {
        let name = self.effect.transformer_name();
        let _ = target
            .scene
            .with_transformers(target.nodes.transformed, |stack| stack.remove(name));
    }
}

/// Description for an effect-specific duration in milliseconds
pub fn describe(options: &AnimateConfig, duration_ms: u64) -> AnimationDescription {
    let easing = Easing::from_name(&options.easing).unwrap_or_else(|| {
        tracing::warn!(easing = %options.easing, "unknown easing, using the default");
        Easing::default()
    });
    AnimationDescription::new(std::time::Duration::from_millis(duration_ms), easing)
}

/// Register fade, zoom and spin. Durations and spin rotations are read from
/// `options` whenever an animation starts.
pub fn register_builtin(registry: &mut EffectsRegistry, options: &Rc<RefCell<AnimateConfig>>) {
    let fade = Rc::clone(options);
    registry.register_effect(
        "fade",
        EffectDescription {
            generator: Box::new(|| Box::new(TransformerAnimation::new(Effect::Fade))),
            default_duration: Box::new(move || {
                let o = fade.borrow();
                Some(describe(&o, o.fade_duration_ms))
            }),
        },
    );

    let zoom = Rc::clone(options);
    registry.register_effect(
        "zoom",
        EffectDescription {
            generator: Box::new(|| Box::new(TransformerAnimation::new(Effect::Zoom))),
            default_duration: Box::new(move || {
                let o = zoom.borrow();
                Some(describe(&o, o.zoom_duration_ms))
            }),
        },
    );

    let spin = Rc::clone(options);
    let spin_generator = Rc::clone(options);
    registry.register_effect(
        "spin",
        EffectDescription {
            generator: Box::new(move || {
                let rotations = spin_generator.borrow().spin_rotations;
                Box::new(TransformerAnimation::new(Effect::Spin { rotations }))
            }),
            default_duration: Box::new(move || {
                let o = spin.borrow();
                Some(describe(&o, o.spin_duration_ms))
            }),
        },
    );
}
