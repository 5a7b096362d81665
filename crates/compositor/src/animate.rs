//! Animation hooks and the effects registry
//!
//! # Responsibilities
//!
//! - [`AnimationStrategy`]: the interface animation effects implement
//! - [`EffectsRegistry`]: effects selectable by name from configuration
//! - [`AnimationHook`]: per-(view, animation class) record tying a strategy
//!   to the render loop of the view's output
//! - Timing helpers ([`Progression`], [`Easing`])
//!
//! # NOT Responsible For
//!
//! - Starting, stepping and tearing down hooks (see `state/animation.rs`,
//!   which owns the scene, outputs and views the hook touches)
//! - Choosing which effect a view gets (the animate plugin)

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::output::OutputId;
use crate::scene::{NodeId, SceneGraph};
use crate::view::{ViewId, ViewNodes};

bitflags::bitflags! {
    /// Direction and cause of an animation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AnimationType: u32 {
        const HIDING = 1 << 0;
        const SHOWING = 1 << 1;
        const MAP_STATE = 1 << 2;
        const MINIMIZE_STATE = 1 << 3;

        const MAP = Self::SHOWING.bits() | Self::MAP_STATE.bits();
        const UNMAP = Self::HIDING.bits() | Self::MAP_STATE.bits();
        const MINIMIZE = Self::HIDING.bits() | Self::MINIMIZE_STATE.bits();
        const RESTORE = Self::SHOWING.bits() | Self::MINIMIZE_STATE.bits();
    }
}

impl AnimationType {
    pub fn is_hiding(self) -> bool {
        self.contains(AnimationType::HIDING)
    }
}

/// Hook key for an effect name. Map/unmap and minimize/restore use separate
/// keys so both classes can run on a view at once.
pub fn hook_key(effect: &str, kind: AnimationType) -> String {
    if kind.contains(AnimationType::MINIMIZE_STATE) {
        format!("animation-hook-{effect}-minimize")
    } else {
        format!("animation-hook-{effect}")
    }
}

// ========== Timing ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Easing {
    Linear,
    #[default]
    Circle,
    Sigmoid,
}

impl Easing {
    /// Parse a config name; unknown names are `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Easing::Linear),
            "circle" => Some(Easing::Circle),
            "sigmoid" => Some(Easing::Sigmoid),
            _ => None,
        }
    }

    /// Map linear progress in `[0, 1]` onto the curve
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Circle => (2.0 * t - t * t).sqrt(),
            Easing::Sigmoid => {
                let k = 10.0;
                let s = |x: f64| 1.0 / (1.0 + (-k * (x - 0.5)).exp());
                (s(t) - s(0.0)) / (s(1.0) - s(0.0))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationDescription {
    pub duration: Duration,
    pub easing: Easing,
}

impl AnimationDescription {
    pub fn new(duration: Duration, easing: Easing) -> Self {
        Self { duration, easing }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms), Easing::default())
    }
}

/// Progress of a timed animation from 0 to 1, or 1 to 0 when reversed
#[derive(Debug, Clone, Copy)]
pub struct Progression {
    description: AnimationDescription,
    start: Instant,
    reversed: bool,
}

impl Progression {
    pub fn new(description: AnimationDescription, now: Instant) -> Self {
        Self {
            description,
            start: now,
            reversed: false,
        }
    }

    /// Start at `now`, running from 1 to 0 when `reversed`
    pub fn with_direction(description: AnimationDescription, now: Instant, reversed: bool) -> Self {
        Self {
            description,
            start: now,
            reversed,
        }
    }

    fn linear(&self, now: Instant) -> f64 {
        let total = self.description.duration.as_secs_f64();
        if total <= 0.0 {
            return 1.0;
        }
        (now.saturating_duration_since(self.start).as_secs_f64() / total).min(1.0)
    }

    /// Eased progress at `now`
    pub fn progress(&self, now: Instant) -> f64 {
        let value = self.description.easing.apply(self.linear(now));
        if self.reversed {
            1.0 - value
        } else {
            value
        }
    }

    pub fn running(&self, now: Instant) -> bool {
        self.linear(now) < 1.0
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Run backwards from the current position
    pub fn reverse(&mut self, now: Instant) {
        let elapsed = self.linear(now);
        let remaining = self.description.duration.mul_f64(1.0 - elapsed);
        self.start = now.checked_sub(remaining).unwrap_or(now);
        self.reversed = !self.reversed;
    }

    /// Start over at `now` in the current direction
    pub fn restart(&mut self, now: Instant) {
        self.start = now;
    }
}

// ========== Strategies ==========

/// What an animation strategy may touch
pub struct AnimationTarget<'a> {
    pub scene: &'a mut SceneGraph,
    pub view: ViewId,
    pub nodes: ViewNodes,
    pub now: Instant,
}

/// An animation effect. Strategies drive the view through transformers on
/// its transformed node.
pub trait AnimationStrategy {
    fn init(&mut self, target: &mut AnimationTarget<'_>, description: AnimationDescription, kind: AnimationType);

    /// Advance to `target.now`. Returns false once finished.
    fn step(&mut self, target: &mut AnimationTarget<'_>) -> bool;

    /// Switch between hiding and showing without restarting
    fn reverse(&mut self, now: Instant);

    /// Remove everything the strategy added to the scene
    fn teardown(&mut self, target: &mut AnimationTarget<'_>);
}

pub type StrategyGenerator = Box<dyn Fn() -> Box<dyn AnimationStrategy>>;
pub type DurationSource = Box<dyn Fn() -> Option<AnimationDescription>>;

pub struct EffectDescription {
    pub generator: StrategyGenerator,
    /// Effect-specific duration, `None` to use the caller's default
    pub default_duration: DurationSource,
}

/// Named animation effects
#[derive(Default)]
pub struct EffectsRegistry {
    effects: BTreeMap<String, EffectDescription>,
}

impl fmt::Debug for EffectsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.effects.keys()).finish()
    }
}

impl EffectsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an effect
    pub fn register_effect(&mut self, name: &str, effect: EffectDescription) {
        self.effects.insert(name.to_string(), effect);
    }

    pub fn unregister_effect(&mut self, name: &str) -> bool {
        self.effects.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&EffectDescription> {
        self.effects.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.effects.keys().map(String::as_str)
    }
}

// ========== Hooks ==========

/// A running animation on a view.
///
/// Hooks are stored on the view under their key. Dropping one is done
/// through `WayScene::remove_animation`, which tears it down in order:
/// effect hook, strategy, snapshot, then the root's enable reference.
pub struct AnimationHook {
    pub(crate) effect: String,
    pub(crate) key: String,
    pub(crate) kind: AnimationType,
    pub(crate) output: Option<OutputId>,
    pub(crate) strategy: Option<Box<dyn AnimationStrategy>>,
    /// Last contents of the view, shown while it is being unmapped
    pub(crate) snapshot: Option<NodeId>,
    pub(crate) frames: u32,
}

impl fmt::Debug for AnimationHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationHook")
            .field("effect", &self.effect)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("output", &self.output)
            .field("snapshot", &self.snapshot)
            .field("frames", &self.frames)
            .finish()
    }
}

impl AnimationHook {
    pub fn effect(&self) -> &str {
        &self.effect
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> AnimationType {
        self.kind
    }

    pub fn output(&self) -> Option<OutputId> {
        self.output
    }

    pub fn snapshot(&self) -> Option<NodeId> {
        self.snapshot
    }

    /// Frames stepped so far
    pub fn frames(&self) -> u32 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_types_are_built_from_bits() {
        assert!(AnimationType::UNMAP.is_hiding());
        assert!(AnimationType::MINIMIZE.is_hiding());
        assert!(!AnimationType::MAP.is_hiding());
        assert!(AnimationType::RESTORE.contains(AnimationType::MINIMIZE_STATE));
    }

    #[test]
    fn minimize_keys_are_separate() {
        assert_eq!(hook_key("fade", AnimationType::MAP), "animation-hook-fade");
        assert_eq!(hook_key("fade", AnimationType::UNMAP), "animation-hook-fade");
        assert_eq!(hook_key("fade", AnimationType::MINIMIZE), "animation-hook-fade-minimize");
    }

    #[test]
    fn easing_endpoints() {
        for easing in [Easing::Linear, Easing::Circle, Easing::Sigmoid] {
            assert!(easing.apply(0.0).abs() < 1e-9);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9);
        }
        assert_eq!(Easing::from_name("bounce"), None);
    }

    #[test]
    fn progression_runs_and_finishes() {
        let start = Instant::now();
        let p = Progression::new(
            AnimationDescription::new(Duration::from_millis(100), Easing::Linear),
            start,
        );
        assert!((p.progress(start + Duration::from_millis(50)) - 0.5).abs() < 1e-6);
        assert!(p.running(start + Duration::from_millis(99)));
        assert!(!p.running(start + Duration::from_millis(100)));
    }

    #[test]
    fn reversing_keeps_position() {
        let start = Instant::now();
        let mut p = Progression::new(
            AnimationDescription::new(Duration::from_millis(100), Easing::Linear),
            start,
        );
        let mid = start + Duration::from_millis(30);
        let before = p.progress(mid);
        p.reverse(mid);
        assert!((p.progress(mid) - before).abs() < 1e-6);
        assert!(p.progress(mid + Duration::from_millis(10)) < before);
        assert!(!p.running(mid + Duration::from_millis(30)));
    }

    #[test]
    fn hiding_progression_starts_at_one() {
        let now = Instant::now();
        let p = Progression::with_direction(
            AnimationDescription::new(Duration::from_millis(100), Easing::Linear),
            now,
            true,
        );
        assert_eq!(p.progress(now), 1.0);
        assert!(p.running(now));
        assert!(p.progress(now + Duration::from_millis(100)).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_is_finished() {
        let now = Instant::now();
        let p = Progression::new(AnimationDescription::from_millis(0), now);
        assert!(!p.running(now));
        assert_eq!(p.progress(now), 1.0);
    }

    #[test]
    fn registry_register_and_unregister() {
        struct Nop;
        impl AnimationStrategy for Nop {
            fn init(&mut self, _: &mut AnimationTarget<'_>, _: AnimationDescription, _: AnimationType) {}
            fn step(&mut self, _: &mut AnimationTarget<'_>) -> bool {
                false
            }
            fn reverse(&mut self, _: Instant) {}
            fn teardown(&mut self, _: &mut AnimationTarget<'_>) {}
        }

        let mut registry = EffectsRegistry::new();
        registry.register_effect(
            "nop",
            EffectDescription {
                generator: Box::new(|| Box::new(Nop)),
                default_duration: Box::new(|| None),
            },
        );
        assert!(registry.contains("nop"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["nop"]);
        assert!(registry.unregister_effect("nop"));
        assert!(!registry.unregister_effect("nop"));
    }
}
