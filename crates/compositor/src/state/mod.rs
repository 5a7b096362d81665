//! Compositor state
//!
//! [`WayScene`] owns every core component and passes references between
//! them explicitly; nothing is reachable through globals.
//!
//! # Responsibilities
//!
//! - Ownership of the scene graph, outputs, views, toplevels, the
//!   transaction manager, the effects registry and plugins
//! - Routing scene damage and update flags to outputs
//! - Idle work: transaction flushes and instance regeneration
//!
//! # NOT Responsible For
//!
//! - The event loop itself (see `event_loop.rs`)
//! - Client protocol handling: clients are [`ToplevelClient`] trait objects
//!
//! The `impl WayScene` blocks are split by concern:
//!
//! - `views.rs` - view lifecycle and window-management requests
//! - `transactions.rs` - scheduling, commit, apply and client commits
//! - `paint.rs` - painting outputs
//! - `animation.rs` - animation hook lifecycle
//! - `plugins.rs` - plugin loading, events, grabs and inhibition
//! - `diagnostics.rs` - structured dumps

mod animation;
mod diagnostics;
mod paint;
mod plugins;
mod transactions;
mod views;

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::animate::EffectsRegistry;
use crate::arena::Arena;
use crate::buffer::Color;
use crate::config::Config;
use crate::output::{OutputId, OutputLayout};
use crate::plugin::Plugin;
use crate::scene::SceneGraph;
use crate::toplevel::{Toplevel, ToplevelId};
use crate::txn::TransactionManager;
use crate::view::{View, ViewId};

pub use animation::AnimationStart;

/// Source of time for transactions and animations
#[derive(Debug, Clone)]
pub enum Clock {
    System,
    /// Only moves when advanced; used by tests and the headless driver
    Manual(Rc<Cell<Instant>>),
}

impl Clock {
    pub fn manual() -> Self {
        Clock::Manual(Rc::new(Cell::new(Instant::now())))
    }

    pub fn now(&self) -> Instant {
        match self {
            Clock::System => Instant::now(),
            Clock::Manual(now) => now.get(),
        }
    }

    /// Move a manual clock forward; a system clock cannot be moved
    pub fn advance(&self, by: Duration) {
        match self {
            Clock::System => tracing::warn!("cannot advance the system clock"),
            Clock::Manual(now) => now.set(now.get() + by),
        }
    }
}

/// Main compositor state
pub struct WayScene {
    /// The retained scene
    pub scene: SceneGraph,

    /// Outputs and their render managers
    pub outputs: OutputLayout,

    pub(crate) views: Arena<ViewId, View>,
    pub(crate) toplevels: Arena<ToplevelId, Toplevel>,
    pub(crate) toplevel_views: HashMap<ToplevelId, ViewId>,

    pub(crate) transactions: TransactionManager<ToplevelId>,

    /// Animation effects selectable by name
    pub(crate) effects: EffectsRegistry,

    /// `None` while the plugin is being called
    pub(crate) plugins: Vec<Option<Box<dyn Plugin>>>,
    pub(crate) plugin_names: Vec<String>,
    /// Plugins whose callbacks are on the stack, innermost last
    pub(crate) running_plugins: Vec<crate::plugin::PluginId>,

    pub(crate) config: Config,
    clock: Clock,

    /// A transaction flush is waiting for the next idle
    pub(crate) flush_requested: bool,

    /// Outputs that have painted at least once
    pub(crate) started_outputs: HashSet<OutputId>,
}

impl WayScene {
    pub fn new(config: Config, clock: Clock) -> Self {
        let mut scene = SceneGraph::new();
        scene.set_opaque_optimizations(config.workarounds.enable_opaque_region_damage_optimizations);
        Self {
            scene,
            outputs: OutputLayout::new(),
            views: Arena::new(),
            toplevels: Arena::new(),
            toplevel_views: HashMap::new(),
            transactions: TransactionManager::new(config.core.transaction_timeout()),
            effects: EffectsRegistry::new(),
            plugins: Vec::new(),
            plugin_names: Vec::new(),
            running_plugins: Vec::new(),
            config,
            clock,
            flush_requested: false,
            started_outputs: HashSet::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn background_color(&self) -> Color {
        Color::from_array(self.config.core.background_color)
    }

    pub fn effects(&self) -> &EffectsRegistry {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectsRegistry {
        &mut self.effects
    }

    pub fn transactions(&self) -> &TransactionManager<ToplevelId> {
        &self.transactions
    }

    // ========== Views and toplevels ==========

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.ids()
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.iter().map(|(_, v)| v)
    }

    pub fn toplevel(&self, id: ToplevelId) -> Option<&Toplevel> {
        self.toplevels.get(id)
    }

    pub fn view_toplevel(&self, view: ViewId) -> Option<&Toplevel> {
        self.views.get(view).and_then(|v| self.toplevels.get(v.toplevel))
    }

    pub fn view_for_toplevel(&self, toplevel: ToplevelId) -> Option<ViewId> {
        self.toplevel_views.get(&toplevel).copied()
    }

    // ========== Outputs ==========

    pub fn add_output(&mut self, name: &str, geometry: crate::geometry::Rect, scale: f64) -> OutputId {
        let id = self.outputs.add_output(name, geometry, scale);
        tracing::info!(output = %id, name, %geometry, scale, "output added");
        self.emit(&crate::plugin::Event::OutputAdded { output: id });
        self.update_view_outputs();
        id
    }

    pub fn remove_output(&mut self, id: OutputId) {
        if self.outputs.get(id).is_none() {
            return;
        }
        // Plugins clean up while the output still exists.
        self.emit(&crate::plugin::Event::OutputRemoved { output: id });
        if let Some(output) = self.outputs.remove_output(id) {
            tracing::info!(output = %id, name = %output.name, "output removed");
        }
        self.started_outputs.remove(&id);
        self.update_view_outputs();
    }

    // ========== Damage routing ==========

    /// Move scene damage and update flags to the outputs
    pub fn flush_scene_damage(&mut self) {
        let damage = self.scene.take_damage();
        if !damage.is_empty() {
            self.outputs.damage(&damage);
        }
        let updates = self.scene.take_updates();
        if updates.needs_instance_rebuild() {
            for output in self.outputs.iter_mut() {
                output.render.mark_instances_dirty();
            }
        } else if updates.needs_visibility() {
            for output in self.outputs.iter_mut() {
                output.render.mark_visibility_dirty();
            }
        }
    }

    // ========== Idle ==========

    /// Whether an idle callback has work to do
    pub fn has_idle_work(&self) -> bool {
        self.flush_requested || !self.scene.pending_damage().is_empty() || !self.scene.pending_updates().is_empty()
    }

    /// Work deferred to the end of an event loop iteration: commit the
    /// collected transaction and hand damage to the outputs
    pub fn dispatch_idle(&mut self) {
        if std::mem::take(&mut self.flush_requested) {
            self.flush_transactions();
        }
        self.flush_scene_damage();
    }

    // ========== Configuration ==========

    /// Replace the configuration and notify plugins
    pub fn reload_config(&mut self, config: Config) {
        let background_changed = config.core.background_color != self.config.core.background_color;
        self.scene
            .set_opaque_optimizations(config.workarounds.enable_opaque_region_damage_optimizations);
        self.transactions.set_timeout(config.core.transaction_timeout());
        self.config = config;
        if background_changed || self.config.core.no_damage_track {
            self.outputs.damage_whole();
        }
        for output in self.outputs.iter_mut() {
            output.render.mark_instances_dirty();
        }
        tracing::info!("configuration reloaded");
        self.emit(&crate::plugin::Event::ConfigChanged);
    }
}
