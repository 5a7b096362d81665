//! Plugin interface and core events
//!
//! Plugins are owned by [`WayScene`] and called with mutable access to it.
//! While a plugin runs it is taken out of the plugin list, so a plugin never
//! receives an event it caused itself.

use crate::geometry::{Edges, Rect};
use crate::output::{EffectPhase, OutputId};
use crate::render::{RenderTarget, Renderer};
use crate::state::WayScene;
use crate::toplevel::{ToplevelId, ToplevelState};
use crate::view::ViewId;

/// Handle to a loaded plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(pub usize);

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

/// Something plugins may react to
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ViewMapped { view: ViewId },
    /// The view is about to lose its contents; last chance to snapshot
    ViewPreUnmap { view: ViewId },
    ViewUnmapped { view: ViewId },
    MinimizeRequest { view: ViewId, minimized: bool },
    ViewOutputChanged {
        view: ViewId,
        old: Option<OutputId>,
        new: Option<OutputId>,
    },
    ViewGeometryChanged { view: ViewId, old: Rect },
    FullscreenChanged { view: ViewId, fullscreen: bool },
    TiledChanged { view: ViewId, edges: Edges },
    ToplevelApplied {
        view: ViewId,
        old_state: ToplevelState,
    },
    /// A transaction is about to be committed; pending state may still be
    /// adjusted
    NewTransaction { objects: Vec<ToplevelId> },
    OutputAdded { output: OutputId },
    OutputRemoved { output: OutputId },
    /// First frame of an output is about to be painted
    OutputStartRendering { output: OutputId },
    ConfigChanged,
}

/// Arguments of a plugin effect hook run
pub struct EffectContext<'a> {
    pub output: OutputId,
    pub phase: EffectPhase,
    pub token: u32,
    /// Present in the `Overlay` phase only
    pub target: Option<&'a RenderTarget>,
    pub renderer: Option<&'a mut dyn Renderer>,
}

pub trait Plugin {
    fn name(&self) -> &str;

    fn init(&mut self, _core: &mut WayScene) {}

    fn handle_event(&mut self, _core: &mut WayScene, _event: &Event) {}

    /// Run an effect hook registered as `EffectHook::Plugin`
    fn run_effect(&mut self, _core: &mut WayScene, _ctx: EffectContext<'_>) {}

    /// Give up an output grab immediately; called when a higher-priority
    /// plugin activates or the output is inhibited
    fn cancel(&mut self, _core: &mut WayScene, _output: OutputId) {}

    fn fini(&mut self, _core: &mut WayScene) {}
}
