//! Plugins: loading, events, output grabs and inhibition

use crate::output::{EffectHook, OutputId, PluginGrab};
use crate::plugin::{Event, Plugin, PluginId};

use super::WayScene;

impl WayScene {
    /// Load a plugin and run its `init`
    pub fn load_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        let id = PluginId(self.plugins.len());
        tracing::info!(plugin = %id, name = plugin.name(), "loading plugin");
        self.plugin_names.push(plugin.name().to_string());
        self.plugins.push(Some(plugin));
        self.with_plugin(id, |plugin, core| plugin.init(core));
        id
    }

    /// Run `fini` and drop the plugin, releasing any grab it holds
    pub fn unload_plugin(&mut self, id: PluginId) {
        let Some(mut plugin) = self.plugins.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        self.running_plugins.push(id);
        plugin.fini(self);
        self.running_plugins.pop();
        for output in self.outputs.iter_mut() {
            if output.grab.is_some_and(|g| g.plugin == id) {
                output.grab = None;
            }
            output
                .render
                .retain_effects(|hook| !matches!(hook, EffectHook::Plugin { plugin, .. } if *plugin == id));
        }
        tracing::info!(plugin = %id, name = plugin.name(), "plugin unloaded");
    }

    pub fn plugin_name(&self, id: PluginId) -> Option<&str> {
        self.plugin_names.get(id.0).map(String::as_str)
    }

    /// Call `f` with the plugin taken out of the list. Does nothing if the
    /// plugin is unloaded or already running.
    pub(crate) fn with_plugin<R>(
        &mut self,
        id: PluginId,
        f: impl FnOnce(&mut dyn Plugin, &mut WayScene) -> R,
    ) -> Option<R> {
        let mut plugin = self.plugins.get_mut(id.0)?.take()?;
        self.running_plugins.push(id);
        let result = f(plugin.as_mut(), self);
        self.running_plugins.pop();
        if let Some(slot) = self.plugins.get_mut(id.0) {
            *slot = Some(plugin);
        }
        Some(result)
    }

    /// The plugin whose callback is running, for registering effect hooks
    /// and grabs under its own id
    pub fn current_plugin(&self) -> Option<PluginId> {
        self.running_plugins.last().copied()
    }

    /// Deliver an event to every plugin, in load order
    pub fn emit(&mut self, event: &Event) {
        tracing::trace!(?event, "emitting event");
        for index in 0..self.plugins.len() {
            self.with_plugin(PluginId(index), |plugin, core| plugin.handle_event(core, event));
        }
    }

    // ========== Grabs ==========

    /// Give `plugin` the output. A holder with lower priority is cancelled
    /// first; an equal or higher priority holder, or an inhibited output,
    /// refuses the activation.
    pub fn activate_plugin(&mut self, output: OutputId, plugin: PluginId, priority: i32) -> bool {
        let Some(o) = self.outputs.get(output) else {
            return false;
        };
        if o.render.is_inhibited() {
            tracing::debug!(output = %output, plugin = %plugin, "activation refused: output inhibited");
            return false;
        }
        let current = o.grab;
        match current {
            Some(grab) if grab.plugin == plugin => return true,
            Some(grab) if grab.priority >= priority => {
                tracing::debug!(
                    output = %output,
                    plugin = %plugin,
                    holder = %grab.plugin,
                    "activation refused: output held"
                );
                return false;
            }
            Some(grab) => self.cancel_grab(output, grab),
            None => {}
        }
        if let Some(o) = self.outputs.get_mut(output) {
            o.grab = Some(PluginGrab { plugin, priority });
        }
        true
    }

    pub fn deactivate_plugin(&mut self, output: OutputId, plugin: PluginId) {
        if let Some(o) = self.outputs.get_mut(output) {
            if o.grab.is_some_and(|g| g.plugin == plugin) {
                o.grab = None;
            }
        }
    }

    fn cancel_grab(&mut self, output: OutputId, grab: PluginGrab) {
        tracing::debug!(output = %output, plugin = %grab.plugin, "cancelling plugin grab");
        if let Some(o) = self.outputs.get_mut(output) {
            o.grab = None;
        }
        self.with_plugin(grab.plugin, |plugin, core| plugin.cancel(core, output));
    }

    // ========== Inhibition ==========

    /// Inhibit or uninhibit an output. Inhibited outputs paint black and
    /// cannot be grabbed; a current grab is cancelled.
    pub fn set_output_inhibited(&mut self, output: OutputId, inhibit: bool) {
        let Some(o) = self.outputs.get_mut(output) else {
            return;
        };
        o.render.add_inhibit(inhibit);
        let grab = o.grab;
        if inhibit {
            if let Some(grab) = grab {
                self.cancel_grab(output, grab);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::Config;
    use crate::geometry::Rect;
    use crate::state::Clock;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&mut self, core: &mut WayScene) {
            assert_eq!(core.plugin_name(core.current_plugin().unwrap()), Some(self.name));
            self.log.borrow_mut().push(format!("{} init", self.name));
        }

        fn handle_event(&mut self, _core: &mut WayScene, event: &Event) {
            if matches!(event, Event::ConfigChanged) {
                self.log.borrow_mut().push(format!("{} config", self.name));
            }
        }

        fn cancel(&mut self, core: &mut WayScene, output: OutputId) {
            self.log.borrow_mut().push(format!("{} cancel", self.name));
            // Grab is already released when cancel runs.
            assert!(core.outputs.get(output).unwrap().active_grab().is_none());
        }

        fn fini(&mut self, _core: &mut WayScene) {
            self.log.borrow_mut().push(format!("{} fini", self.name));
        }
    }

    fn setup() -> (WayScene, OutputId, PluginId, PluginId, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut core = WayScene::new(Config::default(), Clock::manual());
        let output = core.add_output("A-1", Rect::new(0, 0, 100, 100), 1.0);
        let low = core.load_plugin(Box::new(Recorder {
            name: "low",
            log: log.clone(),
        }));
        let high = core.load_plugin(Box::new(Recorder {
            name: "high",
            log: log.clone(),
        }));
        (core, output, low, high, log)
    }

    #[test]
    fn plugins_are_initialized_and_receive_events_in_order() {
        let (mut core, _, _, _, log) = setup();
        core.reload_config(Config::default());
        assert_eq!(
            *log.borrow(),
            vec!["low init", "high init", "low config", "high config"]
        );
    }

    #[test]
    fn higher_priority_cancels_holder() {
        let (mut core, output, low, high, log) = setup();
        assert!(core.activate_plugin(output, low, 1));
        assert!(core.activate_plugin(output, high, 5));
        assert!(log.borrow().contains(&"low cancel".to_string()));
        assert_eq!(core.outputs.get(output).unwrap().active_grab().unwrap().plugin, high);
    }

    #[test]
    fn equal_priority_is_refused() {
        let (mut core, output, low, high, log) = setup();
        assert!(core.activate_plugin(output, low, 3));
        assert!(!core.activate_plugin(output, high, 3));
        assert!(!log.borrow().iter().any(|l| l.ends_with("cancel")));
    }

    #[test]
    fn inhibit_cancels_and_blocks_grabs() {
        let (mut core, output, low, _, log) = setup();
        assert!(core.activate_plugin(output, low, 1));
        core.set_output_inhibited(output, true);
        assert!(log.borrow().contains(&"low cancel".to_string()));
        assert!(!core.activate_plugin(output, low, 1));
        core.set_output_inhibited(output, false);
        assert!(core.activate_plugin(output, low, 1));
    }

    #[test]
    fn unload_runs_fini_and_drops_grab() {
        let (mut core, output, low, _, log) = setup();
        core.activate_plugin(output, low, 1);
        core.unload_plugin(low);
        assert!(log.borrow().contains(&"low fini".to_string()));
        assert!(core.outputs.get(output).unwrap().active_grab().is_none());
        assert_eq!(core.plugin_name(low), Some("low"));
    }
}
