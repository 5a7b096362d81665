//! Structured dumps for debugging

use serde_json::json;

use super::WayScene;

impl WayScene {
    /// Everything a bug report needs: the scene tree, views with their
    /// toplevel states, outputs and in-flight transactions
    pub fn dump_state(&self) -> serde_json::Value {
        let views: Vec<_> = self
            .views
            .iter()
            .map(|(id, v)| {
                let toplevel = self.toplevels.get(v.toplevel);
                json!({
                    "id": id.to_string(),
                    "name": v.stringify(),
                    "toplevel": toplevel.map(|t| t.stringify()),
                    "mapped": v.mapped,
                    "minimized": v.minimized,
                    "always_on_top": v.always_on_top,
                    "output": v.output.map(|o| o.to_string()),
                    "current": toplevel.map(|t| t.current()),
                    "committed": toplevel.map(|t| t.committed()),
                    "pending": toplevel.map(|t| t.pending()),
                    "hooks": v.hooks.keys().collect::<Vec<_>>(),
                    "destroy_requested": v.destroy_requested,
                })
            })
            .collect();
        let outputs: Vec<_> = self
            .outputs
            .iter()
            .map(|o| {
                json!({
                    "id": o.id.to_string(),
                    "name": o.name,
                    "enabled": o.enabled,
                    "geometry": o.geometry(),
                    "scale": o.scale(),
                    "frames": o.render.frames_painted(),
                    "inhibited": o.render.is_inhibited(),
                    "redraw_always": o.render.redraw_always(),
                    "grab": o.active_grab().map(|g| g.plugin.to_string()),
                    "scanout": o.scanout_plane.presented().map(|b| b.0),
                })
            })
            .collect();
        json!({
            "scene": self.scene.dump(self.scene.root()),
            "views": views,
            "outputs": outputs,
            "transactions": self.transactions.dump(),
            "effects": self.effects.names().collect::<Vec<_>>(),
            "plugins": self.plugin_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::geometry::Rect;
    use crate::state::{Clock, WayScene};

    #[test]
    fn dump_lists_outputs_and_layers() {
        let mut core = WayScene::new(Config::default(), Clock::manual());
        core.add_output("A-1", Rect::new(0, 0, 100, 100), 1.0);
        let dump = core.dump_state();
        assert_eq!(dump["outputs"][0]["name"], "A-1");
        assert_eq!(dump["scene"]["kind"], "root");
        assert_eq!(dump["scene"]["children"].as_array().map(Vec::len), Some(4));
        assert!(dump["transactions"]["collecting"].is_null());
    }
}
