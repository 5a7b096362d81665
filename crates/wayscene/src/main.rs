//! wayscene - headless driver for the compositor core
//!
//! Runs the calloop loop against a software output with the animate plugin
//! loaded, and plays a short script with one demo client: map, resize,
//! minimize, restore and unmap. Useful for watching transactions and
//! animations in the logs without a display.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=wayscene=debug wayscene --frames 120 --dump-scene
//! ```

mod demo;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use compositor::buffer::Color;
use compositor::config::Config;
use compositor::event_loop::{CompositorLoop, DEFAULT_FRAME_INTERVAL};
use compositor::geometry::{Rect, Size};
use compositor::toplevel::ToplevelKind;
use compositor::{Clock, WayScene};

use animate::AnimatePlugin;

use crate::demo::DemoClient;

const USAGE: &str = "usage: wayscene [--config PATH] [--frames N] [--dump-scene]";

/// Frames to run when `--frames` is not given
const DEFAULT_FRAMES: u32 = 180;

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    frames: u32,
    dump_scene: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<Args>> {
    let mut parsed = Args {
        config: None,
        frames: DEFAULT_FRAMES,
        dump_scene: false,
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--frames" | "-n" => {
                let n = args.next().context("--frames needs a count")?;
                parsed.frames = n.parse().with_context(|| format!("invalid frame count: {n}"))?;
            }
            "--dump-scene" => parsed.dump_scene = true,
            "--help" | "-h" => return Ok(None),
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(Some(parsed))
}

fn main() -> Result<()> {
    setup_logging();

    let Some(args) = parse_args(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let config = match &args.config {
        Some(path) => Config::from_path(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::load(),
    };

    tracing::info!(frames = args.frames, "starting wayscene");

    let mut core = WayScene::new(config, Clock::System);
    core.load_plugin(Box::new(AnimatePlugin::new()));
    let output = core.add_output("HEADLESS-1", Rect::new(0, 0, 1280, 720), 1.0);

    let mut event_loop = CompositorLoop::new(DEFAULT_FRAME_INTERVAL)?;

    let (client, toplevel) = DemoClient::new(Size::new(640, 480), Color::rgba(0.2, 0.4, 0.8, 1.0));
    let view = core.create_view(ToplevelKind::Xdg, toplevel, "wayscene.demo")?;
    client.commit(&mut core, view);
    core.map_view(view, Some(Rect::new(320, 120, 640, 480)));

    let script = Script::new(args.frames);
    for frame in 0..args.frames {
        event_loop.dispatch(&mut core, Some(DEFAULT_FRAME_INTERVAL))?;
        client.respond(&mut core, view);

        match script.step(frame) {
            Some(Step::Resize) => {
                core.set_view_geometry(view, Rect::new(160, 60, 960, 600));
            }
            Some(Step::Minimize) => core.set_minimized(view, true),
            Some(Step::Restore) => core.set_minimized(view, false),
            Some(Step::Unmap) => {
                core.unmap_view(view);
            }
            None => {}
        }
    }

    let painted = core.outputs.get(output).map_or(0, |o| o.render.frames_painted());
    tracing::info!(painted, frames_done = client.frames_done(), "script finished");

    if args.dump_scene {
        println!("{}", serde_json::to_string_pretty(&core.dump_state())?);
    }

    core.destroy_view(view);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Resize,
    Minimize,
    Restore,
    Unmap,
}

/// When each step of the demo happens, spread over the run
struct Script {
    steps: [(u32, Step); 4],
}

impl Script {
    fn new(frames: u32) -> Self {
        let fifth = (frames / 5).max(1);
        Self {
            steps: [
                (fifth, Step::Resize),
                (fifth * 2, Step::Minimize),
                (fifth * 3, Step::Restore),
                (fifth * 4, Step::Unmap),
            ],
        }
    }

    fn step(&self, frame: u32) -> Option<Step> {
        self.steps.iter().find(|(at, _)| *at == frame).map(|(_, step)| *step)
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Respect NO_COLOR environment variable for testing
    let use_ansi = std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_ansi(use_ansi),
        )
        .with(filter)
        .init();
}
