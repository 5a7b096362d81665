//! Headless compositor wrapper for testing
//!
//! Wraps a real [`WayScene`] with one software output and a manual clock.
//! Nothing happens on its own: tests run idle callbacks, advance time and
//! paint frames explicitly, so every intermediate state can be inspected.

use std::time::Duration;

use compositor::buffer::Color;
use compositor::config::Config;
use compositor::geometry::{Rect, Size};
use compositor::output::{FrameOutcome, OutputId};
use compositor::plugin::{Plugin, PluginId};
use compositor::scene::SceneError;
use compositor::toplevel::ToplevelKind;
use compositor::view::ViewId;
use compositor::{Clock, WayScene};
use thiserror::Error;

use crate::client::MockClient;

/// Simulated frame interval
pub const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Error, Debug)]
pub enum TestError {
    #[error("condition not met after {0} frames")]
    Timeout(u32),

    #[error("compositor error: {0}")]
    Compositor(#[from] SceneError),
}

/// Snapshot of one view for assertions
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub view: ViewId,
    pub mapped: bool,
    pub minimized: bool,
    /// Current (applied) geometry
    pub geometry: Rect,
    pub hooks: Vec<String>,
}

/// Snapshot of compositor state for assertions
#[derive(Debug, Clone, PartialEq)]
pub struct CompositorSnapshot {
    pub views: Vec<ViewSnapshot>,

    /// Transactions committed and waiting for clients
    pub committed_transactions: usize,

    pub frames_painted: u64,
}

/// Test compositor wrapper
pub struct TestCompositor {
    pub core: WayScene,

    /// The single output, at the layout origin
    pub output: OutputId,

    output_size: (i32, i32),
}

impl TestCompositor {
    /// Create a headless compositor with default configuration
    pub fn new_headless(width: i32, height: i32) -> Self {
        Self::with_config(Config::default(), width, height)
    }

    pub fn with_config(config: Config, width: i32, height: i32) -> Self {
        let mut core = WayScene::new(config, Clock::manual());
        let output = core.add_output("HEADLESS-1", Rect::new(0, 0, width, height), 1.0);
        tracing::debug!(width, height, "headless test compositor created");
        Self {
            core,
            output,
            output_size: (width, height),
        }
    }

    pub fn output_size(&self) -> (i32, i32) {
        self.output_size
    }

    pub fn load_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginId {
        self.core.load_plugin(plugin)
    }

    // ========== Clients ==========

    /// Create a view whose client has committed one buffer of `size`. The
    /// view is not mapped.
    pub fn spawn(&mut self, kind: ToplevelKind, app_id: &str, size: Size, color: Color) -> Result<MockClient, TestError> {
        let (pending, transport) = MockClient::new(kind, color);
        let view = self.core.create_view(kind, transport, app_id)?;
        let client = pending.attach(view);
        client.commit(self, size);
        Ok(client)
    }

    pub fn spawn_xdg(&mut self, app_id: &str, size: Size, color: Color) -> Result<MockClient, TestError> {
        self.spawn(ToplevelKind::Xdg, app_id, size, color)
    }

    /// Map `client`'s view at `geometry`, acking the configure if the size
    /// differs from what the client committed
    pub fn map(&mut self, client: &MockClient, geometry: Rect) {
        self.core.map_view(client.view, Some(geometry));
        self.idle();
        if client.ack(self).is_some() {
            self.idle();
        }
    }

    // ========== Time ==========

    /// Run idle callbacks: commit collected transactions and route damage
    pub fn idle(&mut self) {
        self.core.dispatch_idle();
    }

    /// Advance the manual clock and fire the transaction timeout if due
    pub fn advance(&mut self, by: Duration) {
        self.core.clock().advance(by);
        self.core.handle_transaction_timeout();
    }

    /// Run idle callbacks and paint the output
    pub fn frame(&mut self) -> FrameOutcome {
        self.idle();
        self.core.paint_output(self.output)
    }

    /// Advance one frame interval, then paint
    pub fn next_frame(&mut self) -> FrameOutcome {
        self.advance(FRAME);
        self.frame()
    }

    /// Paint frames until `done` holds. Returns the number of frames it took.
    pub fn run_until(&mut self, max_frames: u32, mut done: impl FnMut(&Self) -> bool) -> Result<u32, TestError> {
        for frame in 0..max_frames {
            if done(self) {
                return Ok(frame);
            }
            self.next_frame();
        }
        if done(self) {
            Ok(max_frames)
        } else {
            tracing::warn!(max_frames, snapshot = ?self.snapshot(), "condition not met");
            Err(TestError::Timeout(max_frames))
        }
    }

    // ========== Inspection ==========

    /// Pixel of the last presented frame
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.core
            .outputs
            .get(self.output)
            .and_then(|o| o.render.front_buffer())
            .and_then(|fb| fb.pixel(x, y))
    }

    pub fn background(&self) -> u32 {
        self.core.background_color().to_argb8888()
    }

    /// Current geometry of a view's toplevel
    pub fn geometry(&self, view: ViewId) -> Option<Rect> {
        self.core.view_toplevel(view).map(|t| t.current().geometry)
    }

    pub fn frames_painted(&self) -> u64 {
        self.core
            .outputs
            .get(self.output)
            .map_or(0, |o| o.render.frames_painted())
    }

    pub fn snapshot(&self) -> CompositorSnapshot {
        let views = self
            .core
            .views()
            .map(|v| ViewSnapshot {
                view: v.id,
                mapped: v.is_mapped(),
                minimized: v.is_minimized(),
                geometry: self.geometry(v.id).unwrap_or(Rect::EMPTY),
                hooks: v.hook_keys().map(str::to_string).collect(),
            })
            .collect();
        CompositorSnapshot {
            views,
            committed_transactions: self.core.transactions().committed_count(),
            frames_painted: self.frames_painted(),
        }
    }
}
