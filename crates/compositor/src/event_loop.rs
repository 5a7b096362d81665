//! calloop integration
//!
//! # Responsibilities
//!
//! - Repaint timer driving `WayScene::paint_all`
//! - Transaction timeout timer, re-armed whenever the earliest deadline
//!   changes
//! - Idle work (transaction flushes, damage routing) after every dispatch
//!
//! # NOT Responsible For
//!
//! - Client sockets; a backend registers its own sources through
//!   [`CompositorLoop::handle`]

use std::time::{Duration, Instant};

use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, RegistrationToken};

use crate::state::WayScene;

/// Default repaint interval, roughly 60 Hz
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("event loop error: {0}")]
    Calloop(#[from] calloop::Error),
    #[error("failed to register {what}: {source}")]
    Insert {
        what: &'static str,
        #[source]
        source: calloop::Error,
    },
}

pub struct CompositorLoop {
    event_loop: EventLoop<'static, WayScene>,
    /// Deadline the transaction timer is armed for
    txn_timer: Option<(Instant, RegistrationToken)>,
}

impl CompositorLoop {
    pub fn new(frame_interval: Duration) -> Result<Self, LoopError> {
        let event_loop: EventLoop<'static, WayScene> = EventLoop::try_new()?;
        event_loop
            .handle()
            .insert_source(Timer::from_duration(frame_interval), move |_, _, core| {
                core.paint_all();
                TimeoutAction::ToDuration(frame_interval)
            })
            .map_err(|e| LoopError::Insert {
                what: "repaint timer",
                source: e.error,
            })?;
        Ok(Self {
            event_loop,
            txn_timer: None,
        })
    }

    pub fn handle(&self) -> LoopHandle<'static, WayScene> {
        self.event_loop.handle()
    }

    /// Dispatch pending events, then run idle work and re-arm timers
    pub fn dispatch(&mut self, core: &mut WayScene, timeout: Option<Duration>) -> Result<(), LoopError> {
        self.event_loop.dispatch(timeout, core)?;
        if core.has_idle_work() {
            core.dispatch_idle();
        }
        self.arm_transaction_timer(core)
    }

    /// Deadline of the armed transaction timer
    pub fn transaction_timer(&self) -> Option<Instant> {
        self.txn_timer.map(|(deadline, _)| deadline)
    }

    fn arm_transaction_timer(&mut self, core: &WayScene) -> Result<(), LoopError> {
        let deadline = core.next_transaction_deadline();
        if deadline == self.transaction_timer() {
            return Ok(());
        }
        if let Some((_, token)) = self.txn_timer.take() {
            // Already gone if it fired
            self.event_loop.handle().remove(token);
        }
        let Some(deadline) = deadline else {
            return Ok(());
        };
        let token = self
            .event_loop
            .handle()
            .insert_source(Timer::from_deadline(deadline), |_, _, core| {
                core.handle_transaction_timeout();
                TimeoutAction::Drop
            })
            .map_err(|e| LoopError::Insert {
                what: "transaction timer",
                source: e.error,
            })?;
        tracing::trace!(target: "wayscene::txn", ?deadline, "transaction timer armed");
        self.txn_timer = Some((deadline, token));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::{Serial, SERIAL_COUNTER};

    use super::*;
    use crate::buffer::{Buffer, Color};
    use crate::config::Config;
    use crate::geometry::{Edges, Rect, Size};
    use crate::state::Clock;
    use crate::toplevel::{SurfaceCommit, ToplevelClient, ToplevelKind};

    struct Silent;

    impl ToplevelClient for Silent {
        fn request_size(&mut self, _size: Size) -> Serial {
            SERIAL_COUNTER.next_serial()
        }
        fn request_tiled(&mut self, _edges: Edges) -> Serial {
            SERIAL_COUNTER.next_serial()
        }
        fn request_fullscreen(&mut self, _fullscreen: bool) -> Serial {
            SERIAL_COUNTER.next_serial()
        }
        fn send_frame_done(&mut self) {}
    }

    fn core(timeout_ms: u64) -> WayScene {
        let mut config = Config::default();
        config.core.transaction_timeout_ms = timeout_ms;
        let mut core = WayScene::new(config, Clock::System);
        core.add_output("A-1", Rect::new(0, 0, 100, 100), 1.0);
        core
    }

    #[test]
    fn repaint_timer_paints_outputs() {
        let mut core = core(100);
        let mut event_loop = CompositorLoop::new(Duration::from_millis(1)).unwrap();
        let output = core.outputs.ids()[0];
        for _ in 0..20 {
            event_loop.dispatch(&mut core, Some(Duration::from_millis(20))).unwrap();
            if core.outputs.get(output).unwrap().render.frames_painted() > 0 {
                break;
            }
        }
        assert!(core.outputs.get(output).unwrap().render.frames_painted() > 0);
    }

    #[test]
    fn timeout_timer_applies_stuck_transaction() {
        let mut core = core(5);
        let mut event_loop = CompositorLoop::new(Duration::from_secs(60)).unwrap();
        let view = core.create_view(ToplevelKind::Xdg, Box::new(Silent), "stuck").unwrap();
        core.client_commit(
            view,
            SurfaceCommit::with_buffer(Buffer::shared(Size::new(50, 50), Color::BLACK)),
        );
        core.map_view(view, Some(Rect::new(0, 0, 50, 50)));
        event_loop.dispatch(&mut core, Some(Duration::ZERO)).unwrap();
        assert!(core.view(view).unwrap().is_mapped());

        core.set_view_geometry(view, Rect::new(0, 0, 80, 80));
        event_loop.dispatch(&mut core, Some(Duration::ZERO)).unwrap();
        assert!(event_loop.transaction_timer().is_some());

        for _ in 0..20 {
            event_loop.dispatch(&mut core, Some(Duration::from_millis(10))).unwrap();
            if core.view_toplevel(view).unwrap().current().geometry.width == 80 {
                break;
            }
        }
        assert_eq!(core.view_toplevel(view).unwrap().current().geometry.width, 80);
        assert!(event_loop.transaction_timer().is_none());
    }
}
