//! Scripted client for the headless driver
//!
//! Records every configure the compositor sends and answers them with a
//! buffer of the requested size, the way a well-behaved xdg client would.

use std::cell::RefCell;
use std::rc::Rc;

use smithay::utils::{Serial, SERIAL_COUNTER};

use compositor::buffer::{Buffer, Color};
use compositor::geometry::{Edges, Size};
use compositor::toplevel::{SurfaceCommit, ToplevelClient};
use compositor::view::ViewId;
use compositor::WayScene;

#[derive(Debug, Default)]
struct ClientLog {
    /// Configures not answered yet
    configures: Vec<(Serial, Option<Size>)>,
    size: Size,
    frames_done: u64,
}

/// Compositor-facing half, owned by the toplevel
struct DemoToplevel {
    log: Rc<RefCell<ClientLog>>,
}

impl DemoToplevel {
    fn configure(&mut self, size: Option<Size>) -> Serial {
        let serial = SERIAL_COUNTER.next_serial();
        self.log.borrow_mut().configures.push((serial, size));
        serial
    }
}

impl ToplevelClient for DemoToplevel {
    fn request_size(&mut self, size: Size) -> Serial {
        self.configure(Some(size))
    }

    fn request_tiled(&mut self, _edges: Edges) -> Serial {
        self.configure(None)
    }

    fn request_fullscreen(&mut self, _fullscreen: bool) -> Serial {
        self.configure(None)
    }

    fn send_frame_done(&mut self) {
        self.log.borrow_mut().frames_done += 1;
    }
}

/// Driver-facing half
pub struct DemoClient {
    log: Rc<RefCell<ClientLog>>,
    color: Color,
}

impl DemoClient {
    pub fn new(size: Size, color: Color) -> (Self, Box<dyn ToplevelClient>) {
        let log = Rc::new(RefCell::new(ClientLog {
            size,
            ..ClientLog::default()
        }));
        let toplevel = DemoToplevel { log: Rc::clone(&log) };
        (Self { log, color }, Box::new(toplevel))
    }

    /// Commit a buffer of the current size without acking anything
    pub fn commit(&self, core: &mut WayScene, view: ViewId) {
        let size = self.log.borrow().size;
        core.client_commit(view, SurfaceCommit::with_buffer(Buffer::shared(size, self.color)).opaque());
    }

    /// Ack the latest configure, if any, with a buffer of the size it asked
    /// for. Returns true if something was acked.
    pub fn respond(&self, core: &mut WayScene, view: ViewId) -> bool {
        let (serial, size) = {
            let mut log = self.log.borrow_mut();
            let Some((serial, size)) = log.configures.drain(..).last() else {
                return false;
            };
            if let Some(size) = size.filter(|s| s.w > 0 && s.h > 0) {
                log.size = size;
            }
            (serial, log.size)
        };
        tracing::debug!(serial = ?serial, ?size, "demo client acks configure");
        let commit = SurfaceCommit::with_buffer(Buffer::shared(size, self.color))
            .opaque()
            .acking(serial);
        core.client_commit(view, commit);
        true
    }

    pub fn frames_done(&self) -> u64 {
        self.log.borrow().frames_done
    }
}
