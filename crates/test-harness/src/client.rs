//! Mock toplevel clients
//!
//! The compositor owns the [`ToplevelClient`] half; tests keep a
//! [`MockClient`] that shares its request log and commits buffers on the
//! client's behalf.

use std::cell::RefCell;
use std::rc::Rc;

use smithay::utils::{Serial, SERIAL_COUNTER};

use compositor::buffer::{Buffer, Color};
use compositor::geometry::{Edges, Point, Size};
use compositor::toplevel::{CommitOutcome, SurfaceCommit, ToplevelClient, ToplevelKind};
use compositor::view::ViewId;

use crate::headless::TestCompositor;

/// A request the compositor sent to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Size(Size),
    Tiled(Edges),
    Fullscreen(bool),
    Position(Point),
}

#[derive(Debug, Default)]
struct ClientLog {
    requests: Vec<(Serial, Request)>,
    /// Serial of the last configure the client acked
    acked: Option<Serial>,
    frames_done: u32,
    /// Size of the last buffer the client committed
    size: Size,
}

struct Transport {
    log: Rc<RefCell<ClientLog>>,
}

impl Transport {
    fn record(&mut self, request: Request) -> Serial {
        let serial = SERIAL_COUNTER.next_serial();
        self.log.borrow_mut().requests.push((serial, request));
        serial
    }
}

impl ToplevelClient for Transport {
    fn request_size(&mut self, size: Size) -> Serial {
        assert!(size.w > 0 && size.h > 0, "requested non-positive size {size:?}");
        self.record(Request::Size(size))
    }

    fn request_tiled(&mut self, edges: Edges) -> Serial {
        self.record(Request::Tiled(edges))
    }

    fn request_fullscreen(&mut self, fullscreen: bool) -> Serial {
        self.record(Request::Fullscreen(fullscreen))
    }

    fn configure_position(&mut self, position: Point) {
        self.record(Request::Position(position));
    }

    fn send_frame_done(&mut self) {
        self.log.borrow_mut().frames_done += 1;
    }
}

/// Test-side handle of a client toplevel
#[derive(Clone)]
pub struct MockClient {
    pub view: ViewId,
    pub kind: ToplevelKind,
    pub color: Color,
    log: Rc<RefCell<ClientLog>>,
}

impl MockClient {
    /// Create a client and the transport the compositor will own
    pub(crate) fn new(kind: ToplevelKind, color: Color) -> (PendingClient, Box<dyn ToplevelClient>) {
        let log = Rc::new(RefCell::new(ClientLog::default()));
        let transport = Transport { log: Rc::clone(&log) };
        (PendingClient { log, kind, color }, Box::new(transport))
    }

    // ========== Requests ==========

    pub fn requests(&self) -> Vec<Request> {
        self.log.borrow().requests.iter().map(|(_, r)| *r).collect()
    }

    /// Sizes requested so far, oldest first
    pub fn size_requests(&self) -> Vec<Size> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Request::Size(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    /// Serial of the newest configure
    pub fn latest_serial(&self) -> Option<Serial> {
        self.log.borrow().requests.last().map(|(serial, _)| *serial)
    }

    /// True if a configure was sent after the last ack
    pub fn has_unacked_configure(&self) -> bool {
        let log = self.log.borrow();
        match (log.requests.last(), log.acked) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some((latest, _)), Some(acked)) => !acked.is_no_older_than(latest),
        }
    }

    pub fn frames_done(&self) -> u32 {
        self.log.borrow().frames_done
    }

    pub fn size(&self) -> Size {
        self.log.borrow().size
    }

    // ========== Commits ==========

    fn buffer_commit(&self, size: Size) -> SurfaceCommit {
        self.log.borrow_mut().size = size;
        let commit = SurfaceCommit::with_buffer(Buffer::shared(size, self.color));
        if self.color.is_opaque() {
            commit.opaque()
        } else {
            commit
        }
    }

    /// Commit a buffer without acking anything
    pub fn commit(&self, tc: &mut TestCompositor, size: Size) -> CommitOutcome {
        let commit = self.buffer_commit(size);
        tc.core.client_commit(self.view, commit)
    }

    /// Ack the newest configure with a buffer of the newest requested size.
    /// Returns `None` if there was nothing to ack.
    pub fn ack(&self, tc: &mut TestCompositor) -> Option<CommitOutcome> {
        if !self.has_unacked_configure() {
            return None;
        }
        let size = self.size_requests().last().copied().unwrap_or_else(|| self.size());
        Some(self.ack_with_size(tc, size))
    }

    /// Ack the newest configure but commit `size`, like a client that
    /// ignores the requested size
    pub fn ack_with_size(&self, tc: &mut TestCompositor, size: Size) -> CommitOutcome {
        let serial = self.latest_serial();
        let mut commit = self.buffer_commit(size);
        if let Some(serial) = serial {
            self.log.borrow_mut().acked = Some(serial);
            commit = commit.acking(serial);
        }
        tc.core.client_commit(self.view, commit)
    }
}

/// A client whose view is not created yet
pub(crate) struct PendingClient {
    log: Rc<RefCell<ClientLog>>,
    kind: ToplevelKind,
    color: Color,
}

impl PendingClient {
    pub(crate) fn attach(self, view: ViewId) -> MockClient {
        MockClient {
            view,
            kind: self.kind,
            color: self.color,
            log: self.log,
        }
    }
}
