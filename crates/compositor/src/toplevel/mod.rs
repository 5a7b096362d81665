//! Toplevel transaction objects
//!
//! A toplevel keeps three copies of its state:
//!
//! - `pending`: what plugins and window management want next
//! - `committed`: what was last requested from the client
//! - `current`: what the client has acknowledged and the scene presents
//!
//! `current` is only written by [`Toplevel::apply`]. Client buffers that
//! arrive while a transaction is in flight are held back and handed out by
//! `apply`, so the new size and the new contents appear in the same frame.
//!
//! The xdg flavour waits for the configure serial it sent to be acked; the
//! Xwayland flavour has no serials and waits for the requested size.

mod state;

use std::rc::Rc;

use smithay::utils::{Serial, Transform};

use crate::buffer::Buffer;
use crate::geometry::{Edges, Point, Size};
use crate::region::Region;
use crate::txn::{Readiness, TransactionObject};

pub use state::{
    adjust_geometry_for_gravity, expand_geometry_by_margins, expand_size_by_margins, shrink_geometry_by_margins,
    shrink_size_by_margins, Margins, ToplevelState,
};

crate::arena_id!(
    /// Handle to a toplevel
    ToplevelId,
    "toplevel"
);

/// Requests the compositor sends to a toplevel's client
pub trait ToplevelClient {
    /// Ask the client to resize its surface. Never called with zero or
    /// negative dimensions.
    fn request_size(&mut self, size: Size) -> Serial;

    /// Set tiled edges; all four edges also mean maximized
    fn request_tiled(&mut self, edges: Edges) -> Serial;

    fn request_fullscreen(&mut self, fullscreen: bool) -> Serial;

    /// Tell the client where its surface is, for protocols that care
    fn configure_position(&mut self, _position: Point) {}

    /// Let the client draw its next frame
    fn send_frame_done(&mut self);

    fn min_size(&self) -> Size {
        Size::default()
    }

    fn max_size(&self) -> Size {
        Size::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToplevelKind {
    Xdg,
    Xwayland,
}

/// Surface state committed by a client
#[derive(Debug, Clone)]
pub struct SurfaceCommit {
    pub buffer: Option<Rc<Buffer>>,
    pub opaque_region: Region,
    pub input_region: Option<Region>,
    pub buffer_scale: f64,
    pub buffer_transform: Transform,
    /// Offset of the window geometry inside the surface (client-side
    /// shadows)
    pub geometry_offset: Point,
    /// Latest configure serial the client acked before this commit
    pub acked_serial: Option<Serial>,
}

impl SurfaceCommit {
    pub fn with_buffer(buffer: Rc<Buffer>) -> Self {
        Self {
            buffer: Some(buffer),
            opaque_region: Region::new(),
            input_region: None,
            buffer_scale: 1.0,
            buffer_transform: Transform::Normal,
            geometry_offset: Point::ORIGIN,
            acked_serial: None,
        }
    }

    /// Mark the whole buffer opaque
    pub fn opaque(mut self) -> Self {
        if let Some(buffer) = &self.buffer {
            self.opaque_region = Region::from_rect(crate::geometry::Rect::from_loc_size(Point::ORIGIN, buffer.size));
        }
        self
    }

    pub fn acking(mut self, serial: Serial) -> Self {
        self.acked_serial = Some(serial);
        self
    }

    /// Size of the window, as the client sees it
    pub fn window_size(&self) -> Size {
        self.buffer.as_ref().map(|b| b.size).unwrap_or_default()
    }
}

/// What the caller should do after a client commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Held back until the pending transaction applies
    Ignored,
    /// The committed transaction still waits for the right configure
    StillWaiting,
    /// The toplevel became ready; report it to the transaction manager
    Ready,
    /// No transaction involved and no size change: show the new contents
    /// now (see [`Toplevel::take_surface_state`])
    Repaint,
    /// The client resized on its own; pending geometry was adjusted for
    /// gravity and the toplevel should be scheduled
    ClientResize,
}

/// Returned by [`Toplevel::apply`]
#[derive(Debug, Clone)]
pub struct Applied {
    pub old_state: ToplevelState,
    /// Client contents held back for this transaction
    pub surface: Option<SurfaceCommit>,
}

pub struct Toplevel {
    id: ToplevelId,
    kind: ToplevelKind,
    current: ToplevelState,
    committed: ToplevelState,
    pending: ToplevelState,
    /// `None` once the client object is gone
    client: Option<Box<dyn ToplevelClient>>,
    target_configure: Option<Serial>,
    acked_serial: Option<Serial>,
    /// Set by `commit`, cleared when readiness is reported
    pending_ready: bool,
    surface_state: Option<SurfaceCommit>,
    /// Window size from the latest client commit
    client_size: Size,
    wm_offset: Point,
}

impl std::fmt::Debug for Toplevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toplevel")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("current", &self.current)
            .field("committed", &self.committed)
            .field("pending", &self.pending)
            .field("client_alive", &self.client.is_some())
            .finish()
    }
}

impl Toplevel {
    pub fn new(id: ToplevelId, kind: ToplevelKind, client: Box<dyn ToplevelClient>) -> Self {
        Self {
            id,
            kind,
            current: ToplevelState::default(),
            committed: ToplevelState::default(),
            pending: ToplevelState::default(),
            client: Some(client),
            target_configure: None,
            acked_serial: None,
            pending_ready: false,
            surface_state: None,
            client_size: Size::default(),
            wm_offset: Point::ORIGIN,
        }
    }

    pub fn id(&self) -> ToplevelId {
        self.id
    }

    pub fn kind(&self) -> ToplevelKind {
        self.kind
    }

    pub fn current(&self) -> &ToplevelState {
        &self.current
    }

    pub fn committed(&self) -> &ToplevelState {
        &self.committed
    }

    pub fn pending(&self) -> &ToplevelState {
        &self.pending
    }

    /// Pending state may only be changed outside of commit and apply
    pub fn pending_mut(&mut self) -> &mut ToplevelState {
        &mut self.pending
    }

    pub fn is_client_alive(&self) -> bool {
        self.client.is_some()
    }

    pub fn client_size(&self) -> Size {
        self.client_size
    }

    pub fn min_size(&self) -> Size {
        self.client.as_ref().map(|c| c.min_size()).unwrap_or_default()
    }

    pub fn max_size(&self) -> Size {
        self.client.as_ref().map(|c| c.max_size()).unwrap_or_default()
    }

    pub fn send_frame_done(&mut self) {
        if let Some(client) = &mut self.client {
            client.send_frame_done();
        }
    }

    /// Offset of the client surface relative to the view's origin
    pub fn surface_offset(&self) -> Point {
        Point::new(
            self.current.geometry.x - self.wm_offset.x + self.current.margins.left,
            self.current.geometry.y - self.wm_offset.y + self.current.margins.top,
        )
    }

    /// Report readiness once per commit
    fn emit_ready(&mut self) -> bool {
        std::mem::replace(&mut self.pending_ready, false)
    }

    fn merge_surface_state(&mut self, commit: SurfaceCommit) {
        self.client_size = commit.window_size();
        if let Some(serial) = commit.acked_serial {
            if self.acked_serial.map_or(true, |acked| serial.is_no_older_than(&acked)) {
                self.acked_serial = Some(serial);
            }
        }
        self.surface_state = Some(commit);
    }

    /// Take client contents waiting to be shown
    pub fn take_surface_state(&mut self) -> Option<SurfaceCommit> {
        let state = self.surface_state.take();
        if let Some(state) = &state {
            self.wm_offset = state.geometry_offset;
        }
        state
    }

    fn reached_target(&self) -> bool {
        match self.kind {
            ToplevelKind::Xdg => match (self.target_configure, self.acked_serial) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(target), Some(acked)) => acked.is_no_older_than(&target),
            },
            ToplevelKind::Xwayland => {
                self.client_size == shrink_size_by_margins(self.committed.geometry.size(), &self.committed.margins)
            }
        }
    }

    /// Handle a surface commit from the client.
    ///
    /// `is_committed` and `is_pending` come from the transaction manager.
    pub fn handle_client_commit(&mut self, commit: SurfaceCommit, is_committed: bool, is_pending: bool) -> CommitOutcome {
        self.merge_surface_state(commit);

        if is_committed {
            if !self.reached_target() {
                self.send_frame_done();
                return CommitOutcome::StillWaiting;
            }
            let real_size = expand_size_by_margins(self.client_size, &self.committed.margins);
            adjust_geometry_for_gravity(&mut self.committed, real_size);
            return if self.emit_ready() {
                CommitOutcome::Ready
            } else {
                CommitOutcome::Ignored
            };
        }

        if is_pending {
            return CommitOutcome::Ignored;
        }

        let size = expand_size_by_margins(self.client_size, &self.current.margins);
        if size == self.current.geometry.size() || !self.current.mapped {
            return CommitOutcome::Repaint;
        }

        adjust_geometry_for_gravity(&mut self.pending, size);
        tracing::debug!(
            target: "wayscene::views",
            toplevel = %self.id,
            geometry = %self.pending.geometry,
            "client-initiated resize"
        );
        CommitOutcome::ClientResize
    }

    /// The client object was destroyed. Returns true if readiness should be
    /// reported for an in-flight commit.
    pub fn handle_client_destroyed(&mut self) -> bool {
        self.client = None;
        self.emit_ready()
    }

    pub fn stringify(&self) -> String {
        let kind = match self.kind {
            ToplevelKind::Xdg => "xdg",
            ToplevelKind::Xwayland => "xwayland",
        };
        format!("{} ({kind})", self.id)
    }

    /// Commit pending state: request what differs from the client
    pub fn commit(&mut self) -> Readiness {
        self.pending_ready = true;
        self.committed = self.pending.clone();
        tracing::debug!(
            target: "wayscene::txn",
            toplevel = %self.id,
            mapped = self.pending.mapped,
            geometry = %self.pending.geometry,
            tiled = self.pending.tiled_edges.bits(),
            fullscreen = self.pending.fullscreen,
            "committing toplevel state"
        );

        let unmapping = self.current.mapped && !self.pending.mapped;
        let Some(client) = self.client.as_mut().filter(|_| !unmapping) else {
            self.emit_ready();
            return Readiness::Ready;
        };

        let mut current_size = shrink_size_by_margins(self.current.geometry.size(), &self.current.margins);
        if self.pending.mapped && !self.current.mapped {
            // Mapping: only wait if the client's own size is not what we want.
            current_size = self.client_size;
        }
        let desired = shrink_size_by_margins(self.pending.geometry.size(), &self.pending.margins);
        let mut wait_for_client = false;

        if current_size != desired {
            wait_for_client = true;
            self.target_configure = Some(client.request_size(desired.at_least(1)));
        }

        match self.kind {
            ToplevelKind::Xdg => {
                if self.current.tiled_edges != self.pending.tiled_edges {
                    wait_for_client = true;
                    self.target_configure = Some(client.request_tiled(self.pending.tiled_edges));
                }
                if self.current.fullscreen != self.pending.fullscreen {
                    wait_for_client = true;
                    self.target_configure = Some(client.request_fullscreen(self.pending.fullscreen));
                }
            }
            ToplevelKind::Xwayland => {
                // X11 state changes are synchronous; only the size is awaited.
                if self.current.tiled_edges != self.pending.tiled_edges {
                    client.request_tiled(self.pending.tiled_edges);
                }
                if self.current.fullscreen != self.pending.fullscreen {
                    client.request_fullscreen(self.pending.fullscreen);
                }
                let position = shrink_geometry_by_margins(self.pending.geometry, &self.pending.margins).loc();
                client.configure_position(position);
            }
        }

        if wait_for_client {
            client.send_frame_done();
            Readiness::Waiting
        } else {
            self.emit_ready();
            Readiness::Ready
        }
    }

    /// Make the committed state current.
    ///
    /// With the client gone the size is frozen, and a view that was never
    /// mapped is not mapped now.
    pub fn apply(&mut self, still_pending: bool) -> Applied {
        let old_state = self.current.clone();
        if self.client.is_none() {
            self.committed.geometry.width = self.current.geometry.width;
            self.committed.geometry.height = self.current.geometry.height;
            if !self.current.mapped {
                self.committed.mapped = false;
            }
        }

        self.current = self.committed.clone();
        if !still_pending {
            // Pick up gravity adjustments made while committed.
            self.pending = self.committed.clone();
        }
        self.pending_ready = false;

        Applied {
            old_state,
            surface: self.take_surface_state(),
        }
    }
}

impl TransactionObject for Toplevel {
    type Applied = Applied;

    fn stringify(&self) -> String {
        Toplevel::stringify(self)
    }

    fn commit(&mut self) -> Readiness {
        Toplevel::commit(self)
    }

    fn apply(&mut self, still_pending: bool) -> Applied {
        Toplevel::apply(self, still_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, Color};
    use crate::geometry::Rect;
    use smithay::utils::SERIAL_COUNTER;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Requests {
        sizes: Vec<(Size, Serial)>,
        tiled: Vec<Edges>,
        fullscreen: Vec<bool>,
        positions: Vec<Point>,
        frames: usize,
    }

    struct FakeClient(Rc<RefCell<Requests>>);

    impl ToplevelClient for FakeClient {
        fn request_size(&mut self, size: Size) -> Serial {
            let serial = SERIAL_COUNTER.next_serial();
            self.0.borrow_mut().sizes.push((size, serial));
            serial
        }

        fn request_tiled(&mut self, edges: Edges) -> Serial {
            self.0.borrow_mut().tiled.push(edges);
            SERIAL_COUNTER.next_serial()
        }

        fn request_fullscreen(&mut self, fullscreen: bool) -> Serial {
            self.0.borrow_mut().fullscreen.push(fullscreen);
            SERIAL_COUNTER.next_serial()
        }

        fn configure_position(&mut self, position: Point) {
            self.0.borrow_mut().positions.push(position);
        }

        fn send_frame_done(&mut self) {
            self.0.borrow_mut().frames += 1;
        }
    }

    fn toplevel(kind: ToplevelKind) -> (Toplevel, Rc<RefCell<Requests>>) {
        let requests = Rc::new(RefCell::new(Requests::default()));
        let mut arena: crate::arena::Arena<ToplevelId, ()> = crate::arena::Arena::new();
        let id = arena.insert(());
        (Toplevel::new(id, kind, Box::new(FakeClient(requests.clone()))), requests)
    }

    fn commit_of(size: Size) -> SurfaceCommit {
        SurfaceCommit::with_buffer(Buffer::shared(size, Color::BLACK))
    }

    /// Bring a toplevel to mapped at `geometry`
    fn mapped_at(kind: ToplevelKind, geometry: Rect) -> (Toplevel, Rc<RefCell<Requests>>) {
        let (mut t, requests) = toplevel(kind);
        t.handle_client_commit(commit_of(geometry.size()), false, false);
        t.pending_mut().mapped = true;
        t.pending_mut().geometry = geometry;
        assert_eq!(t.commit(), Readiness::Ready);
        t.apply(false);
        (t, requests)
    }

    // ========== Commit ==========

    #[test]
    fn unchanged_state_is_ready_immediately() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        assert_eq!(t.commit(), Readiness::Ready);
        assert!(requests.borrow().sizes.is_empty());
    }

    #[test]
    fn resize_waits_for_acked_serial() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().geometry = Rect::new(0, 0, 300, 150);
        assert_eq!(t.commit(), Readiness::Waiting);
        let (size, serial) = requests.borrow().sizes[0];
        assert_eq!(size, Size::new(300, 150));

        // A commit without the ack keeps waiting and nudges the client.
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(200, 150)), true, false),
            CommitOutcome::StillWaiting
        );
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(300, 150)).acking(serial), true, false),
            CommitOutcome::Ready
        );
        let applied = t.apply(false);
        assert_eq!(applied.old_state.geometry, Rect::new(0, 0, 200, 150));
        assert!(applied.surface.is_some());
        assert_eq!(t.current().geometry, Rect::new(0, 0, 300, 150));
    }

    #[test]
    fn zero_size_requests_are_clamped() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().geometry = Rect::new(0, 0, 0, 0);
        t.commit();
        assert_eq!(requests.borrow().sizes[0].0, Size::new(1, 1));
    }

    #[test]
    fn margins_are_shrunk_before_requesting() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().margins = Margins {
            left: 0,
            right: 0,
            top: 30,
            bottom: 0,
        };
        t.commit();
        assert_eq!(requests.borrow().sizes[0].0, Size::new(200, 120));
    }

    #[test]
    fn tiled_and_fullscreen_changes_are_requested() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().tiled_edges = Edges::ALL;
        t.pending_mut().fullscreen = true;
        assert_eq!(t.commit(), Readiness::Waiting);
        assert_eq!(requests.borrow().tiled, vec![Edges::ALL]);
        assert_eq!(requests.borrow().fullscreen, vec![true]);
    }

    #[test]
    fn unmapping_is_ready_without_client() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().mapped = false;
        t.pending_mut().geometry = Rect::new(0, 0, 10, 10);
        assert_eq!(t.commit(), Readiness::Ready);
        assert!(requests.borrow().sizes.is_empty());
    }

    // ========== Client-driven changes ==========

    #[test]
    fn unprompted_resize_respects_gravity() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().gravity = Edges::BOTTOM | Edges::RIGHT;
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(150, 100)), false, false),
            CommitOutcome::ClientResize
        );
        assert_eq!(t.pending().geometry, Rect::new(50, 50, 150, 100));

        // The client is told about the size it picked and acks it.
        assert_eq!(t.commit(), Readiness::Waiting);
        let serial = requests.borrow().sizes[0].1;
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(150, 100)).acking(serial), true, false),
            CommitOutcome::Ready
        );
        t.apply(false);
        assert_eq!(t.current().geometry, Rect::new(50, 50, 150, 100));
    }

    #[test]
    fn same_size_commit_repaints_directly() {
        let (mut t, _) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(200, 150)), false, false),
            CommitOutcome::Repaint
        );
        assert!(t.take_surface_state().is_some());
    }

    #[test]
    fn commit_while_pending_is_held_back() {
        let (mut t, _) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(10, 10)), false, true),
            CommitOutcome::Ignored
        );
        assert_eq!(t.current().geometry.size(), Size::new(200, 150));
    }

    // ========== Destroyed clients ==========

    #[test]
    fn destroyed_client_freezes_size_but_honours_unmap() {
        let (mut t, _) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().geometry = Rect::new(40, 40, 500, 500);
        assert_eq!(t.commit(), Readiness::Waiting);
        assert!(t.handle_client_destroyed());
        t.apply(false);
        assert_eq!(t.current().geometry, Rect::new(40, 40, 200, 150));

        t.pending_mut().mapped = false;
        assert_eq!(t.commit(), Readiness::Ready);
        t.apply(false);
        assert!(!t.current().mapped);
    }

    #[test]
    fn destroyed_before_map_never_maps() {
        let (mut t, _) = toplevel(ToplevelKind::Xdg);
        t.pending_mut().mapped = true;
        t.pending_mut().geometry = Rect::new(0, 0, 100, 100);
        t.commit();
        t.handle_client_destroyed();
        t.apply(false);
        assert!(!t.current().mapped);
    }

    // ========== Xwayland ==========

    #[test]
    fn xwayland_waits_for_size_not_serial() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xwayland, Rect::new(0, 0, 200, 150));
        t.pending_mut().geometry = Rect::new(10, 10, 300, 200);
        assert_eq!(t.commit(), Readiness::Waiting);
        assert_eq!(requests.borrow().positions.last(), Some(&Point::new(10, 10)));
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(250, 200)), true, false),
            CommitOutcome::StillWaiting
        );
        assert_eq!(
            t.handle_client_commit(commit_of(Size::new(300, 200)), true, false),
            CommitOutcome::Ready
        );
    }

    #[test]
    fn ready_is_reported_once_per_commit() {
        let (mut t, requests) = mapped_at(ToplevelKind::Xdg, Rect::new(0, 0, 200, 150));
        t.pending_mut().geometry = Rect::new(0, 0, 300, 150);
        t.commit();
        let serial = requests.borrow().sizes[0].1;
        let ack = commit_of(Size::new(300, 150)).acking(serial);
        assert_eq!(t.handle_client_commit(ack.clone(), true, false), CommitOutcome::Ready);
        assert_eq!(t.handle_client_commit(ack, true, false), CommitOutcome::Ignored);
    }
}
