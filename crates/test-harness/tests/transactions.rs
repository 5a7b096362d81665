//! Toplevel transactions: double buffering, gravity, atomicity and timeouts

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;

use compositor::geometry::{Edges, Point, Rect, Size};
use compositor::plugin::{Event, Plugin};
use compositor::toplevel::{CommitOutcome, ToplevelKind};
use compositor::view::ViewId;
use compositor::WayScene;
use test_harness::assertions::{assert_all_or_nothing, assert_geometry, assert_no_stale_pixels, assert_rect_color};
use test_harness::fixtures::{single_view, views, GREEN, RED, TEST_HEIGHT, TEST_WIDTH};
use test_harness::{Request, TestCompositor};

/// Counts `ToplevelApplied` per view
#[derive(Clone, Default)]
struct ApplyCounter(Rc<RefCell<HashMap<ViewId, u32>>>);

impl ApplyCounter {
    fn count(&self, view: ViewId) -> u32 {
        self.0.borrow().get(&view).copied().unwrap_or(0)
    }
}

impl Plugin for ApplyCounter {
    fn name(&self) -> &str {
        "apply-counter"
    }

    fn handle_event(&mut self, _core: &mut WayScene, event: &Event) {
        if let Event::ToplevelApplied { view, .. } = event {
            *self.0.borrow_mut().entry(*view).or_default() += 1;
        }
    }
}

// ========== Scenarios ==========

#[test]
fn resize_applies_after_ack() {
    let (mut tc, client) = single_view(Rect::new(0, 0, 200, 150)).unwrap();

    tc.core.set_view_geometry(client.view, Rect::new(0, 0, 300, 150));
    tc.idle();
    assert_eq!(client.size_requests().last(), Some(&Size::new(300, 150)));
    assert_geometry(&tc, client.view, Rect::new(0, 0, 200, 150));

    assert_eq!(client.ack(&mut tc), Some(CommitOutcome::Ready));
    assert_geometry(&tc, client.view, Rect::new(0, 0, 300, 150));
}

#[test]
fn client_shrink_keeps_bottom_right_corner() {
    let (mut tc, client) = single_view(Rect::new(0, 0, 200, 150)).unwrap();
    tc.core.set_gravity(client.view, Edges::BOTTOM | Edges::RIGHT);
    tc.idle();

    assert_eq!(client.commit(&mut tc, Size::new(150, 100)), CommitOutcome::ClientResize);
    tc.idle();
    // The next commit confirms the new size with a configure.
    assert_eq!(client.size_requests().last(), Some(&Size::new(150, 100)));
    client.ack(&mut tc);
    assert_geometry(&tc, client.view, Rect::new(50, 50, 150, 100));
}

#[test]
fn joint_transaction_waits_for_slowest_member() {
    let a_old = Rect::new(0, 0, 100, 100);
    let b_old = Rect::new(150, 0, 100, 100);
    let (mut tc, clients) = views(&[a_old, b_old]).unwrap();
    let (a, b) = (&clients[0], &clients[1]);
    tc.frame();

    // A only moves and is ready at once; B must resize first.
    let a_new = Rect::new(0, 120, 100, 100);
    let b_new = Rect::new(150, 0, 120, 100);
    tc.core.set_view_geometry(a.view, a_new);
    tc.core.set_view_geometry(b.view, b_new);
    tc.idle();
    assert!(a.size_requests().is_empty());
    assert!(b.has_unacked_configure());

    for _ in 0..3 {
        tc.next_frame();
        assert_all_or_nothing(&tc, &[(a.view, a_old, a_new), (b.view, b_old, b_new)]);
        assert_geometry(&tc, a.view, a_old);
        assert_rect_color(&tc, a_old, RED);
        assert_no_stale_pixels(&tc, a_new);
    }

    b.ack(&mut tc);
    assert_geometry(&tc, a.view, a_new);
    assert_geometry(&tc, b.view, b_new);
    tc.frame();
    assert_rect_color(&tc, a_new, RED);
    assert_rect_color(&tc, b_new, GREEN);
    assert_no_stale_pixels(&tc, Rect::new(0, 0, 100, 100));
}

#[test]
fn stuck_client_applies_after_timeout() {
    let (mut tc, clients) = views(&[Rect::new(0, 0, 100, 100), Rect::new(120, 0, 100, 100)]).unwrap();
    let counter = ApplyCounter::default();
    tc.load_plugin(Box::new(counter.clone()));

    tc.core.set_view_geometry(clients[0].view, Rect::new(0, 0, 60, 60));
    tc.core.set_view_geometry(clients[1].view, Rect::new(120, 0, 80, 80));
    tc.idle();
    clients[0].ack(&mut tc);
    assert_eq!(counter.count(clients[0].view), 0);

    let timeout = tc.core.transactions().timeout();
    tc.advance(timeout + Duration::from_millis(1));
    assert_eq!(counter.count(clients[0].view), 1);
    assert_eq!(counter.count(clients[1].view), 1);
    assert_geometry(&tc, clients[0].view, Rect::new(0, 0, 60, 60));
    // Late ack of the timed-out configure changes nothing.
    clients[1].ack(&mut tc);
    tc.advance(timeout * 2);
    assert_eq!(counter.count(clients[1].view), 1);
}

#[test]
fn xwayland_waits_for_requested_size() {
    let mut tc = TestCompositor::new_headless(TEST_WIDTH, TEST_HEIGHT);
    let client = tc
        .spawn(ToplevelKind::Xwayland, "xterm", Size::new(100, 100), RED)
        .unwrap();
    tc.map(&client, Rect::new(10, 10, 100, 100));
    assert!(tc.core.view(client.view).unwrap().is_mapped());

    tc.core.set_view_geometry(client.view, Rect::new(20, 20, 150, 100));
    tc.idle();
    assert!(client.requests().contains(&Request::Position(Point::new(20, 20))));
    assert_eq!(client.commit(&mut tc, Size::new(120, 100)), CommitOutcome::StillWaiting);
    assert_geometry(&tc, client.view, Rect::new(10, 10, 100, 100));
    client.commit(&mut tc, Size::new(150, 100));
    assert_geometry(&tc, client.view, Rect::new(20, 20, 150, 100));
}

#[test]
fn client_size_wins_over_request() {
    let (mut tc, client) = single_view(Rect::new(0, 0, 100, 100)).unwrap();
    tc.frame();

    tc.core.set_view_geometry(client.view, Rect::new(0, 0, 200, 100));
    tc.idle();
    // Acked with the wrong size: the view follows the client.
    client.ack_with_size(&mut tc, Size::new(180, 100));
    assert_geometry(&tc, client.view, Rect::new(0, 0, 180, 100));
    tc.frame();
    assert_rect_color(&tc, Rect::new(0, 0, 180, 100), RED);
    assert_no_stale_pixels(&tc, Rect::new(180, 0, 20, 100));
}

// ========== Properties ==========

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (0..200i32, 0..150i32, 1..120i32, 1..90i32).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Pending changes never leak into current before apply
    #[test]
    fn current_only_changes_on_apply(
        initial in rect_strategy(),
        changes in prop::collection::vec(rect_strategy(), 1..6),
    ) {
        let (mut tc, client) = single_view(initial).unwrap();
        for change in &changes {
            tc.core.set_view_geometry(client.view, *change);
            prop_assert_eq!(tc.geometry(client.view), Some(initial));
        }
        tc.idle();
        client.ack(&mut tc);
        prop_assert_eq!(tc.geometry(client.view), changes.last().copied());
    }

    /// Bottom-right gravity keeps the corner fixed across client resizes
    #[test]
    fn gravity_keeps_corner(
        initial in rect_strategy(),
        w in 1..120i32,
        h in 1..90i32,
    ) {
        let (mut tc, client) = single_view(initial).unwrap();
        tc.core.set_gravity(client.view, Edges::BOTTOM | Edges::RIGHT);
        tc.idle();
        client.commit(&mut tc, Size::new(w, h));
        tc.idle();
        client.ack(&mut tc);

        let geometry = tc.geometry(client.view).unwrap();
        prop_assert_eq!(geometry.size(), Size::new(w, h));
        prop_assert_eq!(geometry.right(), initial.right());
        prop_assert_eq!(geometry.bottom(), initial.bottom());
    }

    /// No frame shows a transaction half applied
    #[test]
    fn transactions_apply_atomically(
        targets in prop::collection::vec((rect_strategy(), 0..4u32), 2..4),
    ) {
        let olds: Vec<Rect> = (0..targets.len() as i32).map(|i| Rect::new(i * 10, i * 10, 50, 50)).collect();
        let (mut tc, clients) = views(&olds).unwrap();
        for (client, (new, _)) in clients.iter().zip(&targets) {
            tc.core.set_view_geometry(client.view, *new);
        }
        tc.idle();

        let members: Vec<(ViewId, Rect, Rect)> = clients
            .iter()
            .zip(olds.iter().zip(&targets))
            .map(|(c, (old, (new, _)))| (c.view, *old, *new))
            .collect();
        for frame in 0..4 {
            for (client, (_, ack_at)) in clients.iter().zip(&targets) {
                if *ack_at == frame {
                    client.ack(&mut tc);
                    assert_all_or_nothing(&tc, &members);
                }
            }
            tc.next_frame();
            assert_all_or_nothing(&tc, &members);
        }
        for (view, _, new) in &members {
            prop_assert_eq!(tc.geometry(*view), Some(*new));
        }
    }

    /// A member that never answers cannot block the others forever
    #[test]
    fn timeout_applies_every_member_once(
        sizes in prop::collection::vec((1..100i32, 1..100i32), 2..5),
        stuck in 0usize..5,
    ) {
        let olds: Vec<Rect> = (0..sizes.len() as i32).map(|i| Rect::new(i * 20, 0, 100, 100)).collect();
        let (mut tc, clients) = views(&olds).unwrap();
        let counter = ApplyCounter::default();
        tc.load_plugin(Box::new(counter.clone()));
        let stuck = stuck % clients.len();

        for (client, (w, h)) in clients.iter().zip(&sizes) {
            let old = tc.geometry(client.view).unwrap();
            tc.core.set_view_geometry(client.view, Rect::new(old.x, old.y, *w, *h));
        }
        tc.idle();
        for (i, client) in clients.iter().enumerate() {
            if i != stuck {
                client.ack(&mut tc);
            }
        }

        let timeout = tc.core.transactions().timeout();
        tc.advance(timeout + Duration::from_millis(1));
        tc.advance(timeout * 3);
        for client in &clients {
            prop_assert_eq!(counter.count(client.view), 1);
        }
        prop_assert_eq!(tc.snapshot().committed_transactions, 0);
    }
}
