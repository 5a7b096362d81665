//! Test fixtures for common test scenarios

use compositor::buffer::Color;
use compositor::geometry::Rect;

use crate::client::MockClient;
use crate::headless::{TestCompositor, TestError};

/// Standard test output dimensions, small enough to paint quickly
pub const TEST_WIDTH: i32 = 320;
pub const TEST_HEIGHT: i32 = 240;

pub const RED: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);
pub const GREEN: Color = Color::rgba(0.0, 1.0, 0.0, 1.0);
pub const BLUE: Color = Color::rgba(0.0, 0.0, 1.0, 1.0);

/// Create a compositor with one view mapped at `geometry`
pub fn single_view(geometry: Rect) -> Result<(TestCompositor, MockClient), TestError> {
    let mut tc = TestCompositor::new_headless(TEST_WIDTH, TEST_HEIGHT);
    let client = tc.spawn_xdg("test.single", geometry.size(), RED)?;
    tc.map(&client, geometry);
    Ok((tc, client))
}

/// Create a compositor with one mapped view per geometry, coloured in turn
/// red, green and blue
pub fn views(geometries: &[Rect]) -> Result<(TestCompositor, Vec<MockClient>), TestError> {
    let mut tc = TestCompositor::new_headless(TEST_WIDTH, TEST_HEIGHT);
    let colors = [RED, GREEN, BLUE];
    let mut clients = Vec::with_capacity(geometries.len());
    for (i, geometry) in geometries.iter().enumerate() {
        let client = tc.spawn_xdg(&format!("test.view{i}"), geometry.size(), colors[i % colors.len()])?;
        tc.map(&client, *geometry);
        clients.push(client);
    }
    Ok((tc, clients))
}

/// A single view, painted once so later frames only repaint damage
pub fn painted_view(geometry: Rect) -> Result<(TestCompositor, MockClient), TestError> {
    let (mut tc, client) = single_view(geometry)?;
    tc.frame();
    Ok((tc, client))
}
