#![no_main]
//! Fuzz target for region arithmetic
//!
//! Builds two regions from random rectangles and checks the set identities
//! damage tracking relies on.

use libfuzzer_sys::fuzz_target;

use compositor::geometry::Rect;
use compositor::region::Region;

fn rects(data: &[u8]) -> Vec<Rect> {
    data.chunks_exact(4)
        .map(|c| Rect::new(i32::from(c[0] as i8), i32::from(c[1] as i8), i32::from(c[2]), i32::from(c[3])))
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let half = data.len() / 2;
    let a = Region::from_rects(rects(&data[..half]));
    let b = Region::from_rects(rects(&data[half..]));

    let union = a.union(&b);
    assert!(union.contains_region(&a));
    assert!(union.contains_region(&b));

    let difference = a.subtract(&b);
    assert!(a.contains_region(&difference));
    assert!(difference.intersect(&b).is_empty());

    let intersection = a.intersect(&b);
    assert_eq!(difference.area() + intersection.area(), a.area());
});
