//! Property-based tests for the geometry primitives

use hypertree::geometry::{
    dist, dist_sq, dist_to_rect_edge, overlaps, point_enclosed, rect_enclosed, BoxND,
};
use proptest::prelude::*;

prop_compose! {
    fn arb_point()(coords in prop::collection::vec(-100.0..100.0f64, 3)) -> Vec<f64> {
        coords
    }
}

prop_compose! {
    fn arb_box()(lo in prop::collection::vec(-100.0..100.0f64, 3),
                 extent in prop::collection::vec(0.0..50.0f64, 3)) -> BoxND {
        let hi: Vec<f64> = lo.iter().zip(extent.iter()).map(|(l, e)| l + e).collect();
        BoxND::new(lo, hi).unwrap()
    }
}

proptest! {
    #[test]
    fn test_dist_is_symmetric(a in arb_point(), b in arb_point()) {
        prop_assert!((dist(&a, &b) - dist(&b, &a)).abs() < 1e-9);
        prop_assert!((dist(&a, &b).powi(2) - dist_sq(&a, &b)).abs() < 1e-6);
        prop_assert!(dist(&a, &a) == 0.0);
    }

    #[test]
    fn test_edge_distance_lower_bounds_inner_points(p in arb_point(), b in arb_box()) {
        // The distance to the box never exceeds the distance to its center
        // or to any of its corners.
        let edge = dist_to_rect_edge(&p, b.min(), b.max());
        prop_assert!(edge >= 0.0);
        prop_assert!(edge <= dist(&p, &b.center_point()) + 1e-9);
        prop_assert!(edge <= dist(&p, b.min()) + 1e-9);
        prop_assert!(edge <= dist(&p, b.max()) + 1e-9);
        if b.contains_point(&p) {
            prop_assert!(edge == 0.0);
        }
    }

    #[test]
    fn test_union_contains_both(a in arb_box(), b in arb_box()) {
        let u = a.union(&b);
        prop_assert!(u.contains_box(&a));
        prop_assert!(u.contains_box(&b));
        prop_assert!(u.area() + 1e-9 >= a.area());
        prop_assert!(u.area() + 1e-9 >= b.area());
        prop_assert!((a.enlargement(&b) - (u.area() - a.area())).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_consistency(a in arb_box(), b in arb_box()) {
        let o = overlaps(a.min(), a.max(), b.min(), b.max());
        prop_assert_eq!(o, overlaps(b.min(), b.max(), a.min(), a.max()));
        prop_assert_eq!(o, a.intersects(&b));
        prop_assert_eq!(a.overlap_area(&b) > 0.0 || o, o);
        if a.contains_box(&b) {
            prop_assert!(o);
            prop_assert!((a.overlap_area(&b) - b.area()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_enclosure_chain(p in arb_point(), b in arb_box()) {
        if point_enclosed(&p, b.min(), b.max()) {
            // A point inside the box stays inside any union with it.
            let other = BoxND::from_point(&p);
            prop_assert!(rect_enclosed(other.min(), other.max(), b.min(), b.max()));
            prop_assert!(b.contains_point(&p));
        }
    }
}
