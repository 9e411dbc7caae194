//! Property-based tests for the R*-tree

use hypertree::geometry::{dist_to_rect_edge, BoxND, EuclideanDistance};
use hypertree::index::RStarConfig;
use hypertree::rstar_tree::{RStarTree, RangedFilter};
use proptest::prelude::*;

prop_compose! {
    fn arb_box_2d()(lo in prop::collection::vec(0.0..90.0f64, 2),
                    extent in prop::collection::vec(0.0..10.0f64, 2)) -> (Vec<f64>, Vec<f64>) {
        let hi: Vec<f64> = lo.iter().zip(extent.iter()).map(|(l, e)| l + e).collect();
        (lo, hi)
    }
}

fn small_tree() -> RStarTree<usize> {
    RStarTree::with_config(
        2,
        RStarConfig {
            max_entries: 4,
            min_entries: 2,
            reinsert_count: 1,
        },
    )
    .unwrap()
}

proptest! {
    #[test]
    fn test_round_trip_and_structure(boxes in prop::collection::vec(arb_box_2d(), 1..50)) {
        let mut tree = small_tree();
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            tree.insert(lo, hi, i).unwrap();
            prop_assert!(tree.check_invariants(), "invariants broken after insert {}", i);
        }
        prop_assert_eq!(tree.len(), boxes.len());
        for (lo, hi) in &boxes {
            prop_assert!(tree.contains(lo, hi));
        }
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            prop_assert!(tree.remove(lo, hi).is_some(), "box {} missing on remove", i);
            prop_assert!(tree.check_invariants(), "invariants broken after remove {}", i);
        }
        prop_assert!(tree.is_empty());
    }

    #[test]
    fn test_window_completeness(
        boxes in prop::collection::vec(arb_box_2d(), 1..50),
        corner_a in prop::collection::vec(0.0..100.0f64, 2),
        corner_b in prop::collection::vec(0.0..100.0f64, 2),
    ) {
        let wlo: Vec<f64> = corner_a.iter().zip(corner_b.iter()).map(|(a, b)| a.min(*b)).collect();
        let whi: Vec<f64> = corner_a.iter().zip(corner_b.iter()).map(|(a, b)| a.max(*b)).collect();
        let mut tree = small_tree();
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            tree.insert(lo, hi, i).unwrap();
        }
        let mut found: Vec<usize> = tree.window(&wlo, &whi).unwrap().map(|(_, v)| *v).collect();
        let mut expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, (lo, hi))| {
                hi[0] >= wlo[0] && lo[0] <= whi[0] && hi[1] >= wlo[1] && lo[1] <= whi[1]
            })
            .map(|(i, _)| i)
            .collect();
        found.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn test_knn_correctness(
        boxes in prop::collection::vec(arb_box_2d(), 1..50),
        center in prop::collection::vec(0.0..100.0f64, 2),
        k in 1usize..8,
    ) {
        let mut tree = small_tree();
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            tree.insert(lo, hi, i).unwrap();
        }
        let results: Vec<_> = tree.knn::<EuclideanDistance>(&center, k).unwrap().collect();
        prop_assert_eq!(results.len(), k.min(boxes.len()));

        let mut brute: Vec<f64> = boxes
            .iter()
            .map(|(lo, hi)| dist_to_rect_edge(&center, lo, hi))
            .collect();
        brute.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut prev = 0.0;
        for (rank, entry) in results.iter().enumerate() {
            prop_assert!((entry.dist - brute[rank]).abs() < 1e-9);
            prop_assert!(entry.dist >= prev);
            prev = entry.dist;
        }
    }

    #[test]
    fn test_ranged_nn_monotone_and_complete(
        boxes in prop::collection::vec(arb_box_2d(), 1..50),
        center in prop::collection::vec(0.0..100.0f64, 2),
    ) {
        let mut tree = small_tree();
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            tree.insert(lo, hi, i).unwrap();
        }
        let window = BoxND::new(vec![20.0, 20.0], vec![80.0, 80.0]).unwrap();
        let results: Vec<_> = tree
            .ranged_nn(
                &center,
                |c, mbr| dist_to_rect_edge(c, mbr.min(), mbr.max()),
                |c, mbr| dist_to_rect_edge(c, mbr.min(), mbr.max()),
                RangedFilter::Window(window.clone()),
            )
            .unwrap()
            .map(|e| (e.dist, *e.value))
            .collect();

        let mut prev = 0.0;
        for (dist, _) in &results {
            prop_assert!(*dist >= prev, "ranged-NN distances must be non-decreasing");
            prev = *dist;
        }
        let mut found: Vec<usize> = results.iter().map(|(_, v)| *v).collect();
        let mut expected: Vec<usize> = boxes
            .iter()
            .enumerate()
            .filter(|(_, (lo, hi))| {
                hi[0] >= 20.0 && lo[0] <= 80.0 && hi[1] >= 20.0 && lo[1] <= 80.0
            })
            .map(|(i, _)| i)
            .collect();
        found.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn test_update_equivalence(
        boxes in prop::collection::vec(arb_box_2d(), 2..30),
        moves in prop::collection::vec((any::<prop::sample::Index>(), arb_box_2d()), 1..15),
    ) {
        let mut updated = small_tree();
        let mut rebuilt = small_tree();
        let mut keys = boxes.clone();
        for (i, (lo, hi)) in boxes.iter().enumerate() {
            updated.insert(lo, hi, i).unwrap();
            rebuilt.insert(lo, hi, i).unwrap();
        }
        for (index, (new_lo, new_hi)) in moves {
            let i = index.index(keys.len());
            let (old_lo, old_hi) = keys[i].clone();
            let a = updated.update(&old_lo, &old_hi, &new_lo, &new_hi).unwrap();
            let b = match rebuilt.remove(&old_lo, &old_hi) {
                Some(v) => {
                    rebuilt.insert(&new_lo, &new_hi, v).unwrap();
                    true
                }
                None => false,
            };
            prop_assert_eq!(a, b);
            keys[i] = (new_lo, new_hi);
        }
        prop_assert_eq!(updated.len(), rebuilt.len());
        prop_assert!(updated.check_invariants());
        for (lo, hi) in &keys {
            prop_assert_eq!(updated.contains(lo, hi), rebuilt.contains(lo, hi));
        }
    }
}
