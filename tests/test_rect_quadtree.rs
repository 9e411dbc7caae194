#[path = "shared.rs"]
mod shared;
use shared::*;

use hypertree::geometry::EuclideanDistance;
use hypertree::rect_quadtree::RectQuadTree;
use tracing::info;

#[test]
fn test_box_window_scenario() {
    info!("Starting RectQuadTree box window scenario");
    let mut tree: RectQuadTree<u32> = RectQuadTree::new(2).unwrap();
    tree.insert(&[0.0, 0.0], &[10.0, 10.0], 1).unwrap();
    tree.insert(&[20.0, 20.0], &[30.0, 30.0], 2).unwrap();

    let mut hits: Vec<u32> = tree
        .window(&[5.0, 5.0], &[25.0, 25.0])
        .unwrap()
        .map(|e| e.value)
        .collect();
    hits.sort_unstable();
    assert_eq!(hits, vec![1, 2]);
}

#[test]
fn test_window_matches_brute_force() {
    let mut rng = Rng::new(31);
    let mut tree: RectQuadTree<usize> =
        RectQuadTree::with_config(2, small_quadtree_config()).unwrap();
    let mut boxes = Vec::new();
    for i in 0..200 {
        let lo = rng.point(2, 90.0);
        let hi: Vec<f64> = lo.iter().map(|c| c + rng.next_f64() * 10.0).collect();
        tree.insert(&lo, &hi, i).unwrap();
        boxes.push((lo, hi));
    }
    assert!(tree.check_invariants());

    let wlo = [25.0, 25.0];
    let whi = [60.0, 60.0];
    let mut expected: Vec<usize> = boxes
        .iter()
        .enumerate()
        .filter(|(_, (lo, hi))| {
            hi[0] >= wlo[0] && lo[0] <= whi[0] && hi[1] >= wlo[1] && lo[1] <= whi[1]
        })
        .map(|(i, _)| i)
        .collect();
    let mut found: Vec<usize> = tree.window(&wlo, &whi).unwrap().map(|e| e.value).collect();
    expected.sort_unstable();
    found.sort_unstable();
    assert_eq!(found, expected);
}

#[test]
fn test_mixed_sizes_insert_remove() {
    let mut rng = Rng::new(57);
    let mut tree: RectQuadTree<usize> =
        RectQuadTree::with_config(2, small_quadtree_config()).unwrap();
    let mut boxes = Vec::new();
    // Large boxes straddle quadrants; small ones sink into leaves.
    for i in 0..120 {
        let lo = rng.point(2, 80.0);
        let side = if i % 5 == 0 { 40.0 } else { 2.0 };
        let hi: Vec<f64> = lo.iter().map(|c| c + side).collect();
        tree.insert(&lo, &hi, i).unwrap();
        boxes.push((lo, hi));
    }
    assert_eq!(tree.len(), 120);
    assert!(tree.check_invariants());

    for (i, (lo, hi)) in boxes.iter().enumerate() {
        assert_eq!(tree.query_exact(lo, hi), Some(&i));
    }
    for (i, (lo, hi)) in boxes.iter().enumerate() {
        assert_eq!(tree.remove(lo, hi), Some(i), "failed to remove box {i}");
    }
    assert!(tree.is_empty());
    assert!(tree.check_invariants());
}

#[test]
fn test_knn_edge_distance_ordering() {
    let mut rng = Rng::new(73);
    let mut tree: RectQuadTree<usize> =
        RectQuadTree::with_config(2, small_quadtree_config()).unwrap();
    for i in 0..80 {
        let lo = rng.point(2, 100.0);
        let hi: Vec<f64> = lo.iter().map(|c| c + 3.0).collect();
        tree.insert(&lo, &hi, i).unwrap();
    }
    let center = [50.0, 50.0];
    let results: Vec<_> = tree.knn::<EuclideanDistance>(&center, 10).unwrap().collect();
    assert_eq!(results.len(), 10);
    let mut prev = 0.0;
    for entry in &results {
        assert!(entry.dist >= prev, "kNN results not sorted");
        prev = entry.dist;
    }
    // The reported distance is the distance to the closest face.
    let brute_best = results[0].dist;
    let check: Vec<_> = tree.iter().collect();
    let true_best = check
        .iter()
        .map(|e| e.key.min_distance(&center))
        .fold(f64::INFINITY, f64::min);
    assert!((brute_best - true_best).abs() < 1e-9);
}
