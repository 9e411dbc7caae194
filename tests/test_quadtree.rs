#[path = "shared.rs"]
mod shared;
use shared::*;

use hypertree::geometry::EuclideanDistance;
use hypertree::quadtree::QuadTree;
use tracing::{debug, info};

#[test]
fn test_point_insert_and_knn_scenario() {
    info!("Starting QuadTree point insert + kNN scenario");
    let mut tree: QuadTree<&str> = QuadTree::new(2).unwrap();
    tree.insert(&[2.0, 3.0], "A").unwrap();
    tree.insert(&[5.0, 4.0], "B").unwrap();
    tree.insert(&[9.0, 6.0], "C").unwrap();
    tree.insert(&[4.0, 7.0], "D").unwrap();

    let results: Vec<_> = tree.knn::<EuclideanDistance>(&[3.0, 4.0], 2).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert_eq!(*results[0].value, "A");
    assert!((results[0].dist - 2.0f64.sqrt()).abs() < 1e-12);
    assert_eq!(*results[1].value, "D");
    assert!((results[1].dist - 10.0f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_duplicate_points_scenario() {
    info!("Starting QuadTree duplicate point scenario");
    let mut tree: QuadTree<&str> = QuadTree::new(2).unwrap();
    for _ in 0..4 {
        tree.insert(&[2.0, 3.0], "X").unwrap();
    }
    assert_eq!(tree.len(), 4);

    let hits: Vec<_> = tree.window(&[2.0, 3.0], &[2.0, 3.0]).unwrap().collect();
    assert_eq!(hits.len(), 4);

    for expected in (0..4).rev() {
        assert_eq!(tree.remove(&[2.0, 3.0]), Some("X"));
        assert_eq!(tree.len(), expected);
    }
    assert_eq!(tree.remove(&[2.0, 3.0]), None);
}

#[test]
fn test_common_points_knn_sorted() {
    let mut tree: QuadTree<&str> = QuadTree::with_config(2, small_quadtree_config()).unwrap();
    for (p, v) in common_points_2d() {
        tree.insert(&p, v).unwrap();
        debug!("Inserted 2D point {:?} into QuadTree", p);
    }
    let target = target_point_2d();
    let results: Vec<_> = tree
        .knn::<EuclideanDistance>(&target, KNN_COUNT)
        .unwrap()
        .collect();
    assert_eq!(results.len(), KNN_COUNT);
    let mut prev = 0.0;
    for entry in &results {
        let d = distance(&target, entry.point);
        assert!((d - entry.dist).abs() < 1e-9);
        assert!(d >= prev, "kNN results not sorted by increasing distance");
        prev = d;
    }
}

#[test]
fn test_window_matches_brute_force() {
    let mut rng = Rng::new(11);
    let mut tree: QuadTree<usize> = QuadTree::with_config(2, small_quadtree_config()).unwrap();
    let mut points = Vec::new();
    for i in 0..300 {
        let p = rng.point(2, 100.0);
        tree.insert(&p, i).unwrap();
        points.push(p);
    }
    assert!(tree.check_invariants());

    let lo = [20.0, 30.0];
    let hi = [70.0, 80.0];
    let mut expected: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| p[0] >= lo[0] && p[0] <= hi[0] && p[1] >= lo[1] && p[1] <= hi[1])
        .map(|(i, _)| i)
        .collect();
    let mut found: Vec<usize> = tree.window(&lo, &hi).unwrap().map(|e| e.value).collect();
    expected.sort_unstable();
    found.sort_unstable();
    assert_eq!(found, expected);
}

#[test]
fn test_grown_root_still_answers_queries() {
    let mut tree: QuadTree<usize> = QuadTree::with_config(2, small_quadtree_config()).unwrap();
    // Spread keys over wildly different magnitudes to force repeated growth.
    let keys = [
        [0.5, 0.5],
        [-3.0, 2.0],
        [40.0, -17.0],
        [-300.0, 290.0],
        [5000.0, 5000.0],
        [-80000.0, 1.0],
    ];
    for (i, k) in keys.iter().enumerate() {
        tree.insert(k, i).unwrap();
    }
    assert!(tree.check_invariants());
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(tree.query_exact(k), Some(&i));
        let nearest: Vec<_> = tree.knn::<EuclideanDistance>(k, 1).unwrap().collect();
        assert_eq!(*nearest[0].value, i);
        assert!(nearest[0].dist.abs() < 1e-12);
    }
}

#[test]
fn test_update_equivalent_to_remove_insert() {
    let mut rng = Rng::new(23);
    let mut updated: QuadTree<usize> = QuadTree::with_config(2, small_quadtree_config()).unwrap();
    let mut rebuilt: QuadTree<usize> = QuadTree::with_config(2, small_quadtree_config()).unwrap();
    let mut keys = Vec::new();
    for i in 0..100 {
        let p = rng.point(2, 50.0);
        updated.insert(&p, i).unwrap();
        rebuilt.insert(&p, i).unwrap();
        keys.push(p);
    }
    for i in (0..100).step_by(3) {
        let new_key = rng.point(2, 50.0);
        assert!(updated.update(&keys[i], &new_key).unwrap());
        let value = rebuilt.remove(&keys[i]).unwrap();
        rebuilt.insert(&new_key, value).unwrap();
        keys[i] = new_key;
    }
    assert_eq!(updated.len(), rebuilt.len());
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(updated.query_exact(k), rebuilt.query_exact(k), "key {i}");
    }
    assert!(updated.check_invariants());
}
