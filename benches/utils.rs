#![allow(dead_code)]

use hypertree::index::{QuadTreeConfig, RStarConfig};
use hypertree::quadtree::QuadTree;
use hypertree::rect_quadtree::RectQuadTree;
use hypertree::rstar_tree::RStarTree;
use tracing::info;

pub const BENCH_NUM_INSERT: usize = 1000;
pub const BENCH_NODE_CAPACITY: usize = 8;
pub const BENCH_KNN_SIZE: usize = 5;

pub fn bench_quadtree_config() -> QuadTreeConfig {
    QuadTreeConfig {
        max_leaf: BENCH_NODE_CAPACITY,
    }
}

pub fn bench_rstar_config() -> RStarConfig {
    RStarConfig::with_max_entries(BENCH_NODE_CAPACITY)
}

/// Deterministic scattered points, spread over a 1000x1000 region.
pub fn generate_points_2d() -> Vec<[f64; 2]> {
    info!("Generating 2D data with {} points", BENCH_NUM_INSERT);
    (0..BENCH_NUM_INSERT)
        .map(|i| {
            let x = (i * 7919 % 100_000) as f64 / 100.0;
            let y = (i * 104_729 % 100_000) as f64 / 100.0;
            [x, y]
        })
        .collect()
}

/// Deterministic scattered boxes with sides up to 10.
pub fn generate_boxes_2d() -> Vec<([f64; 2], [f64; 2])> {
    generate_points_2d()
        .into_iter()
        .enumerate()
        .map(|(i, lo)| {
            let side = (i % 10) as f64 + 0.5;
            (lo, [lo[0] + side, lo[1] + side])
        })
        .collect()
}

pub fn filled_quadtree() -> QuadTree<usize> {
    let mut tree = QuadTree::with_config(2, bench_quadtree_config())
        .expect("valid bench config");
    for (i, p) in generate_points_2d().iter().enumerate() {
        tree.insert(p, i).expect("valid bench key");
    }
    tree
}

pub fn filled_rect_quadtree() -> RectQuadTree<usize> {
    let mut tree = RectQuadTree::with_config(2, bench_quadtree_config())
        .expect("valid bench config");
    for (i, (lo, hi)) in generate_boxes_2d().iter().enumerate() {
        tree.insert(lo, hi, i).expect("valid bench key");
    }
    tree
}

pub fn filled_rstar_tree() -> RStarTree<usize> {
    let mut tree =
        RStarTree::with_config(2, bench_rstar_config()).expect("valid bench config");
    for (i, (lo, hi)) in generate_boxes_2d().iter().enumerate() {
        tree.insert(lo, hi, i).expect("valid bench key");
    }
    tree
}
