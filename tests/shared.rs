#![allow(dead_code)]

//! Shared test utilities for Hypertree.
//!
//! This module provides common constants, sample data, and helper functions
//! used across multiple tests: test parameters, the sample point sets the
//! scenario tests are written against, a small deterministic pseudo-random
//! generator, and distance helpers.

use hypertree::index::{QuadTreeConfig, RStarConfig};

//
// Constants
//
pub const MAX_LEAF: usize = 4;
pub const KNN_COUNT: usize = 2;

pub fn small_quadtree_config() -> QuadTreeConfig {
    QuadTreeConfig { max_leaf: MAX_LEAF }
}

pub fn small_rstar_config() -> RStarConfig {
    RStarConfig {
        max_entries: 4,
        min_entries: 2,
        reinsert_count: 1,
    }
}

//
// Common Points
//
pub fn common_points_2d() -> Vec<([f64; 2], &'static str)> {
    vec![
        ([11.0, 11.0], "A"),
        ([51.0, 51.0], "B"),
        ([31.0, 41.0], "C"),
        ([71.0, 81.0], "D"),
        ([81.0, 91.0], "E"),
        ([21.0, 21.0], "F"),
        ([22.0, 22.0], "G"),
        ([23.0, 23.0], "H"),
        ([24.0, 24.0], "I"),
        ([25.0, 25.0], "J"),
        ([26.0, 26.0], "K"),
    ]
}

pub fn target_point_2d() -> [f64; 2] {
    [35.0, 45.0]
}

//
// Deterministic pseudo-random generator (splitmix-style), so the heavier
// scenario tests stay reproducible without extra dependencies.
//
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    /// A value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// A point with coordinates in `[0, scale)`.
    pub fn point(&mut self, dims: usize, scale: f64) -> Vec<f64> {
        (0..dims).map(|_| self.next_f64() * scale).collect()
    }
}

//
// Distance helpers
//
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
