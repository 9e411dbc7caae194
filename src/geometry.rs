//! ## Geometry Primitives
//!
//! This module provides the d-dimensional building blocks shared by all index
//! structures: predicates over coordinate slices, Euclidean distances between
//! points and axis-aligned boxes, the [`BoxND`] bounding box type, and the
//! [`DistanceMetric`] capability used by nearest-neighbor searches.
//!
//! All comparisons are exact (`<` / `>` on `f64`, no epsilon) except for the
//! quadtree enclosure guard [`EPS_MUL`], which widens a node box slightly to
//! absorb floating-point rounding at split boundaries.

use crate::errors::IndexError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Multiplier applied to a quadtree node radius when checking whether a box
/// fits inside the node, absorbing floating-point rounding at split
/// boundaries.
pub const EPS_MUL: f64 = 1.00000002 * 1.0000001;

/// Returns true if the two points have componentwise equal coordinates.
pub fn point_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Returns true if `lo[i] <= p[i] <= hi[i]` for all axes.
pub fn point_enclosed(p: &[f64], lo: &[f64], hi: &[f64]) -> bool {
    p.iter()
        .zip(lo.iter().zip(hi.iter()))
        .all(|(x, (l, h))| *x >= *l && *x <= *h)
}

/// Returns true if box A is fully contained in box B.
pub fn rect_enclosed(a_lo: &[f64], a_hi: &[f64], b_lo: &[f64], b_hi: &[f64]) -> bool {
    a_lo.iter().zip(b_lo.iter()).all(|(a, b)| *a >= *b)
        && a_hi.iter().zip(b_hi.iter()).all(|(a, b)| *a <= *b)
}

/// Returns true if the two boxes overlap (closed bounds, edge-touching counts).
pub fn overlaps(a_lo: &[f64], a_hi: &[f64], b_lo: &[f64], b_hi: &[f64]) -> bool {
    a_hi.iter().zip(b_lo.iter()).all(|(ah, bl)| *ah >= *bl)
        && a_lo.iter().zip(b_hi.iter()).all(|(al, bh)| *al <= *bh)
}

/// Squared Euclidean distance between two points.
pub fn dist_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Euclidean distance between two points.
pub fn dist(a: &[f64], b: &[f64]) -> f64 {
    dist_sq(a, b).sqrt()
}

/// Squared Euclidean distance from a point to the closest face of a box.
/// Zero if the point lies inside the box.
pub fn dist_to_rect_edge_sq(p: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    p.iter()
        .zip(lo.iter().zip(hi.iter()))
        .map(|(x, (l, h))| {
            let d = (l - x).max(0.0).max(x - h);
            d * d
        })
        .sum()
}

/// Euclidean distance from a point to the closest face of a box.
pub fn dist_to_rect_edge(p: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    dist_to_rect_edge_sq(p, lo, hi).sqrt()
}

/// Squared Euclidean distance from a point to the center of a box.
pub fn dist_to_rect_center_sq(p: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    p.iter()
        .zip(lo.iter().zip(hi.iter()))
        .map(|(x, (l, h))| {
            let d = x - (l + h) / 2.0;
            d * d
        })
        .sum()
}

/// Euclidean distance from a point to the center of a box.
pub fn dist_to_rect_center(p: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    dist_to_rect_center_sq(p, lo, hi).sqrt()
}

/// Returns the smallest power of two that is greater than or equal to `x`,
/// clamped below at 1.0. Used to size quadtree root regions.
pub fn ceil_power_of_two(x: f64) -> f64 {
    if !(x > 1.0) {
        return 1.0;
    }
    let mut p = 1.0;
    while p < x {
        p *= 2.0;
    }
    p
}

/// Validates a point key against the index dimensionality.
pub fn validate_point(p: &[f64], dims: usize) -> Result<(), IndexError> {
    if p.len() != dims {
        return Err(IndexError::InvalidDimension {
            requested: p.len(),
            available: dims,
        });
    }
    if p.iter().any(|c| !c.is_finite()) {
        return Err(IndexError::InvalidKey);
    }
    Ok(())
}

/// Validates a box key against the index dimensionality and the
/// `lower <= upper` invariant.
pub fn validate_box(lo: &[f64], hi: &[f64], dims: usize) -> Result<(), IndexError> {
    validate_point(lo, dims)?;
    validate_point(hi, dims)?;
    for (axis, (l, h)) in lo.iter().zip(hi.iter()).enumerate() {
        if l > h {
            return Err(IndexError::InvalidBox {
                axis,
                lower: *l,
                upper: *h,
            });
        }
    }
    Ok(())
}

/// An axis-aligned box in d dimensions, with `min[i] <= max[i]` on every axis.
/// A point is the degenerate box with `min == max`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoxND {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl BoxND {
    /// Creates a new box, validating dimensions, NaN freedom, and bound order.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self, IndexError> {
        validate_box(&min, &max, min.len())?;
        Ok(BoxND { min, max })
    }

    /// Creates the degenerate box for a point.
    pub fn from_point(p: &[f64]) -> Self {
        BoxND {
            min: p.to_vec(),
            max: p.to_vec(),
        }
    }

    /// Builds a box from bounds already known to be valid.
    pub(crate) fn new_unchecked(min: Vec<f64>, max: Vec<f64>) -> Self {
        debug_assert!(validate_box(&min, &max, min.len()).is_ok());
        BoxND { min, max }
    }

    /// The number of dimensions.
    pub fn dims(&self) -> usize {
        self.min.len()
    }

    /// The lower corner.
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    /// The upper corner.
    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Area in 2D, volume in 3D, hypervolume beyond.
    pub fn area(&self) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(l, h)| h - l)
            .product()
    }

    /// Sum of the side lengths (half the perimeter in 2D).
    pub fn margin(&self) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(l, h)| h - l)
            .sum()
    }

    /// Returns the smallest box that contains both `self` and `other`.
    pub fn union(&self, other: &BoxND) -> BoxND {
        let min = self
            .min
            .iter()
            .zip(other.min.iter())
            .map(|(a, b)| a.min(*b))
            .collect();
        let max = self
            .max
            .iter()
            .zip(other.max.iter())
            .map(|(a, b)| a.max(*b))
            .collect();
        BoxND { min, max }
    }

    /// Grows `self` in place to contain `other`.
    pub fn extend(&mut self, other: &BoxND) {
        for (a, b) in self.min.iter_mut().zip(other.min.iter()) {
            if *b < *a {
                *a = *b;
            }
        }
        for (a, b) in self.max.iter_mut().zip(other.max.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    /// Returns the additional area required to enlarge `self` to include `other`.
    pub fn enlargement(&self, other: &BoxND) -> f64 {
        self.union(other).area() - self.area()
    }

    /// The area of the intersection of the two boxes, zero if disjoint.
    pub fn overlap_area(&self, other: &BoxND) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .zip(other.min.iter().zip(other.max.iter()))
            .map(|((al, ah), (bl, bh))| (ah.min(*bh) - al.max(*bl)).max(0.0))
            .product()
    }

    /// Returns true if the two boxes overlap (edge-touching counts).
    pub fn intersects(&self, other: &BoxND) -> bool {
        overlaps(&self.min, &self.max, &other.min, &other.max)
    }

    /// Returns true if `other` is fully contained in `self`.
    pub fn contains_box(&self, other: &BoxND) -> bool {
        rect_enclosed(&other.min, &other.max, &self.min, &self.max)
    }

    /// Returns true if the point lies inside the box (closed bounds).
    pub fn contains_point(&self, p: &[f64]) -> bool {
        point_enclosed(p, &self.min, &self.max)
    }

    /// The center coordinate on the given axis.
    pub fn center(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) / 2.0
    }

    /// The center point of the box.
    pub fn center_point(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(l, h)| (l + h) / 2.0)
            .collect()
    }

    /// Euclidean distance from the point to the closest face of the box.
    pub fn min_distance(&self, p: &[f64]) -> f64 {
        dist_to_rect_edge(p, &self.min, &self.max)
    }

    /// Squared variant of [`BoxND::min_distance`].
    pub fn min_distance_sq(&self, p: &[f64]) -> f64 {
        dist_to_rect_edge_sq(p, &self.min, &self.max)
    }

    /// Euclidean distance from the point to the center of the box.
    pub fn center_distance(&self, p: &[f64]) -> f64 {
        dist_to_rect_center(p, &self.min, &self.max)
    }

    /// Squared variant of [`BoxND::center_distance`].
    pub fn center_distance_sq(&self, p: &[f64]) -> f64 {
        dist_to_rect_center_sq(p, &self.min, &self.max)
    }
}

/// Distance capability used by nearest-neighbor searches: one method for
/// point-to-point distances and one for the point-to-box lower bound that
/// drives best-first traversal.
///
/// The pruning logic of the searches assumes the box distance never
/// overestimates the distance to any point inside the box. Both provided
/// metrics satisfy this; custom metrics must as well or result ordering is
/// not guaranteed.
pub trait DistanceMetric {
    /// Distance between two points.
    fn point_to_point(a: &[f64], b: &[f64]) -> f64;
    /// Lower-bound distance from a point to a box.
    fn point_to_rect(p: &[f64], rect: &BoxND) -> f64;
}

/// Euclidean distance.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanDistance;

impl DistanceMetric for EuclideanDistance {
    fn point_to_point(a: &[f64], b: &[f64]) -> f64 {
        dist(a, b)
    }
    fn point_to_rect(p: &[f64], rect: &BoxND) -> f64 {
        rect.min_distance(p)
    }
}

/// Squared Euclidean distance. Cheaper than [`EuclideanDistance`] and ranks
/// candidates identically.
#[derive(Debug, Clone, Copy)]
pub struct SquaredEuclidean;

impl DistanceMetric for SquaredEuclidean {
    fn point_to_point(a: &[f64], b: &[f64]) -> f64 {
        dist_sq(a, b)
    }
    fn point_to_rect(p: &[f64], rect: &BoxND) -> f64 {
        rect.min_distance_sq(p)
    }
}
