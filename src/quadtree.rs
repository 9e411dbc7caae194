//! ## Hypercube Quadtree Implementation
//!
//! This module implements a point quadtree in arbitrary dimension d with a
//! fixed 2^d-way fanout. Every node covers a hypercube described by a center
//! and a half-side radius (the same radius in every dimension). A node is
//! either a leaf holding up to `max_leaf` entries or an inner node with a
//! sparse map from a d-bit child index to a child node; inner nodes hold no
//! entries. The root region grows on demand to enclose any inserted key.
//!
//! The tree is a multimap: coordinate-equal points may be inserted more than
//! once. It supports insertion, removal (with single-level merging), update
//! (with an in-leaf fast path), exact lookup, window queries, and k-nearest
//! neighbor search scheduled through a min-max heap.
//!
//! ### Example
//!
//! ```
//! use hypertree::geometry::EuclideanDistance;
//! use hypertree::quadtree::QuadTree;
//!
//! let mut tree: QuadTree<&str> = QuadTree::new(2).unwrap();
//! tree.insert(&[10.0, 20.0], "a").unwrap();
//! tree.insert(&[50.0, 50.0], "b").unwrap();
//!
//! let neighbors: Vec<_> = tree
//!     .knn::<EuclideanDistance>(&[12.0, 22.0], 1)
//!     .unwrap()
//!     .collect();
//! assert_eq!(*neighbors[0].value, "a");
//! ```

use std::collections::{btree_map, BTreeMap};
use std::cmp::Ordering;

use ordered_float::OrderedFloat;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::IndexError;
use crate::geometry::{ceil_power_of_two, point_eq, validate_point, BoxND, DistanceMetric};
use crate::index::QuadTreeConfig;
use crate::minmax_heap::MinMaxHeap;
use crate::query::PointDistEntry;

/// The child-index bit pattern limits the dimensionality; the sparse child
/// map never allocates 2^d slots, but the index itself must fit a machine
/// word with room to spare.
pub const MAX_DIMS: usize = 32;

/// A point key together with its user value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointEntry<T> {
    /// The coordinate vector.
    pub point: Vec<f64>,
    /// The user value.
    pub value: T,
}

/// A quadtree node: a hypercube region `[center - radius, center + radius]`
/// per dimension. `children` is `None` for leaves.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct QNode<T> {
    center: Vec<f64>,
    radius: f64,
    entries: Vec<PointEntry<T>>,
    children: Option<BTreeMap<usize, Box<QNode<T>>>>,
}

impl<T> QNode<T> {
    fn new_leaf(center: Vec<f64>, radius: f64) -> Self {
        QNode {
            center,
            radius,
            entries: Vec::new(),
            children: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    fn contains(&self, p: &[f64]) -> bool {
        p.iter()
            .zip(self.center.iter())
            .all(|(x, c)| *x >= c - self.radius && *x <= c + self.radius)
    }

    fn overlaps_window(&self, lo: &[f64], hi: &[f64]) -> bool {
        self.center
            .iter()
            .zip(lo.iter().zip(hi.iter()))
            .all(|(c, (l, h))| c + self.radius >= *l && c - self.radius <= *h)
    }

    fn bounding_box(&self) -> BoxND {
        let min = self.center.iter().map(|c| c - self.radius).collect();
        let max = self.center.iter().map(|c| c + self.radius).collect();
        BoxND::new_unchecked(min, max)
    }
}

/// Returns the d-bit child index of `p` relative to `center`: bit k (MSB =
/// dimension 0) is set iff `p[k] >= center[k]`.
fn child_index(center: &[f64], p: &[f64]) -> usize {
    center
        .iter()
        .zip(p.iter())
        .fold(0usize, |idx, (c, x)| (idx << 1) | usize::from(*x >= *c))
}

/// Center and radius of the child quadrant at `index`.
fn child_geometry(center: &[f64], radius: f64, index: usize, dims: usize) -> (Vec<f64>, f64) {
    let half = radius / 2.0;
    let child_center = center
        .iter()
        .enumerate()
        .map(|(k, c)| {
            if (index >> (dims - 1 - k)) & 1 == 1 {
                c + half
            } else {
                c - half
            }
        })
        .collect();
    (child_center, half)
}

/// A point quadtree over d-dimensional keys.
///
/// Duplicate (coordinate-equal) keys are allowed; operations that address a
/// specific entry take an extra value argument.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadTree<T> {
    root: Option<Box<QNode<T>>>,
    dims: usize,
    max_leaf: usize,
    size: usize,
}

impl<T: PartialEq> QuadTree<T> {
    /// Creates an empty quadtree with the default configuration.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::with_config(dims, QuadTreeConfig::default())
    }

    /// Creates an empty quadtree with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvalidDimension` if `dims` is zero or larger
    /// than [`MAX_DIMS`], and `IndexError::InvalidCapacity` if the
    /// configuration is rejected by [`QuadTreeConfig::validate`].
    pub fn with_config(dims: usize, config: QuadTreeConfig) -> Result<Self, IndexError> {
        if dims == 0 || dims > MAX_DIMS {
            return Err(IndexError::InvalidDimension {
                requested: dims,
                available: MAX_DIMS,
            });
        }
        config.validate()?;
        info!(
            "Creating new QuadTree with dims: {} and max_leaf: {}",
            dims, config.max_leaf
        );
        Ok(QuadTree {
            root: None,
            dims,
            max_leaf: config.max_leaf,
            size: 0,
        })
    }

    /// The dimensionality of the keys.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Removes all entries and resets the root region.
    pub fn clear(&mut self) {
        self.root = None;
        self.size = 0;
    }

    /// Inserts a point entry. Coordinate-equal duplicates are kept.
    pub fn insert(&mut self, point: &[f64], value: T) -> Result<(), IndexError> {
        validate_point(point, self.dims)?;
        let entry = PointEntry {
            point: point.to_vec(),
            value,
        };
        match self.root {
            None => {
                let max_abs = point.iter().fold(0.0f64, |m, c| m.max(c.abs()));
                let radius = ceil_power_of_two(max_abs);
                let mut root = QNode::new_leaf(point.to_vec(), radius);
                root.entries.push(entry);
                self.root = Some(Box::new(root));
            }
            Some(_) => {
                while !self
                    .root
                    .as_ref()
                    .map_or(false, |r| r.contains(&entry.point))
                {
                    self.grow_root(&entry.point);
                }
                let max_leaf = self.max_leaf;
                let dims = self.dims;
                if let Some(root) = self.root.as_deref_mut() {
                    Self::insert_rec(root, entry, max_leaf, dims);
                }
            }
        }
        self.size += 1;
        Ok(())
    }

    /// Doubles the root region toward `p`, wrapping the old root as one child
    /// of the new root.
    fn grow_root(&mut self, p: &[f64]) {
        let Some(old) = self.root.take() else { return };
        let new_center: Vec<f64> = old
            .center
            .iter()
            .zip(p.iter())
            .map(|(c, k)| if *k >= *c { c + old.radius } else { c - old.radius })
            .collect();
        let new_radius = old.radius * 2.0;
        debug!(
            "Growing QuadTree root to center {:?} radius {}",
            new_center, new_radius
        );
        let idx = child_index(&new_center, &old.center);
        let mut children = BTreeMap::new();
        children.insert(idx, old);
        self.root = Some(Box::new(QNode {
            center: new_center,
            radius: new_radius,
            entries: Vec::new(),
            children: Some(children),
        }));
    }

    fn all_points_equal(entries: &[PointEntry<T>], p: &[f64]) -> bool {
        entries.iter().all(|e| point_eq(&e.point, p))
    }

    fn insert_rec(node: &mut QNode<T>, entry: PointEntry<T>, max_leaf: usize, dims: usize) {
        if node.is_leaf() {
            // A leaf absorbs the entry if it has room, or if every resident
            // key equals the new key (identical keys cannot be separated by
            // further splitting).
            if node.entries.len() < max_leaf || Self::all_points_equal(&node.entries, &entry.point)
            {
                node.entries.push(entry);
                return;
            }
            Self::split(node, max_leaf, dims);
        }
        let idx = child_index(&node.center, &entry.point);
        let (child_center, child_radius) = child_geometry(&node.center, node.radius, idx, dims);
        let children = match node.children.as_mut() {
            Some(children) => children,
            None => unreachable!("node was split above"),
        };
        let child = children
            .entry(idx)
            .or_insert_with(|| Box::new(QNode::new_leaf(child_center, child_radius)));
        Self::insert_rec(child, entry, max_leaf, dims);
    }

    /// Turns a full leaf into an inner node, redistributing its entries into
    /// lazily created child quadrants.
    fn split(node: &mut QNode<T>, max_leaf: usize, dims: usize) {
        debug!(
            "Splitting QuadTree leaf at center {:?} radius {}",
            node.center, node.radius
        );
        let old = std::mem::take(&mut node.entries);
        node.children = Some(BTreeMap::new());
        for entry in old {
            Self::insert_rec(node, entry, max_leaf, dims);
        }
    }

    /// Removes one entry with the given coordinates and returns its value.
    pub fn remove(&mut self, point: &[f64]) -> Option<T> {
        self.remove_if(point, &|_| true)
    }

    /// Removes one entry matching both coordinates and value.
    pub fn remove_entry(&mut self, point: &[f64], value: &T) -> Option<T> {
        self.remove_if(point, &|v| v == value)
    }

    fn remove_if(&mut self, point: &[f64], pred: &dyn Fn(&T) -> bool) -> Option<T> {
        if point.len() != self.dims {
            return None;
        }
        let max_leaf = self.max_leaf;
        let root = self.root.as_deref_mut()?;
        let removed = Self::remove_rec(root, point, pred, max_leaf)?;
        self.size -= 1;
        if root.is_leaf() && root.entries.is_empty() {
            self.root = None;
        }
        Some(removed)
    }

    fn remove_rec(
        node: &mut QNode<T>,
        point: &[f64],
        pred: &dyn Fn(&T) -> bool,
        max_leaf: usize,
    ) -> Option<T> {
        if node.is_leaf() {
            let pos = node
                .entries
                .iter()
                .position(|e| point_eq(&e.point, point) && pred(&e.value))?;
            let entry = node.entries.remove(pos);
            debug!("Removed point {:?} from QuadTree leaf", entry.point);
            return Some(entry.value);
        }
        let idx = child_index(&node.center, point);
        let children = node.children.as_mut()?;
        let child = children.get_mut(&idx)?;
        let removed = Self::remove_rec(child, point, pred, max_leaf)?;
        if child.is_leaf() && child.entries.is_empty() {
            children.remove(&idx);
        }
        Self::try_merge(node, max_leaf);
        Some(removed)
    }

    /// Collapses an inner node back into a leaf when all children are leaves
    /// and their entries fit the leaf limit. Merging never cascades above the
    /// immediate parent.
    fn try_merge(node: &mut QNode<T>, max_leaf: usize) {
        let Some(children) = node.children.as_ref() else {
            return;
        };
        if children.values().any(|c| !c.is_leaf()) {
            return;
        }
        let total: usize = children.values().map(|c| c.entries.len()).sum();
        if total > max_leaf {
            return;
        }
        let children = match node.children.take() {
            Some(children) => children,
            None => unreachable!("checked above"),
        };
        for child in children.into_values() {
            node.entries.extend(child.entries);
        }
        debug!(
            "Merged QuadTree children into leaf at center {:?} with {} entries",
            node.center,
            node.entries.len()
        );
    }

    /// Returns a reference to the value of one entry with the given
    /// coordinates.
    pub fn query_exact(&self, point: &[f64]) -> Option<&T> {
        if point.len() != self.dims {
            return None;
        }
        let mut node = self.root.as_deref()?;
        loop {
            match node.children.as_ref() {
                None => {
                    return node
                        .entries
                        .iter()
                        .find(|e| point_eq(&e.point, point))
                        .map(|e| &e.value);
                }
                Some(children) => {
                    let idx = child_index(&node.center, point);
                    node = children.get(&idx)?;
                }
            }
        }
    }

    /// Returns true if an entry with the given coordinates exists.
    pub fn contains(&self, point: &[f64]) -> bool {
        self.query_exact(point).is_some()
    }

    /// Returns true if an entry with the given coordinates and value exists.
    pub fn contains_entry(&self, point: &[f64], value: &T) -> bool {
        if point.len() != self.dims {
            return false;
        }
        self.window_unchecked(Some((point.to_vec(), point.to_vec())))
            .any(|e| e.value == *value)
    }

    /// Moves one entry from `old` to `new`, preserving its value.
    ///
    /// Fast path: if `new` falls inside the routing cell of the leaf that
    /// holds `old`, the entry is rewritten in place without structural
    /// change. Otherwise the entry is removed and re-inserted, which may
    /// trigger a merge and then a split.
    ///
    /// Returns true if an entry was moved.
    pub fn update(&mut self, old: &[f64], new: &[f64]) -> Result<bool, IndexError> {
        self.update_if(old, new, &|_| true)
    }

    /// Like [`QuadTree::update`], addressing the entry that also matches
    /// `value`.
    pub fn update_entry(
        &mut self,
        old: &[f64],
        new: &[f64],
        value: &T,
    ) -> Result<bool, IndexError> {
        self.update_if(old, new, &|v| v == value)
    }

    fn update_if(
        &mut self,
        old: &[f64],
        new: &[f64],
        pred: &dyn Fn(&T) -> bool,
    ) -> Result<bool, IndexError> {
        validate_point(old, self.dims)?;
        validate_point(new, self.dims)?;
        if let Some(root) = self.root.as_deref_mut() {
            let mut node = root;
            let mut same_route = true;
            loop {
                if node.is_leaf() {
                    let Some(pos) = node
                        .entries
                        .iter()
                        .position(|e| point_eq(&e.point, old) && pred(&e.value))
                    else {
                        return Ok(false);
                    };
                    // In-place rewrite is sound only if the new point routes
                    // to this same leaf and stays inside its region.
                    let stays = same_route
                        && new
                            .iter()
                            .zip(node.center.iter())
                            .all(|(x, c)| (x - c).abs() <= node.radius);
                    if stays {
                        node.entries[pos].point = new.to_vec();
                        return Ok(true);
                    }
                    break;
                }
                let old_idx = child_index(&node.center, old);
                if old_idx != child_index(&node.center, new) {
                    same_route = false;
                }
                let Some(child) = node.children.as_mut().and_then(|c| c.get_mut(&old_idx)) else {
                    return Ok(false);
                };
                node = child;
            }
        } else {
            return Ok(false);
        }
        match self.remove_if(old, pred) {
            Some(value) => {
                self.insert(new, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns a lazy iterator over all entries enclosed by the axis-aligned
    /// window `[lo, hi]`.
    pub fn window<'a>(
        &'a self,
        lo: &[f64],
        hi: &[f64],
    ) -> Result<QtWindowIter<'a, T>, IndexError> {
        crate::geometry::validate_box(lo, hi, self.dims)?;
        Ok(self.window_unchecked(Some((lo.to_vec(), hi.to_vec()))))
    }

    /// Returns a lazy iterator over every entry in the tree.
    pub fn iter(&self) -> QtWindowIter<'_, T> {
        self.window_unchecked(None)
    }

    fn window_unchecked(&self, window: Option<(Vec<f64>, Vec<f64>)>) -> QtWindowIter<'_, T> {
        let mut iter = QtWindowIter {
            root: self.root.as_deref(),
            window,
            stack: Vec::new(),
        };
        iter.rearm();
        iter
    }

    /// Performs a lazy best-first k-nearest-neighbor search around `center`.
    /// Entries are emitted in non-decreasing metric distance.
    ///
    /// The traversal relies on `M::point_to_rect` never overestimating the
    /// distance to an entry inside the box; both provided metrics guarantee
    /// this.
    pub fn knn<'a, M: DistanceMetric>(
        &'a self,
        center: &[f64],
        k: usize,
    ) -> Result<QtKnnIter<'a, T, M>, IndexError> {
        validate_point(center, self.dims)?;
        let mut iter = QtKnnIter {
            root: self.root.as_deref(),
            dims: self.dims,
            center: center.to_vec(),
            remaining: k,
            queue: MinMaxHeap::new(),
            seq: 0,
            _metric: std::marker::PhantomData,
        };
        iter.rearm();
        Ok(iter)
    }

    /// Verifies the structural invariants: every entry lies inside its
    /// leaf's region, inner nodes hold no entries, and child geometry is
    /// consistent with the parent. Intended for tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> bool {
        fn check<T>(node: &QNode<T>, dims: usize) -> bool {
            match node.children.as_ref() {
                None => node.entries.iter().all(|e| {
                    e.point
                        .iter()
                        .zip(node.center.iter())
                        .all(|(x, c)| (x - c).abs() <= node.radius * crate::geometry::EPS_MUL)
                }),
                Some(children) => {
                    if !node.entries.is_empty() {
                        return false;
                    }
                    children.iter().all(|(idx, child)| {
                        let (expect_center, expect_radius) =
                            child_geometry(&node.center, node.radius, *idx, dims);
                        point_eq(&child.center, &expect_center)
                            && child.radius == expect_radius
                            && check(child, dims)
                    })
                }
            }
        }
        match self.root.as_deref() {
            None => self.size == 0,
            Some(root) => check(root, self.dims) && self.iter().count() == self.size,
        }
    }
}

enum QtRanked<'a, T> {
    Node(&'a QNode<T>),
    Entry(&'a PointEntry<T>),
}

struct QtRankedItem<'a, T> {
    dist: OrderedFloat<f64>,
    seq: u64,
    target: QtRanked<'a, T>,
}

impl<T> PartialEq for QtRankedItem<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.seq == other.seq
    }
}
impl<T> Eq for QtRankedItem<'_, T> {}
impl<T> Ord for QtRankedItem<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}
impl<T> PartialOrd for QtRankedItem<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QtFrame<'a, T> {
    node: &'a QNode<T>,
    entry_idx: usize,
    children: Option<btree_map::Values<'a, usize, Box<QNode<T>>>>,
}

impl<'a, T> QtFrame<'a, T> {
    fn new(node: &'a QNode<T>) -> Self {
        QtFrame {
            node,
            entry_idx: 0,
            children: node.children.as_ref().map(|m| m.values()),
        }
    }
}

/// Lazy depth-first iterator over the entries enclosed by a window (or the
/// whole tree when created through [`QuadTree::iter`]).
pub struct QtWindowIter<'a, T> {
    root: Option<&'a QNode<T>>,
    window: Option<(Vec<f64>, Vec<f64>)>,
    stack: Vec<QtFrame<'a, T>>,
}

impl<'a, T> QtWindowIter<'a, T> {
    fn rearm(&mut self) {
        self.stack.clear();
        if let Some(root) = self.root {
            let prune = match &self.window {
                Some((lo, hi)) => !root.overlaps_window(lo, hi),
                None => false,
            };
            if !prune {
                self.stack.push(QtFrame::new(root));
            }
        }
    }

    /// Re-arms the iterator with a new window, reusing its internal stack.
    pub fn reset(&mut self, lo: &[f64], hi: &[f64]) -> Result<(), IndexError> {
        let dims = self.root.map_or(lo.len(), |r| r.center.len());
        crate::geometry::validate_box(lo, hi, dims)?;
        self.window = Some((lo.to_vec(), hi.to_vec()));
        self.rearm();
        Ok(())
    }
}

impl<'a, T> Iterator for QtWindowIter<'a, T> {
    type Item = &'a PointEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.entry_idx < frame.node.entries.len() {
                let entry = &frame.node.entries[frame.entry_idx];
                frame.entry_idx += 1;
                let admit = match &self.window {
                    Some((lo, hi)) => crate::geometry::point_enclosed(&entry.point, lo, hi),
                    None => true,
                };
                if admit {
                    return Some(entry);
                }
                continue;
            }
            let next_child = frame.children.as_mut().and_then(|c| c.next());
            match next_child {
                Some(child) => {
                    let prune = match &self.window {
                        Some((lo, hi)) => !child.overlaps_window(lo, hi),
                        None => false,
                    };
                    if !prune {
                        self.stack.push(QtFrame::new(child));
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Lazy best-first k-nearest-neighbor iterator; entries come out in
/// ascending distance order.
pub struct QtKnnIter<'a, T, M: DistanceMetric> {
    root: Option<&'a QNode<T>>,
    dims: usize,
    center: Vec<f64>,
    remaining: usize,
    queue: MinMaxHeap<QtRankedItem<'a, T>>,
    seq: u64,
    _metric: std::marker::PhantomData<M>,
}

impl<'a, T, M: DistanceMetric> QtKnnIter<'a, T, M> {
    fn rearm(&mut self) {
        self.queue.clear();
        self.seq = 0;
        if let Some(root) = self.root {
            self.queue.push(QtRankedItem {
                dist: OrderedFloat(0.0),
                seq: 0,
                target: QtRanked::Node(root),
            });
        }
    }

    /// Re-runs the search with a new center and `k`, reusing the iterator.
    pub fn reset(&mut self, center: &[f64], k: usize) -> Result<(), IndexError> {
        validate_point(center, self.dims)?;
        self.center = center.to_vec();
        self.remaining = k;
        self.rearm();
        Ok(())
    }
}

impl<'a, T, M: DistanceMetric> Iterator for QtKnnIter<'a, T, M> {
    type Item = PointDistEntry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while let Some(item) = self.queue.pop_min() {
            match item.target {
                QtRanked::Entry(entry) => {
                    self.remaining -= 1;
                    return Some(PointDistEntry {
                        dist: item.dist.0,
                        point: &entry.point,
                        value: &entry.value,
                    });
                }
                QtRanked::Node(node) => match node.children.as_ref() {
                    None => {
                        for entry in &node.entries {
                            let dist = M::point_to_point(&self.center, &entry.point);
                            self.seq += 1;
                            self.queue.push(QtRankedItem {
                                dist: OrderedFloat(dist),
                                seq: self.seq,
                                target: QtRanked::Entry(entry),
                            });
                        }
                    }
                    Some(children) => {
                        for child in children.values() {
                            let dist = M::point_to_rect(&self.center, &child.bounding_box());
                            self.seq += 1;
                            self.queue.push(QtRankedItem {
                                dist: OrderedFloat(dist),
                                seq: self.seq,
                                target: QtRanked::Node(child),
                            });
                        }
                    }
                },
            }
        }
        None
    }
}
