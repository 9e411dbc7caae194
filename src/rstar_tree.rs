//! ## R*-tree Implementation
//!
//! This module implements an R*-tree over axis-aligned box keys in arbitrary
//! dimension d (points are stored as degenerate boxes). The tree follows the
//! R* insertion heuristics: subtrees are chosen by least overlap enlargement
//! at the leaf level and least area enlargement above it, the first overflow
//! per level of a top-level insert triggers a forced reinsertion of the
//! entries farthest from the node center, and subsequent overflows split the
//! node along the axis with the smallest total margin, at the distribution
//! with the smallest overlap.
//!
//! Queries: window search (intersection semantics), exact lookup, k-nearest
//! neighbor search, and a generalised best-first ranged-NN iterator with
//! pluggable node and entry distance functions plus an optional filter. All
//! queries return lazy iterators.
//!
//! ### Example
//!
//! ```
//! use hypertree::geometry::EuclideanDistance;
//! use hypertree::rstar_tree::RStarTree;
//!
//! let mut tree: RStarTree<&str> = RStarTree::new(2).unwrap();
//! tree.insert(&[0.0, 0.0], &[10.0, 10.0], "a").unwrap();
//! tree.insert_point(&[20.0, 20.0], "b").unwrap();
//!
//! let hits: Vec<_> = tree.window(&[5.0, 5.0], &[25.0, 25.0]).unwrap().collect();
//! assert_eq!(hits.len(), 2);
//!
//! let nearest: Vec<_> = tree.knn::<EuclideanDistance>(&[19.0, 19.0], 1).unwrap().collect();
//! assert_eq!(*nearest[0].value, "b");
//! ```

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::IndexError;
use crate::geometry::{validate_box, validate_point, BoxND, DistanceMetric};
use crate::index::RStarConfig;
use crate::minmax_heap::MinMaxHeap;
use crate::query::BoxDistEntry;

/// An entry in an R*-tree node: either a stored object or a child pointer,
/// both annotated with a minimum bounding rectangle.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RStarEntry<T> {
    /// A stored object with its box key.
    Leaf {
        /// The box key.
        mbr: BoxND,
        /// The user value.
        value: T,
    },
    /// A subtree annotated with the tight union of its descendants' boxes.
    Node {
        /// The subtree MBR.
        mbr: BoxND,
        /// The child node.
        child: Box<RStarNode<T>>,
    },
}

impl<T> RStarEntry<T> {
    /// Returns a reference to the entry's MBR.
    pub fn mbr(&self) -> &BoxND {
        match self {
            RStarEntry::Leaf { mbr, .. } => mbr,
            RStarEntry::Node { mbr, .. } => mbr,
        }
    }
}

/// A node in the R*-tree. Leaves sit at level 0.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RStarNode<T> {
    entries: Vec<RStarEntry<T>>,
    level: usize,
}

#[derive(Clone, Copy)]
struct RStarParams {
    max_entries: usize,
    min_entries: usize,
    reinsert_count: usize,
}

/// An R*-tree over d-dimensional box keys.
///
/// The tree is a multimap: equal keys may be inserted more than once;
/// operations that address a specific entry take an extra value argument.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RStarTree<T> {
    root: Box<RStarNode<T>>,
    dims: usize,
    size: usize,
    max_entries: usize,
    min_entries: usize,
    reinsert_count: usize,
}

/// Computes the tight union of the entries' MBRs.
fn mbr_of<T>(entries: &[RStarEntry<T>]) -> Option<BoxND> {
    let mut iter = entries.iter();
    let first = iter.next()?.mbr().clone();
    Some(iter.fold(first, |acc, entry| acc.union(entry.mbr())))
}

fn sort_by_bound<T>(entries: &mut [RStarEntry<T>], axis: usize, upper: bool) {
    entries.sort_by(|a, b| {
        let (ka, kb) = if upper {
            (a.mbr().max()[axis], b.mbr().max()[axis])
        } else {
            (a.mbr().min()[axis], b.mbr().min()[axis])
        };
        ka.partial_cmp(&kb).unwrap_or(Ordering::Equal)
    });
}

impl<T: PartialEq> RStarTree<T> {
    /// Creates an empty R*-tree with the default configuration.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::with_config(dims, RStarConfig::default())
    }

    /// Creates an empty R*-tree with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::InvalidDimension` if `dims` is zero, and
    /// `IndexError::InvalidCapacity` if the configuration is rejected by
    /// [`RStarConfig::validate`].
    pub fn with_config(dims: usize, config: RStarConfig) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::InvalidDimension {
                requested: dims,
                available: usize::MAX,
            });
        }
        config.validate()?;
        info!(
            "Creating new RStarTree with dims: {}, max_entries: {}, min_entries: {}, reinsert_count: {}",
            dims, config.max_entries, config.min_entries, config.reinsert_count
        );
        Ok(RStarTree {
            root: Box::new(RStarNode {
                entries: Vec::new(),
                level: 0,
            }),
            dims,
            size: 0,
            max_entries: config.max_entries,
            min_entries: config.min_entries,
            reinsert_count: config.reinsert_count,
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

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.root = Box::new(RStarNode {
            entries: Vec::new(),
            level: 0,
        });
        self.size = 0;
    }

    /// The number of levels in the tree (a fresh tree has height 1).
    pub fn height(&self) -> usize {
        self.root.level + 1
    }

    fn params(&self) -> RStarParams {
        RStarParams {
            max_entries: self.max_entries,
            min_entries: self.min_entries,
            reinsert_count: self.reinsert_count,
        }
    }

    /// Inserts a box entry. Equal keys are kept as duplicates.
    pub fn insert(&mut self, lo: &[f64], hi: &[f64], value: T) -> Result<(), IndexError> {
        validate_box(lo, hi, self.dims)?;
        let mbr = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        let mut reinserted = Vec::new();
        self.insert_entry_at(RStarEntry::Leaf { mbr, value }, 0, &mut reinserted);
        self.size += 1;
        Ok(())
    }

    /// Inserts a point entry as a degenerate box.
    pub fn insert_point(&mut self, point: &[f64], value: T) -> Result<(), IndexError> {
        self.insert(point, point, value)
    }

    /// Inserts an entry at the given level, draining any forced
    /// reinsertions. `reinserted` carries the per-level overflow marks of
    /// the ongoing top-level operation.
    fn insert_entry_at(
        &mut self,
        entry: RStarEntry<T>,
        level: usize,
        reinserted: &mut Vec<bool>,
    ) {
        let params = self.params();
        let mut pending = vec![(entry, level)];
        while let Some((entry, target_level)) = pending.pop() {
            let sibling = Self::insert_rec(
                &mut self.root,
                entry,
                target_level,
                params,
                reinserted,
                &mut pending,
            );
            if let Some(sibling) = sibling {
                self.grow_root(sibling);
            }
        }
    }

    /// Makes a new root one level up, holding the old root and its split
    /// sibling.
    fn grow_root(&mut self, sibling: Box<RStarNode<T>>) {
        let new_level = self.root.level + 1;
        debug!("Splitting RStarTree root; new height {}", new_level + 1);
        let old_root = std::mem::replace(
            &mut self.root,
            Box::new(RStarNode {
                entries: Vec::new(),
                level: new_level,
            }),
        );
        let old_mbr = match mbr_of(&old_root.entries) {
            Some(mbr) => mbr,
            None => unreachable!("split halves are non-empty"),
        };
        let sibling_mbr = match mbr_of(&sibling.entries) {
            Some(mbr) => mbr,
            None => unreachable!("split halves are non-empty"),
        };
        self.root.entries.push(RStarEntry::Node {
            mbr: old_mbr,
            child: old_root,
        });
        self.root.entries.push(RStarEntry::Node {
            mbr: sibling_mbr,
            child: sibling,
        });
    }

    fn insert_rec(
        node: &mut RStarNode<T>,
        entry: RStarEntry<T>,
        target_level: usize,
        params: RStarParams,
        reinserted: &mut Vec<bool>,
        pending: &mut Vec<(RStarEntry<T>, usize)>,
    ) -> Option<Box<RStarNode<T>>> {
        if node.level == target_level {
            node.entries.push(entry);
        } else {
            let idx = Self::choose_subtree(node, entry.mbr());
            let sibling = {
                let child = match &mut node.entries[idx] {
                    RStarEntry::Node { child, .. } => child,
                    RStarEntry::Leaf { .. } => unreachable!("inner entries carry children"),
                };
                Self::insert_rec(child, entry, target_level, params, reinserted, pending)
            };
            Self::retighten(&mut node.entries[idx]);
            if let Some(sibling) = sibling {
                let sibling_mbr = match mbr_of(&sibling.entries) {
                    Some(mbr) => mbr,
                    None => unreachable!("split halves are non-empty"),
                };
                node.entries.push(RStarEntry::Node {
                    mbr: sibling_mbr,
                    child: sibling,
                });
            }
        }
        if node.entries.len() <= params.max_entries {
            return None;
        }
        // Overflow. The first overflow per level of a top-level operation is
        // handled by forced reinsertion; later overflows at that level split.
        if reinserted.len() <= node.level {
            reinserted.resize(node.level + 1, false);
        }
        if !reinserted[node.level] {
            reinserted[node.level] = true;
            let removed = Self::forced_reinsert(node, params.reinsert_count);
            let level = node.level;
            for entry in removed {
                pending.push((entry, level));
            }
            return None;
        }
        let entries = std::mem::take(&mut node.entries);
        let (group1, group2) = Self::split_entries(entries, params.min_entries);
        node.entries = group1;
        Some(Box::new(RStarNode {
            entries: group2,
            level: node.level,
        }))
    }

    fn retighten(entry: &mut RStarEntry<T>) {
        let tight = match entry {
            RStarEntry::Node { child, .. } => mbr_of(&child.entries),
            RStarEntry::Leaf { .. } => None,
        };
        if let (Some(tight), RStarEntry::Node { mbr, .. }) = (tight, entry) {
            *mbr = tight;
        }
    }

    /// Picks the child to descend into. Where the children are leaves the
    /// cost is overlap enlargement (ties: area enlargement, then area);
    /// higher up it is area enlargement (ties: area).
    fn choose_subtree(node: &RStarNode<T>, new_mbr: &BoxND) -> usize {
        let indices = 0..node.entries.len();
        if node.level == 1 {
            indices
                .min_by(|&a, &b| {
                    let overlap_a = Self::overlap_enlargement(node, a, new_mbr);
                    let overlap_b = Self::overlap_enlargement(node, b, new_mbr);
                    let mbr_a = node.entries[a].mbr();
                    let mbr_b = node.entries[b].mbr();
                    overlap_a
                        .partial_cmp(&overlap_b)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| {
                            mbr_a
                                .enlargement(new_mbr)
                                .partial_cmp(&mbr_b.enlargement(new_mbr))
                                .unwrap_or(Ordering::Equal)
                        })
                        .then_with(|| {
                            mbr_a
                                .area()
                                .partial_cmp(&mbr_b.area())
                                .unwrap_or(Ordering::Equal)
                        })
                })
                .unwrap_or(0)
        } else {
            indices
                .min_by(|&a, &b| {
                    let mbr_a = node.entries[a].mbr();
                    let mbr_b = node.entries[b].mbr();
                    mbr_a
                        .enlargement(new_mbr)
                        .partial_cmp(&mbr_b.enlargement(new_mbr))
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| {
                            mbr_a
                                .area()
                                .partial_cmp(&mbr_b.area())
                                .unwrap_or(Ordering::Equal)
                        })
                })
                .unwrap_or(0)
        }
    }

    /// How much the overlap between entry `j` and its siblings grows when
    /// `j` absorbs the new MBR.
    fn overlap_enlargement(node: &RStarNode<T>, j: usize, new_mbr: &BoxND) -> f64 {
        let mbr_j = node.entries[j].mbr();
        let enlarged = mbr_j.union(new_mbr);
        node.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != j)
            .map(|(_, e)| enlarged.overlap_area(e.mbr()) - mbr_j.overlap_area(e.mbr()))
            .sum()
    }

    /// Removes the `count` entries whose centers sit farthest from the node
    /// MBR center, in descending distance order.
    fn forced_reinsert(node: &mut RStarNode<T>, count: usize) -> Vec<RStarEntry<T>> {
        let node_mbr = match mbr_of(&node.entries) {
            Some(mbr) => mbr,
            None => return Vec::new(),
        };
        let center = node_mbr.center_point();
        debug!(
            "Forced reinsert of {} entries at level {}",
            count, node.level
        );
        node.entries.sort_by(|a, b| {
            let da = a.mbr().center_distance_sq(&center);
            let db = b.mbr().center_distance_sq(&center);
            db.partial_cmp(&da).unwrap_or(Ordering::Equal)
        });
        node.entries.drain(0..count).collect()
    }

    /// Topological split: the axis with the least total margin over all
    /// distributions wins, then the distribution with the least overlap
    /// (ties: least total area).
    fn split_entries(
        mut entries: Vec<RStarEntry<T>>,
        min_entries: usize,
    ) -> (Vec<RStarEntry<T>>, Vec<RStarEntry<T>>) {
        let total = entries.len();
        let dims = match entries.first() {
            Some(entry) => entry.mbr().dims(),
            None => unreachable!("split input is non-empty"),
        };
        let mut best_axis = 0usize;
        let mut best_margin = f64::INFINITY;
        for axis in 0..dims {
            let mut axis_margin = 0.0;
            for upper in [false, true] {
                sort_by_bound(&mut entries, axis, upper);
                for k in min_entries..=(total - min_entries) {
                    let mbr1 = match mbr_of(&entries[..k]) {
                        Some(mbr) => mbr,
                        None => unreachable!("distribution groups are non-empty"),
                    };
                    let mbr2 = match mbr_of(&entries[k..]) {
                        Some(mbr) => mbr,
                        None => unreachable!("distribution groups are non-empty"),
                    };
                    axis_margin += mbr1.margin() + mbr2.margin();
                }
            }
            if axis_margin < best_margin {
                best_margin = axis_margin;
                best_axis = axis;
            }
        }
        let mut best_upper = false;
        let mut best_index = min_entries;
        let mut best_overlap = f64::INFINITY;
        let mut best_area = f64::INFINITY;
        for upper in [false, true] {
            sort_by_bound(&mut entries, best_axis, upper);
            for k in min_entries..=(total - min_entries) {
                let mbr1 = match mbr_of(&entries[..k]) {
                    Some(mbr) => mbr,
                    None => unreachable!("distribution groups are non-empty"),
                };
                let mbr2 = match mbr_of(&entries[k..]) {
                    Some(mbr) => mbr,
                    None => unreachable!("distribution groups are non-empty"),
                };
                let overlap = mbr1.overlap_area(&mbr2);
                let area = mbr1.area() + mbr2.area();
                if overlap < best_overlap || (overlap == best_overlap && area < best_area) {
                    best_overlap = overlap;
                    best_area = area;
                    best_upper = upper;
                    best_index = k;
                }
            }
        }
        sort_by_bound(&mut entries, best_axis, best_upper);
        let group2 = entries.split_off(best_index);
        (entries, group2)
    }

    /// Removes one entry with the given key and returns its value.
    pub fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<T> {
        self.remove_if(lo, hi, &|_| true)
    }

    /// Removes one entry matching both key and value.
    pub fn remove_entry(&mut self, lo: &[f64], hi: &[f64], value: &T) -> Option<T> {
        self.remove_if(lo, hi, &|v| v == value)
    }

    /// Removes one point entry (a degenerate box key).
    pub fn remove_point(&mut self, point: &[f64]) -> Option<T> {
        self.remove_if(point, point, &|_| true)
    }

    fn remove_if(&mut self, lo: &[f64], hi: &[f64], pred: &dyn Fn(&T) -> bool) -> Option<T> {
        if validate_box(lo, hi, self.dims).is_err() {
            return None;
        }
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        let min_entries = self.min_entries;
        let mut orphans = Vec::new();
        let value = Self::delete_rec(&mut self.root, &key, pred, min_entries, &mut orphans)?;
        self.size -= 1;
        debug!("Removed box {:?} from RStarTree", key);
        // Entries of detached underfull nodes go back in at their original
        // level, then a single-child root collapses. Each orphan counts as
        // its own top-level insertion for the overflow marks.
        for (entry, level) in orphans {
            let mut reinserted = Vec::new();
            self.insert_entry_at(entry, level, &mut reinserted);
        }
        while self.root.level > 0 && self.root.entries.len() == 1 {
            match self.root.entries.pop() {
                Some(RStarEntry::Node { child, .. }) => self.root = child,
                _ => unreachable!("inner nodes hold child entries"),
            }
        }
        Some(value)
    }

    fn delete_rec(
        node: &mut RStarNode<T>,
        key: &BoxND,
        pred: &dyn Fn(&T) -> bool,
        min_entries: usize,
        orphans: &mut Vec<(RStarEntry<T>, usize)>,
    ) -> Option<T> {
        if node.level == 0 {
            let pos = node.entries.iter().position(|e| match e {
                RStarEntry::Leaf { mbr, value } => mbr == key && pred(value),
                RStarEntry::Node { .. } => false,
            })?;
            match node.entries.remove(pos) {
                RStarEntry::Leaf { value, .. } => return Some(value),
                RStarEntry::Node { .. } => unreachable!("leaf entries carry values"),
            }
        }
        // The key may be contained in several subtrees; stop at the first hit.
        for i in 0..node.entries.len() {
            if !node.entries[i].mbr().contains_box(key) {
                continue;
            }
            let result = match &mut node.entries[i] {
                RStarEntry::Node { child, .. } => {
                    Self::delete_rec(child, key, pred, min_entries, orphans)
                }
                RStarEntry::Leaf { .. } => unreachable!("inner entries carry children"),
            };
            let Some(value) = result else { continue };
            let underfull = match &node.entries[i] {
                RStarEntry::Node { child, .. } => child.entries.len() < min_entries,
                RStarEntry::Leaf { .. } => unreachable!("inner entries carry children"),
            };
            if underfull {
                match node.entries.remove(i) {
                    RStarEntry::Node { child, .. } => {
                        let child = *child;
                        let level = child.level;
                        for entry in child.entries {
                            orphans.push((entry, level));
                        }
                    }
                    RStarEntry::Leaf { .. } => unreachable!("inner entries carry children"),
                }
            } else {
                Self::retighten(&mut node.entries[i]);
            }
            return Some(value);
        }
        None
    }

    /// Returns a reference to the value of one entry with the given key.
    pub fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&T> {
        if validate_box(lo, hi, self.dims).is_err() {
            return None;
        }
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        Self::find_exact(&self.root, &key, &|_| true)
    }

    /// Returns true if an entry with the given key exists.
    pub fn contains(&self, lo: &[f64], hi: &[f64]) -> bool {
        self.query_exact(lo, hi).is_some()
    }

    /// Returns true if an entry with the given key and value exists.
    pub fn contains_entry(&self, lo: &[f64], hi: &[f64], value: &T) -> bool {
        if validate_box(lo, hi, self.dims).is_err() {
            return false;
        }
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        Self::find_exact(&self.root, &key, &|v| v == value).is_some()
    }

    fn find_exact<'n>(
        node: &'n RStarNode<T>,
        key: &BoxND,
        pred: &dyn Fn(&T) -> bool,
    ) -> Option<&'n T> {
        if node.level == 0 {
            return node.entries.iter().find_map(|e| match e {
                RStarEntry::Leaf { mbr, value } if mbr == key && pred(value) => Some(value),
                _ => None,
            });
        }
        node.entries.iter().find_map(|e| match e {
            RStarEntry::Node { mbr, child } if mbr.contains_box(key) => {
                Self::find_exact(child, key, pred)
            }
            _ => None,
        })
    }

    /// Moves one entry from the `old` key to the `new` key, preserving its
    /// value, through the regular delete and insert paths.
    pub fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError> {
        validate_box(old_lo, old_hi, self.dims)?;
        validate_box(new_lo, new_hi, self.dims)?;
        match self.remove(old_lo, old_hi) {
            Some(value) => {
                self.insert(new_lo, new_hi, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns a lazy iterator over all entries whose boxes intersect the
    /// window `[lo, hi]`.
    pub fn window<'a>(
        &'a self,
        lo: &[f64],
        hi: &[f64],
    ) -> Result<RStarWindowIter<'a, T>, IndexError> {
        validate_box(lo, hi, self.dims)?;
        Ok(self.window_unchecked(Some(BoxND::new_unchecked(lo.to_vec(), hi.to_vec()))))
    }

    /// Returns a lazy iterator over every entry in the tree.
    pub fn iter(&self) -> RStarWindowIter<'_, T> {
        self.window_unchecked(None)
    }

    fn window_unchecked(&self, window: Option<BoxND>) -> RStarWindowIter<'_, T> {
        let mut iter = RStarWindowIter {
            root: &self.root,
            dims: self.dims,
            window,
            stack: Vec::new(),
        };
        iter.rearm();
        iter
    }

    /// Performs a lazy best-first k-nearest-neighbor search around `center`.
    /// Entries are emitted in non-decreasing metric distance.
    pub fn knn<'a, M: DistanceMetric>(
        &'a self,
        center: &[f64],
        k: usize,
    ) -> Result<RStarKnnIter<'a, T, M>, IndexError> {
        validate_point(center, self.dims)?;
        let mut iter = RStarKnnIter {
            root: &self.root,
            center: center.to_vec(),
            remaining: k,
            queue: MinMaxHeap::new(),
            seq: 0,
            _metric: std::marker::PhantomData,
        };
        iter.rearm();
        Ok(iter)
    }

    /// Generalised best-first nearest-neighbor iterator.
    ///
    /// `node_dist` ranks inner nodes by their MBR and `entry_dist` ranks
    /// stored entries by their key; the filter admits or prunes both.
    /// Emitted entries are non-decreasing in `entry_dist` provided
    /// `node_dist` never exceeds `entry_dist` of any entry beneath the node
    /// (both provided metrics paired with themselves satisfy this). The
    /// ordering guarantee is void if the caller violates that bound.
    pub fn ranged_nn<'a, FN, FE>(
        &'a self,
        center: &[f64],
        node_dist: FN,
        entry_dist: FE,
        filter: RangedFilter<'a, T>,
    ) -> Result<RangedNnIter<'a, T, FN, FE>, IndexError>
    where
        FN: Fn(&[f64], &BoxND) -> f64,
        FE: Fn(&[f64], &BoxND) -> f64,
    {
        validate_point(center, self.dims)?;
        if let RangedFilter::Window(window) = &filter {
            if window.dims() != self.dims {
                return Err(IndexError::InvalidDimension {
                    requested: window.dims(),
                    available: self.dims,
                });
            }
        }
        let mut iter = RangedNnIter {
            root: &self.root,
            center: center.to_vec(),
            node_dist,
            entry_dist,
            filter,
            queue: MinMaxHeap::new(),
            seq: 0,
        };
        iter.rearm();
        Ok(iter)
    }

    /// Verifies the structural invariants: tight MBRs, fill bounds, uniform
    /// leaf depth, and the size counter. Intended for tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> bool {
        fn check<T>(
            node: &RStarNode<T>,
            is_root: bool,
            min_entries: usize,
            max_entries: usize,
        ) -> bool {
            if node.entries.len() > max_entries {
                return false;
            }
            if !is_root && node.entries.len() < min_entries {
                return false;
            }
            if is_root && node.level > 0 && node.entries.len() < 2 {
                return false;
            }
            for entry in &node.entries {
                match entry {
                    RStarEntry::Leaf { .. } => {
                        if node.level != 0 {
                            return false;
                        }
                    }
                    RStarEntry::Node { mbr, child } => {
                        if node.level == 0 || child.level != node.level - 1 {
                            return false;
                        }
                        match mbr_of(&child.entries) {
                            Some(tight) if tight == *mbr => {}
                            _ => return false,
                        }
                        if !check(child, false, min_entries, max_entries) {
                            return false;
                        }
                    }
                }
            }
            true
        }
        check(&self.root, true, self.min_entries, self.max_entries)
            && self.iter().count() == self.size
    }
}

/// Filter applied by [`RStarTree::ranged_nn`].
pub enum RangedFilter<'a, T> {
    /// Admit everything.
    All,
    /// Admit entries intersecting the window; prune subtrees that do not.
    Window(BoxND),
    /// Admit entries for which the predicate holds. Subtrees are not pruned.
    Predicate(&'a dyn Fn(&BoxND, &T) -> bool),
}

impl<'a, T> RangedFilter<'a, T> {
    fn admits_node(&self, mbr: &BoxND) -> bool {
        match self {
            RangedFilter::Window(window) => mbr.intersects(window),
            RangedFilter::All | RangedFilter::Predicate(_) => true,
        }
    }

    fn admits_entry(&self, mbr: &BoxND, value: &T) -> bool {
        match self {
            RangedFilter::All => true,
            RangedFilter::Window(window) => mbr.intersects(window),
            RangedFilter::Predicate(pred) => pred(mbr, value),
        }
    }
}

enum Ranked<'a, T> {
    Node(&'a RStarNode<T>),
    Entry { key: &'a BoxND, value: &'a T },
}

struct RankedItem<'a, T> {
    dist: OrderedFloat<f64>,
    seq: u64,
    target: Ranked<'a, T>,
}

impl<T> PartialEq for RankedItem<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.seq == other.seq
    }
}
impl<T> Eq for RankedItem<'_, T> {}
impl<T> Ord for RankedItem<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}
impl<T> PartialOrd for RankedItem<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct RStarFrame<'a, T> {
    node: &'a RStarNode<T>,
    idx: usize,
}

/// Lazy depth-first iterator over the entries intersecting a window (or the
/// whole tree when created through [`RStarTree::iter`]).
pub struct RStarWindowIter<'a, T> {
    root: &'a RStarNode<T>,
    dims: usize,
    window: Option<BoxND>,
    stack: Vec<RStarFrame<'a, T>>,
}

impl<'a, T> RStarWindowIter<'a, T> {
    fn rearm(&mut self) {
        self.stack.clear();
        self.stack.push(RStarFrame {
            node: self.root,
            idx: 0,
        });
    }

    /// Re-arms the iterator with a new window, reusing its internal stack.
    pub fn reset(&mut self, lo: &[f64], hi: &[f64]) -> Result<(), IndexError> {
        validate_box(lo, hi, self.dims)?;
        self.window = Some(BoxND::new_unchecked(lo.to_vec(), hi.to_vec()));
        self.rearm();
        Ok(())
    }
}

impl<'a, T> Iterator for RStarWindowIter<'a, T> {
    type Item = (&'a BoxND, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(entry) = frame.node.entries.get(frame.idx) else {
                self.stack.pop();
                continue;
            };
            frame.idx += 1;
            let admit = match &self.window {
                Some(window) => entry.mbr().intersects(window),
                None => true,
            };
            if !admit {
                continue;
            }
            match entry {
                RStarEntry::Leaf { mbr, value } => return Some((mbr, value)),
                RStarEntry::Node { child, .. } => {
                    self.stack.push(RStarFrame {
                        node: child,
                        idx: 0,
                    });
                }
            }
        }
    }
}

/// Lazy best-first k-nearest-neighbor iterator.
pub struct RStarKnnIter<'a, T, M: DistanceMetric> {
    root: &'a RStarNode<T>,
    center: Vec<f64>,
    remaining: usize,
    queue: MinMaxHeap<RankedItem<'a, T>>,
    seq: u64,
    _metric: std::marker::PhantomData<M>,
}

impl<'a, T, M: DistanceMetric> RStarKnnIter<'a, T, M> {
    fn rearm(&mut self) {
        self.queue.clear();
        self.seq = 0;
        self.queue.push(RankedItem {
            dist: OrderedFloat(0.0),
            seq: 0,
            target: Ranked::Node(self.root),
        });
    }

    /// Re-runs the search with a new center and `k`, reusing the iterator.
    pub fn reset(&mut self, center: &[f64], k: usize) -> Result<(), IndexError> {
        validate_point(center, self.center.len())?;
        self.center = center.to_vec();
        self.remaining = k;
        self.rearm();
        Ok(())
    }
}

impl<'a, T, M: DistanceMetric> Iterator for RStarKnnIter<'a, T, M> {
    type Item = BoxDistEntry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while let Some(item) = self.queue.pop_min() {
            match item.target {
                Ranked::Entry { key, value } => {
                    self.remaining -= 1;
                    return Some(BoxDistEntry {
                        dist: item.dist.0,
                        key,
                        value,
                    });
                }
                Ranked::Node(node) => {
                    for entry in &node.entries {
                        let dist = M::point_to_rect(&self.center, entry.mbr());
                        self.seq += 1;
                        let target = match entry {
                            RStarEntry::Leaf { mbr, value } => Ranked::Entry { key: mbr, value },
                            RStarEntry::Node { child, .. } => Ranked::Node(child),
                        };
                        self.queue.push(RankedItem {
                            dist: OrderedFloat(dist),
                            seq: self.seq,
                            target,
                        });
                    }
                }
            }
        }
        None
    }
}

/// Generalised best-first ranged-NN iterator; see [`RStarTree::ranged_nn`].
pub struct RangedNnIter<'a, T, FN, FE>
where
    FN: Fn(&[f64], &BoxND) -> f64,
    FE: Fn(&[f64], &BoxND) -> f64,
{
    root: &'a RStarNode<T>,
    center: Vec<f64>,
    node_dist: FN,
    entry_dist: FE,
    filter: RangedFilter<'a, T>,
    queue: MinMaxHeap<RankedItem<'a, T>>,
    seq: u64,
}

impl<'a, T, FN, FE> RangedNnIter<'a, T, FN, FE>
where
    FN: Fn(&[f64], &BoxND) -> f64,
    FE: Fn(&[f64], &BoxND) -> f64,
{
    fn rearm(&mut self) {
        self.queue.clear();
        self.seq = 0;
        self.queue.push(RankedItem {
            dist: OrderedFloat(0.0),
            seq: 0,
            target: Ranked::Node(self.root),
        });
    }

    /// Re-runs the search around a new center, keeping the distance
    /// functions and filter.
    pub fn reset(&mut self, center: &[f64]) -> Result<(), IndexError> {
        if center.len() != self.center.len() {
            return Err(IndexError::InvalidDimension {
                requested: center.len(),
                available: self.center.len(),
            });
        }
        self.center = center.to_vec();
        self.rearm();
        Ok(())
    }
}

impl<'a, T, FN, FE> Iterator for RangedNnIter<'a, T, FN, FE>
where
    FN: Fn(&[f64], &BoxND) -> f64,
    FE: Fn(&[f64], &BoxND) -> f64,
{
    type Item = BoxDistEntry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(item) = self.queue.pop_min() {
            match item.target {
                Ranked::Entry { key, value } => {
                    return Some(BoxDistEntry {
                        dist: item.dist.0,
                        key,
                        value,
                    });
                }
                Ranked::Node(node) => {
                    for entry in &node.entries {
                        match entry {
                            RStarEntry::Leaf { mbr, value } => {
                                if self.filter.admits_entry(mbr, value) {
                                    self.seq += 1;
                                    self.queue.push(RankedItem {
                                        dist: OrderedFloat((self.entry_dist)(&self.center, mbr)),
                                        seq: self.seq,
                                        target: Ranked::Entry { key: mbr, value },
                                    });
                                }
                            }
                            RStarEntry::Node { mbr, child } => {
                                if self.filter.admits_node(mbr) {
                                    self.seq += 1;
                                    self.queue.push(RankedItem {
                                        dist: OrderedFloat((self.node_dist)(&self.center, mbr)),
                                        seq: self.seq,
                                        target: Ranked::Node(child),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        None
    }
}
