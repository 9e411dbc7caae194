//! ## Hypercube Quadtree over Box Keys
//!
//! This module implements a quadtree for axis-aligned box keys in arbitrary
//! dimension d, sharing the node geometry of the point quadtree: every node
//! covers a hypercube with a center and a half-side radius, and fans out into
//! up to 2^d child quadrants. A box descends into the unique child quadrant
//! that fully encloses it (widened by [`EPS_MUL`] against rounding at split
//! boundaries); boxes straddling a quadrant boundary stay in the directory
//! node's local list, so inner nodes may hold entries here, unlike the point
//! variant.
//!
//! Window queries use intersection semantics. The tree is a multimap.
//!
//! ### Example
//!
//! ```
//! use hypertree::rect_quadtree::RectQuadTree;
//!
//! let mut tree: RectQuadTree<u32> = RectQuadTree::new(2).unwrap();
//! tree.insert(&[0.0, 0.0], &[10.0, 10.0], 1).unwrap();
//! tree.insert(&[20.0, 20.0], &[30.0, 30.0], 2).unwrap();
//!
//! let hits: Vec<u32> = tree
//!     .window(&[5.0, 5.0], &[25.0, 25.0])
//!     .unwrap()
//!     .map(|e| e.value)
//!     .collect();
//! assert_eq!(hits.len(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap};

use ordered_float::OrderedFloat;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::IndexError;
use crate::geometry::{ceil_power_of_two, validate_box, BoxND, DistanceMetric, EPS_MUL};
use crate::index::QuadTreeConfig;
use crate::minmax_heap::MinMaxHeap;
use crate::query::BoxDistEntry;
use crate::quadtree::MAX_DIMS;

/// A box key together with its user value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RectEntry<T> {
    /// The box key.
    pub key: BoxND,
    /// The user value.
    pub value: T,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct QRNode<T> {
    center: Vec<f64>,
    radius: f64,
    /// Leaf payload, or boxes that straddle quadrant boundaries on directory
    /// nodes.
    entries: Vec<RectEntry<T>>,
    children: Option<BTreeMap<usize, Box<QRNode<T>>>>,
}

impl<T> QRNode<T> {
    fn new_leaf(center: Vec<f64>, radius: f64) -> Self {
        QRNode {
            center,
            radius,
            entries: Vec::new(),
            children: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// True if the box fits inside this node's region, with the epsilon
    /// guard against rounding at split boundaries.
    fn encloses(&self, key: &BoxND) -> bool {
        let r = self.radius * EPS_MUL;
        key.min()
            .iter()
            .zip(key.max().iter())
            .zip(self.center.iter())
            .all(|((lo, hi), c)| *lo >= c - r && *hi <= c + r)
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

    /// The child quadrant index that would hold the box, if one encloses it.
    fn fitting_child(&self, key: &BoxND, dims: usize) -> Option<usize> {
        let idx = child_index(&self.center, key.min());
        let (child_center, child_radius) = child_geometry(&self.center, self.radius, idx, dims);
        let r = child_radius * EPS_MUL;
        let fits = key
            .min()
            .iter()
            .zip(key.max().iter())
            .zip(child_center.iter())
            .all(|((lo, hi), c)| *lo >= c - r && *hi <= c + r);
        if fits {
            Some(idx)
        } else {
            None
        }
    }
}

fn child_index(center: &[f64], p: &[f64]) -> usize {
    center
        .iter()
        .zip(p.iter())
        .fold(0usize, |idx, (c, x)| (idx << 1) | usize::from(*x >= *c))
}

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

/// A quadtree over d-dimensional box keys.
///
/// Duplicate keys are allowed; operations that address a specific entry take
/// an extra value argument.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RectQuadTree<T> {
    root: Option<Box<QRNode<T>>>,
    dims: usize,
    max_leaf: usize,
    size: usize,
}

impl<T: PartialEq> RectQuadTree<T> {
    /// Creates an empty tree with the default configuration.
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        Self::with_config(dims, QuadTreeConfig::default())
    }

    /// Creates an empty tree with the given configuration.
    pub fn with_config(dims: usize, config: QuadTreeConfig) -> Result<Self, IndexError> {
        if dims == 0 || dims > MAX_DIMS {
            return Err(IndexError::InvalidDimension {
                requested: dims,
                available: MAX_DIMS,
            });
        }
        config.validate()?;
        info!(
            "Creating new RectQuadTree with dims: {} and max_leaf: {}",
            dims, config.max_leaf
        );
        Ok(RectQuadTree {
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

    /// Inserts a box entry. Equal keys are kept as duplicates.
    pub fn insert(&mut self, lo: &[f64], hi: &[f64], value: T) -> Result<(), IndexError> {
        validate_box(lo, hi, self.dims)?;
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        let entry = RectEntry { key, value };
        match self.root {
            None => {
                let max_side = entry
                    .key
                    .min()
                    .iter()
                    .zip(entry.key.max().iter())
                    .map(|(l, h)| h - l)
                    .fold(0.0f64, f64::max);
                let radius = ceil_power_of_two(max_side);
                let mut root = QRNode::new_leaf(entry.key.center_point(), radius);
                root.entries.push(entry);
                self.root = Some(Box::new(root));
            }
            Some(_) => {
                while !self
                    .root
                    .as_ref()
                    .map_or(false, |r| r.encloses(&entry.key))
                {
                    self.grow_root(&entry.key);
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

    fn grow_root(&mut self, key: &BoxND) {
        let Some(old) = self.root.take() else { return };
        let toward = key.center_point();
        let new_center: Vec<f64> = old
            .center
            .iter()
            .zip(toward.iter())
            .map(|(c, k)| if *k >= *c { c + old.radius } else { c - old.radius })
            .collect();
        let new_radius = old.radius * 2.0;
        debug!(
            "Growing RectQuadTree root to center {:?} radius {}",
            new_center, new_radius
        );
        let idx = child_index(&new_center, &old.center);
        let mut children = BTreeMap::new();
        children.insert(idx, old);
        self.root = Some(Box::new(QRNode {
            center: new_center,
            radius: new_radius,
            entries: Vec::new(),
            children: Some(children),
        }));
    }

    fn insert_rec(node: &mut QRNode<T>, entry: RectEntry<T>, max_leaf: usize, dims: usize) {
        if node.is_leaf() {
            if node.entries.len() < max_leaf {
                node.entries.push(entry);
                return;
            }
            // Splitting only helps if something would actually descend.
            let moves_something = node
                .entries
                .iter()
                .any(|e| node.fitting_child(&e.key, dims).is_some())
                || node.fitting_child(&entry.key, dims).is_some();
            if !moves_something {
                node.entries.push(entry);
                return;
            }
            Self::split(node, max_leaf, dims);
        }
        match node.fitting_child(&entry.key, dims) {
            Some(idx) => {
                let (child_center, child_radius) =
                    child_geometry(&node.center, node.radius, idx, dims);
                let children = match node.children.as_mut() {
                    Some(children) => children,
                    None => unreachable!("node was split above"),
                };
                let child = children
                    .entry(idx)
                    .or_insert_with(|| Box::new(QRNode::new_leaf(child_center, child_radius)));
                Self::insert_rec(child, entry, max_leaf, dims);
            }
            None => node.entries.push(entry),
        }
    }

    fn split(node: &mut QRNode<T>, max_leaf: usize, dims: usize) {
        debug!(
            "Splitting RectQuadTree leaf at center {:?} radius {}",
            node.center, node.radius
        );
        let old = std::mem::take(&mut node.entries);
        node.children = Some(BTreeMap::new());
        for entry in old {
            Self::insert_rec(node, entry, max_leaf, dims);
        }
    }

    /// Removes one entry with the given key and returns its value.
    pub fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<T> {
        self.remove_if(lo, hi, &|_| true)
    }

    /// Removes one entry matching both key and value.
    pub fn remove_entry(&mut self, lo: &[f64], hi: &[f64], value: &T) -> Option<T> {
        self.remove_if(lo, hi, &|v| v == value)
    }

    fn remove_if(&mut self, lo: &[f64], hi: &[f64], pred: &dyn Fn(&T) -> bool) -> Option<T> {
        if validate_box(lo, hi, self.dims).is_err() {
            return None;
        }
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        let max_leaf = self.max_leaf;
        let dims = self.dims;
        let root = self.root.as_deref_mut()?;
        let removed = Self::remove_rec(root, &key, pred, max_leaf, dims)?;
        self.size -= 1;
        if root.is_leaf() && root.entries.is_empty() {
            self.root = None;
        }
        Some(removed)
    }

    fn remove_rec(
        node: &mut QRNode<T>,
        key: &BoxND,
        pred: &dyn Fn(&T) -> bool,
        max_leaf: usize,
        dims: usize,
    ) -> Option<T> {
        if let Some(pos) = node
            .entries
            .iter()
            .position(|e| e.key == *key && pred(&e.value))
        {
            let entry = node.entries.remove(pos);
            debug!("Removed box {:?} from RectQuadTree node", entry.key);
            if !node.is_leaf() {
                Self::try_merge(node, max_leaf);
            }
            return Some(entry.value);
        }
        if node.is_leaf() {
            return None;
        }
        let idx = node.fitting_child(key, dims)?;
        let children = node.children.as_mut()?;
        let child = children.get_mut(&idx)?;
        let removed = Self::remove_rec(child, key, pred, max_leaf, dims)?;
        if child.is_leaf() && child.entries.is_empty() {
            children.remove(&idx);
        }
        Self::try_merge(node, max_leaf);
        Some(removed)
    }

    /// Collapses a directory node back into a leaf when all children are
    /// leaves and the combined entries fit the leaf limit. Local straddlers
    /// count toward the limit. No cascade above the immediate parent.
    fn try_merge(node: &mut QRNode<T>, max_leaf: usize) {
        let Some(children) = node.children.as_ref() else {
            return;
        };
        if children.values().any(|c| !c.is_leaf()) {
            return;
        }
        let total: usize =
            node.entries.len() + children.values().map(|c| c.entries.len()).sum::<usize>();
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
            "Merged RectQuadTree children into leaf at center {:?} with {} entries",
            node.center,
            node.entries.len()
        );
    }

    /// Returns a reference to the value of one entry with the given key.
    pub fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&T> {
        if validate_box(lo, hi, self.dims).is_err() {
            return None;
        }
        let key = BoxND::new_unchecked(lo.to_vec(), hi.to_vec());
        let mut node = self.root.as_deref()?;
        loop {
            if let Some(entry) = node.entries.iter().find(|e| e.key == key) {
                return Some(&entry.value);
            }
            if node.is_leaf() {
                return None;
            }
            let idx = node.fitting_child(&key, self.dims)?;
            node = node.children.as_ref()?.get(&idx)?;
        }
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
        self.window_unchecked(Some((lo.to_vec(), hi.to_vec())))
            .any(|e| e.key == key && e.value == *value)
    }

    /// Moves one entry from the `old` key to the `new` key, preserving its
    /// value. If the new key still fits the node that holds the entry, it is
    /// rewritten in place; otherwise the entry is removed and re-inserted.
    pub fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError> {
        validate_box(old_lo, old_hi, self.dims)?;
        validate_box(new_lo, new_hi, self.dims)?;
        let old_key = BoxND::new_unchecked(old_lo.to_vec(), old_hi.to_vec());
        let new_key = BoxND::new_unchecked(new_lo.to_vec(), new_hi.to_vec());
        let dims = self.dims;
        if let Some(root) = self.root.as_deref_mut() {
            let mut node = root;
            let mut same_route = true;
            loop {
                if let Some(pos) = node.entries.iter().position(|e| e.key == old_key) {
                    // In-place rewrite is sound only if the new key routes to
                    // this same node, fits its region, and would not descend
                    // into a child quadrant.
                    let stays = same_route
                        && node.encloses(&new_key)
                        && (node.is_leaf() || node.fitting_child(&new_key, dims).is_none());
                    if stays {
                        node.entries[pos].key = new_key;
                        return Ok(true);
                    }
                    break;
                }
                if node.is_leaf() {
                    return Ok(false);
                }
                let Some(old_idx) = node.fitting_child(&old_key, dims) else {
                    return Ok(false);
                };
                if node.fitting_child(&new_key, dims) != Some(old_idx) {
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
    ) -> Result<RectWindowIter<'a, T>, IndexError> {
        validate_box(lo, hi, self.dims)?;
        Ok(self.window_unchecked(Some((lo.to_vec(), hi.to_vec()))))
    }

    /// Returns a lazy iterator over every entry in the tree.
    pub fn iter(&self) -> RectWindowIter<'_, T> {
        self.window_unchecked(None)
    }

    fn window_unchecked(&self, window: Option<(Vec<f64>, Vec<f64>)>) -> RectWindowIter<'_, T> {
        let mut iter = RectWindowIter {
            root: self.root.as_deref(),
            window,
            stack: Vec::new(),
        };
        iter.rearm();
        iter
    }

    /// Performs a lazy best-first k-nearest-neighbor search around `center`,
    /// measuring the distance from the center to the closest face of each
    /// stored box. Entries are emitted in non-decreasing distance.
    pub fn knn<'a, M: DistanceMetric>(
        &'a self,
        center: &[f64],
        k: usize,
    ) -> Result<RectKnnIter<'a, T, M>, IndexError> {
        crate::geometry::validate_point(center, self.dims)?;
        let mut iter = RectKnnIter {
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

    /// Verifies the structural invariants: every entry fits the node holding
    /// it, leaf entries could not descend further, and child geometry is
    /// consistent. Intended for tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> bool {
        fn check<T: PartialEq>(node: &QRNode<T>, dims: usize) -> bool {
            if !node.entries.iter().all(|e| node.encloses(&e.key)) {
                return false;
            }
            match node.children.as_ref() {
                None => true,
                Some(children) => {
                    // Straddlers kept locally must genuinely not fit a child.
                    if !node
                        .entries
                        .iter()
                        .all(|e| node.fitting_child(&e.key, dims).is_none())
                    {
                        return false;
                    }
                    children.iter().all(|(idx, child)| {
                        let (expect_center, expect_radius) =
                            child_geometry(&node.center, node.radius, *idx, dims);
                        crate::geometry::point_eq(&child.center, &expect_center)
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

enum RectRanked<'a, T> {
    Node(&'a QRNode<T>),
    Entry(&'a RectEntry<T>),
}

struct RectRankedItem<'a, T> {
    dist: OrderedFloat<f64>,
    seq: u64,
    target: RectRanked<'a, T>,
}

impl<T> PartialEq for RectRankedItem<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.seq == other.seq
    }
}
impl<T> Eq for RectRankedItem<'_, T> {}
impl<T> Ord for RectRankedItem<'_, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}
impl<T> PartialOrd for RectRankedItem<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct RectFrame<'a, T> {
    node: &'a QRNode<T>,
    entry_idx: usize,
    children: Option<btree_map::Values<'a, usize, Box<QRNode<T>>>>,
}

impl<'a, T> RectFrame<'a, T> {
    fn new(node: &'a QRNode<T>) -> Self {
        RectFrame {
            node,
            entry_idx: 0,
            children: node.children.as_ref().map(|m| m.values()),
        }
    }
}

/// Lazy depth-first iterator over the entries intersecting a window (or the
/// whole tree when created through [`RectQuadTree::iter`]).
pub struct RectWindowIter<'a, T> {
    root: Option<&'a QRNode<T>>,
    window: Option<(Vec<f64>, Vec<f64>)>,
    stack: Vec<RectFrame<'a, T>>,
}

impl<'a, T> RectWindowIter<'a, T> {
    fn rearm(&mut self) {
        self.stack.clear();
        if let Some(root) = self.root {
            let prune = match &self.window {
                Some((lo, hi)) => !root.overlaps_window(lo, hi),
                None => false,
            };
            if !prune {
                self.stack.push(RectFrame::new(root));
            }
        }
    }

    /// Re-arms the iterator with a new window, reusing its internal stack.
    pub fn reset(&mut self, lo: &[f64], hi: &[f64]) -> Result<(), IndexError> {
        let dims = self.root.map_or(lo.len(), |r| r.center.len());
        validate_box(lo, hi, dims)?;
        self.window = Some((lo.to_vec(), hi.to_vec()));
        self.rearm();
        Ok(())
    }
}

impl<'a, T> Iterator for RectWindowIter<'a, T> {
    type Item = &'a RectEntry<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.entry_idx < frame.node.entries.len() {
                let entry = &frame.node.entries[frame.entry_idx];
                frame.entry_idx += 1;
                let admit = match &self.window {
                    Some((lo, hi)) => {
                        crate::geometry::overlaps(entry.key.min(), entry.key.max(), lo, hi)
                    }
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
                        self.stack.push(RectFrame::new(child));
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
pub struct RectKnnIter<'a, T, M: DistanceMetric> {
    root: Option<&'a QRNode<T>>,
    dims: usize,
    center: Vec<f64>,
    remaining: usize,
    queue: MinMaxHeap<RectRankedItem<'a, T>>,
    seq: u64,
    _metric: std::marker::PhantomData<M>,
}

impl<'a, T, M: DistanceMetric> RectKnnIter<'a, T, M> {
    fn rearm(&mut self) {
        self.queue.clear();
        self.seq = 0;
        if let Some(root) = self.root {
            self.queue.push(RectRankedItem {
                dist: OrderedFloat(0.0),
                seq: 0,
                target: RectRanked::Node(root),
            });
        }
    }

    /// Re-runs the search with a new center and `k`, reusing the iterator.
    pub fn reset(&mut self, center: &[f64], k: usize) -> Result<(), IndexError> {
        crate::geometry::validate_point(center, self.dims)?;
        self.center = center.to_vec();
        self.remaining = k;
        self.rearm();
        Ok(())
    }
}

impl<'a, T, M: DistanceMetric> Iterator for RectKnnIter<'a, T, M> {
    type Item = BoxDistEntry<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while let Some(item) = self.queue.pop_min() {
            match item.target {
                RectRanked::Entry(entry) => {
                    self.remaining -= 1;
                    return Some(BoxDistEntry {
                        dist: item.dist.0,
                        key: &entry.key,
                        value: &entry.value,
                    });
                }
                RectRanked::Node(node) => {
                    // Directory nodes rank their local straddlers alongside
                    // their children.
                    for entry in &node.entries {
                        let dist = M::point_to_rect(&self.center, &entry.key);
                        self.seq += 1;
                        self.queue.push(RectRankedItem {
                            dist: OrderedFloat(dist),
                            seq: self.seq,
                            target: RectRanked::Entry(entry),
                        });
                    }
                    if let Some(children) = node.children.as_ref() {
                        for child in children.values() {
                            let dist = M::point_to_rect(&self.center, &child.bounding_box());
                            self.seq += 1;
                            self.queue.push(RectRankedItem {
                                dist: OrderedFloat(dist),
                                seq: self.seq,
                                target: RectRanked::Node(child),
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::EuclideanDistance;

    #[test]
    fn test_insert_and_query_exact() {
        let mut tree: RectQuadTree<&str> = RectQuadTree::new(2).unwrap();
        tree.insert(&[0.0, 0.0], &[10.0, 10.0], "a").unwrap();
        tree.insert(&[5.0, 5.0], &[6.0, 6.0], "b").unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.query_exact(&[0.0, 0.0], &[10.0, 10.0]), Some(&"a"));
        assert_eq!(tree.query_exact(&[5.0, 5.0], &[6.0, 6.0]), Some(&"b"));
        assert_eq!(tree.query_exact(&[0.0, 0.0], &[9.0, 10.0]), None);
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_straddlers_stay_in_directory_nodes() {
        let mut tree: RectQuadTree<usize> =
            RectQuadTree::with_config(2, QuadTreeConfig { max_leaf: 2 }).unwrap();
        // Small boxes scattered in one quadrant force splits; a box covering
        // the middle cannot descend.
        for i in 0..6 {
            let lo = [i as f64, i as f64];
            let hi = [i as f64 + 0.5, i as f64 + 0.5];
            tree.insert(&lo, &hi, i).unwrap();
        }
        tree.insert(&[-3.0, -3.0], &[3.0, 3.0], 100).unwrap();
        assert_eq!(tree.len(), 7);
        assert!(tree.check_invariants());
        assert_eq!(tree.query_exact(&[-3.0, -3.0], &[3.0, 3.0]), Some(&100));
        assert_eq!(tree.remove(&[-3.0, -3.0], &[3.0, 3.0]), Some(100));
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_window_intersects_semantics() {
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
        // A window that only touches an edge still intersects.
        let touching: Vec<u32> = tree
            .window(&[10.0, 10.0], &[12.0, 12.0])
            .unwrap()
            .map(|e| e.value)
            .collect();
        assert_eq!(touching, vec![1]);
        let empty: Vec<u32> = tree
            .window(&[11.0, 11.0], &[19.0, 19.0])
            .unwrap()
            .map(|e| e.value)
            .collect();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_remove_and_merge() {
        let mut tree: RectQuadTree<usize> =
            RectQuadTree::with_config(2, QuadTreeConfig { max_leaf: 2 }).unwrap();
        for i in 0..8 {
            let lo = [i as f64 * 2.0, 0.0];
            let hi = [i as f64 * 2.0 + 1.0, 1.0];
            tree.insert(&lo, &hi, i).unwrap();
        }
        for i in 0..8 {
            let lo = [i as f64 * 2.0, 0.0];
            let hi = [i as f64 * 2.0 + 1.0, 1.0];
            assert_eq!(tree.remove(&lo, &hi), Some(i));
            assert!(tree.check_invariants());
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_duplicates_and_remove_entry() {
        let mut tree: RectQuadTree<&str> = RectQuadTree::new(2).unwrap();
        tree.insert(&[1.0, 1.0], &[2.0, 2.0], "a").unwrap();
        tree.insert(&[1.0, 1.0], &[2.0, 2.0], "b").unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.contains_entry(&[1.0, 1.0], &[2.0, 2.0], &"b"));
        assert_eq!(tree.remove_entry(&[1.0, 1.0], &[2.0, 2.0], &"b"), Some("b"));
        assert!(!tree.contains_entry(&[1.0, 1.0], &[2.0, 2.0], &"b"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_update_in_place_and_relocate() {
        let mut tree: RectQuadTree<&str> = RectQuadTree::new(2).unwrap();
        tree.insert(&[1.0, 1.0], &[2.0, 2.0], "x").unwrap();
        assert!(tree
            .update(&[1.0, 1.0], &[2.0, 2.0], &[1.2, 1.2], &[2.2, 2.2])
            .unwrap());
        assert_eq!(tree.query_exact(&[1.2, 1.2], &[2.2, 2.2]), Some(&"x"));
        assert!(tree
            .update(&[1.2, 1.2], &[2.2, 2.2], &[100.0, 100.0], &[101.0, 101.0])
            .unwrap());
        assert_eq!(
            tree.query_exact(&[100.0, 100.0], &[101.0, 101.0]),
            Some(&"x")
        );
        assert_eq!(tree.len(), 1);
        assert!(tree.check_invariants());
    }

    #[test]
    fn test_knn_by_edge_distance() {
        let mut tree: RectQuadTree<&str> = RectQuadTree::new(2).unwrap();
        tree.insert(&[0.0, 0.0], &[1.0, 1.0], "near").unwrap();
        tree.insert(&[10.0, 0.0], &[11.0, 1.0], "mid").unwrap();
        tree.insert(&[50.0, 50.0], &[51.0, 51.0], "far").unwrap();
        let results: Vec<_> = tree
            .knn::<EuclideanDistance>(&[2.0, 0.5], 2)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].value, "near");
        assert!((results[0].dist - 1.0).abs() < 1e-12);
        assert_eq!(*results[1].value, "mid");
        assert!((results[1].dist - 8.0).abs() < 1e-12);
    }
}
