//! ## Index Façade
//!
//! Common contracts over the concrete index structures. The capability
//! traits [`PointIndex`] and [`BoxIndex`] expose the shared multimap surface
//! (duplicate keys allowed); the [`PointMap`] and [`BoxMap`] wrappers enforce
//! unique keys on top of any implementation, replacing on insert.
//!
//! Every implementation declares which capabilities it supports through the
//! `supports_*` probes; an operation an index does not support returns
//! [`IndexError::Unsupported`] instead of panicking.
//!
//! ### Example
//!
//! ```
//! use hypertree::index::{PointMap, QuadTreeConfig};
//!
//! let mut map = PointMap::quadtree(2, QuadTreeConfig::default()).unwrap();
//! assert_eq!(map.insert(&[1.0, 2.0], "a").unwrap(), None);
//! assert_eq!(map.insert(&[1.0, 2.0], "b").unwrap(), Some("a"));
//! assert_eq!(map.query_exact(&[1.0, 2.0]), Some(&"b"));
//! ```

use std::marker::PhantomData;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::IndexError;
use crate::geometry::{point_eq, BoxND, EuclideanDistance};
use crate::quadtree::QuadTree;
use crate::rect_quadtree::RectQuadTree;
use crate::rstar_tree::RStarTree;

/// Configuration for the quadtree families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QuadTreeConfig {
    /// Maximum number of entries in a leaf before it splits. Must be at
    /// least 2.
    pub max_leaf: usize,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        QuadTreeConfig { max_leaf: 10 }
    }
}

impl QuadTreeConfig {
    /// Checks the configuration bounds.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_leaf < 2 {
            return Err(IndexError::InvalidCapacity {
                capacity: self.max_leaf,
            });
        }
        Ok(())
    }
}

/// Configuration for the R*-tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RStarConfig {
    /// Maximum number of entries per node. Must be at least 4.
    pub max_entries: usize,
    /// Minimum number of entries per non-root node. Must satisfy
    /// `1 <= min_entries` and `2 * min_entries <= max_entries + 1`.
    pub min_entries: usize,
    /// Number of entries evicted by a forced reinsertion. Must satisfy
    /// `1 <= reinsert_count <= max_entries - min_entries`.
    pub reinsert_count: usize,
}

impl Default for RStarConfig {
    fn default() -> Self {
        Self::with_max_entries(16)
    }
}

impl RStarConfig {
    /// Derives the standard configuration for a node capacity:
    /// `min_entries = ceil(0.4 * max_entries)` and
    /// `reinsert_count = ceil(0.3 * max_entries)`.
    pub fn with_max_entries(max_entries: usize) -> Self {
        RStarConfig {
            max_entries,
            min_entries: (max_entries as f64 * 0.4).ceil() as usize,
            reinsert_count: (max_entries as f64 * 0.3).ceil() as usize,
        }
    }

    /// Checks the configuration bounds.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_entries < 4 {
            return Err(IndexError::InvalidCapacity {
                capacity: self.max_entries,
            });
        }
        if self.min_entries == 0 || 2 * self.min_entries > self.max_entries + 1 {
            return Err(IndexError::InvalidCapacity {
                capacity: self.min_entries,
            });
        }
        if self.reinsert_count == 0 || self.reinsert_count > self.max_entries - self.min_entries {
            return Err(IndexError::InvalidCapacity {
                capacity: self.reinsert_count,
            });
        }
        Ok(())
    }
}

/// Boxed lazy iterator over `(point, value)` pairs.
pub type PointIter<'a, V> = Box<dyn Iterator<Item = (&'a [f64], &'a V)> + 'a>;
/// Boxed lazy iterator over `(distance, point, value)` triples.
pub type PointDistIter<'a, V> = Box<dyn Iterator<Item = (f64, &'a [f64], &'a V)> + 'a>;
/// Boxed lazy iterator over `(key, value)` pairs.
pub type BoxIter<'a, V> = Box<dyn Iterator<Item = (&'a BoxND, &'a V)> + 'a>;
/// Boxed lazy iterator over `(distance, key, value)` triples.
pub type BoxDistIter<'a, V> = Box<dyn Iterator<Item = (f64, &'a BoxND, &'a V)> + 'a>;

/// The multimap contract over point keys.
pub trait PointIndex<V: PartialEq> {
    /// The dimensionality of the keys.
    fn dims(&self) -> usize;
    /// The number of stored entries.
    fn len(&self) -> usize;
    /// Returns true if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Removes all entries.
    fn clear(&mut self);
    /// Inserts an entry; duplicate keys are kept.
    fn insert(&mut self, point: &[f64], value: V) -> Result<(), IndexError>;
    /// Removes one entry with the given key.
    fn remove(&mut self, point: &[f64]) -> Option<V>;
    /// Removes one entry matching both key and value.
    fn remove_entry(&mut self, point: &[f64], value: &V) -> Option<V>;
    /// Moves one entry to a new key.
    fn update(&mut self, old: &[f64], new: &[f64]) -> Result<bool, IndexError>;
    /// Returns one value stored under the key.
    fn query_exact(&self, point: &[f64]) -> Option<&V>;
    /// Returns true if the key is present.
    fn contains(&self, point: &[f64]) -> bool {
        self.query_exact(point).is_some()
    }
    /// Lazy iterator over entries enclosed by the window.
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<PointIter<'a, V>, IndexError>;
    /// Lazy iterator over the k nearest entries in ascending Euclidean
    /// distance.
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<PointDistIter<'a, V>, IndexError>;

    /// Capability probe for [`PointIndex::window`].
    fn supports_window_query(&self) -> bool {
        true
    }
    /// Capability probe for [`PointIndex::query_exact`] and
    /// [`PointIndex::contains`].
    fn supports_point_query(&self) -> bool {
        true
    }
    /// Capability probe for [`PointIndex::update`].
    fn supports_update(&self) -> bool {
        true
    }
    /// Capability probe for [`PointIndex::knn`].
    fn supports_knn(&self) -> bool {
        true
    }
}

/// The multimap contract over box keys.
pub trait BoxIndex<V: PartialEq> {
    /// The dimensionality of the keys.
    fn dims(&self) -> usize;
    /// The number of stored entries.
    fn len(&self) -> usize;
    /// Returns true if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Removes all entries.
    fn clear(&mut self);
    /// Inserts an entry; duplicate keys are kept.
    fn insert(&mut self, lo: &[f64], hi: &[f64], value: V) -> Result<(), IndexError>;
    /// Removes one entry with the given key.
    fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<V>;
    /// Removes one entry matching both key and value.
    fn remove_entry(&mut self, lo: &[f64], hi: &[f64], value: &V) -> Option<V>;
    /// Moves one entry to a new key.
    fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError>;
    /// Returns one value stored under the key.
    fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&V>;
    /// Returns true if the key is present.
    fn contains(&self, lo: &[f64], hi: &[f64]) -> bool {
        self.query_exact(lo, hi).is_some()
    }
    /// Lazy iterator over entries intersecting the window.
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<BoxIter<'a, V>, IndexError>;
    /// Lazy iterator over the k nearest entries in ascending Euclidean
    /// edge distance.
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<BoxDistIter<'a, V>, IndexError>;

    /// Capability probe for [`BoxIndex::window`].
    fn supports_window_query(&self) -> bool {
        true
    }
    /// Capability probe for [`BoxIndex::query_exact`] and
    /// [`BoxIndex::contains`].
    fn supports_point_query(&self) -> bool {
        true
    }
    /// Capability probe for [`BoxIndex::update`].
    fn supports_update(&self) -> bool {
        true
    }
    /// Capability probe for [`BoxIndex::knn`].
    fn supports_knn(&self) -> bool {
        true
    }
}

impl<V: PartialEq> PointIndex<V> for QuadTree<V> {
    fn dims(&self) -> usize {
        QuadTree::dims(self)
    }
    fn len(&self) -> usize {
        QuadTree::len(self)
    }
    fn clear(&mut self) {
        QuadTree::clear(self)
    }
    fn insert(&mut self, point: &[f64], value: V) -> Result<(), IndexError> {
        QuadTree::insert(self, point, value)
    }
    fn remove(&mut self, point: &[f64]) -> Option<V> {
        QuadTree::remove(self, point)
    }
    fn remove_entry(&mut self, point: &[f64], value: &V) -> Option<V> {
        QuadTree::remove_entry(self, point, value)
    }
    fn update(&mut self, old: &[f64], new: &[f64]) -> Result<bool, IndexError> {
        QuadTree::update(self, old, new)
    }
    fn query_exact(&self, point: &[f64]) -> Option<&V> {
        QuadTree::query_exact(self, point)
    }
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<PointIter<'a, V>, IndexError> {
        let iter = QuadTree::window(self, lo, hi)?;
        Ok(Box::new(iter.map(|e| (e.point.as_slice(), &e.value))))
    }
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<PointDistIter<'a, V>, IndexError> {
        let iter = QuadTree::knn::<EuclideanDistance>(self, center, k)?;
        Ok(Box::new(iter.map(|e| (e.dist, e.point, e.value))))
    }
}

impl<V: PartialEq> PointIndex<V> for RStarTree<V> {
    fn dims(&self) -> usize {
        RStarTree::dims(self)
    }
    fn len(&self) -> usize {
        RStarTree::len(self)
    }
    fn clear(&mut self) {
        RStarTree::clear(self)
    }
    fn insert(&mut self, point: &[f64], value: V) -> Result<(), IndexError> {
        RStarTree::insert_point(self, point, value)
    }
    fn remove(&mut self, point: &[f64]) -> Option<V> {
        RStarTree::remove_point(self, point)
    }
    fn remove_entry(&mut self, point: &[f64], value: &V) -> Option<V> {
        RStarTree::remove_entry(self, point, point, value)
    }
    fn update(&mut self, old: &[f64], new: &[f64]) -> Result<bool, IndexError> {
        RStarTree::update(self, old, old, new, new)
    }
    fn query_exact(&self, point: &[f64]) -> Option<&V> {
        RStarTree::query_exact(self, point, point)
    }
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<PointIter<'a, V>, IndexError> {
        let iter = RStarTree::window(self, lo, hi)?;
        Ok(Box::new(iter.map(|(key, value)| (key.min(), value))))
    }
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<PointDistIter<'a, V>, IndexError> {
        let iter = RStarTree::knn::<EuclideanDistance>(self, center, k)?;
        Ok(Box::new(iter.map(|e| (e.dist, e.key.min(), e.value))))
    }
}

impl<V: PartialEq> BoxIndex<V> for RStarTree<V> {
    fn dims(&self) -> usize {
        RStarTree::dims(self)
    }
    fn len(&self) -> usize {
        RStarTree::len(self)
    }
    fn clear(&mut self) {
        RStarTree::clear(self)
    }
    fn insert(&mut self, lo: &[f64], hi: &[f64], value: V) -> Result<(), IndexError> {
        RStarTree::insert(self, lo, hi, value)
    }
    fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<V> {
        RStarTree::remove(self, lo, hi)
    }
    fn remove_entry(&mut self, lo: &[f64], hi: &[f64], value: &V) -> Option<V> {
        RStarTree::remove_entry(self, lo, hi, value)
    }
    fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError> {
        RStarTree::update(self, old_lo, old_hi, new_lo, new_hi)
    }
    fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&V> {
        RStarTree::query_exact(self, lo, hi)
    }
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<BoxIter<'a, V>, IndexError> {
        let iter = RStarTree::window(self, lo, hi)?;
        Ok(Box::new(iter))
    }
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<BoxDistIter<'a, V>, IndexError> {
        let iter = RStarTree::knn::<EuclideanDistance>(self, center, k)?;
        Ok(Box::new(iter.map(|e| (e.dist, e.key, e.value))))
    }
}

impl<V: PartialEq> BoxIndex<V> for RectQuadTree<V> {
    fn dims(&self) -> usize {
        RectQuadTree::dims(self)
    }
    fn len(&self) -> usize {
        RectQuadTree::len(self)
    }
    fn clear(&mut self) {
        RectQuadTree::clear(self)
    }
    fn insert(&mut self, lo: &[f64], hi: &[f64], value: V) -> Result<(), IndexError> {
        RectQuadTree::insert(self, lo, hi, value)
    }
    fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<V> {
        RectQuadTree::remove(self, lo, hi)
    }
    fn remove_entry(&mut self, lo: &[f64], hi: &[f64], value: &V) -> Option<V> {
        RectQuadTree::remove_entry(self, lo, hi, value)
    }
    fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError> {
        RectQuadTree::update(self, old_lo, old_hi, new_lo, new_hi)
    }
    fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&V> {
        RectQuadTree::query_exact(self, lo, hi)
    }
    fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<BoxIter<'a, V>, IndexError> {
        let iter = RectQuadTree::window(self, lo, hi)?;
        Ok(Box::new(iter.map(|e| (&e.key, &e.value))))
    }
    fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<BoxDistIter<'a, V>, IndexError> {
        let iter = RectQuadTree::knn::<EuclideanDistance>(self, center, k)?;
        Ok(Box::new(iter.map(|e| (e.dist, e.key, e.value))))
    }
}

/// Unique-key map over point keys: insert replaces an existing entry and
/// returns the displaced value.
#[derive(Debug, Clone)]
pub struct PointMap<V: PartialEq, I: PointIndex<V>> {
    inner: I,
    _values: PhantomData<V>,
}

impl<V: PartialEq> PointMap<V, QuadTree<V>> {
    /// A point map backed by a quadtree.
    pub fn quadtree(dims: usize, config: QuadTreeConfig) -> Result<Self, IndexError> {
        Ok(Self::with_index(QuadTree::with_config(dims, config)?))
    }
}

impl<V: PartialEq> PointMap<V, RStarTree<V>> {
    /// A point map backed by an R*-tree storing degenerate boxes.
    pub fn rstar(dims: usize, config: RStarConfig) -> Result<Self, IndexError> {
        Ok(Self::with_index(RStarTree::with_config(dims, config)?))
    }
}

impl<V: PartialEq, I: PointIndex<V>> PointMap<V, I> {
    /// Wraps an existing multimap index.
    pub fn with_index(inner: I) -> Self {
        PointMap {
            inner,
            _values: PhantomData,
        }
    }

    /// The underlying multimap index.
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// The dimensionality of the keys.
    pub fn dims(&self) -> usize {
        self.inner.dims()
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.inner.clear()
    }

    /// Inserts a value, replacing and returning any existing value under the
    /// key.
    pub fn insert(&mut self, point: &[f64], value: V) -> Result<Option<V>, IndexError> {
        // Both calls validate the key identically, so a failing insert
        // implies the remove was a no-op.
        let old = self.inner.remove(point);
        self.inner.insert(point, value)?;
        Ok(old)
    }

    /// Removes the entry under the key.
    pub fn remove(&mut self, point: &[f64]) -> Option<V> {
        self.inner.remove(point)
    }

    /// Moves the entry under `old` to `new`, displacing any entry already
    /// stored there.
    pub fn update(&mut self, old: &[f64], new: &[f64]) -> Result<bool, IndexError> {
        if !self.inner.contains(old) {
            return Ok(false);
        }
        if !point_eq(old, new) {
            self.inner.remove(new);
        }
        self.inner.update(old, new)
    }

    /// Returns the value stored under the key.
    pub fn query_exact(&self, point: &[f64]) -> Option<&V> {
        self.inner.query_exact(point)
    }

    /// Returns true if the key is present.
    pub fn contains(&self, point: &[f64]) -> bool {
        self.inner.contains(point)
    }

    /// Lazy iterator over entries enclosed by the window.
    pub fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<PointIter<'a, V>, IndexError> {
        self.inner.window(lo, hi)
    }

    /// Lazy iterator over the k nearest entries.
    pub fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<PointDistIter<'a, V>, IndexError> {
        self.inner.knn(center, k)
    }
}

/// Unique-key map over box keys: insert replaces an existing entry and
/// returns the displaced value.
#[derive(Debug, Clone)]
pub struct BoxMap<V: PartialEq, I: BoxIndex<V>> {
    inner: I,
    _values: PhantomData<V>,
}

impl<V: PartialEq> BoxMap<V, RStarTree<V>> {
    /// A box map backed by an R*-tree.
    pub fn rstar(dims: usize, config: RStarConfig) -> Result<Self, IndexError> {
        Ok(Self::with_index(RStarTree::with_config(dims, config)?))
    }
}

impl<V: PartialEq> BoxMap<V, RectQuadTree<V>> {
    /// A box map backed by a rectangle quadtree.
    pub fn quadtree(dims: usize, config: QuadTreeConfig) -> Result<Self, IndexError> {
        Ok(Self::with_index(RectQuadTree::with_config(dims, config)?))
    }
}

impl<V: PartialEq, I: BoxIndex<V>> BoxMap<V, I> {
    /// Wraps an existing multimap index.
    pub fn with_index(inner: I) -> Self {
        BoxMap {
            inner,
            _values: PhantomData,
        }
    }

    /// The underlying multimap index.
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// The dimensionality of the keys.
    pub fn dims(&self) -> usize {
        self.inner.dims()
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.inner.clear()
    }

    /// Inserts a value, replacing and returning any existing value under the
    /// key.
    pub fn insert(&mut self, lo: &[f64], hi: &[f64], value: V) -> Result<Option<V>, IndexError> {
        let old = self.inner.remove(lo, hi);
        self.inner.insert(lo, hi, value)?;
        Ok(old)
    }

    /// Removes the entry under the key.
    pub fn remove(&mut self, lo: &[f64], hi: &[f64]) -> Option<V> {
        self.inner.remove(lo, hi)
    }

    /// Moves the entry under the old key to the new key, displacing any
    /// entry already stored there.
    pub fn update(
        &mut self,
        old_lo: &[f64],
        old_hi: &[f64],
        new_lo: &[f64],
        new_hi: &[f64],
    ) -> Result<bool, IndexError> {
        if !self.inner.contains(old_lo, old_hi) {
            return Ok(false);
        }
        if !(point_eq(old_lo, new_lo) && point_eq(old_hi, new_hi)) {
            self.inner.remove(new_lo, new_hi);
        }
        self.inner.update(old_lo, old_hi, new_lo, new_hi)
    }

    /// Returns the value stored under the key.
    pub fn query_exact(&self, lo: &[f64], hi: &[f64]) -> Option<&V> {
        self.inner.query_exact(lo, hi)
    }

    /// Returns true if the key is present.
    pub fn contains(&self, lo: &[f64], hi: &[f64]) -> bool {
        self.inner.contains(lo, hi)
    }

    /// Lazy iterator over entries intersecting the window.
    pub fn window<'a>(&'a self, lo: &[f64], hi: &[f64]) -> Result<BoxIter<'a, V>, IndexError> {
        self.inner.window(lo, hi)
    }

    /// Lazy iterator over the k nearest entries.
    pub fn knn<'a>(&'a self, center: &[f64], k: usize) -> Result<BoxDistIter<'a, V>, IndexError> {
        self.inner.knn(center, k)
    }
}
