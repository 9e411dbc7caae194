//! # Hypertree
//!
//! A library of in-memory multidimensional spatial indexes over real-valued
//! coordinate vectors. Hypertree stores associations between geometric keys
//! (points or axis-aligned boxes) in arbitrary dimension and user values, and
//! answers exact lookups, axis-aligned window queries, and nearest-neighbor
//! queries.
//!
//! The main index families are:
//!
//! * [`rstar_tree::RStarTree`] — an R\*-tree over box keys with forced
//!   reinsertion, topological splits, and best-first nearest-neighbor search.
//! * [`quadtree::QuadTree`] — a hypercube quadtree over point keys with a
//!   fixed 2^d fanout.
//! * [`rect_quadtree::RectQuadTree`] — a hypercube quadtree over box keys.
//! * [`minmax_heap::MinMaxHeap`] — the double-ended priority queue backing
//!   the nearest-neighbor searches.
//!
//! The [`index`] module exposes common map/multimap contracts over the
//! concrete structures.

pub mod errors;
pub mod geometry;
pub mod index;
#[cfg(feature = "setup_tracing")]
mod logging;
pub mod minmax_heap;
pub mod quadtree;
pub mod query;
pub mod rect_quadtree;
pub mod rstar_tree;
