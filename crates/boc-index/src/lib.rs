//! Interval index for the bitemporal object cache.
//!
//! A half-open interval `[start, end)` is treated as the point
//! `(start, end)` in the half-plane `start <= end`. The [`TdTree`]
//! (Temporal Decomposition Tree) covers that half-plane with a right
//! isosceles triangle and bisects it recursively along the altitude whenever
//! a [`Leaf`] overflows. Containment in a triangle is a fixed three-compare
//! test at every depth.
//!
//! # Key Types
//!
//! - [`TdTree`] -- the triangle-split index
//! - [`LinearIndex`] -- flat scan index, useful as a reference
//! - [`TemporalIndex`] -- the interface both implement
//! - [`Leaf`] / [`InsertResult`] -- fixed-capacity blocks and their split result
//! - [`IndexStatistics`] -- occupancy and fragmentation

pub mod config;
pub mod entry;
pub mod error;
pub mod geometry;
pub mod leaf;
pub mod linear;
pub mod stats;
pub mod traits;
pub mod tree;

pub use config::IndexConfig;
pub use entry::{Entry, Key};
pub use error::{IndexError, IndexResult};
pub use geometry::Triangle;
pub use leaf::{InsertResult, Leaf};
pub use linear::LinearIndex;
pub use stats::IndexStatistics;
pub use traits::TemporalIndex;
pub use tree::TdTree;
