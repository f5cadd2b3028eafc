//! Core data structures for somagrid
//!
//! This crate provides the data model shared by the piece extraction pipeline:
//! coloured points and clouds, bounding boxes, oriented frames snapped to the
//! 24 axis-aligned rotations, the cubic lattice description and the faces emitted
//! for accepted lattice cells.

pub mod point;
pub mod point_cloud;
pub mod frame;
pub mod lattice;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use frame::*;
pub use lattice::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};

/// Sentinel colour label for points that no palette entry claims
pub const UNCLASSIFIED: i32 = -1;
