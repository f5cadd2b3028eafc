//! # Somagrid Algorithms
//!
//! The stages of cube piece extraction from a coloured point cloud.
//!
//! Points are labelled by colour, grouped into voxel-connected components per
//! label, filtered by bounding geometry, oriented along their principal axes
//! snapped to the nearest axis-aligned rotation, overlaid with a fitted cubic
//! lattice, voted into cells and finally reduced to the visible faces of the
//! accepted cells. [`PieceExtractor`] runs the whole pass.

pub mod color;
pub mod clustering;
pub mod shape;
pub mod orientation;
pub mod grid;
pub mod voting;
pub mod faces;
pub mod pipeline;

// Re-export commonly used items
pub use color::*;
pub use clustering::*;
pub use shape::*;
pub use orientation::*;
pub use grid::*;
pub use voting::*;
pub use faces::*;
pub use pipeline::*;
