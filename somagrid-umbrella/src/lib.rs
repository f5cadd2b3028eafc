//! # somagrid
//!
//! Extraction of cube-built puzzle pieces from coloured 3D point clouds.
//!
//! This is the umbrella crate that provides convenient access to all somagrid
//! functionality. Use the individual crates for more granular control over
//! dependencies.
//!
//! ## Features
//!
//! - **Core**: Points, coloured clouds, oriented frames, lattice cells and faces
//! - **Algorithms**: Colour classification, voxel clustering, shape gating,
//!   orientation, grid fitting, cell voting and face extraction
//! - **I/O**: UPCD point clouds, JSON configuration and report export
//!
//! ## Quick Start
//!
//! ```rust
//! use somagrid::prelude::*;
//!
//! let positions = vec![Point3f::new(0.0, 0.0, 0.0); 10];
//! let colors = vec![[220, 20, 20]; 10];
//!
//! let extractor = PieceExtractor::new(PipelineConfig::default())?;
//! let report = extractor.build_from_arrays(&positions, Some(&colors))?;
//! assert_eq!(report.accepted().count(), 0);
//! # Ok::<(), somagrid::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables core, algorithms and io
//! - `algorithms`: The extraction pipeline
//! - `io`: File formats (implies `algorithms`)
//! - `all`: Enables all features

// Re-export core functionality
pub use somagrid_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use somagrid_algorithms as algorithms;

#[cfg(feature = "io")]
pub use somagrid_io as io;

/// Convenient imports for common use cases
pub mod prelude {
    pub use somagrid_core::*;

    #[cfg(feature = "algorithms")]
    pub use somagrid_algorithms::*;

    #[cfg(feature = "io")]
    pub use somagrid_io::*;
}
