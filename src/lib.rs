//! # mesh-loom
//!
//! mesh-loom generates, merges, and repartitions unstructured meshes for
//! scientific-computing workflows. It provides a tiled mesh generator for
//! building large 2D/3D test meshes from a parametric pattern, a
//! tolerance-based point merge for fusing coincident vertices across
//! domains, and a partitioner that redistributes mesh chunks across the
//! ranks of a communicator, with serial and MPI-backed workflows sharing
//! one driver.
//!
//! ## Features
//! - Tiled quad/hex mesh generation with seam-shared points, spatial
//!   element reordering, and labeled boundary faces
//! - Tolerance-quantized point merging with a retained original→merged map
//! - Collective repartitioning: target resolution, iterative selection
//!   splitting, balanced chunk mapping, and tagged chunk migration
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//! Add `mesh-loom` as a dependency in your `Cargo.toml` and enable
//! features as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-loom = "0.2"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! Meshes move through the crate as [`tree::Node`] trees using the
//! `coordsets`/`topologies`/`fields`/`state` layout; cloning a tree shares
//! its bulk arrays, so passing subtrees around is cheap.

pub mod algs;
pub mod mesh_error;
pub mod partition;
pub mod tiling;
pub mod tree;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collective::{
        allgather_u64, allgatherv_bytes, allreduce_max_loc, allreduce_max_u64, allreduce_sum_u64,
    };
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::point_merge::PointMerge;
    pub use crate::mesh_error::MeshLoomError;
    pub use crate::partition::{Chunk, ParallelPartitioner, Partitioner, Selection};
    pub use crate::tiling::{tiled, Side, TilePattern, Tiler};
    pub use crate::tree::{Node, Value};
}
