//! Algorithm module: communication, wire formats, geometric utilities.
//!
//! This module provides the communicator abstraction and the collectives
//! built on it, the versioned wire types used for chunk migration, the
//! point merge, and spatial element reordering.

pub mod collective;
pub mod communicator;
pub mod point_merge;
pub mod reorder;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, ThreadComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use point_merge::{CoordSystem, MergeRecord, PointMerge};
pub use reorder::{reorder, spatial_ordering};
