//! Mesh repartitioning: selections, chunks, the serial driver, and the
//! parallel overrides.

pub mod chunk;
pub mod parallel;
pub mod partitioner;
pub mod selection;

pub use chunk::{Chunk, NO_DESTINATION};
pub use parallel::{ParallelPartitioner, PARTITION_TAG_BASE};
pub use partitioner::{ChunkMap, Partitioner};
pub use selection::Selection;
