//! Tiled mesh generation: the pattern template and the generator.

pub mod pattern;
pub mod tiler;

pub use pattern::TilePattern;
pub use tiler::{tiled, Side, Tiler};
