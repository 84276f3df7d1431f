//! Chunks: the unit of migration.

use crate::mesh_error::MeshLoomError;
use crate::tree::Node;

/// Sentinel destination meaning "the caller has no preference".
pub const NO_DESTINATION: i32 = -1;

/// A mesh fragment produced by chunk extraction, plus where it must go.
///
/// Destinations are all-or-nothing: a chunk is either *free*
/// (rank and domain both [`NO_DESTINATION`]) or *pinned* (both
/// non-negative). The `owned` flag records whether the holder carries
/// exclusive data or shares its bulk arrays with the input tree.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The mesh subtree.
    pub mesh: Node,
    /// Whether the holder carries exclusive data.
    pub owned: bool,
    destination_rank: i32,
    destination_domain: i32,
}

impl Chunk {
    /// A chunk that is free to move anywhere.
    pub fn free(mesh: Node, owned: bool) -> Self {
        Self {
            mesh,
            owned,
            destination_rank: NO_DESTINATION,
            destination_domain: NO_DESTINATION,
        }
    }

    /// A chunk pinned to a specific rank and domain.
    pub fn pinned(
        mesh: Node,
        owned: bool,
        destination_rank: i32,
        destination_domain: i32,
    ) -> Result<Self, MeshLoomError> {
        if destination_rank < 0 || destination_domain < 0 {
            return Err(MeshLoomError::Partition(format!(
                "pinned chunk needs a non-negative rank and domain, got ({destination_rank}, {destination_domain})"
            )));
        }
        Ok(Self {
            mesh,
            owned,
            destination_rank,
            destination_domain,
        })
    }

    /// The caller-requested destination rank, or [`NO_DESTINATION`].
    pub fn destination_rank(&self) -> i32 {
        self.destination_rank
    }

    /// The caller-requested destination domain, or [`NO_DESTINATION`].
    pub fn destination_domain(&self) -> i32 {
        self.destination_domain
    }

    /// True if the caller specified where this chunk ends up.
    pub fn is_pinned(&self) -> bool {
        self.destination_domain >= 0
    }

    /// Total element count across every topology in the subtree.
    pub fn num_elements(&self) -> u64 {
        let Some(topologies) = self.mesh.fetch("topologies") else {
            return 0;
        };
        topologies
            .children()
            .map(|(_, topo)| {
                topo.fetch("elements/sizes")
                    .map_or(0, |s| s.num_elements() as u64)
            })
            .sum()
    }
}
