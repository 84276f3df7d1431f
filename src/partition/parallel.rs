//! The parallel partitioner: collective overrides of the base loop.
//!
//! Five operations become collective: resolving the target, counting
//! selections, finding the globally largest selection, mapping chunks to
//! destinations, and migrating the chunks themselves. Every rank calls
//! them in the same order; all error detection happens after the
//! collectives, so classification is globally consistent.

use crate::algs::collective::{
    allgather_u64, allgatherv_bytes, allreduce_max_loc, allreduce_max_u64, allreduce_sum_u64,
    recv_bytes, send_bytes,
};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{self, ChunkInfo};
use crate::mesh_error::MeshLoomError;
use crate::partition::chunk::Chunk;
use crate::partition::partitioner::{
    assign_chunks, wrap_local_chunk, ChunkMap, CollectiveHooks, LargestSelection, Partitioner,
};
use crate::partition::selection::Selection;
use crate::tree::Node;

/// Base tag for chunk migration; global chunk `g` travels with tag
/// `BASE_TAG + g`, so concurrent in-flight chunks can never be mismatched.
pub const PARTITION_TAG_BASE: u16 = 12000;

fn chunk_tag(global_index: usize) -> Result<CommTag, MeshLoomError> {
    let tag = (global_index as u64) + u64::from(PARTITION_TAG_BASE);
    // Stay below the collective tag range.
    if tag >= 60000 {
        return Err(MeshLoomError::Partition(format!(
            "global chunk index {global_index} exceeds the tag space"
        )));
    }
    Ok(CommTag::new(tag as u16))
}

/// Repartitions meshes spread across the ranks of a communicator.
///
/// The communicator is borrowed: it stays externally owned and is never
/// duplicated.
pub struct ParallelPartitioner<'a, C: Communicator> {
    base: Partitioner,
    comm: &'a C,
}

impl<'a, C: Communicator> ParallelPartitioner<'a, C> {
    /// A parallel partitioner bound to `comm`.
    pub fn new(comm: &'a C) -> Self {
        Self {
            base: Partitioner::new(),
            comm,
        }
    }

    /// Repartition this rank's `input` domains into `output`, collectively
    /// with every other rank of the communicator.
    pub fn execute(
        &mut self,
        input: &Node,
        options: &Node,
        output: &mut Node,
    ) -> Result<(), MeshLoomError> {
        let hooks = ParallelHooks { comm: self.comm };
        self.base.execute_with(&hooks, input, options, output)
    }

    /// The target chosen by the last `execute`.
    pub fn target(&self) -> u32 {
        self.base.target()
    }
}

struct ParallelHooks<'a, C: Communicator> {
    comm: &'a C,
}

impl<C: Communicator> CollectiveHooks for ParallelHooks<'_, C> {
    /// Ranks may be handed different options; the fleet agrees on the max
    /// of any provided target.
    fn options_get_target(
        &self,
        base: &Partitioner,
        options: &Node,
    ) -> Result<Option<u32>, MeshLoomError> {
        let local = base.options_get_target(options)?.unwrap_or(0);
        let global = allreduce_max_u64(self.comm, u64::from(local))?;
        Ok(if global > 0 { Some(global as u32) } else { None })
    }

    fn total_selections(&self, base: &Partitioner) -> Result<u64, MeshLoomError> {
        allreduce_sum_u64(self.comm, base.selections.len() as u64)
    }

    /// Maxloc over `(length, rank)`; the winning rank scans for its first
    /// selection of that length, everyone else keeps looping.
    fn largest_selection(&self, base: &Partitioner) -> Result<LargestSelection, MeshLoomError> {
        let local_max = base
            .selections
            .iter()
            .map(Selection::len)
            .max()
            .unwrap_or(0) as u64;
        let (global_max, winner) = allreduce_max_loc(self.comm, local_max)?;
        if global_max <= 1 {
            return Ok(LargestSelection::Unsplittable);
        }
        if winner == self.comm.rank() {
            let idx = base
                .selections
                .iter()
                .position(|s| s.len() as u64 == global_max)
                .ok_or_else(|| {
                    MeshLoomError::Partition("winning selection vanished locally".into())
                })?;
            Ok(LargestSelection::Local(idx))
        } else {
            Ok(LargestSelection::Remote)
        }
    }

    /// Gather every rank's chunk metadata and decide, globally, where each
    /// chunk ends up.
    fn map_chunks(&self, base: &Partitioner, chunks: &[Chunk]) -> Result<ChunkMap, MeshLoomError> {
        let counts = allgather_u64(self.comm, chunks.len() as u64)?;
        let mut offsets = Vec::with_capacity(counts.len());
        let mut acc = 0i64;
        for &c in &counts {
            offsets.push(acc as i32);
            acc += c as i64;
        }
        let ntotal = acc as usize;

        let local_info: Vec<ChunkInfo> = chunks
            .iter()
            .map(|c| ChunkInfo::new(c.num_elements(), c.destination_rank(), c.destination_domain()))
            .collect();
        let (bytes, _) = allgatherv_bytes(self.comm, wire::cast_slice(&local_info))?;
        let global_info: Vec<ChunkInfo> = bytemuck::pod_collect_to_vec(&bytes);
        if global_info.len() != ntotal {
            return Err(MeshLoomError::WireFormat(format!(
                "gathered {} chunk records, expected {ntotal}",
                global_info.len()
            )));
        }

        let (dest_rank, dest_domain) = assign_chunks(
            &global_info,
            base.target(),
            self.comm.size(),
            self.comm.rank() == 0,
        )?;
        Ok(ChunkMap {
            dest_rank,
            dest_domain,
            offsets,
        })
    }

    /// Migrate chunks to their destination ranks. Chunks staying local are
    /// wrapped as shallow views; remote chunks travel as length-prefixed
    /// serialized trees under their global tag.
    fn communicate_chunks(
        &self,
        _base: &Partitioner,
        chunks: Vec<Chunk>,
        map: &ChunkMap,
    ) -> Result<(Vec<Chunk>, Vec<i32>), MeshLoomError> {
        let rank = self.comm.rank();
        let size = self.comm.size();
        let ntotal = map.dest_rank.len();

        // The offsets tell us who sent each global chunk.
        let mut src_rank = vec![size as i32 - 1; ntotal];
        let mut idx = 0usize;
        for r in 1..map.offsets.len() {
            let n = (map.offsets[r] - map.offsets[r - 1]) as usize;
            for _ in 0..n {
                src_rank[idx] = r as i32 - 1;
                idx += 1;
            }
        }

        // Sends: every local chunk whose destination is elsewhere.
        let my_offset = map.offsets[rank] as usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let g = my_offset + i;
            let dest = map.dest_rank[g];
            if dest != rank as i32 {
                log::trace!("rank {rank}: send chunk {g} to rank {dest}");
                let encoded = wire::encode_tree(&chunk.mesh)?;
                send_bytes(self.comm, dest as usize, chunk_tag(g)?, &encoded)?;
            }
        }

        // Receives: every global chunk whose destination is this rank.
        let mut out = Vec::new();
        let mut out_domains = Vec::new();
        for g in 0..ntotal {
            if map.dest_rank[g] != rank as i32 {
                continue;
            }
            let local_range = my_offset..my_offset + chunks.len();
            if local_range.contains(&g) {
                let local_i = g - my_offset;
                out.push(Chunk::free(wrap_local_chunk(&chunks[local_i].mesh, g), true));
            } else {
                log::trace!("rank {rank}: recv chunk {g} from rank {}", src_rank[g]);
                let encoded = recv_bytes(self.comm, src_rank[g] as usize, chunk_tag(g)?)?;
                let mut mesh = wire::decode_tree(&encoded)?;
                mesh.fetch_mut("state/domain_id").set(g as i64);
                out.push(Chunk::free(mesh, true));
            }
            out_domains.push(map.dest_domain[g]);
        }
        Ok((out, out_domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_tags_are_offset_from_base() {
        assert_eq!(chunk_tag(0).unwrap(), CommTag::new(12000));
        assert_eq!(chunk_tag(1).unwrap(), CommTag::new(12001));
        assert!(chunk_tag(50_000).is_err());
    }
}
