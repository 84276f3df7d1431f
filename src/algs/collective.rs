//! Collective operations layered over point-to-point messaging.
//!
//! Every collective gathers at rank 0 and broadcasts the combined result,
//! visiting peers in ascending rank order. That gives all ranks the same
//! view in the same order, which the partitioner's determinism guarantees
//! rely on. With a single rank every operation degenerates to the identity,
//! so the serial and parallel code paths share one driver.
//!
//! Tag discipline: collectives use the two reserved tags below. A collective
//! is a global synchronization point (no rank proceeds before the
//! broadcast), so back-to-back collectives on the same tags cannot
//! interleave.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::mesh_error::MeshLoomError;

const TAG_GATHER: CommTag = CommTag::new(60001);
const TAG_BCAST: CommTag = CommTag::new(60002);

fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    len: usize,
) -> Result<Vec<u8>, MeshLoomError> {
    let data = comm.irecv(peer, tag, len).wait().ok_or_else(|| {
        MeshLoomError::CommunicationFailure(format!("receive from rank {peer} failed"))
    })?;
    if data.len() != len {
        return Err(MeshLoomError::CommunicationFailure(format!(
            "short message from rank {peer}: {} of {len} bytes",
            data.len()
        )));
    }
    Ok(data)
}

/// Gather one `u64` per rank; every rank gets the full rank-ordered vector.
pub fn allgather_u64<C: Communicator>(comm: &C, value: u64) -> Result<Vec<u64>, MeshLoomError> {
    let (rank, size) = (comm.rank(), comm.size());
    if size == 1 {
        return Ok(vec![value]);
    }
    if rank == 0 {
        let mut all = vec![0u64; size];
        all[0] = value;
        for (r, slot) in all.iter_mut().enumerate().skip(1) {
            let bytes = recv_exact(comm, r, TAG_GATHER, 8)?;
            *slot = u64::from_le_bytes(bytes.try_into().expect("8-byte message"));
        }
        let mut payload = Vec::with_capacity(size * 8);
        for v in &all {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        for r in 1..size {
            comm.isend(r, TAG_BCAST, &payload).wait();
        }
        Ok(all)
    } else {
        comm.isend(0, TAG_GATHER, &value.to_le_bytes()).wait();
        let payload = recv_exact(comm, 0, TAG_BCAST, size * 8)?;
        Ok(payload
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("8-byte chunk")))
            .collect())
    }
}

/// Max-reduce a `u64` across all ranks.
pub fn allreduce_max_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64, MeshLoomError> {
    Ok(allgather_u64(comm, value)?
        .into_iter()
        .max()
        .unwrap_or(value))
}

/// Sum-reduce a `u64` across all ranks.
pub fn allreduce_sum_u64<C: Communicator>(comm: &C, value: u64) -> Result<u64, MeshLoomError> {
    Ok(allgather_u64(comm, value)?.into_iter().sum())
}

/// Maxloc-reduce: the maximum value and the lowest rank holding it.
pub fn allreduce_max_loc<C: Communicator>(
    comm: &C,
    value: u64,
) -> Result<(u64, usize), MeshLoomError> {
    let vals = allgather_u64(comm, value)?;
    let mut best = (vals[0], 0usize);
    for (r, &v) in vals.iter().enumerate().skip(1) {
        if v > best.0 {
            best = (v, r);
        }
    }
    Ok(best)
}

/// Variable-length gather: every rank gets the rank-ordered concatenation
/// of all contributions along with the per-rank byte counts.
pub fn allgatherv_bytes<C: Communicator>(
    comm: &C,
    local: &[u8],
) -> Result<(Vec<u8>, Vec<usize>), MeshLoomError> {
    let (rank, size) = (comm.rank(), comm.size());
    let counts: Vec<usize> = allgather_u64(comm, local.len() as u64)?
        .into_iter()
        .map(|c| c as usize)
        .collect();
    if size == 1 {
        return Ok((local.to_vec(), counts));
    }
    let total: usize = counts.iter().sum();
    if rank == 0 {
        let mut all = Vec::with_capacity(total);
        all.extend_from_slice(local);
        for (r, &count) in counts.iter().enumerate().skip(1) {
            if count > 0 {
                all.extend_from_slice(&recv_exact(comm, r, TAG_GATHER, count)?);
            }
        }
        for r in 1..size {
            comm.isend(r, TAG_BCAST, &all).wait();
        }
        Ok((all, counts))
    } else {
        if !local.is_empty() {
            comm.isend(0, TAG_GATHER, local).wait();
        }
        let all = recv_exact(comm, 0, TAG_BCAST, total)?;
        Ok((all, counts))
    }
}

/// Blocking send of a length-prefixed payload.
pub fn send_bytes<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    bytes: &[u8],
) -> Result<(), MeshLoomError> {
    comm.isend(peer, tag, &(bytes.len() as u64).to_le_bytes())
        .wait();
    if !bytes.is_empty() {
        comm.isend(peer, tag, bytes).wait();
    }
    Ok(())
}

/// Blocking receive of a length-prefixed payload.
pub fn recv_bytes<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: CommTag,
) -> Result<Vec<u8>, MeshLoomError> {
    let len_bytes = recv_exact(comm, peer, tag, 8)?;
    let len = u64::from_le_bytes(len_bytes.try_into().expect("8-byte message")) as usize;
    if len == 0 {
        return Ok(Vec::new());
    }
    recv_exact(comm, peer, tag, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    fn on_ranks<F>(size: usize, f: F) -> Vec<std::thread::JoinHandle<()>>
    where
        F: Fn(ThreadComm) + Send + Sync + Clone + 'static,
    {
        ThreadComm::universe(size)
            .into_iter()
            .map(|comm| {
                let f = f.clone();
                std::thread::spawn(move || f(comm))
            })
            .collect()
    }

    #[test]
    fn serial_collectives_are_identity() {
        let comm = NoComm;
        assert_eq!(allgather_u64(&comm, 5).unwrap(), vec![5]);
        assert_eq!(allreduce_max_u64(&comm, 5).unwrap(), 5);
        assert_eq!(allreduce_sum_u64(&comm, 5).unwrap(), 5);
        assert_eq!(allreduce_max_loc(&comm, 5).unwrap(), (5, 0));
    }

    #[test]
    fn allgather_and_reductions_across_ranks() {
        for h in on_ranks(3, |comm| {
            let mine = (comm.rank() as u64 + 1) * 10;
            assert_eq!(allgather_u64(&comm, mine).unwrap(), vec![10, 20, 30]);
            assert_eq!(allreduce_max_u64(&comm, mine).unwrap(), 30);
            assert_eq!(allreduce_sum_u64(&comm, mine).unwrap(), 60);
            assert_eq!(allreduce_max_loc(&comm, mine).unwrap(), (30, 2));
        }) {
            h.join().unwrap();
        }
    }

    #[test]
    fn max_loc_ties_go_to_lowest_rank() {
        for h in on_ranks(3, |comm| {
            let mine = if comm.rank() == 0 { 3 } else { 7 };
            assert_eq!(allreduce_max_loc(&comm, mine).unwrap(), (7, 1));
        }) {
            h.join().unwrap();
        }
    }

    #[test]
    fn allgatherv_concatenates_in_rank_order() {
        for h in on_ranks(3, |comm| {
            let local = vec![comm.rank() as u8; comm.rank()]; // rank 0 sends nothing
            let (all, counts) = allgatherv_bytes(&comm, &local).unwrap();
            assert_eq!(counts, vec![0, 1, 2]);
            assert_eq!(all, vec![1u8, 2, 2]);
        }) {
            h.join().unwrap();
        }
    }

    #[test]
    fn length_prefixed_send_recv() {
        let comms = ThreadComm::universe(2);
        let (c0, c1) = (comms[0].clone(), comms[1].clone());
        let tag = CommTag::new(12345);
        let t = std::thread::spawn(move || {
            send_bytes(&c1, 0, tag, b"payload").unwrap();
        });
        let got = recv_bytes(&c0, 1, tag).unwrap();
        t.join().unwrap();
        assert_eq!(got, b"payload");
    }
}
