//! Communication abstraction for intra-process (threaded) and inter-process
//! (MPI) message passing.
//!
//! The partitioner treats its communicator as an externally owned
//! capability: it never duplicates it and never mutates its attributes.
//! Higher-level protocols (collectives, chunk migration) are layered on the
//! non-blocking `isend`/`irecv` pair; all multi-byte integers they put on
//! the wire are little-endian fixed width.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous send/receive operations and waitable
/// handles. Messages between a fixed `(sender, receiver, tag)` triple are
/// delivered in send order; distinct tags never match each other.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of exactly `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Self::RecvHandle;

    /// Rank of this process (0..size-1).
    fn rank(&self) -> usize;
    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Synchronization barrier (default: no-op for serial comms).
    fn barrier(&self) {}

    /// Returns true if this communicator is serial (for test logic).
    fn is_serial(&self) -> bool {
        self.size() == 1
    }
}

/// Compile-time no-op comm for pure serial use.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: CommTag, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: one rank per thread, shared mailbox ---

type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

#[derive(Default)]
struct Mailbox {
    map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

impl Mailbox {
    fn entry(&self, key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
        let mut g = self.map.lock().expect("mailbox poisoned");
        g.entry(key)
            .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
            .clone()
    }
}

struct EpochBarrier {
    arrived: usize,
    epoch: usize,
}

pub struct LocalSendHandle;

impl Wait for LocalSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct LocalRecvHandle {
    cell: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut slot = lock.lock().expect("slot poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("condvar poisoned");
        }
        let mut msg = slot.q.pop_front().expect("q non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

/// In-process communicator: each rank lives on its own thread and all ranks
/// share one mailbox. Construct the whole universe up front with
/// [`ThreadComm::universe`]; state is scoped to that universe, so separate
/// universes (and separate tests) cannot observe each other's traffic.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    barrier: Arc<(Mutex<EpochBarrier>, Condvar)>,
}

impl ThreadComm {
    /// Create `size` connected communicators, one per rank.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "universe needs at least one rank");
        let mailbox = Arc::new(Mailbox::default());
        let barrier = Arc::new((
            Mutex::new(EpochBarrier {
                arrived: 0,
                epoch: 0,
            }),
            Condvar::new(),
        ));
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = LocalSendHandle;
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        let entry = self.mailbox.entry((self.rank, peer, tag.as_u16()));
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        LocalSendHandle
    }

    fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Self::RecvHandle {
        LocalRecvHandle {
            cell: self.mailbox.entry((peer, self.rank, tag.as_u16())),
            want_len: len,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        let (lock, cv) = &*self.barrier;
        let mut b = lock.lock().expect("barrier poisoned");
        let e = b.epoch;
        b.arrived += 1;
        if b.arrived == self.size {
            b.arrived = 0;
            b.epoch += 1;
            cv.notify_all();
        } else {
            while e == b.epoch {
                b = cv.wait(b).expect("barrier condvar poisoned");
            }
        }
    }
}

// --- MPI backend ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use core::ptr::NonNull;
    use mpi::environment::Universe;
    use mpi::point_to_point::{Destination, Source};
    use mpi::topology::{Communicator as _, SimpleCommunicator};

    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Default for MpiComm {
        fn default() -> Self {
            let uni = mpi::initialize().expect("MPI already initialized");
            let world = uni.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: uni,
                world,
                rank,
                size,
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
            use mpi::request::StaticScope;
            let boxed = buf.to_vec().into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice: &[u8] = unsafe { &*raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, slice, tag.as_u16() as i32);
            MpiSendHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
            }
        }

        fn irecv(&self, peer: usize, tag: CommTag, len: usize) -> Self::RecvHandle {
            use mpi::request::StaticScope;
            let boxed = vec![0u8; len].into_boxed_slice();
            let raw: *mut [u8] = Box::into_raw(boxed);
            let slice_mut: &mut [u8] = unsafe { &mut *raw };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, slice_mut, tag.as_u16() as i32);
            MpiRecvHandle {
                req: Some(req),
                buf: Some(unsafe { NonNull::new_unchecked(raw) }),
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn barrier(&self) {
            use mpi::collective::CommunicatorCollectives;
            self.world.barrier();
        }
    }

    pub struct MpiSendHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
    }
    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
            None
        }
    }
    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }

    pub struct MpiRecvHandle {
        req: Option<mpi::request::Request<'static, [u8], mpi::request::StaticScope>>,
        buf: Option<NonNull<[u8]>>,
        len: usize,
    }
    impl Wait for MpiRecvHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(r) = self.req.take() {
                let _ = r.wait();
            }
            let ptr = self.buf.take()?;
            let boxed: Box<[u8]> = unsafe { Box::from_raw(ptr.as_ptr()) };
            let mut v = Vec::from(boxed);
            v.truncate(self.len);
            Some(v)
        }
    }
    impl Drop for MpiRecvHandle {
        fn drop(&mut self) {
            if let Some(r) = self.req.take() {
                let _ = r.test();
            }
            if let Some(ptr) = self.buf.take() {
                unsafe {
                    drop(Box::from_raw(ptr.as_ptr()));
                }
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
