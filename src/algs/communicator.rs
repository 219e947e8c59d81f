//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; `wait()` hands back the received
//! bytes. On top of point-to-point the trait carries the collectives the
//! decomposition core needs. Every collective is a hard barrier: all ranks
//! must enter the same collectives in the same order with consistent
//! shapes, otherwise the run deadlocks. There is no timeout.
//!
//! The default collective bodies route everything through rank 0 with
//! point-to-point messages, which is all an in-process backend needs.
//! [`MpiComm`] overrides them with the runtime's native collectives.

use crate::algs::wire::{self, COUNT_WIDTH};
use crate::mesh_error::MeshPartitionError;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Tag `n` slots above this one.
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

// Tags reserved for the default collective implementations.
const REDUCE_TAG: CommTag = CommTag::new(0x7E00);
const REDUCE_BCAST_TAG: CommTag = REDUCE_TAG.offset(1);
const GATHER_TAG: CommTag = CommTag::new(0x7E10);
const GATHER_BCAST_TAG: CommTag = GATHER_TAG.offset(1);
const SCATTER_TAG: CommTag = CommTag::new(0x7E20);

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message-passing runtime seen by one rank.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes; the data comes back from `wait()`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// `true` for the serial no-op backend.
    fn is_no_comm(&self) -> bool {
        false
    }

    fn barrier(&self) -> Result<(), MeshPartitionError> {
        let mut token = [0u64];
        self.allreduce_sum(&mut token)
    }

    /// Element-wise sum of `vals` across ranks; every rank receives the result.
    fn allreduce_sum(&self, vals: &mut [u64]) -> Result<(), MeshPartitionError> {
        let size = self.size();
        if size <= 1 {
            return Ok(());
        }
        let root = 0;
        let nbytes = vals.len() * COUNT_WIDTH;
        if self.rank() == root {
            for peer in 1..size {
                let incoming = recv_exact(self, peer, REDUCE_TAG, nbytes)?;
                for (v, x) in vals.iter_mut().zip(wire::decode_counts(&incoming)) {
                    *v = v.wrapping_add(x);
                }
            }
            let out = wire::encode_counts(vals);
            send_to_all(self, root, REDUCE_BCAST_TAG, &out);
        } else {
            let _ = self
                .isend(root, REDUCE_TAG.as_u16(), &wire::encode_counts(vals))
                .wait();
            let reduced = recv_exact(self, root, REDUCE_BCAST_TAG, nbytes)?;
            for (v, x) in vals.iter_mut().zip(wire::decode_counts(&reduced)) {
                *v = x;
            }
        }
        Ok(())
    }

    /// Concatenate every rank's `send` (rank `r` contributes `counts[r]`
    /// bytes) on `root`. Non-root ranks get `None`.
    fn gather_varcount(
        &self,
        root: usize,
        send: &[u8],
        counts: &[usize],
    ) -> Result<Option<Vec<u8>>, MeshPartitionError> {
        check_layout(self, root, counts)?;
        let rank = self.rank();
        wire::expect_exact_len("gather_varcount", send.len(), counts[rank])?;
        if rank != root {
            if !send.is_empty() {
                let _ = self.isend(root, GATHER_TAG.as_u16(), send).wait();
            }
            return Ok(None);
        }
        let mut out = Vec::with_capacity(counts.iter().sum());
        for (peer, &count) in counts.iter().enumerate() {
            if peer == root {
                out.extend_from_slice(send);
            } else if count > 0 {
                out.extend_from_slice(&recv_exact(self, peer, GATHER_TAG, count)?);
            }
        }
        Ok(Some(out))
    }

    /// Like [`gather_varcount`](Self::gather_varcount) but every rank receives
    /// the concatenation.
    fn allgather_varcount(
        &self,
        send: &[u8],
        counts: &[usize],
    ) -> Result<Vec<u8>, MeshPartitionError> {
        let root = 0;
        let total: usize = counts.iter().sum();
        let gathered = self.gather_varcount(root, send, counts)?;
        if self.rank() == root {
            let data = gathered.unwrap_or_default();
            if total > 0 {
                send_to_all(self, root, GATHER_BCAST_TAG, &data);
            }
            Ok(data)
        } else if total == 0 {
            Ok(Vec::new())
        } else {
            recv_exact(self, root, GATHER_BCAST_TAG, total)
        }
    }

    /// Split root's `send` into `counts[r]`-byte pieces, rank `r` receiving
    /// piece `r`. Only root reads `send`; every rank must pass the same `counts`.
    fn scatter_varcount(
        &self,
        root: usize,
        send: Option<&[u8]>,
        counts: &[usize],
    ) -> Result<Vec<u8>, MeshPartitionError> {
        check_layout(self, root, counts)?;
        let rank = self.rank();
        if rank != root {
            return if counts[rank] == 0 {
                Ok(Vec::new())
            } else {
                recv_exact(self, root, SCATTER_TAG, counts[rank])
            };
        }
        let send = send.ok_or(MeshPartitionError::RootDataMissing {
            operation: "scatter_varcount",
            rank,
        })?;
        wire::expect_exact_len("scatter_varcount", send.len(), counts.iter().sum())?;
        let mut mine = Vec::new();
        let mut pending = Vec::new();
        let mut offset = 0;
        for (peer, &count) in counts.iter().enumerate() {
            let piece = &send[offset..offset + count];
            offset += count;
            if peer == root {
                mine = piece.to_vec();
            } else if count > 0 {
                pending.push(self.isend(peer, SCATTER_TAG.as_u16(), piece));
            }
        }
        for h in pending {
            let _ = h.wait();
        }
        Ok(mine)
    }

    /// Terminate the whole run. Never returns.
    fn abort(&self, code: i32) -> ! {
        log::error!("[rank {}] aborting with code {code}", self.rank());
        std::process::exit(code)
    }
}

fn check_layout<C: Communicator + ?Sized>(
    comm: &C,
    root: usize,
    counts: &[usize],
) -> Result<(), MeshPartitionError> {
    let size = comm.size();
    if root >= size {
        return Err(MeshPartitionError::RankOutOfRange {
            rank: root,
            nranks: size,
        });
    }
    wire::expect_exact_len("collective layout", counts.len(), size)
}

fn recv_exact<C: Communicator + ?Sized>(
    comm: &C,
    peer: usize,
    tag: CommTag,
    len: usize,
) -> Result<Vec<u8>, MeshPartitionError> {
    let mut buf = vec![0u8; len];
    match comm.irecv(peer, tag.as_u16(), &mut buf).wait() {
        Some(data) if data.len() == len => Ok(data),
        Some(data) => Err(MeshPartitionError::CommError {
            neighbor: peer,
            message: format!("expected {len} bytes, got {}", data.len()),
        }),
        None => Err(MeshPartitionError::CommError {
            neighbor: peer,
            message: format!("no data received for tag {:#x}", tag.as_u16()),
        }),
    }
}

fn send_to_all<C: Communicator + ?Sized>(comm: &C, from: usize, tag: CommTag, buf: &[u8]) {
    let pending: Vec<_> = (0..comm.size())
        .filter(|&peer| peer != from)
        .map(|peer| comm.isend(peer, tag.as_u16(), buf))
        .collect();
    for h in pending {
        let _ = h.wait();
    }
}

/// Compile-time no-op comm for pure serial runs: one rank, identity collectives.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

/// FIFO queues per `(src, dst, tag)`; receivers sleep on `signal` until a post.
#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    posted: Mutex<u64>,
    signal: Condvar,
    poisoned: AtomicBool,
}

impl Mailbox {
    fn post(&self, key: Key, payload: Bytes) {
        self.queues.entry(key).or_default().push_back(payload);
        let mut posted = self.posted.lock();
        *posted = posted.wrapping_add(1);
        self.signal.notify_all();
    }

    fn take(&self, key: Key) -> Bytes {
        let mut posted = self.posted.lock();
        loop {
            if let Some(payload) = self.queues.get_mut(&key).and_then(|mut q| q.pop_front()) {
                return payload;
            }
            if self.poisoned.load(Ordering::Acquire) {
                panic!("rank {} gave up waiting on rank {}: a peer rank failed", key.1, key.0);
            }
            self.signal.wait(&mut posted);
        }
    }

    /// Wake every blocked receiver and make it fail.
    fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
        let _posted = self.posted.lock();
        self.signal.notify_all();
    }
}

static GLOBAL_MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(Mailbox::default()));

pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let bytes = self.mailbox.take(self.key);
        let n = bytes.len().min(self.len);
        Some(bytes[..n].to_vec())
    }
}

/// In-process SPMD communicator: each rank is a thread sharing one mailbox.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl RayonComm {
    /// Join the process-global world as `rank` of `size`.
    ///
    /// All handles created this way share one mailbox, so concurrent users
    /// must keep their tags apart.
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: GLOBAL_MAILBOX.clone(),
        }
    }

    /// Handles for ranks `0..size` of a fresh, isolated world.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    /// Run `f` once per rank of a fresh world, one scoped thread per rank,
    /// and return the results in rank order.
    ///
    /// A panicking rank poisons the world so its peers fail instead of
    /// blocking forever; the first panic is re-raised.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(RayonComm) -> R + Sync,
    {
        let f = &f;
        std::thread::scope(|scope| {
            let handles: Vec<_> = Self::world(size)
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let mailbox = comm.mailbox.clone();
                        catch_unwind(AssertUnwindSafe(|| f(comm))).map_err(|panic| {
                            mailbox.poison();
                            panic
                        })
                    })
                })
                .collect();
            let results: Vec<_> = handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| resume_unwind(panic)))
                .collect();
            results
                .into_iter()
                .map(|r| r.unwrap_or_else(|panic| resume_unwind(panic)))
                .collect()
        })
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: self.mailbox.clone(),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    /// Fails every rank of this world: peers blocked in a receive panic,
    /// and so does the caller.
    fn abort(&self, code: i32) -> ! {
        log::error!("[rank {}] aborting in-process world with code {code}", self.rank);
        self.mailbox.poison();
        panic!("rank {} aborted with code {code}", self.rank)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::mesh_error::MeshPartitionError;
    use mpi::collective::SystemOperation;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{
        Communicator as _, CommunicatorCollectives as _, Destination as _, Root as _, Source as _,
    };
    use mpi::Count;

    /// The MPI world communicator.
    ///
    /// Point-to-point calls complete eagerly: `isend` is a standard-mode send
    /// and `irecv` receives before returning its handle. The collectives use
    /// MPI's own implementations.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        // Declared last so MPI is finalised after `world` is released.
        _universe: Universe,
    }

    // SAFETY: every rank drives MPI from the thread that initialised it;
    // handles are never used concurrently from several threads.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, MeshPartitionError> {
            let universe = mpi::initialize().ok_or_else(|| {
                MeshPartitionError::RuntimeInit("MPI was already initialised".into())
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }

        fn counts_and_displs(counts: &[usize]) -> Result<(Vec<Count>, Vec<Count>), MeshPartitionError> {
            let mut mpi_counts = Vec::with_capacity(counts.len());
            let mut displs = Vec::with_capacity(counts.len());
            let mut offset = 0usize;
            for &c in counts {
                let to_count = |v: usize| {
                    Count::try_from(v).map_err(|_| MeshPartitionError::IndexOverflow { value: v })
                };
                mpi_counts.push(to_count(c)?);
                displs.push(to_count(offset)?);
                offset += c;
            }
            Ok((mpi_counts, displs))
        }
    }

    pub struct MpiRecvHandle(Option<Vec<u8>>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
            let (mut data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            data.truncate(buf.len());
            MpiRecvHandle(Some(data))
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) -> Result<(), MeshPartitionError> {
            self.world.barrier();
            Ok(())
        }

        fn allreduce_sum(&self, vals: &mut [u64]) -> Result<(), MeshPartitionError> {
            let send = vals.to_vec();
            self.world
                .all_reduce_into(&send[..], vals, SystemOperation::sum());
            Ok(())
        }

        fn gather_varcount(
            &self,
            root: usize,
            send: &[u8],
            counts: &[usize],
        ) -> Result<Option<Vec<u8>>, MeshPartitionError> {
            super::check_layout(self, root, counts)?;
            let root_process = self.world.process_at_rank(root as i32);
            if self.rank != root {
                root_process.gather_varcount_into(send);
                return Ok(None);
            }
            let (mpi_counts, displs) = Self::counts_and_displs(counts)?;
            let mut recv = vec![0u8; counts.iter().sum()];
            {
                let mut partition = PartitionMut::new(&mut recv[..], mpi_counts, displs);
                root_process.gather_varcount_into_root(send, &mut partition);
            }
            Ok(Some(recv))
        }

        fn allgather_varcount(
            &self,
            send: &[u8],
            counts: &[usize],
        ) -> Result<Vec<u8>, MeshPartitionError> {
            let (mpi_counts, displs) = Self::counts_and_displs(counts)?;
            let mut recv = vec![0u8; counts.iter().sum()];
            {
                let mut partition = PartitionMut::new(&mut recv[..], mpi_counts, displs);
                self.world.all_gather_varcount_into(send, &mut partition);
            }
            Ok(recv)
        }

        fn scatter_varcount(
            &self,
            root: usize,
            send: Option<&[u8]>,
            counts: &[usize],
        ) -> Result<Vec<u8>, MeshPartitionError> {
            super::check_layout(self, root, counts)?;
            let root_process = self.world.process_at_rank(root as i32);
            let mut recv = vec![0u8; counts[self.rank]];
            if self.rank == root {
                let send = send.ok_or(MeshPartitionError::RootDataMissing {
                    operation: "scatter_varcount",
                    rank: self.rank,
                })?;
                let (mpi_counts, displs) = Self::counts_and_displs(counts)?;
                let partition = Partition::new(send, mpi_counts, displs);
                root_process.scatter_varcount_into_root(&partition, &mut recv[..]);
            } else {
                root_process.scatter_varcount_into(&mut recv[..]);
            }
            Ok(recv)
        }

        fn abort(&self, code: i32) -> ! {
            log::error!("[rank {}] calling MPI_Abort with code {code}", self.rank);
            self.world.abort(code)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let mut comms = RayonComm::world(2).into_iter();
        let (comm0, comm1) = (comms.next().unwrap(), comms.next().unwrap());

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn no_comm_collectives_are_identity() {
        let comm = NoComm;
        let mut vals = [3u64, 4];
        comm.allreduce_sum(&mut vals).unwrap();
        assert_eq!(vals, [3, 4]);
        let all = comm.allgather_varcount(&[9, 8], &[2]).unwrap();
        assert_eq!(all, vec![9, 8]);
        let mine = comm.scatter_varcount(0, Some(&[5, 6, 7]), &[3]).unwrap();
        assert_eq!(mine, vec![5, 6, 7]);
    }

    #[test]
    fn root_outside_world_is_rejected() {
        let err = NoComm.gather_varcount(1, &[], &[0]).unwrap_err();
        assert_eq!(
            err,
            MeshPartitionError::RankOutOfRange { rank: 1, nranks: 1 }
        );
    }

    #[test]
    fn allreduce_three_ranks() {
        let sums = RayonComm::run(3, |comm| {
            let mut vals = [comm.rank() as u64, 1];
            comm.allreduce_sum(&mut vals).unwrap();
            vals
        });
        assert!(sums.iter().all(|v| *v == [3, 3]));
    }
}
