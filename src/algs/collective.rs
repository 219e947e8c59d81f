//! Typed variable-length collectives.
//!
//! Every exchange first agrees on a per-rank layout with
//! [`RangeDistribution::exchange`] (one sum-reduction over a per-rank-zeroed
//! vector), then moves the payload bytes with a single variable-count
//! collective of the [`Communicator`].
//!
//! All functions here are collective: every rank of `comm` must call them in
//! the same order. A fallible local step that precedes a collective is
//! settled with [`agree`] first, so a failure on one rank surfaces on all
//! ranks instead of leaving the others blocked.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{byte_counts, cast_slice, collect_from_bytes};
use crate::data::range_distribution::RangeDistribution;
use crate::data::root::RootHandle;
use crate::mesh_error::MeshPartitionError;
use bytemuck::Pod;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::mem::size_of;

/// Rank-ordered concatenation of every rank's contribution.
///
/// `layout.sizes()[r]` elements came from rank `r`, starting at
/// `layout.offsets()[r]`; `data.len() == layout.nglob()`.
#[derive(Clone, Debug, PartialEq)]
pub struct GatheredBuffer<T> {
    data: Vec<T>,
    layout: RangeDistribution,
}

impl<T> GatheredBuffer<T> {
    fn new(data: Vec<T>, layout: RangeDistribution) -> Result<Self, MeshPartitionError> {
        if data.len() != layout.nglob() {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "GatheredBuffer",
                expected: layout.nglob(),
                found: data.len(),
            });
        }
        Ok(Self { data, layout })
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }
    pub fn layout(&self) -> &RangeDistribution {
        &self.layout
    }
    pub fn counts(&self) -> &[usize] {
        self.layout.sizes()
    }
    pub fn offsets(&self) -> &[usize] {
        self.layout.offsets()
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// What rank `rank` contributed (empty for ranks outside the layout).
    pub fn contribution(&self, rank: usize) -> &[T] {
        &self.data[self.layout.range(rank)]
    }

    /// `(rank, contribution)` pairs in rank order.
    pub fn contributions(&self) -> impl Iterator<Item = (usize, &[T])> + '_ {
        (0..self.layout.nranks()).map(move |r| (r, self.contribution(r)))
    }

    pub fn into_parts(self) -> (Vec<T>, RangeDistribution) {
        (self.data, self.layout)
    }
}

/// Result of [`gather_to_root`]: the layout on every rank, the data on root only.
#[derive(Clone, Debug, PartialEq)]
pub struct RootGather<T> {
    layout: RangeDistribution,
    data: RootHandle<Vec<T>>,
}

impl<T> RootGather<T> {
    pub fn layout(&self) -> &RangeDistribution {
        &self.layout
    }
    pub fn data(&self) -> &RootHandle<Vec<T>> {
        &self.data
    }
    pub fn into_parts(self) -> (RangeDistribution, RootHandle<Vec<T>>) {
        (self.layout, self.data)
    }
    /// The gathered buffer; `None` off root.
    pub fn into_buffer(self) -> Option<GatheredBuffer<T>> {
        let layout = self.layout;
        self.data
            .into_inner()
            .map(|data| GatheredBuffer { data, layout })
    }
}

/// Concatenate every rank's `local` slice on `root`, in rank order.
pub fn gather_to_root<T: Pod, C: Communicator + ?Sized>(
    local: &[T],
    root: usize,
    comm: &C,
) -> Result<RootGather<T>, MeshPartitionError> {
    let layout = RangeDistribution::exchange(local.len(), comm)?;
    log::debug!(
        "[rank {}] gather_to_root: {} of {} items to rank {root}",
        comm.rank(),
        local.len(),
        layout.nglob()
    );
    let counts = byte_counts(layout.sizes(), size_of::<T>());
    let data = comm
        .gather_varcount(root, cast_slice(local), &counts)?
        .map(|bytes| collect_from_bytes::<T>(&bytes))
        .transpose()?;
    Ok(RootGather {
        layout,
        data: RootHandle::from_parts(root, data),
    })
}

/// Inverse of [`gather_to_root`]: rank `r` receives
/// `layout.sizes()[r]` elements of the root-held buffer.
///
/// Every rank passes the same `layout`; only root reads the data. A root
/// buffer whose length differs from `layout.nglob()` fails on every rank.
pub fn scatter_from_root<T: Pod, C: Communicator + ?Sized>(
    root_data: &RootHandle<Vec<T>>,
    layout: &RangeDistribution,
    comm: &C,
) -> Result<Vec<T>, MeshPartitionError> {
    if layout.nranks() != comm.size() {
        return Err(MeshPartitionError::LengthMismatch {
            operation: "scatter_from_root layout",
            expected: comm.size(),
            found: layout.nranks(),
        });
    }
    let root = root_data.root();
    let rank = comm.rank();
    let checked = if rank == root {
        root_data
            .require("scatter_from_root", rank)
            .and_then(|v| {
                crate::algs::wire::expect_exact_len("scatter_from_root", v.len(), layout.nglob())
            })
    } else {
        Ok(())
    };
    agree("scatter_from_root", checked, comm)?;

    log::debug!(
        "[rank {rank}] scatter_from_root: receiving {} of {} items from rank {root}",
        layout.size(rank),
        layout.nglob()
    );
    let counts = byte_counts(layout.sizes(), size_of::<T>());
    let send = root_data.get().map(|v| cast_slice(v.as_slice()));
    let bytes = comm.scatter_varcount(root, send, &counts)?;
    collect_from_bytes(&bytes)
}

/// Every rank receives the rank-ordered concatenation of all `local` slices.
pub fn all_gather_variable<T: Pod, C: Communicator + ?Sized>(
    local: &[T],
    comm: &C,
) -> Result<GatheredBuffer<T>, MeshPartitionError> {
    let layout = RangeDistribution::exchange(local.len(), comm)?;
    log::debug!(
        "[rank {}] all_gather_variable: {} of {} items",
        comm.rank(),
        local.len(),
        layout.nglob()
    );
    let counts = byte_counts(layout.sizes(), size_of::<T>());
    let bytes = comm.allgather_varcount(cast_slice(local), &counts)?;
    GatheredBuffer::new(collect_from_bytes(&bytes)?, layout)
}

/// Replace `vals` on every rank with root's `vals`.
pub fn broadcast_from_root<C: Communicator + ?Sized>(
    vals: &mut [u64],
    root: usize,
    comm: &C,
) -> Result<(), MeshPartitionError> {
    if root >= comm.size() {
        return Err(MeshPartitionError::RankOutOfRange {
            rank: root,
            nranks: comm.size(),
        });
    }
    if comm.rank() != root {
        vals.fill(0);
    }
    comm.allreduce_sum(vals)
}

/// Collective failure agreement.
///
/// Every rank publishes whether `local` failed; if any rank failed, every
/// rank returns an error: its own, or
/// [`PeerFailure`](MeshPartitionError::PeerFailure) listing the failed ranks.
pub fn agree<T, C: Communicator + ?Sized>(
    operation: &'static str,
    local: Result<T, MeshPartitionError>,
    comm: &C,
) -> Result<T, MeshPartitionError> {
    let rank = comm.rank();
    let mut flags = vec![0u64; comm.size()];
    if local.is_err() {
        if let Some(slot) = flags.get_mut(rank) {
            *slot = 1;
        }
    }
    comm.allreduce_sum(&mut flags)?;
    let failed: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter_map(|(r, &f)| (f != 0).then_some(r))
        .collect();
    match local {
        Err(e) => {
            log::error!("[rank {rank}] {operation} failed locally: {e}");
            Err(e)
        }
        Ok(_) if !failed.is_empty() => {
            log::warn!("[rank {rank}] {operation} failed on rank(s) {failed:?}");
            Err(MeshPartitionError::PeerFailure {
                operation,
                ranks: failed,
            })
        }
        Ok(v) => Ok(v),
    }
}

/// Fetch rows of a row-partitioned table from their owners.
///
/// `layout` says which rank owns which global row; `lookup(g)` returns
/// global row `g` and is only called on its owner. Rows may differ in
/// length. Requests and replies are all-gathered; each requested row is
/// answered once by its owner. Returns the rows this rank asked for.
pub fn fetch_rows<T, C, F>(
    layout: &RangeDistribution,
    lookup: F,
    wanted: &[usize],
    comm: &C,
) -> Result<HashMap<usize, Vec<T>>, MeshPartitionError>
where
    T: Pod,
    C: Communicator + ?Sized,
    F: Fn(usize) -> Result<Vec<T>, MeshPartitionError>,
{
    let rank = comm.rank();
    let wanted: BTreeSet<usize> = wanted.iter().copied().collect();
    let checked = wanted
        .iter()
        .find(|&&g| g >= layout.nglob())
        .map_or(Ok(()), |&g| {
            Err(MeshPartitionError::GlobalIdOutOfRange {
                id: g,
                nglob: layout.nglob(),
            })
        });
    agree("fetch_rows request", checked, comm)?;

    let request: Vec<u64> = wanted.iter().map(|&g| g as u64).collect();
    let requests = all_gather_variable(&request, comm)?;

    // Each row once, even when several ranks asked for it.
    let mine: BTreeSet<usize> = requests
        .data()
        .iter()
        .map(|&g| g as usize)
        .filter(|&g| layout.range(rank).contains(&g))
        .collect();
    let answered: Result<Vec<(usize, Vec<T>)>, MeshPartitionError> =
        mine.into_iter().map(|g| lookup(g).map(|row| (g, row))).collect();
    let answered = agree("fetch_rows lookup", answered, comm)?;

    let ids: Vec<u64> = answered.iter().map(|(g, _)| *g as u64).collect();
    let lens: Vec<u64> = answered.iter().map(|(_, r)| r.len() as u64).collect();
    let values: Vec<T> = answered.into_iter().flat_map(|(_, r)| r).collect();

    let ids = all_gather_variable(&ids, comm)?;
    let lens = all_gather_variable(&lens, comm)?;
    let values = all_gather_variable(&values, comm)?;

    let mut out = HashMap::with_capacity(wanted.len());
    let mut at = 0usize;
    for (&g, &len) in ids.data().iter().zip(lens.data()) {
        let (g, len) = (g as usize, len as usize);
        let row = values
            .data()
            .get(at..at + len)
            .ok_or(MeshPartitionError::LengthMismatch {
                operation: "fetch_rows reply",
                expected: at + len,
                found: values.len(),
            })?;
        if wanted.contains(&g) {
            out.insert(g, row.to_vec());
        }
        at += len;
    }
    if let Some(&missing) = wanted.iter().find(|g| !out.contains_key(*g)) {
        return Err(MeshPartitionError::CommError {
            neighbor: layout.owner_of(missing)?,
            message: format!("row {missing} was requested but never answered"),
        });
    }
    Ok(out)
}

/// Unwrap `result`, or log the failing operation and abort every rank.
pub fn abort_on_error<T, C: Communicator + ?Sized>(
    operation: &str,
    result: Result<T, MeshPartitionError>,
    comm: &C,
) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            log::error!("[rank {}] {operation} failed: {e}; aborting all ranks", comm.rank());
            comm.abort(1)
        }
    }
}
