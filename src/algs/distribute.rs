//! Build the local partition of each rank after partitioning.
//!
//! Two collections share one numbering scheme:
//!
//! * **elements**: the elements a partition labels with this rank, in
//!   ascending global order, then the one-hop dual-graph neighbours of those
//!   elements that this rank does not own (halo);
//! * **vertices**: the vertices referenced by this rank's element rows
//!   (row-major scan order), then those referenced by dual-graph neighbour
//!   elements (halo).
//!
//! Local ids are dense and first-seen; owned entities are numbered in a first
//! pass and halo entities in a second, so owned always precede halo.
//!
//! The entity payload (connectivity rows or coordinates) lives on one rank
//! only. The ids each rank needs are gathered there, the root assembles the
//! rows and scatters them back.

use crate::algs::collective::{
    agree, all_gather_variable, broadcast_from_root, fetch_rows, gather_to_root,
    scatter_from_root,
};
use crate::algs::communicator::Communicator;
use crate::algs::dual_graph::DualGraph;
use crate::data::array::Array2;
use crate::data::connectivity::{ConnectivityFormat, MeshIndex};
use crate::data::distributed_array::DistributedArray;
use crate::data::range_distribution::RangeDistribution;
use crate::data::root::RootHandle;
use crate::mesh_error::MeshPartitionError;
use crate::partitioning::{Idx, to_idx, validate_owners};
use bytemuck::Pod;
use hashbrown::HashMap;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Element,
    Vertex,
}

/// Options shared by both collections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectOptions {
    /// Rank holding the global payload arrays.
    pub root: usize,
    /// Spatial dimension (coordinate components per vertex).
    pub ndim: usize,
    /// Layout of the element-node connectivity rows.
    pub format: ConnectivityFormat,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            root: 0,
            ndim: 3,
            format: ConnectivityFormat::tagged_one_based(),
        }
    }
}

/// One rank's reconciled view of a set of entities.
///
/// # Invariants
/// - `local_to_global[global_to_local[g]] == g` for every present `g`.
/// - `local_to_global` has no duplicates.
/// - Local ids `0..n_owned` are owned, `n_owned..` are halo.
/// - `payload` has one row per local id.
#[derive(Debug, Clone)]
pub struct LocalPartition<'a, T: Pod, I: Pod> {
    pub kind: EntityKind,
    pub local_to_global: Vec<usize>,
    pub global_to_local: HashMap<usize, usize>,
    pub n_owned: usize,
    /// Redistributed rows, in local-id order.
    pub payload: DistributedArray<T>,
    /// Element connectivity this partition was built from.
    pub elements: &'a DistributedArray<I>,
    pub ndim: usize,
    /// Dual-graph rows that seeded the halo.
    pub adjacency: DualGraph,
}

impl<T: Pod, I: Pod> LocalPartition<'_, T, I> {
    pub fn len(&self) -> usize {
        self.local_to_global.len()
    }
    pub fn is_empty(&self) -> bool {
        self.local_to_global.is_empty()
    }
    pub fn n_halo(&self) -> usize {
        self.len() - self.n_owned
    }
    pub fn owned(&self) -> &[usize] {
        &self.local_to_global[..self.n_owned]
    }
    pub fn halo(&self) -> &[usize] {
        &self.local_to_global[self.n_owned..]
    }
    pub fn local_id(&self, global: usize) -> Option<usize> {
        self.global_to_local.get(&global).copied()
    }
    pub fn global_id(&self, local: usize) -> Option<usize> {
        self.local_to_global.get(local).copied()
    }
    pub fn is_owned(&self, local: usize) -> bool {
        local < self.n_owned
    }

    /// Check the map and payload invariants.
    pub fn validate(&self) -> Result<(), MeshPartitionError> {
        if self.global_to_local.len() != self.local_to_global.len() {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "LocalPartition maps",
                expected: self.local_to_global.len(),
                found: self.global_to_local.len(),
            });
        }
        for (l, &g) in self.local_to_global.iter().enumerate() {
            if self.global_to_local.get(&g) != Some(&l) {
                return Err(MeshPartitionError::InvalidIndex { value: g as i64 });
            }
        }
        if self.n_owned > self.len() {
            return Err(MeshPartitionError::RowOutOfBounds {
                row: self.n_owned,
                nrow: self.len(),
            });
        }
        crate::algs::wire::expect_exact_len("LocalPartition payload", self.payload.nrow(), self.len())
    }
}

/// First-seen numbering of global ids.
#[derive(Default)]
struct Numbering {
    local_to_global: Vec<usize>,
    global_to_local: HashMap<usize, usize>,
}

impl Numbering {
    fn insert(&mut self, g: usize) {
        let next = self.local_to_global.len();
        self.global_to_local.entry(g).or_insert_with(|| {
            self.local_to_global.push(g);
            next
        });
    }
}

/// The payload must sit on the rank `options` names as root.
pub(crate) fn check_payload_root<T>(
    operation: &'static str,
    payload: &RootHandle<T>,
    options: &CollectOptions,
) -> Result<(), MeshPartitionError> {
    if payload.root() != options.root {
        return Err(MeshPartitionError::RootMismatch {
            operation,
            expected: options.root,
            found: payload.root(),
        });
    }
    Ok(())
}

/// Collective: elements labelled with this rank by `part`, plus their halo.
///
/// `elements`, `dual` and `part` describe this rank's rows under the
/// current distribution; `part[i]` is the new owner of local element `i`.
/// The payload is the raw connectivity rows taken from `global_conn`.
pub fn collect_elements_per_rank<'a, I, C>(
    elements: &'a DistributedArray<I>,
    dual: &DualGraph,
    part: &[Idx],
    global_conn: &RootHandle<Array2<I>>,
    options: &CollectOptions,
    comm: &C,
) -> Result<LocalPartition<'a, I, I>, MeshPartitionError>
where
    I: MeshIndex,
    C: Communicator + ?Sized,
{
    let rank = comm.rank();
    let nloc = elements.nrow();
    let checked = check_payload_root("collect_elements_per_rank", global_conn, options)
        .and_then(|()| crate::algs::wire::expect_exact_len("partition labels", part.len(), nloc))
        .and_then(|()| crate::algs::wire::expect_exact_len("dual graph rows", dual.len(), nloc))
        .and_then(|()| validate_owners(part, comm.size()).map_err(|e| e.at("collect_elements")));
    agree("collect_elements_per_rank", checked, comm)?;

    let labels = all_gather_variable(part, comm)?;
    crate::algs::wire::expect_exact_len("gathered labels", labels.len(), elements.nglob())?;
    let owned: Vec<usize> = labels
        .data()
        .iter()
        .enumerate()
        .filter_map(|(g, &owner)| (owner as usize == rank).then_some(g))
        .collect();

    // Dual rows of the new elements come from their previous owners.
    let offset = elements.offset();
    let lookup = |g: usize| {
        dual.neighbors(g - offset)
            .map(to_idx)
            .collect::<Result<Vec<Idx>, _>>()
    };
    let mut rows = fetch_rows(elements.distribution(), lookup, &owned, comm)?;

    let mut numbering = Numbering::default();
    for &g in &owned {
        numbering.insert(g);
    }
    let n_owned = owned.len();
    let mut seeding = Vec::with_capacity(n_owned);
    for &g in &owned {
        let row = rows.remove(&g).unwrap_or_default();
        for &nbr in &row {
            numbering.insert(nbr as usize);
        }
        seeding.push(row.into_iter().map(|n| n as usize).collect::<Vec<_>>());
    }
    log::debug!(
        "[rank {rank}] collect_elements: {n_owned} owned, {} halo",
        numbering.local_to_global.len() - n_owned
    );
    if n_owned == 0 {
        log::warn!("[rank {rank}] was assigned no elements by the partition");
    }

    let (payload, width, layout) =
        redistribute_rows(global_conn, &numbering.local_to_global, comm)?;
    let payload = DistributedArray::from_local(Arc::new(layout), width, rank, payload)?;

    Ok(LocalPartition {
        kind: EntityKind::Element,
        local_to_global: numbering.local_to_global,
        global_to_local: numbering.global_to_local,
        n_owned,
        payload,
        elements,
        ndim: options.ndim,
        adjacency: DualGraph::from_rows(&seeding)?,
    })
}

/// Collective: vertices of this rank's elements, plus the vertices of the
/// dual-graph neighbour elements.
///
/// `dual` has one row per local element of `elements`. Rows of neighbour
/// elements held by other ranks are fetched from them. The payload is
/// `coords` rows, which must have `options.ndim` components.
pub fn collect_vertices_per_rank<'a, T, I, C>(
    elements: &'a DistributedArray<I>,
    dual: &DualGraph,
    coords: &RootHandle<Array2<T>>,
    options: &CollectOptions,
    comm: &C,
) -> Result<LocalPartition<'a, T, I>, MeshPartitionError>
where
    T: Pod + Send + Sync,
    I: MeshIndex,
    C: Communicator + ?Sized,
{
    let rank = comm.rank();
    let format = &options.format;
    let nloc = elements.nrow();

    let owned = check_payload_root("collect_vertices_per_rank", coords, options)
        .and_then(|()| crate::algs::wire::expect_exact_len("dual graph rows", dual.len(), nloc))
        .and_then(|()| {
            let mut numbering = Numbering::default();
            for row in elements.rows() {
                for v in format.decode_row(row)? {
                    numbering.insert(v);
                }
            }
            Ok(numbering)
        });
    let mut numbering = agree("collect_vertices_per_rank", owned, comm)?;
    let n_owned = numbering.local_to_global.len();

    let local_range = elements.distribution().range(rank);
    let mut remote: Vec<usize> = (0..nloc)
        .flat_map(|i| dual.neighbors(i))
        .filter(|g| !local_range.contains(g))
        .collect();
    remote.sort_unstable();
    remote.dedup();
    let offset = elements.offset();
    let fetched = fetch_rows(
        elements.distribution(),
        |g| Ok(elements.row(g - offset)?.to_vec()),
        &remote,
        comm,
    )?;

    let halo: Result<(), MeshPartitionError> = (|| {
        for i in 0..nloc {
            for nbr in dual.neighbors(i) {
                let row = match fetched.get(&nbr) {
                    Some(r) => r.as_slice(),
                    None => elements.row(nbr - offset)?,
                };
                for v in format.decode_row(row)? {
                    numbering.insert(v);
                }
            }
        }
        Ok(())
    })();
    agree("collect_vertices_per_rank halo", halo, comm)?;
    log::debug!(
        "[rank {rank}] collect_vertices: {n_owned} owned, {} halo",
        numbering.local_to_global.len() - n_owned
    );

    let (payload, width, layout) = redistribute_rows(coords, &numbering.local_to_global, comm)?;
    if width != options.ndim {
        return Err(MeshPartitionError::LengthMismatch {
            operation: "coordinate components",
            expected: options.ndim,
            found: width,
        });
    }
    let payload = DistributedArray::from_local(Arc::new(layout), width, rank, payload)?;

    Ok(LocalPartition {
        kind: EntityKind::Vertex,
        local_to_global: numbering.local_to_global,
        global_to_local: numbering.global_to_local,
        n_owned,
        payload,
        elements,
        ndim: options.ndim,
        adjacency: dual.clone(),
    })
}

/// Collective: fetch rows `wanted` of a root-held array.
///
/// Returns this rank's rows (in `wanted` order, flattened), the row width
/// and the per-rank row counts.
pub fn redistribute_rows<T, C>(
    global: &RootHandle<Array2<T>>,
    wanted: &[usize],
    comm: &C,
) -> Result<(Vec<T>, usize, RangeDistribution), MeshPartitionError>
where
    T: Pod + Send + Sync,
    C: Communicator + ?Sized,
{
    let root = global.root();
    let rank = comm.rank();

    let mut shape = [0u64; 2];
    let present = if rank == root {
        global.require("redistribute_rows", rank).map(|a| {
            shape = [a.ncol() as u64, a.nrow() as u64];
        })
    } else {
        Ok(())
    };
    agree("redistribute_rows", present, comm)?;
    broadcast_from_root(&mut shape, root, comm)?;
    let (width, nrow) = (shape[0] as usize, shape[1] as usize);

    let in_range = match wanted.iter().find(|&&g| g >= nrow) {
        Some(&g) => Err(MeshPartitionError::GlobalIdOutOfRange { id: g, nglob: nrow }),
        None => Ok(()),
    };
    agree("redistribute_rows request", in_range, comm)?;

    let ids: Vec<u64> = wanted.iter().map(|&g| g as u64).collect();
    let (layout, requested) = gather_to_root(&ids, root, comm)?.into_parts();

    let assembled = match (requested.get(), global.get()) {
        (Some(ids), Some(array)) => assemble_rows(array, ids).map(Some),
        _ => Ok(None),
    };
    let assembled = agree("redistribute_rows assemble", assembled, comm)?;
    log::debug!(
        "[rank {rank}] redistribute_rows: {} rows of width {width}",
        layout.size(rank)
    );
    let payload = scatter_from_root(
        &RootHandle::from_parts(root, assembled),
        &layout.scaled(width),
        comm,
    )?;
    Ok((payload, width, layout))
}

#[cfg(feature = "rayon")]
fn assemble_rows<T: Pod + Send + Sync>(
    array: &Array2<T>,
    ids: &[u64],
) -> Result<Vec<T>, MeshPartitionError> {
    let rows: Vec<&[T]> = ids
        .par_iter()
        .map(|&g| array.row(g as usize))
        .collect::<Result<_, _>>()?;
    Ok(rows.concat())
}

#[cfg(not(feature = "rayon"))]
fn assemble_rows<T: Pod + Send + Sync>(
    array: &Array2<T>,
    ids: &[u64],
) -> Result<Vec<T>, MeshPartitionError> {
    let mut out = Vec::with_capacity(ids.len() * array.ncol());
    for &g in ids {
        out.extend_from_slice(array.row(g as usize)?);
    }
    Ok(out)
}
