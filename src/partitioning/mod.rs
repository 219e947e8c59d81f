//! Seam to the external mesh partitioner.
//!
//! A [`MeshPartitioner`] offers the three entry points of a ParMETIS-style
//! library: mesh-to-dual conversion, direct k-way partitioning of a mesh
//! and adaptive repartitioning of a dual graph. Inputs use the library's
//! integer width ([`Idx`]) and 0-based global ids.
//!
//! [`GatheredPartitioner`] is the reference collaborator. It builds the dual
//! graph from all-gathered connectivity and partitions it with serial METIS
//! on one rank (feature `metis-support`).
#![cfg_attr(not(feature = "metis-support"), allow(unused_imports))]

pub mod error;
#[cfg(feature = "metis-support")]
pub mod metis;

pub use error::PartitionError;

use crate::algs::collective::{agree, gather_to_root, scatter_from_root};
use crate::algs::communicator::Communicator;
use crate::algs::dual_graph::{DualGraph, mesh_to_dual_gathered};
use crate::algs::graph_distribution::GraphDistribution;
use crate::data::root::RootHandle;
use crate::mesh_error::MeshPartitionError;
use serde::{Deserialize, Serialize};

/// Partitioner index type (`idx_t`).
pub type Idx = i32;
/// Partitioner real type (`real_t`).
pub type Real = f32;

/// Convert a count or id to the partitioner index type.
pub fn to_idx(v: usize) -> Result<Idx, MeshPartitionError> {
    Idx::try_from(v).map_err(|_| MeshPartitionError::IndexOverflow { value: v })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionParams {
    /// Number of parts; `None` means one part per rank.
    pub nparts: Option<usize>,
    /// Nodes two elements must share to be dual-graph neighbours.
    pub ncommon_nodes: usize,
    /// Allowed load imbalance (`ubvec`).
    pub imbalance_tolerance: Real,
    /// Target fraction per part (`tpwgts`); `None` means uniform.
    pub target_weights: Option<Vec<Real>>,
    /// Redistribution-to-edge-cut ratio for adaptive repartitioning (`itr`).
    pub redistribution_cost: Real,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            nparts: None,
            // hexahedra sharing a quadrilateral face
            ncommon_nodes: 4,
            imbalance_tolerance: 1.05,
            target_weights: None,
            redistribution_cost: 1.05,
        }
    }
}

impl PartitionParams {
    pub fn nparts_for(&self, nranks: usize) -> usize {
        self.nparts.unwrap_or(nranks)
    }

    pub fn target_weights_for(&self, nparts: usize) -> Vec<Real> {
        match &self.target_weights {
            Some(w) => w.clone(),
            None => vec![1.0 / nparts.max(1) as Real; nparts],
        }
    }

    pub fn validate(&self, nranks: usize) -> Result<(), PartitionError> {
        let nparts = self.nparts_for(nranks);
        if nparts == 0 {
            return Err(PartitionError::InvalidParams("nparts must be at least 1".into()));
        }
        if self.ncommon_nodes == 0 {
            return Err(PartitionError::InvalidParams(
                "ncommon_nodes must be at least 1".into(),
            ));
        }
        if !(self.imbalance_tolerance >= 1.0) {
            return Err(PartitionError::InvalidParams(format!(
                "imbalance_tolerance {} is below 1.0",
                self.imbalance_tolerance
            )));
        }
        if !(self.redistribution_cost > 0.0) {
            return Err(PartitionError::InvalidParams(format!(
                "redistribution_cost {} must be positive",
                self.redistribution_cost
            )));
        }
        if let Some(w) = &self.target_weights {
            if w.len() != nparts {
                return Err(PartitionError::InvalidParams(format!(
                    "{} target weights for {nparts} parts",
                    w.len()
                )));
            }
            let sum: Real = w.iter().sum();
            if w.iter().any(|&x| x < 0.0) || (sum - 1.0).abs() > 1e-3 {
                return Err(PartitionError::InvalidParams(format!(
                    "target weights must be non-negative and sum to 1 (sum = {sum})"
                )));
            }
        }
        Ok(())
    }
}

/// The three partitioner entry points. Every method is collective.
pub trait MeshPartitioner {
    /// Dual graph rows of this rank's elements (global neighbour ids).
    fn mesh_to_dual<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<DualGraph, PartitionError>;

    /// Owner part of each local element.
    fn part_mesh_kway<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError>;

    /// New owner part of each local element, starting from `current`.
    fn adaptive_repart<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        dual: &DualGraph,
        current: &[Idx],
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError>;
}

/// Check every owner label is a valid part.
pub fn validate_owners(owners: &[Idx], nparts: usize) -> Result<(), PartitionError> {
    match owners
        .iter()
        .enumerate()
        .find(|&(_, &o)| o < 0 || o as usize >= nparts)
    {
        Some((element, &owner)) => Err(PartitionError::OwnerOutOfRange {
            element,
            owner,
            nparts,
        }),
        None => Ok(()),
    }
}

/// Reference partitioner: gathered dual graph, serial METIS on `root`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheredPartitioner {
    pub root: usize,
}

impl GatheredPartitioner {
    pub fn new(root: usize) -> Self {
        Self { root }
    }

    fn partition_dual<C: Communicator + ?Sized>(
        &self,
        entry_point: &'static str,
        graph: &GraphDistribution,
        dual: &DualGraph,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        let checked = params
            .validate(comm.size())
            .and_then(|()| {
                crate::algs::wire::expect_exact_len(entry_point, dual.len(), graph.n_local())
                    .map_err(PartitionError::from)
            })
            .map_err(|e| e.at(entry_point));
        agree(entry_point, checked, comm)?;
        self.gathered_kway(entry_point, graph, dual, params, comm)
    }

    #[cfg(not(feature = "metis-support"))]
    fn gathered_kway<C: Communicator + ?Sized>(
        &self,
        entry_point: &'static str,
        _graph: &GraphDistribution,
        _dual: &DualGraph,
        _params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        log::error!(
            "[rank {}] {entry_point} needs the `metis-support` feature",
            comm.rank()
        );
        Err(PartitionError::Unsupported(entry_point))
    }

    #[cfg(feature = "metis-support")]
    fn gathered_kway<C: Communicator + ?Sized>(
        &self,
        entry_point: &'static str,
        graph: &GraphDistribution,
        dual: &DualGraph,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        let rank = comm.rank();
        let nparts = params.nparts_for(comm.size());
        let degrees: Vec<Idx> = dual.xadj.windows(2).map(|w| w[1] - w[0]).collect();
        let degrees = gather_to_root(&degrees, self.root, comm)?;
        let adjncy = gather_to_root(&dual.adjncy, self.root, comm)?;

        let labels: Result<Option<Vec<Idx>>, MeshPartitionError> = if rank == self.root {
            (|| {
                let degrees = degrees.data().require(entry_point, rank)?;
                let adjncy = adjncy.data().require(entry_point, rank)?;
                let mut xadj = Vec::with_capacity(degrees.len() + 1);
                xadj.push(0);
                for d in degrees {
                    let last = xadj.last().copied().unwrap_or(0);
                    xadj.push(last + d);
                }
                let global = DualGraph::from_csr(xadj, adjncy.clone())?;
                log::debug!(
                    "[rank {rank}] {entry_point}: METIS on {} elements, {nparts} parts",
                    global.len()
                );
                global
                    .metis_partition(
                        nparts,
                        &params.target_weights_for(nparts),
                        params.imbalance_tolerance,
                    )
                    .map(Some)
                    .map_err(|e| e.at(entry_point))
            })()
        } else {
            Ok(None)
        };
        let labels = agree(entry_point, labels, comm)?;
        let labels = RootHandle::from_parts(self.root, labels);
        let mine = scatter_from_root(&labels, graph.elements(), comm)?;
        validate_owners(&mine, nparts)?;
        Ok(mine)
    }
}

impl MeshPartitioner for GatheredPartitioner {
    fn mesh_to_dual<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<DualGraph, PartitionError> {
        Ok(mesh_to_dual_gathered(graph, params.ncommon_nodes, comm)?)
    }

    fn part_mesh_kway<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        let dual = self.mesh_to_dual(graph, params, comm)?;
        self.partition_dual("part_mesh_kway", graph, &dual, params, comm)
    }

    /// Partitions `dual` from scratch; `current` and the redistribution cost
    /// are only checked, not used.
    fn adaptive_repart<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        dual: &DualGraph,
        current: &[Idx],
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        let checked = validate_owners(current, params.nparts_for(comm.size()))
            .map_err(|e| e.at("adaptive_repart"));
        agree("adaptive_repart", checked, comm)?;
        self.partition_dual("adaptive_repart", graph, dual, params, comm)
    }
}
