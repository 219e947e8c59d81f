//! End-to-end distribution of a mesh read in row blocks.
//!
//! graph distribution → dual graph → partition (k-way or adaptive) →
//! element collection → vertex collection. Interface-face resolution runs
//! separately on face connectivity, see
//! [`resolve_interface_faces`](crate::algs::duplicate_faces::resolve_interface_faces).

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::algs::distribute::{
    CollectOptions, LocalPartition, check_payload_root, collect_elements_per_rank,
    collect_vertices_per_rank,
};
use crate::algs::dual_graph::DualGraph;
use crate::algs::graph_distribution::{GraphDistribution, build_graph_distribution};
use crate::data::array::Array2;
use crate::data::connectivity::{ConnectivityFormat, MeshIndex};
use crate::data::distributed_array::DistributedArray;
use crate::data::root::RootHandle;
use crate::mesh_error::MeshPartitionError;
use crate::partitioning::{Idx, MeshPartitioner, PartitionParams, to_idx};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Rank holding the global connectivity and coordinates.
    pub root: usize,
    pub ndim: usize,
    pub element_format: ConnectivityFormat,
    pub face_format: ConnectivityFormat,
    /// Repartition adaptively from the current block layout instead of a fresh k-way.
    pub adaptive: bool,
    pub params: PartitionParams,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            root: 0,
            ndim: 3,
            element_format: ConnectivityFormat::tagged_one_based(),
            face_format: ConnectivityFormat::tagged_one_based(),
            adaptive: false,
            params: PartitionParams::default(),
        }
    }
}

impl DistributionConfig {
    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            root: self.root,
            ndim: self.ndim,
            format: self.element_format,
        }
    }
}

/// Everything [`distribute_mesh`] produced on one rank.
#[derive(Debug, Clone)]
pub struct MeshDistribution<'a, T: Pod, I: Pod> {
    pub graph: GraphDistribution,
    pub dual: DualGraph,
    /// New owner of each element of the input block.
    pub part: Vec<Idx>,
    pub elements: LocalPartition<'a, I, I>,
    /// Vertices of the input element block and its dual-graph neighbours.
    pub vertices: LocalPartition<'a, T, I>,
}

/// Collective: partition and redistribute a block-distributed mesh.
///
/// `conn` is this rank's block of element-node rows; `conn_root` and
/// `coords_root` are the global connectivity and coordinates on
/// `config.root`.
pub fn distribute_mesh<'a, T, I, P, C>(
    conn: &'a DistributedArray<I>,
    conn_root: &RootHandle<Array2<I>>,
    coords_root: &RootHandle<Array2<T>>,
    partitioner: &P,
    config: &DistributionConfig,
    comm: &C,
) -> Result<MeshDistribution<'a, T, I>, MeshPartitionError>
where
    T: Pod + Send + Sync,
    I: MeshIndex,
    P: MeshPartitioner,
    C: Communicator + ?Sized,
{
    let rank = comm.rank();
    let options = config.collect_options();
    let roots = check_payload_root("distribute_mesh", conn_root, &options)
        .and_then(|()| check_payload_root("distribute_mesh", coords_root, &options));
    agree("distribute_mesh", roots, comm)?;

    let graph = build_graph_distribution(conn, &config.element_format, comm)?;
    let dual = partitioner
        .mesh_to_dual(&graph, &config.params, comm)
        .map_err(|e| e.at("mesh_to_dual"))?;

    let part = if config.adaptive {
        let current = vec![to_idx(rank)?; graph.n_local()];
        partitioner
            .adaptive_repart(&graph, &dual, &current, &config.params, comm)
            .map_err(|e| e.at("adaptive_repart"))?
    } else {
        partitioner
            .part_mesh_kway(&graph, &config.params, comm)
            .map_err(|e| e.at("part_mesh_kway"))?
    };
    log::info!(
        "[rank {rank}] partitioned {} local elements ({} global)",
        part.len(),
        graph.elements().nglob()
    );

    let elements = collect_elements_per_rank(conn, &dual, &part, conn_root, &options, comm)?;
    let vertices = collect_vertices_per_rank(conn, &dual, coords_root, &options, comm)?;

    Ok(MeshDistribution {
        graph,
        dual,
        part,
        elements,
        vertices,
    })
}
