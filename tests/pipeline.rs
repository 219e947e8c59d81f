mod util;

use mesh_partition::algs::communicator::{Communicator, RayonComm};
use mesh_partition::algs::dual_graph::{DualGraph, mesh_to_dual_gathered};
use mesh_partition::algs::graph_distribution::GraphDistribution;
use mesh_partition::algs::pipeline::{DistributionConfig, distribute_mesh};
use mesh_partition::data::RootHandle;
use mesh_partition::mesh_error::MeshPartitionError;
use mesh_partition::partitioning::{
    GatheredPartitioner, Idx, MeshPartitioner, PartitionError, PartitionParams,
};
use util::*;

/// Hands every rank's elements to the mirror rank `P - 1 - r`.
struct MirrorRanks;

impl MeshPartitioner for MirrorRanks {
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
        _params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        let mirror = (comm.size() - 1 - comm.rank()) as Idx;
        Ok(vec![mirror; graph.n_local()])
    }

    fn adaptive_repart<C: Communicator + ?Sized>(
        &self,
        _graph: &GraphDistribution,
        _dual: &DualGraph,
        current: &[Idx],
        _params: &PartitionParams,
        _comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        Ok(current.to_vec())
    }
}

/// Returns a label no rank can own.
struct OutOfRange;

impl MeshPartitioner for OutOfRange {
    fn mesh_to_dual<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        params: &PartitionParams,
        comm: &C,
    ) -> Result<DualGraph, PartitionError> {
        MirrorRanks.mesh_to_dual(graph, params, comm)
    }

    fn part_mesh_kway<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        _params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        Ok(vec![comm.size() as Idx; graph.n_local()])
    }

    fn adaptive_repart<C: Communicator + ?Sized>(
        &self,
        _graph: &GraphDistribution,
        _dual: &DualGraph,
        _current: &[Idx],
        _params: &PartitionParams,
        _comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        Err(PartitionError::Library("not used".into()))
    }
}

fn quad_config(adaptive: bool) -> DistributionConfig {
    DistributionConfig {
        adaptive,
        params: PartitionParams {
            ncommon_nodes: 2,
            ..PartitionParams::default()
        },
        ..DistributionConfig::default()
    }
}

/// `(element l2g, element n_owned, vertex l2g, part)` of every rank.
type RankSummary = (Vec<usize>, usize, Vec<usize>, Vec<Idx>);

fn run_pipeline<P: MeshPartitioner + Sync>(
    partitioner: &P,
    config: &DistributionConfig,
) -> Vec<Result<RankSummary, MeshPartitionError>> {
    let rows = quad_strip_rows(4);
    let coords = quad_strip_coords(4);
    RayonComm::run(2, |comm| -> Result<RankSummary, MeshPartitionError> {
        let conn = local_block(&rows, &comm);
        let conn_root = on_root(&rows, config.root, &comm);
        let coords_root = RootHandle::load(&comm, config.root, || coords.clone())?;
        let out = distribute_mesh(&conn, &conn_root, &coords_root, partitioner, config, &comm)?;
        out.elements.validate()?;
        out.vertices.validate()?;
        Ok((
            out.elements.local_to_global.clone(),
            out.elements.n_owned,
            out.vertices.local_to_global.clone(),
            out.part,
        ))
    })
}

#[test]
fn kway_labels_move_elements() {
    let out = run_pipeline(&MirrorRanks, &quad_config(false));
    let (e0, n0, v0, part0) = out[0].clone().unwrap();
    assert_eq!(part0, vec![1, 1]);
    assert_eq!(e0, vec![2, 3, 1]);
    assert_eq!(n0, 2);
    // vertices follow the input block and its dual neighbours
    assert_eq!(v0, vec![0, 1, 6, 5, 2, 7, 3, 8]);

    let (e1, n1, _, _) = out[1].clone().unwrap();
    assert_eq!(e1, vec![0, 1, 2]);
    assert_eq!(n1, 2);
}

#[test]
fn adaptive_mode_starts_from_current_owners() {
    let out = run_pipeline(&MirrorRanks, &quad_config(true));
    let (e0, _, _, part0) = out[0].clone().unwrap();
    assert_eq!(part0, vec![0, 0]);
    assert_eq!(e0, vec![0, 1, 2]);
}

#[test]
fn invalid_labels_fail_every_rank() {
    let out = run_pipeline(&OutOfRange, &quad_config(false));
    for r in out {
        assert!(matches!(
            r,
            Err(MeshPartitionError::Partitioner {
                entry_point: "collect_elements",
                ..
            })
        ));
    }
}

#[test]
fn coordinates_held_by_another_root() {
    let config = DistributionConfig {
        root: 1,
        ..quad_config(false)
    };
    let out = run_pipeline(&MirrorRanks, &config);
    assert!(out.iter().all(Result::is_ok));
}

#[test]
fn connectivity_on_the_wrong_root_fails_every_rank() {
    let rows = quad_strip_rows(4);
    let coords = quad_strip_coords(4);
    let config = DistributionConfig {
        root: 1,
        ..quad_config(false)
    };
    let out = RayonComm::run(2, |comm| {
        let conn = local_block(&rows, &comm);
        let conn_root = on_root(&rows, 0, &comm);
        let coords_root = RootHandle::load(&comm, 1, || coords.clone()).unwrap();
        distribute_mesh(&conn, &conn_root, &coords_root, &MirrorRanks, &config, &comm).map(|d| d.part)
    });
    for r in out {
        assert!(matches!(
            r,
            Err(MeshPartitionError::RootMismatch {
                operation: "distribute_mesh",
                expected: 1,
                found: 0,
            })
        ));
    }
}

#[cfg(not(feature = "metis-support"))]
#[test]
fn gathered_partitioner_needs_metis() {
    let out = run_pipeline(&GatheredPartitioner::new(0), &quad_config(false));
    for r in out {
        assert!(matches!(
            r,
            Err(MeshPartitionError::Partitioner {
                entry_point: "part_mesh_kway",
                ..
            })
        ));
    }
}

#[cfg(feature = "metis-support")]
#[test]
fn gathered_partitioner_owns_every_element_once() {
    let out = run_pipeline(&GatheredPartitioner::new(0), &quad_config(false));
    let mut owned: Vec<usize> = Vec::new();
    for r in out {
        let (elements, n_owned, _, _) = r.unwrap();
        owned.extend_from_slice(&elements[..n_owned]);
    }
    assert_permutation(&owned, &[0, 1, 2, 3]);
}
