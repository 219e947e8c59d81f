//! Partition a small hexahedral block mesh over four in-process ranks.
//!
//! Run with `cargo run --example in_process_pipeline`.

use mesh_partition::algs::communicator::{Communicator, RayonComm};
use mesh_partition::algs::dual_graph::{DualGraph, mesh_to_dual_gathered};
use mesh_partition::algs::duplicate_faces::resolve_interface_faces;
use mesh_partition::algs::graph_distribution::GraphDistribution;
use mesh_partition::algs::pipeline::{DistributionConfig, distribute_mesh};
use mesh_partition::data::{Array2, DistributedArray};
use mesh_partition::io::{DatasetPath, MemoryReader, read_distributed, read_on_root};
use mesh_partition::mesh_error::MeshPartitionError;
use mesh_partition::partitioning::{Idx, MeshPartitioner, PartitionError, PartitionParams};

const NX: usize = 8;

/// Slabs of consecutive elements, one per part.
struct Slabs;

impl MeshPartitioner for Slabs {
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
        let nparts = params.nparts_for(comm.size());
        let nglob = graph.elements().nglob().max(1);
        Ok(graph
            .global_elements()
            .map(|e| (e * nparts / nglob) as Idx)
            .collect())
    }

    fn adaptive_repart<C: Communicator + ?Sized>(
        &self,
        graph: &GraphDistribution,
        _dual: &DualGraph,
        _current: &[Idx],
        params: &PartitionParams,
        comm: &C,
    ) -> Result<Vec<Idx>, PartitionError> {
        self.part_mesh_kway(graph, params, comm)
    }
}

/// A row of `NX` unit hexahedra: tagged one-based element-node rows,
/// element-face rows and node coordinates.
fn hex_row() -> (Array2<i32>, Array2<i32>, Array2<f64>) {
    let w = (NX + 1) as i32;
    let node = |i: i32, j: i32, k: i32| 1 + i + w * (j + 2 * k);
    let mut conn = Vec::new();
    let mut faces = Vec::new();
    for e in 0..NX as i32 {
        conn.extend_from_slice(&[
            8,
            node(e, 0, 0),
            node(e + 1, 0, 0),
            node(e + 1, 1, 0),
            node(e, 1, 0),
            node(e, 0, 1),
            node(e + 1, 0, 1),
            node(e + 1, 1, 1),
            node(e, 1, 1),
        ]);
        // x-faces are shared along the row, the other four are boundary faces
        let side = 1 + (NX as i32 + 1) + 4 * e;
        faces.extend_from_slice(&[e, e + 1, -(e + 2), side, side + 1, side + 2, side + 3]);
    }
    let coords = (0..4 * (NX + 1))
        .flat_map(|v| {
            let (i, j, k) = (v % (NX + 1), (v / (NX + 1)) % 2, v / (2 * (NX + 1)));
            [i as f64, j as f64, k as f64]
        })
        .collect();
    (
        Array2::from_vec(conn, 9).unwrap(),
        Array2::from_vec(faces, 7).unwrap(),
        Array2::from_vec(coords, 3).unwrap(),
    )
}

fn run(comm: RayonComm, reader: &MemoryReader) -> Result<String, MeshPartitionError> {
    let rank = comm.rank();
    let config = DistributionConfig::default();
    let ien = DatasetPath::new("ien").in_group("mesh");
    let conn: DistributedArray<i32> = read_distributed(reader, &ien, &comm)?;
    let conn_root = read_on_root(reader, &ien, config.root, &comm)?;
    let coords_root = read_on_root::<f64, _, _>(reader, &DatasetPath::new("xcn"), config.root, &comm)?;

    let mesh = distribute_mesh(&conn, &conn_root, &coords_root, &Slabs, &config, &comm)?;

    // Slabs keep the block layout, so the face rows read in blocks belong
    // to this rank's elements.
    let ief: DistributedArray<i32> = read_distributed(reader, &DatasetPath::new("ief"), &comm)?;
    let (classification, _) = resolve_interface_faces(&ief, &config.face_format, &comm)?;

    Ok(format!(
        "rank {rank}: elements {:?} (+halo {:?}), {} vertices, {} interface faces",
        mesh.elements.owned(),
        mesh.elements.halo(),
        mesh.vertices.len(),
        classification.shared.len()
    ))
}

fn main() {
    let (conn, faces, coords) = hex_row();
    let reader = MemoryReader::new()
        .with(DatasetPath::new("ien").in_group("mesh"), &conn)
        .with(DatasetPath::new("ief"), &faces)
        .with(DatasetPath::new("xcn"), &coords);

    for line in RayonComm::run(4, |comm| run(comm, &reader)) {
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("distribution failed: {e}"),
        }
    }
}
