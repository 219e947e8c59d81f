// Partition a 4-quad strip over MPI ranks with the gathered METIS
// partitioner and classify the faces shared between ranks.
//
//   mpirun -n 2 cargo run --example partition_two_ranks --features mpi-support,metis-support
fn main() {
    use mesh_partition::algs::collective::abort_on_error;
    use mesh_partition::algs::communicator::{Communicator, MpiComm};
    use mesh_partition::algs::duplicate_faces::resolve_interface_faces;
    use mesh_partition::algs::pipeline::{DistributionConfig, distribute_mesh};
    use mesh_partition::data::{Array2, DistributedArray, RangeDistribution, RootHandle};
    use mesh_partition::mesh_error::MeshPartitionError;
    use mesh_partition::partitioning::{GatheredPartitioner, PartitionParams};
    use std::sync::Arc;

    // 1. Initialize MPI
    let comm = match MpiComm::new() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("MPI initialisation failed: {e}");
            return;
        }
    };
    let rank = comm.rank();

    // 2. Global strip: quad e has 0-based nodes e, e+1, e+6, e+5. Its faces
    //    are its four edges; vertical edge e is shared by quads e-1 and e.
    let rows: Vec<[i32; 5]> = (0..4).map(|e| [7, e + 1, e + 2, e + 7, e + 6]).collect();
    let faces: Vec<[i32; 5]> = (0..4)
        .map(|e| [e, e + 1, -(e + 2), 6 + 2 * e, 7 + 2 * e])
        .collect();
    let coords: Vec<f64> = (0..10)
        .flat_map(|v| [(v % 5) as f64, (v / 5) as f64, 0.0])
        .collect();

    // 3. Each rank holds its block of rows; rank 0 holds the global arrays.
    let block = |data: &[[i32; 5]]| -> Result<DistributedArray<i32>, MeshPartitionError> {
        let dist = Arc::new(RangeDistribution::build(data.len(), &comm)?);
        let local = data[dist.range(rank)].iter().flatten().copied().collect();
        DistributedArray::from_local(dist, 5, rank, local)
    };
    let conn = abort_on_error("block connectivity", block(&rows), &comm);
    let ief = abort_on_error("block faces", block(&faces), &comm);
    let conn_root = abort_on_error(
        "root connectivity",
        RootHandle::try_load(&comm, 0, || Array2::from_rows(&rows)),
        &comm,
    );
    let coords_root = abort_on_error(
        "root coordinates",
        RootHandle::try_load(&comm, 0, || Array2::from_vec(coords, 3)),
        &comm,
    );

    // 4. Partition and redistribute
    let config = DistributionConfig {
        params: PartitionParams {
            ncommon_nodes: 2,
            ..PartitionParams::default()
        },
        ..DistributionConfig::default()
    };
    let mesh = abort_on_error(
        "distribute_mesh",
        distribute_mesh(
            &conn,
            &conn_root,
            &coords_root,
            &GatheredPartitioner::new(0),
            &config,
            &comm,
        ),
        &comm,
    );
    println!(
        "Rank {rank} elements: owned {:?}, halo {:?}",
        mesh.elements.owned(),
        mesh.elements.halo()
    );
    println!("Rank {rank} vertices: {:?}", mesh.vertices.local_to_global);

    // 5. Interface faces of the input blocks
    let (faces, _) = abort_on_error(
        "resolve_interface_faces",
        resolve_interface_faces(&ief, &config.face_format, &comm),
        &comm,
    );
    println!("Rank {rank} shared faces: {:?}", faces.shared);

    // Synchronize before exit
    abort_on_error("barrier", comm.barrier(), &comm);
}
