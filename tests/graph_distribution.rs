mod util;

use mesh_partition::algs::communicator::RayonComm;
use mesh_partition::algs::dual_graph::mesh_to_dual_gathered;
use mesh_partition::algs::graph_distribution::build_graph_distribution;
use mesh_partition::data::ConnectivityFormat;
use mesh_partition::mesh_error::MeshPartitionError;
use util::*;

#[test]
fn csr_arrays_are_partitioner_ready() {
    let rows = quad_strip_rows(5);
    let out = RayonComm::run(2, |comm| {
        let conn = local_block(&rows, &comm);
        let g = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &comm)
            .unwrap();
        g.validate().unwrap();
        g
    });

    for g in &out {
        assert_eq!(g.element_distribution, vec![0, 3, 5]);
        assert_eq!(g.nodes_per_element, 4);
    }
    assert_eq!(out[0].element_pointer, vec![0, 4, 8, 12]);
    assert_eq!(out[1].element_pointer, vec![0, 4, 8]);
    // quad 3 of a 5-quad strip: nodes 3, 4, 10, 9
    assert_eq!(out[1].element_nodes(0).unwrap(), &[3, 4, 10, 9]);
    assert_eq!(out[1].global_elements(), 3..5);
    assert!(out[1].element_nodes(2).is_err());
}

#[test]
fn decoding_error_on_one_rank_reaches_all() {
    let mut rows = quad_strip_rows(4);
    rows[3][2] = 0;
    let out = RayonComm::run(2, |comm| {
        let conn = local_block(&rows, &comm);
        build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &comm)
            .map(|g| g.n_local())
    });
    assert_eq!(out[1], Err(MeshPartitionError::InvalidIndex { value: 0 }));
    assert!(matches!(out[0], Err(MeshPartitionError::PeerFailure { .. })));
}

#[test]
fn more_ranks_than_elements() {
    let rows = quad_strip_rows(2);
    let out = RayonComm::run(3, |comm| {
        let conn = local_block(&rows, &comm);
        let g = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &comm)
            .unwrap();
        g.validate().unwrap();
        (g.n_local(), g.element_distribution)
    });
    assert_eq!(out[2], (0, vec![0, 1, 2, 2]));
}

#[test]
fn gathered_dual_graph_is_symmetric() {
    let rows = quad_strip_rows(5);
    let out = RayonComm::run(3, |comm| {
        let conn = local_block(&rows, &comm);
        let g = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &comm)
            .unwrap();
        let dual = mesh_to_dual_gathered(&g, 2, &comm).unwrap();
        dual.validate(g.elements().nglob()).unwrap();
        let first = g.global_elements().start;
        (0..dual.len())
            .map(|i| (first + i, dual.neighbors(i).collect::<Vec<_>>()))
            .collect::<Vec<_>>()
    });
    let rows: Vec<(usize, Vec<usize>)> = out.into_iter().flatten().collect();
    assert_eq!(
        rows,
        vec![
            (0, vec![1]),
            (1, vec![0, 2]),
            (2, vec![1, 3]),
            (3, vec![2, 4]),
            (4, vec![3]),
        ]
    );
    // one shared node is not a shared edge
    let corner_only = RayonComm::run(1, |comm| {
        let conn = local_block(&rows_for_corner(), &comm);
        let g = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &comm)
            .unwrap();
        mesh_to_dual_gathered(&g, 2, &comm).unwrap().adjncy
    });
    assert!(corner_only[0].is_empty());
}

/// Two quads sharing one node only.
fn rows_for_corner() -> Vec<[i32; 5]> {
    vec![[7, 1, 2, 3, 4], [7, 3, 5, 6, 7]]
}
