use mesh_partition::algs::collective::{abort_on_error, all_gather_variable};
use mesh_partition::algs::communicator::{Communicator, RayonComm};
use mesh_partition::mesh_error::MeshPartitionError;
use std::panic::catch_unwind;

#[test]
fn abort_releases_a_peer_waiting_in_a_collective() {
    let outcome = catch_unwind(|| {
        RayonComm::run(2, |comm| {
            if comm.rank() == 1 {
                abort_on_error::<Vec<u64>, _>(
                    "read coordinates",
                    Err(MeshPartitionError::RootDataMissing {
                        operation: "read coordinates",
                        rank: 1,
                    }),
                    &comm,
                )
            } else {
                all_gather_variable(&[1u64], &comm)
                    .map(|gathered| gathered.data().to_vec())
                    .unwrap_or_default()
            }
        })
    });
    assert!(outcome.is_err());
}

#[test]
fn ok_results_pass_through() {
    let out = RayonComm::run(2, |comm| {
        let gathered = abort_on_error(
            "all_gather_variable",
            all_gather_variable(&[comm.rank() as u64], &comm),
            &comm,
        );
        gathered.data().to_vec()
    });
    assert_eq!(out, vec![vec![0, 1], vec![0, 1]]);
}
