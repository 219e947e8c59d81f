use mesh_partition::algs::communicator::{Communicator, RayonComm};
use mesh_partition::data::RangeDistribution;
use mesh_partition::mesh_error::MeshPartitionError;
use proptest::prelude::*;

proptest! {
    #[test]
    fn block_layout_is_complete(n in 0usize..10_000, p in 1usize..64) {
        let d = RangeDistribution::block(n, p).unwrap();
        prop_assert_eq!(d.sizes().iter().sum::<usize>(), n);
        prop_assert_eq!(d.offsets()[0], 0);
        for r in 1..p {
            prop_assert_eq!(d.offset(r), d.offset(r - 1) + d.size(r - 1));
        }
        prop_assert_eq!(d.offset(p - 1) + d.size(p - 1), n);
        // sizes differ by at most one, larger ones first
        prop_assert!(d.sizes().windows(2).all(|w| w[0] >= w[1] && w[0] - w[1] <= 1));
        prop_assert!(d.is_block());
    }

    #[test]
    fn every_item_has_one_owner(n in 1usize..2_000, p in 1usize..40) {
        let d = RangeDistribution::block(n, p).unwrap();
        for g in 0..n {
            let owner = d.owner_of(g).unwrap();
            prop_assert!(d.range(owner).contains(&g));
        }
        prop_assert!(d.owner_of(n).is_err());
    }

    #[test]
    fn from_sizes_keeps_prefix_sums(sizes in proptest::collection::vec(0usize..50, 1..16)) {
        let d = RangeDistribution::from_sizes(sizes.clone()).unwrap();
        prop_assert_eq!(d.sizes(), sizes.as_slice());
        prop_assert_eq!(d.nglob(), sizes.iter().sum::<usize>());
        let ed = d.element_distribution();
        prop_assert_eq!(ed.len(), sizes.len() + 1);
        prop_assert_eq!(*ed.last().unwrap(), d.nglob());
    }
}

#[test]
fn ten_and_seven_over_three_ranks() {
    let d = RangeDistribution::block(10, 3).unwrap();
    assert_eq!(d.sizes(), &[4, 3, 3]);
    assert_eq!(d.offsets(), &[0, 4, 7]);
    let d = RangeDistribution::block(7, 3).unwrap();
    assert_eq!(d.sizes(), &[3, 2, 2]);
    assert_eq!(d.offsets(), &[0, 3, 5]);
}

#[test]
fn collective_build_matches_block_and_is_idempotent() {
    let out = RayonComm::run(3, |comm| {
        let a = RangeDistribution::build(10, &comm).unwrap();
        let b = RangeDistribution::build(10, &comm).unwrap();
        assert_eq!(a, b);
        a
    });
    let block = RangeDistribution::block(10, 3).unwrap();
    assert!(out.iter().all(|d| *d == block));
}

#[test]
fn disagreeing_global_counts_fail_everywhere() {
    let out = RayonComm::run(3, |comm| {
        let n = if comm.rank() == 2 { 11 } else { 10 };
        RangeDistribution::build(n, &comm)
    });
    for r in out {
        assert_eq!(
            r,
            Err(MeshPartitionError::InconsistentGlobalCount {
                rank: 2,
                expected: 10,
                found: 11,
            })
        );
    }
}

#[test]
fn exchange_builds_irregular_layout() {
    let out = RayonComm::run(4, |comm| RangeDistribution::exchange(comm.rank() * 2, &comm).unwrap());
    for d in out {
        assert_eq!(d.sizes(), &[0, 2, 4, 6]);
        assert_eq!(d.offsets(), &[0, 0, 2, 6]);
        assert_eq!(d.owner_of(1).unwrap(), 1);
        assert!(!d.is_block());
        assert_eq!(d.scaled(3).sizes(), &[0, 6, 12, 18]);
    }
}
