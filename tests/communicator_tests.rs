use mesh_partition::algs::communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
use mesh_partition::mesh_error::MeshPartitionError;
use serial_test::serial;

#[test]
#[serial]
fn rayon_round_trip() {
    let tag = CommTag(0x1000);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    let msg = b"hello";
    let _s = c0.isend(1, tag.as_u16(), msg);

    let mut buf = [0u8; 5];
    let h = c1.irecv(0, tag.as_u16(), &mut buf);
    let got = h.wait().unwrap();
    assert_eq!(&got, msg);
}

#[test]
#[serial]
fn rayon_fifo_order() {
    let tag = CommTag(0x1001);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    for i in 0..10u8 {
        c0.isend(1, tag.as_u16(), &[i]);
    }
    let mut out = Vec::new();
    for _ in 0..10 {
        let mut b = [0u8; 1];
        let h = c1.irecv(0, tag.as_u16(), &mut b);
        out.push(h.wait().unwrap()[0]);
    }
    assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
}

#[test]
#[serial]
fn truncation_is_ok() {
    let tag = CommTag(0x1002);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    c0.isend(1, tag.as_u16(), &[1, 2, 3, 4, 5, 6]);
    let mut b = [0u8; 4];
    let h = c1.irecv(0, tag.as_u16(), &mut b);
    let got = h.wait().unwrap();
    assert_eq!(got, vec![1, 2, 3, 4]);
}

#[test]
fn tags_are_offset_independently() {
    let base = CommTag::new(0x2000);
    assert_eq!(base.offset(3).as_u16(), 0x2003);
    assert_ne!(base.offset(1), base);
}

#[test]
fn isolated_worlds_do_not_share_messages() {
    let a = RayonComm::world(2);
    let b = RayonComm::world(2);
    a[0].isend(1, 5, &[1]);
    b[0].isend(1, 5, &[2]);
    let mut buf = [0u8; 1];
    assert_eq!(b[1].irecv(0, 5, &mut buf).wait().unwrap(), vec![2]);
    assert_eq!(a[1].irecv(0, 5, &mut buf).wait().unwrap(), vec![1]);
}

#[test]
fn varcount_collectives_four_ranks() {
    let out = RayonComm::run(4, |comm| {
        let r = comm.rank();
        let counts: Vec<usize> = (0..4).collect();
        let mine = vec![r as u8; r];

        let all = comm.allgather_varcount(&mine, &counts).unwrap();
        let gathered = comm.gather_varcount(3, &mine, &counts).unwrap();
        let root_buf: Vec<u8> = (0..6).collect();
        let send = (r == 2).then_some(root_buf.as_slice());
        let scattered = comm.scatter_varcount(2, send, &counts).unwrap();
        comm.barrier().unwrap();
        (all, gathered, scattered)
    });

    let concat = vec![1, 2, 2, 3, 3, 3];
    for (r, (all, gathered, scattered)) in out.into_iter().enumerate() {
        assert_eq!(all, concat);
        assert_eq!(gathered.is_some(), r == 3);
        if let Some(g) = gathered {
            assert_eq!(g, concat);
        }
        let start = r * (r.saturating_sub(1)) / 2;
        assert_eq!(scattered, (start as u8..(start + r) as u8).collect::<Vec<_>>());
    }
}

#[test]
fn layout_must_cover_every_rank() {
    let err = NoComm.allgather_varcount(&[1, 2], &[2, 0]).unwrap_err();
    assert!(matches!(err, MeshPartitionError::LengthMismatch { .. }));
}

#[test]
fn serial_barrier_and_size() {
    let comm = NoComm;
    assert_eq!((comm.rank(), comm.size()), (0, 1));
    assert!(comm.is_no_comm());
    comm.barrier().unwrap();
}
