#![allow(dead_code)]
use mesh_partition::algs::communicator::Communicator;
use mesh_partition::data::{Array2, DistributedArray, RangeDistribution, RootHandle};
use std::sync::Arc;

/// `n` quads in a row on a 2-row node grid, as tagged one-based rows
/// `[tag, a, b, c, d]`. Quad `e` has 0-based nodes `e, e+1, e+w+1, e+w`.
pub fn quad_strip_rows(n: usize) -> Vec<[i32; 5]> {
    let w = n + 1;
    (0..n)
        .map(|e| {
            let e = e as i32;
            let w = w as i32;
            [7, e + 1, e + 2, e + w + 2, e + w + 1]
        })
        .collect()
}

/// Coordinates `(x, y, 0)` of the nodes of [`quad_strip_rows`].
pub fn quad_strip_coords(n: usize) -> Array2<f64> {
    let w = n + 1;
    let data = (0..2 * w)
        .flat_map(|v| [(v % w) as f64, (v / w) as f64, 0.0])
        .collect();
    Array2::from_vec(data, 3).unwrap()
}

/// This rank's block of `rows`.
pub fn local_block<C: Communicator, const N: usize>(
    rows: &[[i32; N]],
    comm: &C,
) -> DistributedArray<i32> {
    let dist = Arc::new(RangeDistribution::block(rows.len(), comm.size()).unwrap());
    let local = rows[dist.range(comm.rank())]
        .iter()
        .flatten()
        .copied()
        .collect();
    DistributedArray::from_local(dist, N, comm.rank(), local).unwrap()
}

/// `rows` held on `root` only.
pub fn on_root<C: Communicator, const N: usize>(
    rows: &[[i32; N]],
    root: usize,
    comm: &C,
) -> RootHandle<Array2<i32>> {
    RootHandle::load(comm, root, || Array2::from_rows(rows).unwrap()).unwrap()
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
