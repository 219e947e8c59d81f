//! DistributedArray: a 2D array whose rows are partitioned over ranks.
//!
//! Each rank stores only its own share, `sizes[rank] x ncol` elements in
//! row-major order. Local row `i` is global row `offsets[rank] + i`.
//! Mutation is purely local; ranks that need a consistent view coordinate
//! through the collectives in [`crate::algs::collective`].

use crate::algs::communicator::Communicator;
use crate::data::range_distribution::RangeDistribution;
use crate::mesh_error::MeshPartitionError;
use bytemuck::Pod;
use std::ops::Range;
use std::sync::Arc;

/// File-format selection covering this rank's rows: start `(row_offset, 0)`,
/// count `(row_count, ncol)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hyperslab {
    pub row_offset: usize,
    pub row_count: usize,
    pub ncol: usize,
}

impl Hyperslab {
    pub fn len(&self) -> usize {
        self.row_count * self.ncol
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn rows(&self) -> Range<usize> {
        self.row_offset..self.row_offset + self.row_count
    }
}

/// This rank's share of a row-partitioned `nglob x ncol` array.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributedArray<T: Pod> {
    data: Vec<T>,
    ncol: usize,
    rank: usize,
    distribution: Arc<RangeDistribution>,
}

impl<T: Pod> DistributedArray<T> {
    /// Zero-filled local share of `rank` under `distribution`.
    pub fn new(
        distribution: Arc<RangeDistribution>,
        ncol: usize,
        rank: usize,
    ) -> Result<Self, MeshPartitionError> {
        check_rank(&distribution, rank)?;
        let data = vec![T::zeroed(); distribution.size(rank) * ncol];
        Ok(Self {
            data,
            ncol,
            rank,
            distribution,
        })
    }

    /// Collective: block-distribute `nglob` rows over `comm` and allocate
    /// this rank's zero-filled share.
    pub fn build<C: Communicator + ?Sized>(
        nglob: usize,
        ncol: usize,
        comm: &C,
    ) -> Result<Self, MeshPartitionError> {
        let distribution = Arc::new(RangeDistribution::build(nglob, comm)?);
        Self::new(distribution, ncol, comm.rank())
    }

    /// Wrap already-populated local rows.
    pub fn from_local(
        distribution: Arc<RangeDistribution>,
        ncol: usize,
        rank: usize,
        data: Vec<T>,
    ) -> Result<Self, MeshPartitionError> {
        check_rank(&distribution, rank)?;
        let expected = distribution.size(rank) * ncol;
        if data.len() != expected {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "DistributedArray::from_local",
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            data,
            ncol,
            rank,
            distribution,
        })
    }

    #[inline]
    pub fn nglob(&self) -> usize {
        self.distribution.nglob()
    }
    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
    /// Number of local rows.
    #[inline]
    pub fn nrow(&self) -> usize {
        self.distribution.size(self.rank)
    }
    #[inline]
    pub fn offset(&self) -> usize {
        self.distribution.offset(self.rank)
    }
    pub fn distribution(&self) -> &Arc<RangeDistribution> {
        &self.distribution
    }
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Global row of local row `i`.
    pub fn global_row(&self, i: usize) -> Result<usize, MeshPartitionError> {
        self.check_row(i)?;
        Ok(self.offset() + i)
    }

    /// Local row of global row `g`, if this rank owns it.
    pub fn local_row(&self, g: usize) -> Option<usize> {
        self.distribution.range(self.rank).contains(&g).then(|| g - self.offset())
    }

    pub fn get(&self, i: usize, j: usize) -> Result<T, MeshPartitionError> {
        let at = self.index(i, j)?;
        Ok(self.data[at])
    }

    pub fn set(&mut self, i: usize, j: usize, v: T) -> Result<(), MeshPartitionError> {
        let at = self.index(i, j)?;
        self.data[at] = v;
        Ok(())
    }

    pub fn row(&self, i: usize) -> Result<&[T], MeshPartitionError> {
        self.check_row(i)?;
        Ok(&self.data[i * self.ncol..(i + 1) * self.ncol])
    }

    pub fn row_mut(&mut self, i: usize) -> Result<&mut [T], MeshPartitionError> {
        self.check_row(i)?;
        let ncol = self.ncol;
        Ok(&mut self.data[i * ncol..(i + 1) * ncol])
    }

    /// Local rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.data.chunks_exact(self.ncol.max(1)).take(self.nrow())
    }

    /// Selection a parallel reader must fill for this rank.
    pub fn hyperslab(&self) -> Hyperslab {
        Hyperslab {
            row_offset: self.offset(),
            row_count: self.nrow(),
            ncol: self.ncol,
        }
    }

    fn check_row(&self, i: usize) -> Result<(), MeshPartitionError> {
        let nrow = self.nrow();
        if i >= nrow {
            return Err(MeshPartitionError::RowOutOfBounds { row: i, nrow });
        }
        Ok(())
    }

    fn index(&self, i: usize, j: usize) -> Result<usize, MeshPartitionError> {
        self.check_row(i)?;
        if j >= self.ncol {
            return Err(MeshPartitionError::ColumnOutOfBounds {
                col: j,
                ncol: self.ncol,
            });
        }
        Ok(i * self.ncol + j)
    }
}

fn check_rank(distribution: &RangeDistribution, rank: usize) -> Result<(), MeshPartitionError> {
    if rank >= distribution.nranks() {
        return Err(MeshPartitionError::RankOutOfRange {
            rank,
            nranks: distribution.nranks(),
        });
    }
    Ok(())
}
