//! RangeDistribution: block decomposition of `N` global items over `P` ranks.
//!
//! Rank `r` owns the contiguous global rows `offsets[r] .. offsets[r] + sizes[r]`.
//! The block layout gives the first `N mod P` ranks one extra item:
//!
//! ```text
//! sizes[r]   = N / P + (r < N % P)
//! offsets[r] = r * (N / P) + min(r, N % P)
//! ```
//!
//! The same type also describes *irregular* layouts (per-rank counts of a
//! gathered buffer, payload sizes after partitioning); those come from
//! [`RangeDistribution::exchange`] or [`RangeDistribution::from_sizes`].
//!
//! # Invariants
//! - `sizes.len() == offsets.len() == P >= 1`
//! - `offsets[0] == 0`, `offsets[r + 1] == offsets[r] + sizes[r]`
//! - `sum(sizes) == nglob`

use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshPartitionError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Rows assigned to `rank` by the block layout.
#[inline]
pub fn block_size(nglob: usize, nranks: usize, rank: usize) -> usize {
    nglob / nranks + usize::from(rank < nglob % nranks)
}

/// First global row of `rank` under the block layout.
#[inline]
pub fn block_offset(nglob: usize, nranks: usize, rank: usize) -> usize {
    rank * (nglob / nranks) + rank.min(nglob % nranks)
}

/// Per-rank sizes and offsets of a row-partitioned global range.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeDistribution {
    nglob: usize,
    sizes: Vec<usize>,
    offsets: Vec<usize>,
}

impl RangeDistribution {
    /// Block layout of `nglob` items over `nranks` ranks. No communication.
    pub fn block(nglob: usize, nranks: usize) -> Result<Self, MeshPartitionError> {
        if nranks == 0 {
            return Err(MeshPartitionError::NoRanks);
        }
        let sizes = (0..nranks).map(|r| block_size(nglob, nranks, r)).collect();
        let offsets = (0..nranks).map(|r| block_offset(nglob, nranks, r)).collect();
        Ok(Self {
            nglob,
            sizes,
            offsets,
        })
    }

    /// Collective block layout of `nglob` items over the ranks of `comm`.
    ///
    /// Every rank publishes its own size and its own `nglob` in a per-rank
    /// slot of one sum-reduction. If the ranks were not given the same
    /// `nglob`, every rank returns
    /// [`InconsistentGlobalCount`](MeshPartitionError::InconsistentGlobalCount)
    /// naming the first disagreeing rank.
    pub fn build<C: Communicator + ?Sized>(
        nglob: usize,
        comm: &C,
    ) -> Result<Self, MeshPartitionError> {
        let nranks = comm.size();
        if nranks == 0 {
            return Err(MeshPartitionError::NoRanks);
        }
        let rank = comm.rank();
        let mut slots = vec![0u64; 2 * nranks];
        slots[rank] = block_size(nglob, nranks, rank) as u64;
        slots[nranks + rank] = nglob as u64;
        comm.allreduce_sum(&mut slots)?;

        let announced = &slots[nranks..];
        let expected = announced[0] as usize;
        if let Some((bad, &found)) = announced
            .iter()
            .enumerate()
            .find(|&(_, &n)| n as usize != expected)
        {
            log::error!(
                "[rank {rank}] RangeDistribution::build: ranks disagree on the global count"
            );
            return Err(MeshPartitionError::InconsistentGlobalCount {
                rank: bad,
                expected,
                found: found as usize,
            });
        }
        Self::from_sizes(slots[..nranks].iter().map(|&s| s as usize).collect())
    }

    /// Irregular layout where rank `r` contributes `local_count` on rank `r`.
    ///
    /// Counts are assembled by a sum-reduction over a per-rank-zeroed vector,
    /// so every rank ends up with the identical table.
    pub fn exchange<C: Communicator + ?Sized>(
        local_count: usize,
        comm: &C,
    ) -> Result<Self, MeshPartitionError> {
        let nranks = comm.size();
        if nranks == 0 {
            return Err(MeshPartitionError::NoRanks);
        }
        let mut counts = vec![0u64; nranks];
        counts[comm.rank()] = local_count as u64;
        comm.allreduce_sum(&mut counts)?;
        Self::from_sizes(counts.into_iter().map(|c| c as usize).collect())
    }

    /// Layout from explicit per-rank sizes.
    pub fn from_sizes(sizes: Vec<usize>) -> Result<Self, MeshPartitionError> {
        if sizes.is_empty() {
            return Err(MeshPartitionError::NoRanks);
        }
        let mut offsets = Vec::with_capacity(sizes.len());
        let mut nglob = 0usize;
        for &s in &sizes {
            offsets.push(nglob);
            nglob += s;
        }
        Ok(Self {
            nglob,
            sizes,
            offsets,
        })
    }

    /// Same layout with every count and offset multiplied by `width`
    /// (rows of `width` components each).
    pub fn scaled(&self, width: usize) -> Self {
        Self {
            nglob: self.nglob * width,
            sizes: self.sizes.iter().map(|s| s * width).collect(),
            offsets: self.offsets.iter().map(|o| o * width).collect(),
        }
    }

    #[inline]
    pub fn nglob(&self) -> usize {
        self.nglob
    }
    #[inline]
    pub fn nranks(&self) -> usize {
        self.sizes.len()
    }
    #[inline]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }
    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of rows on `rank` (0 for ranks outside the layout).
    pub fn size(&self, rank: usize) -> usize {
        self.sizes.get(rank).copied().unwrap_or(0)
    }

    /// First global row of `rank` (`nglob` for ranks outside the layout).
    pub fn offset(&self, rank: usize) -> usize {
        self.offsets.get(rank).copied().unwrap_or(self.nglob)
    }

    /// Global rows owned by `rank`.
    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = self.offset(rank);
        start..start + self.size(rank)
    }

    /// Rank owning global row `global`.
    ///
    /// Empty ranks never own anything; with several candidates the last
    /// rank whose offset is `<= global` wins, which skips empty ranks.
    pub fn owner_of(&self, global: usize) -> Result<usize, MeshPartitionError> {
        if global >= self.nglob {
            return Err(MeshPartitionError::GlobalIdOutOfRange {
                id: global,
                nglob: self.nglob,
            });
        }
        Ok(self.offsets.partition_point(|&o| o <= global) - 1)
    }

    /// Distribution vector in partitioner form: `P + 1` monotonic entries,
    /// the last being `nglob`.
    pub fn element_distribution(&self) -> Vec<usize> {
        let mut dist = self.offsets.clone();
        dist.push(self.nglob);
        dist
    }

    /// `true` if this is the block layout of `nglob` over `nranks()`.
    pub fn is_block(&self) -> bool {
        let p = self.nranks();
        (0..p).all(|r| self.sizes[r] == block_size(self.nglob, p, r))
    }
}
