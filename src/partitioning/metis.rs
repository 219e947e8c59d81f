//! Serial METIS k-way partitioning of a (gathered) dual graph.

use crate::algs::dual_graph::DualGraph;
use crate::partitioning::{Idx, PartitionError, Real, to_idx};

impl DualGraph {
    /// Partition this graph into `nparts` parts using METIS.
    ///
    /// The graph must be complete (`adjncy` ids index rows of this graph).
    /// Returns the part of every row.
    pub fn metis_partition(
        &self,
        nparts: usize,
        target_weights: &[Real],
        imbalance_tolerance: Real,
    ) -> Result<Vec<Idx>, PartitionError> {
        let n = self.len();
        // METIS rejects these; the answer is trivial anyway.
        if n == 0 {
            return Ok(Vec::new());
        }
        if nparts <= 1 {
            return Ok(vec![0; n]);
        }
        let nparts_idx = to_idx(nparts)?;
        let ubvec = [imbalance_tolerance];
        let mut part = vec![0 as Idx; n];

        metis::Graph::new(1, nparts_idx, &self.xadj, &self.adjncy)
            .map_err(|e| PartitionError::Library(format!("{e:?}")))?
            .set_vwgt(&self.vwgt)
            .set_tpwgts(target_weights)
            .set_ubvec(&ubvec)
            .part_kway(&mut part)
            .map_err(|e| PartitionError::Library(format!("{e:?}")))?;
        Ok(part)
    }
}
