//! Element-to-node connectivity in the distributed CSR form a parallel
//! mesh partitioner consumes.
//!
//! For `P` ranks and `nloc` local elements:
//!
//! * `element_distribution[0..=P]` = first global element of each rank, the
//!   last entry being the global element count
//! * `element_pointer[0..=nloc]`    = offsets into `element_index`
//! * `element_index`               = 0-based global node ids, element by element
//!
//! Every element has the same number of nodes.

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::data::connectivity::{ConnectivityFormat, MeshIndex};
use crate::data::distributed_array::DistributedArray;
use crate::data::range_distribution::RangeDistribution;
use crate::mesh_error::MeshPartitionError;
use crate::partitioning::{Idx, to_idx};
use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphDistribution {
    pub element_distribution: Vec<Idx>,
    pub element_pointer: Vec<Idx>,
    pub element_index: Vec<Idx>,
    pub nodes_per_element: usize,
    rank: usize,
    elements: RangeDistribution,
}

impl GraphDistribution {
    /// Number of elements on this rank.
    pub fn n_local(&self) -> usize {
        self.element_pointer.len().saturating_sub(1)
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Distribution of elements over ranks.
    pub fn elements(&self) -> &RangeDistribution {
        &self.elements
    }

    /// Global ids of this rank's elements.
    pub fn global_elements(&self) -> Range<usize> {
        self.elements.range(self.rank)
    }

    /// Node ids of local element `i`.
    pub fn element_nodes(&self, i: usize) -> Result<&[Idx], MeshPartitionError> {
        let nloc = self.n_local();
        if i >= nloc {
            return Err(MeshPartitionError::RowOutOfBounds { row: i, nrow: nloc });
        }
        let start = self.element_pointer[i] as usize;
        let end = self.element_pointer[i + 1] as usize;
        Ok(&self.element_index[start..end])
    }

    /// Check the shape the partitioner relies on.
    pub fn validate(&self) -> Result<(), MeshPartitionError> {
        let expected = self.elements.element_distribution();
        if self.element_distribution.len() != expected.len()
            || self
                .element_distribution
                .iter()
                .zip(&expected)
                .any(|(&a, &b)| a as usize != b)
        {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "element_distribution",
                expected: expected.len(),
                found: self.element_distribution.len(),
            });
        }
        let nloc = self.elements.size(self.rank);
        if self.element_pointer.len() != nloc + 1 {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "element_pointer",
                expected: nloc + 1,
                found: self.element_pointer.len(),
            });
        }
        for w in self.element_pointer.windows(2) {
            let len = (w[1] - w[0]).max(0) as usize;
            if w[1] < w[0] || len != self.nodes_per_element {
                return Err(MeshPartitionError::LengthMismatch {
                    operation: "nodes of element",
                    expected: self.nodes_per_element,
                    found: len,
                });
            }
        }
        let last = self.element_pointer.last().copied().unwrap_or(0) as usize;
        if self.element_index.len() != last {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "element_index",
                expected: last,
                found: self.element_index.len(),
            });
        }
        if let Some(&bad) = self.element_index.iter().find(|&&n| n < 0) {
            return Err(MeshPartitionError::InvalidIndex { value: bad.into() });
        }
        Ok(())
    }
}

/// Collective: flatten this rank's connectivity rows into partitioner form.
///
/// `conn` holds one raw row per local element, decoded with `format`.
/// A decoding failure on any rank fails the call on every rank.
pub fn build_graph_distribution<I, C>(
    conn: &DistributedArray<I>,
    format: &ConnectivityFormat,
    comm: &C,
) -> Result<GraphDistribution, MeshPartitionError>
where
    I: MeshIndex,
    C: Communicator + ?Sized,
{
    let nodes_per_element = format.ids_per_row(conn.ncol());
    let nloc = conn.nrow();

    let flattened: Result<(Vec<Idx>, Vec<Idx>), MeshPartitionError> = (|| {
        let mut element_index = Vec::with_capacity(nloc * nodes_per_element);
        for row in conn.rows() {
            for id in format.decode_row(row)? {
                element_index.push(to_idx(id)?);
            }
        }
        let element_pointer = (0..=nloc)
            .map(|i| to_idx(i * nodes_per_element))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((element_pointer, element_index))
    })();
    let (element_pointer, element_index) =
        agree("build_graph_distribution", flattened, comm)?;

    let elements = RangeDistribution::exchange(nloc, comm)?;
    let element_distribution = elements
        .element_distribution()
        .into_iter()
        .map(to_idx)
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!(
        "[rank {}] graph distribution: {nloc} of {} elements, {nodes_per_element} nodes each",
        comm.rank(),
        elements.nglob()
    );
    if nloc == 0 {
        log::warn!("[rank {}] owns no elements", comm.rank());
    }

    Ok(GraphDistribution {
        element_distribution,
        element_pointer,
        element_index,
        nodes_per_element,
        rank: comm.rank(),
        elements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use std::sync::Arc;

    fn serial_conn(rows: &[[i32; 3]]) -> DistributedArray<i32> {
        let dist = Arc::new(RangeDistribution::block(rows.len(), 1).unwrap());
        let data = rows.iter().flatten().copied().collect();
        DistributedArray::from_local(dist, 3, 0, data).unwrap()
    }

    #[test]
    fn tagged_rows_become_zero_based_csr() {
        let conn = serial_conn(&[[9, 1, 2], [9, 2, 3]]);
        let g = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &NoComm)
            .unwrap();
        assert_eq!(g.nodes_per_element, 2);
        assert_eq!(g.element_pointer, vec![0, 2, 4]);
        assert_eq!(g.element_index, vec![0, 1, 1, 2]);
        assert_eq!(g.element_distribution, vec![0, 2]);
        assert_eq!(g.element_nodes(1).unwrap(), &[1, 2]);
        g.validate().unwrap();
    }

    #[test]
    fn zero_id_in_one_based_rows_fails() {
        let conn = serial_conn(&[[9, 0, 2]]);
        let err = build_graph_distribution(&conn, &ConnectivityFormat::tagged_one_based(), &NoComm)
            .unwrap_err();
        assert_eq!(err, MeshPartitionError::InvalidIndex { value: 0 });
    }
}
