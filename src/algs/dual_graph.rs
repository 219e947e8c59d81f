//! Distributed CSR (compressed-sparse-row) *dual graph* of a mesh.
//
// Each *element* is a vertex; an undirected edge joins two elements that
// share at least `ncommon` mesh nodes (a face, for `ncommon` = nodes per face).
//
// Every rank holds the rows of its own elements, in partitioner form:
//
// * `xadj[i] .. xadj[i+1]`   = neighbour list of local element *i*
// * `adjncy`                 = concatenated neighbours, as *global* element ids
// * `vwgt[i]`                = vertex weight, default = 1
//
// The graph is **symmetric** across ranks (i↔j appear in both rows) and
// **self-free** (no loops). Neighbour lists are sorted.

use crate::algs::collective::all_gather_variable;
use crate::algs::communicator::Communicator;
use crate::algs::graph_distribution::GraphDistribution;
use crate::mesh_error::MeshPartitionError;
use crate::partitioning::{Idx, to_idx};
use hashbrown::HashMap;

/// Local rows of the distributed dual graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualGraph {
    pub xadj: Vec<Idx>,
    pub adjncy: Vec<Idx>,
    pub vwgt: Vec<Idx>,
}

impl DualGraph {
    /// Wrap CSR arrays (unit weights) after checking their shape.
    pub fn from_csr(xadj: Vec<Idx>, adjncy: Vec<Idx>) -> Result<Self, MeshPartitionError> {
        let n = xadj.len().saturating_sub(1);
        let g = Self {
            xadj,
            adjncy,
            vwgt: vec![1; n],
        };
        g.check_csr()?;
        Ok(g)
    }

    /// Build from per-element neighbour lists.
    pub fn from_rows<R: AsRef<[usize]>>(rows: &[R]) -> Result<Self, MeshPartitionError> {
        let mut xadj = Vec::with_capacity(rows.len() + 1);
        let mut adjncy = Vec::new();
        xadj.push(0);
        for r in rows {
            for &nbr in r.as_ref() {
                adjncy.push(to_idx(nbr)?);
            }
            xadj.push(to_idx(adjncy.len())?);
        }
        Ok(Self {
            vwgt: vec![1; rows.len()],
            xadj,
            adjncy,
        })
    }

    /// Number of local rows.
    pub fn len(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global neighbour ids of local row `i` (empty past the end).
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let (start, end) = match (self.xadj.get(i), self.xadj.get(i + 1)) {
            (Some(&s), Some(&e)) => (s as usize, e as usize),
            _ => (0, 0),
        };
        self.adjncy
            .get(start..end)
            .unwrap_or(&[])
            .iter()
            .map(|&n| n as usize)
    }

    /// Neighbour count of local row `i`.
    pub fn degree(&self, i: usize) -> usize {
        self.neighbors(i).count()
    }

    /// Check CSR shape and that neighbours are in `0..nglob`.
    pub fn validate(&self, nglob: usize) -> Result<(), MeshPartitionError> {
        self.check_csr()?;
        if self.vwgt.len() != self.len() {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "dual graph vwgt",
                expected: self.len(),
                found: self.vwgt.len(),
            });
        }
        if let Some(&bad) = self
            .adjncy
            .iter()
            .find(|&&n| n < 0 || n as usize >= nglob)
        {
            return Err(MeshPartitionError::GlobalIdOutOfRange {
                id: bad.max(0) as usize,
                nglob,
            });
        }
        Ok(())
    }

    fn check_csr(&self) -> Result<(), MeshPartitionError> {
        if self.xadj.first().is_some_and(|&x| x != 0)
            || self.xadj.windows(2).any(|w| w[1] < w[0])
        {
            return Err(MeshPartitionError::InvalidIndex {
                value: self.xadj.first().copied().unwrap_or(0).into(),
            });
        }
        let last = self.xadj.last().copied().unwrap_or(0) as usize;
        if self.adjncy.len() != last {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "dual graph adjncy",
                expected: last,
                found: self.adjncy.len(),
            });
        }
        Ok(())
    }
}

/// Collective: dual graph of the distributed mesh `graph`.
///
/// Element-node lists are all-gathered, so each rank sees the whole mesh
/// connectivity; each rank then builds the rows of its own elements.
pub fn mesh_to_dual_gathered<C: Communicator + ?Sized>(
    graph: &GraphDistribution,
    ncommon: usize,
    comm: &C,
) -> Result<DualGraph, MeshPartitionError> {
    let all = all_gather_variable(&graph.element_index, comm)?;
    let npe = graph.nodes_per_element;
    let nglob = graph.elements().nglob();
    if all.len() != nglob * npe {
        return Err(MeshPartitionError::LengthMismatch {
            operation: "mesh_to_dual gathered connectivity",
            expected: nglob * npe,
            found: all.len(),
        });
    }
    let nodes_of = |e: usize| &all.data()[e * npe..(e + 1) * npe];

    // node -> elements touching it
    let mut touching: HashMap<Idx, Vec<usize>> = HashMap::new();
    for e in 0..nglob {
        let mut nodes = nodes_of(e).to_vec();
        nodes.sort_unstable();
        nodes.dedup();
        for n in nodes {
            touching.entry(n).or_default().push(e);
        }
    }

    let ncommon = ncommon.max(1);
    let mut rows = Vec::with_capacity(graph.n_local());
    for e in graph.global_elements() {
        let mut nodes = nodes_of(e).to_vec();
        nodes.sort_unstable();
        nodes.dedup();
        let mut shared: HashMap<usize, usize> = HashMap::new();
        for n in &nodes {
            for &other in touching.get(n).map(Vec::as_slice).unwrap_or(&[]) {
                if other != e {
                    *shared.entry(other).or_insert(0) += 1;
                }
            }
        }
        let mut nbrs: Vec<usize> = shared
            .into_iter()
            .filter_map(|(other, count)| (count >= ncommon).then_some(other))
            .collect();
        nbrs.sort_unstable();
        rows.push(nbrs);
    }
    log::debug!(
        "[rank {}] dual graph: {} local rows, ncommon = {ncommon}",
        comm.rank(),
        rows.len()
    );
    DualGraph::from_rows(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_to_csr() {
        let dg = DualGraph::from_rows(&[vec![1], vec![0, 2], vec![1]]).unwrap();
        assert_eq!(dg.xadj, vec![0, 1, 3, 4]);
        assert_eq!(dg.adjncy, vec![1, 0, 2, 1]);
        assert_eq!(dg.vwgt, vec![1, 1, 1]);
        assert_eq!(dg.neighbors(1).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(dg.degree(3), 0);
        dg.validate(3).unwrap();
    }

    #[test]
    fn bad_csr_rejected() {
        assert!(DualGraph::from_csr(vec![0, 2], vec![1]).is_err());
        assert!(DualGraph::from_csr(vec![0, 2, 1], vec![1, 0]).is_err());
        let dg = DualGraph::from_csr(vec![0, 1], vec![5]).unwrap();
        assert!(dg.validate(2).is_err());
    }
}
