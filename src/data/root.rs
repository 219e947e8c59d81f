//! Root-exclusive data.
//!
//! A [`RootHandle`] holds a value only on its root rank. The value can only
//! be produced by a loader closure that runs on the root, so non-root ranks
//! can never observe or dereference it by accident.

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::mesh_error::MeshPartitionError;

#[derive(Clone, Debug, PartialEq)]
pub struct RootHandle<T> {
    root: usize,
    value: Option<T>,
}

impl<T> RootHandle<T> {
    /// Run `load` on `root` only. Purely local, no communication.
    pub fn load<C, F>(comm: &C, root: usize, load: F) -> Result<Self, MeshPartitionError>
    where
        C: Communicator + ?Sized,
        F: FnOnce() -> T,
    {
        check_root(comm, root)?;
        let value = (comm.rank() == root).then(load);
        Ok(Self { root, value })
    }

    /// Collective: run the fallible `load` on `root` and agree on its outcome.
    ///
    /// A root failure is reported on every rank (as
    /// [`PeerFailure`](MeshPartitionError::PeerFailure) on non-root ranks).
    pub fn try_load<C, F>(comm: &C, root: usize, load: F) -> Result<Self, MeshPartitionError>
    where
        C: Communicator + ?Sized,
        F: FnOnce() -> Result<T, MeshPartitionError>,
    {
        check_root(comm, root)?;
        let local = if comm.rank() == root {
            load().map(Some)
        } else {
            Ok(None)
        };
        let value = agree("RootHandle::try_load", local, comm)?;
        Ok(Self { root, value })
    }

    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    /// `true` on the root rank.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// The value; `None` on every non-root rank.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// The value, or `RootDataMissing` naming `operation` when absent.
    pub fn require(&self, operation: &'static str, rank: usize) -> Result<&T, MeshPartitionError> {
        self.value
            .as_ref()
            .ok_or(MeshPartitionError::RootDataMissing { operation, rank })
    }

    pub fn into_inner(self) -> Option<T> {
        self.value
    }

    pub(crate) fn from_parts(root: usize, value: Option<T>) -> Self {
        Self { root, value }
    }
}

fn check_root<C: Communicator + ?Sized>(comm: &C, root: usize) -> Result<(), MeshPartitionError> {
    if root >= comm.size() {
        return Err(MeshPartitionError::RankOutOfRange {
            rank: root,
            nranks: comm.size(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn loader_runs_only_on_root() {
        let present = RayonComm::run(3, |comm| {
            let h = RootHandle::load(&comm, 1, || vec![1u8, 2]).unwrap();
            (h.is_present(), h.get().cloned())
        });
        assert_eq!(present[0], (false, None));
        assert_eq!(present[1], (true, Some(vec![1, 2])));
        assert_eq!(present[2], (false, None));
    }

    #[test]
    fn root_failure_reaches_every_rank() {
        let results = RayonComm::run(2, |comm| {
            RootHandle::<u32>::try_load(&comm, 0, || {
                Err(MeshPartitionError::Dataset {
                    path: "coords".into(),
                    message: "missing".into(),
                })
            })
        });
        assert!(matches!(results[0], Err(MeshPartitionError::Dataset { .. })));
        assert!(matches!(
            &results[1],
            Err(MeshPartitionError::PeerFailure { ranks, .. }) if ranks == &vec![0]
        ));
    }

    #[test]
    fn root_outside_world() {
        assert!(RootHandle::load(&NoComm, 1, || 0).is_err());
    }
}
