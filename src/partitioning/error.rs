//! Partitioning errors for mesh-partition

use crate::mesh_error::MeshPartitionError;
use crate::partitioning::Idx;
use thiserror::Error;

/// Errors reported by a partitioner collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PartitionError {
    /// The entry point is not compiled into this build.
    #[error("partitioner entry point `{0}` is not available in this build")]
    Unsupported(&'static str),
    /// Parameters the partitioner cannot accept.
    #[error("invalid partition parameters: {0}")]
    InvalidParams(String),
    /// The partitioning library reported a failure.
    #[error("partitioning library failed: {0}")]
    Library(String),
    /// A returned owner label is not a valid part.
    #[error("element {element} was assigned part {owner}, expected 0..{nparts}")]
    OwnerOutOfRange {
        element: usize,
        owner: Idx,
        nparts: usize,
    },
    /// Failure in the collectives around the partitioner call.
    #[error(transparent)]
    Mesh(#[from] MeshPartitionError),
}

impl PartitionError {
    /// Attribute this failure to `entry_point`.
    pub fn at(self, entry_point: &'static str) -> MeshPartitionError {
        match self {
            PartitionError::Mesh(e) => e,
            other => MeshPartitionError::Partitioner {
                entry_point,
                message: other.to_string(),
            },
        }
    }
}

impl From<PartitionError> for MeshPartitionError {
    fn from(e: PartitionError) -> Self {
        e.at("partitioner")
    }
}
