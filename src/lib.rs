//! # mesh-partition
//!
//! Distributed decomposition core for large unstructured meshes: block
//! distribution of global arrays over SPMD ranks, variable-length
//! collectives, partitioner input preparation, reconstruction of each
//! rank's partition (owned plus one-hop halo entities) and classification
//! of faces shared between ranks.
//!
//! ## Features
//! - `RangeDistribution` and `DistributedArray` for row-partitioned data
//! - Typed gather / scatter / all-gather of irregular per-rank buffers
//! - ParMETIS-compatible distributed CSR inputs and a partitioner seam
//! - Local partitions with bijective local/global maps and redistributed payloads
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-partition = "0.1"
//! # Optional features:
//! # features = ["mpi-support","rayon","metis-support"]
//! ```
//!
//! Every collective must be entered by all ranks in the same order. A
//! failing local step is agreed on before the next collective, so errors
//! come back on every rank; [`algs::collective::abort_on_error`] turns one
//! into a whole-run abort.

pub mod algs;
pub mod data;
pub mod io;
pub mod mesh_error;
pub mod partitioning;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collective::{
        GatheredBuffer, abort_on_error, agree, all_gather_variable, gather_to_root,
        scatter_from_root,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    pub use crate::algs::distribute::{
        CollectOptions, LocalPartition, collect_elements_per_rank, collect_vertices_per_rank,
    };
    pub use crate::algs::duplicate_faces::{FaceClassification, resolve_interface_faces};
    pub use crate::algs::graph_distribution::{GraphDistribution, build_graph_distribution};
    pub use crate::algs::pipeline::{DistributionConfig, distribute_mesh};
    pub use crate::data::{
        Array2, ConnectivityFormat, DistributedArray, RangeDistribution, RootHandle,
    };
    pub use crate::io::{DatasetPath, DatasetReader, MemoryReader};
    pub use crate::mesh_error::MeshPartitionError;
    pub use crate::partitioning::{
        GatheredPartitioner, MeshPartitioner, PartitionError, PartitionParams,
    };
}
