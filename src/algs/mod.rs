//! Re-export public algorithms.

pub mod collective;
pub mod communicator;
pub mod distribute;
pub mod dual_graph;
pub mod duplicate_faces;
pub mod graph_distribution;
pub mod pipeline;
pub mod wire;

pub use collective::{
    GatheredBuffer, RootGather, abort_on_error, agree, all_gather_variable, gather_to_root,
    scatter_from_root,
};
pub use distribute::{CollectOptions, LocalPartition, collect_elements_per_rank, collect_vertices_per_rank};
pub use duplicate_faces::{FaceClassification, find_duplicates_in_parallel, resolve_interface_faces};
pub use graph_distribution::{GraphDistribution, build_graph_distribution};
pub use pipeline::{DistributionConfig, MeshDistribution, distribute_mesh};
