//! Data module: distributions, distributed arrays and root-held data

pub mod array;
pub mod connectivity;
pub mod distributed_array;
pub mod range_distribution;
pub mod root;

pub use array::Array2;
pub use connectivity::{ConnectivityFormat, IndexBase, MeshIndex};
pub use distributed_array::{DistributedArray, Hyperslab};
pub use range_distribution::RangeDistribution;
pub use root::RootHandle;
