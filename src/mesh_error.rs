//! MeshPartitionError: unified error type for mesh-partition public APIs
//!
//! Every fallible operation in the crate returns this error. Errors raised
//! after a collective has been agreed on (see
//! [`agree`](crate::algs::collective::agree)) are reported identically on
//! every rank, so callers can bail out without leaving peers blocked.

use thiserror::Error;

/// Unified error type for mesh-partition operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshPartitionError {
    /// A distribution was requested over zero ranks.
    #[error("a distribution needs at least one rank")]
    NoRanks,
    /// A rank index was outside the communicator.
    #[error("rank {rank} is outside a communicator of size {nranks}")]
    RankOutOfRange { rank: usize, nranks: usize },
    /// Ranks disagreed on the global item count passed to a collective build.
    #[error("rank {rank} was given {found} global items, rank 0 was given {expected}")]
    InconsistentGlobalCount {
        rank: usize,
        expected: usize,
        found: usize,
    },
    /// A buffer or layout did not have the size an operation requires.
    #[error("{operation}: expected {expected} entries, found {found}")]
    LengthMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },
    /// Local row index past the end of the local share.
    #[error("row {row} out of bounds (local rows: {nrow})")]
    RowOutOfBounds { row: usize, nrow: usize },
    /// Column index past the row width.
    #[error("column {col} out of bounds (columns: {ncol})")]
    ColumnOutOfBounds { col: usize, ncol: usize },
    /// A global id was not in `0..nglob`.
    #[error("global id {id} out of range (global count: {nglob})")]
    GlobalIdOutOfRange { id: usize, nglob: usize },
    /// A connectivity entry did not decode to a valid 0-based id.
    #[error("connectivity entry {value} does not decode to a valid id")]
    InvalidIndex { value: i64 },
    /// A value did not fit the integer width of the partitioner interface.
    #[error("value {value} does not fit the partitioner index type")]
    IndexOverflow { value: usize },
    /// A root-only operation ran on a rank that holds no root data.
    #[error("{operation}: root-held data is not present on rank {rank}")]
    RootDataMissing {
        operation: &'static str,
        rank: usize,
    },
    /// Root-held data sits on a different rank than the configured root.
    #[error("{operation}: data is held on rank {found}, configured root is {expected}")]
    RootMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },
    /// Transport failure while talking to a peer.
    #[error("communication with rank {neighbor} failed: {message}")]
    CommError { neighbor: usize, message: String },
    /// Another rank failed the local step preceding a collective.
    #[error("{operation} failed on rank(s) {ranks:?}")]
    PeerFailure {
        operation: &'static str,
        ranks: Vec<usize>,
    },
    /// The external partitioning collaborator reported a failure.
    #[error("partitioner entry point `{entry_point}` failed: {message}")]
    Partitioner {
        entry_point: &'static str,
        message: String,
    },
    /// The external file-format collaborator reported a failure.
    #[error("dataset `{path}`: {message}")]
    Dataset { path: String, message: String },
    /// The message-passing runtime could not be initialised.
    #[error("message-passing runtime initialisation failed: {0}")]
    RuntimeInit(String),
}
