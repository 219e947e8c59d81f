//! Classify face ids as unique to one rank or shared between ranks.
//!
//! Each rank scans its element-face connectivity (`|entry| - base` is the
//! face id, the sign is orientation) and keeps the first occurrence of every
//! face. Repeats on the same rank are faces interior to that rank's elements;
//! they never need a cross-rank check and are reported separately.
//!
//! The first-seen lists of all ranks are all-gathered. A face in exactly one
//! rank's list is unique (mesh boundary or rank-private interior), a face in
//! several lists is an interface face. Which rank owns an interface face is
//! left to the caller; `sharing_ranks` lists the candidates.

use crate::algs::collective::{agree, all_gather_variable};
use crate::algs::communicator::Communicator;
use crate::data::connectivity::{ConnectivityFormat, MeshIndex};
use crate::data::distributed_array::DistributedArray;
use crate::mesh_error::MeshPartitionError;
use hashbrown::HashSet;
use itertools::Itertools;
use num_traits::Signed;
use std::collections::{BTreeMap, BTreeSet};

/// Rank-local split of the face ids in a face-connectivity block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalFaceCandidates {
    /// Every distinct face id, in first-seen order.
    pub first_seen: Vec<usize>,
    /// Face ids seen more than once on this rank, in order of their second sighting.
    pub seen_again: Vec<usize>,
}

/// Global unique/shared split of face ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceClassification {
    /// Faces contributed by exactly one rank, ascending.
    pub unique: Vec<usize>,
    /// Faces contributed by two or more ranks, ascending.
    pub shared: Vec<usize>,
    /// Contributing ranks (ascending) of every shared face.
    pub sharing_ranks: BTreeMap<usize, Vec<usize>>,
}

impl FaceClassification {
    pub fn is_shared(&self, face: usize) -> bool {
        self.shared.binary_search(&face).is_ok()
    }

    pub fn is_unique(&self, face: usize) -> bool {
        self.unique.binary_search(&face).is_ok()
    }
}

/// Scan local face-connectivity rows.
pub fn local_face_candidates<I>(
    faces: &DistributedArray<I>,
    format: &ConnectivityFormat,
) -> Result<LocalFaceCandidates, MeshPartitionError>
where
    I: MeshIndex + Signed,
{
    let mut seen = HashSet::new();
    let mut repeated = HashSet::new();
    let mut out = LocalFaceCandidates::default();
    for row in faces.rows() {
        for &raw in format.id_columns(row) {
            let face = format.decode_signed(raw)?;
            if seen.insert(face) {
                out.first_seen.push(face);
            } else if repeated.insert(face) {
                out.seen_again.push(face);
            }
        }
    }
    Ok(out)
}

/// Collective: classify the union of every rank's `first_seen` ids.
///
/// `first_seen` must not repeat an id.
pub fn find_duplicates_in_parallel<C: Communicator + ?Sized>(
    first_seen: &[usize],
    comm: &C,
) -> Result<FaceClassification, MeshPartitionError> {
    let local: Vec<u64> = first_seen.iter().map(|&f| f as u64).collect();
    let all = all_gather_variable(&local, comm)?;

    let counts = all.data().iter().counts();
    let mut unique = Vec::new();
    let mut shared = Vec::new();
    for (&face, n) in counts {
        if n == 1 {
            unique.push(face as usize);
        } else {
            shared.push(face as usize);
        }
    }
    unique.sort_unstable();
    shared.sort_unstable();

    let shared_set: BTreeSet<usize> = shared.iter().copied().collect();
    let mut sharing_ranks: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (rank, contribution) in all.contributions() {
        for &f in contribution {
            if shared_set.contains(&(f as usize)) {
                sharing_ranks.entry(f as usize).or_default().push(rank);
            }
        }
    }
    log::debug!(
        "[rank {}] faces: {} unique, {} shared of {} candidates",
        comm.rank(),
        unique.len(),
        shared.len(),
        all.len()
    );
    Ok(FaceClassification {
        unique,
        shared,
        sharing_ranks,
    })
}

/// Collective: local scan plus global classification.
///
/// Returns the classification and this rank's local candidates (whose
/// `seen_again` ids are left unclassified).
pub fn resolve_interface_faces<I, C>(
    faces: &DistributedArray<I>,
    format: &ConnectivityFormat,
    comm: &C,
) -> Result<(FaceClassification, LocalFaceCandidates), MeshPartitionError>
where
    I: MeshIndex + Signed,
    C: Communicator + ?Sized,
{
    let candidates = agree(
        "resolve_interface_faces",
        local_face_candidates(faces, format),
        comm,
    )?;
    let classification = find_duplicates_in_parallel(&candidates.first_seen, comm)?;
    Ok((classification, candidates))
}
