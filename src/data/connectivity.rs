//! Decoding of raw connectivity rows into 0-based global ids.
//!
//! Connectivity datasets can carry leading metadata columns (element type,
//! owning element) and store ids 1-based. Face connectivity additionally
//! encodes orientation in the sign of each entry.

use crate::mesh_error::MeshPartitionError;
use bytemuck::Pod;
use num_traits::{PrimInt, Signed};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Integer type usable as connectivity storage.
pub trait MeshIndex: Pod + PrimInt + Debug + Send + Sync {}

impl<T: Pod + PrimInt + Debug + Send + Sync> MeshIndex for T {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBase {
    #[default]
    Zero,
    One,
}

impl IndexBase {
    #[inline]
    fn shift(self) -> i64 {
        match self {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityFormat {
    /// Columns before the first id.
    pub leading_columns: usize,
    pub base: IndexBase,
}

impl ConnectivityFormat {
    /// Plain 0-based ids, no metadata columns.
    pub const fn plain() -> Self {
        Self {
            leading_columns: 0,
            base: IndexBase::Zero,
        }
    }

    /// One metadata column followed by 1-based ids.
    pub const fn tagged_one_based() -> Self {
        Self {
            leading_columns: 1,
            base: IndexBase::One,
        }
    }

    /// Id entries of a raw row.
    pub fn id_columns<'r, I>(&self, row: &'r [I]) -> &'r [I] {
        row.get(self.leading_columns..).unwrap_or(&[])
    }

    /// Number of ids in a raw row of `ncol` columns.
    pub fn ids_per_row(&self, ncol: usize) -> usize {
        ncol.saturating_sub(self.leading_columns)
    }

    /// `raw - base`; must be non-negative.
    pub fn decode<I: MeshIndex>(&self, raw: I) -> Result<usize, MeshPartitionError> {
        let v = to_i64(raw)?;
        let id = v - self.base.shift();
        usize::try_from(id).map_err(|_| MeshPartitionError::InvalidIndex { value: v })
    }

    /// `|raw| - base`; the sign only carries orientation.
    pub fn decode_signed<I: MeshIndex + Signed>(&self, raw: I) -> Result<usize, MeshPartitionError> {
        let v = to_i64(raw)?;
        let magnitude = v.checked_abs().ok_or(MeshPartitionError::InvalidIndex { value: v })?;
        let id = magnitude - self.base.shift();
        usize::try_from(id).map_err(|_| MeshPartitionError::InvalidIndex { value: v })
    }

    /// Decode every id of a raw row.
    pub fn decode_row<I: MeshIndex>(&self, row: &[I]) -> Result<Vec<usize>, MeshPartitionError> {
        self.id_columns(row).iter().map(|&v| self.decode(v)).collect()
    }
}

fn to_i64<I: MeshIndex>(raw: I) -> Result<i64, MeshPartitionError> {
    raw.to_i64().ok_or(MeshPartitionError::InvalidIndex { value: i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_rows_skip_metadata_and_rebase() {
        let fmt = ConnectivityFormat::tagged_one_based();
        assert_eq!(fmt.decode_row(&[12i32, 1, 5, 3]).unwrap(), vec![0, 4, 2]);
        assert_eq!(fmt.ids_per_row(9), 8);
    }

    #[test]
    fn signed_faces_drop_orientation() {
        let fmt = ConnectivityFormat::tagged_one_based();
        assert_eq!(fmt.decode_signed(-7i64).unwrap(), 6);
        assert_eq!(fmt.decode_signed(7i64).unwrap(), 6);
        assert_eq!(
            fmt.decode_signed(0i32).unwrap_err(),
            MeshPartitionError::InvalidIndex { value: 0 }
        );
    }

    #[test]
    fn most_negative_signed_face_is_invalid() {
        let fmt = ConnectivityFormat::plain();
        assert_eq!(
            fmt.decode_signed(i64::MIN).unwrap_err(),
            MeshPartitionError::InvalidIndex { value: i64::MIN }
        );
    }

    #[test]
    fn negative_plain_id_is_invalid() {
        let fmt = ConnectivityFormat::plain();
        assert!(fmt.decode(-1i32).is_err());
        assert_eq!(fmt.decode(3u32).unwrap(), 3);
    }

    #[test]
    fn format_from_json() {
        let fmt: ConnectivityFormat =
            serde_json::from_str(r#"{"leading_columns":1,"base":"one"}"#).unwrap();
        assert_eq!(fmt, ConnectivityFormat::tagged_one_based());
        let fmt: ConnectivityFormat = serde_json::from_str("{}").unwrap();
        assert_eq!(fmt, ConnectivityFormat::plain());
    }
}
