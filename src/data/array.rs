//! Plain row-major 2D array.
//!
//! Used for whole datasets held by a single rank (the root copy of the
//! global coordinates or connectivity) and as the result of whole reads.

use crate::mesh_error::MeshPartitionError;

#[derive(Clone, Debug, PartialEq)]
pub struct Array2<T> {
    data: Vec<T>,
    nrow: usize,
    ncol: usize,
}

impl<T: Copy + Default> Array2<T> {
    /// `nrow x ncol` array filled with `T::default()`.
    pub fn zeros(nrow: usize, ncol: usize) -> Self {
        Self {
            data: vec![T::default(); nrow * ncol],
            nrow,
            ncol,
        }
    }
}

impl<T> Array2<T> {
    /// Wrap a row-major buffer; its length must be a multiple of `ncol`.
    pub fn from_vec(data: Vec<T>, ncol: usize) -> Result<Self, MeshPartitionError> {
        if ncol == 0 {
            if !data.is_empty() {
                return Err(MeshPartitionError::LengthMismatch {
                    operation: "Array2::from_vec",
                    expected: 0,
                    found: data.len(),
                });
            }
            return Ok(Self {
                data,
                nrow: 0,
                ncol,
            });
        }
        if data.len() % ncol != 0 {
            return Err(MeshPartitionError::LengthMismatch {
                operation: "Array2::from_vec",
                expected: data.len() - data.len() % ncol,
                found: data.len(),
            });
        }
        Ok(Self {
            nrow: data.len() / ncol,
            data,
            ncol,
        })
    }

    /// Build from equally sized rows.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self, MeshPartitionError>
    where
        T: Clone,
    {
        let ncol = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * ncol);
        for r in rows {
            let r = r.as_ref();
            if r.len() != ncol {
                return Err(MeshPartitionError::LengthMismatch {
                    operation: "Array2::from_rows",
                    expected: ncol,
                    found: r.len(),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Self {
            data,
            nrow: rows.len(),
            ncol,
        })
    }

    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }
    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn row(&self, i: usize) -> Result<&[T], MeshPartitionError> {
        if i >= self.nrow {
            return Err(MeshPartitionError::RowOutOfBounds {
                row: i,
                nrow: self.nrow,
            });
        }
        Ok(&self.data[i * self.ncol..(i + 1) * self.ncol])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // chunks_exact panics on 0
        self.data.chunks_exact(self.ncol.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_row_major() {
        let a = Array2::from_vec(vec![1, 2, 3, 4, 5, 6], 3).unwrap();
        assert_eq!(a.nrow(), 2);
        assert_eq!(a.row(1).unwrap(), &[4, 5, 6]);
        assert_eq!(a.rows().count(), 2);
        assert!(a.row(2).is_err());
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = Array2::from_rows(&[vec![1, 2], vec![3]]).unwrap_err();
        assert!(matches!(err, MeshPartitionError::LengthMismatch { .. }));
        assert!(Array2::from_vec(vec![1, 2, 3], 2).is_err());
    }
}
