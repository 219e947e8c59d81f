//! Dataset reader seam.
//!
//! The parallel file-format library is an external collaborator. This
//! module fixes what the decomposition core needs from it: the shape of a
//! 2D dataset (possibly inside nested groups) and hyperslab reads into a
//! caller-provided buffer. [`read_distributed`] reads each rank's block of
//! rows straight into a [`DistributedArray`]; [`read_on_root`] reads a whole
//! dataset on one rank.

use crate::algs::collective::agree;
use crate::algs::communicator::Communicator;
use crate::data::array::Array2;
use crate::data::distributed_array::{DistributedArray, Hyperslab};
use crate::data::root::RootHandle;
use crate::mesh_error::MeshPartitionError;
use bytemuck::Pod;
use std::collections::BTreeMap;
use std::fmt;
use std::mem::size_of;
use std::str::FromStr;

/// `group/.../name` location of a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetPath {
    groups: Vec<String>,
    name: String,
}

impl DatasetPath {
    /// Dataset at the file root.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            groups: Vec::new(),
            name: name.into(),
        }
    }

    /// Same dataset name inside one more (outermost) group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(0, group.into());
        self
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.groups {
            write!(f, "{g}/")?;
        }
        f.write_str(&self.name)
    }
}

impl FromStr for DatasetPath {
    type Err = MeshPartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split('/').filter(|p| !p.is_empty()).collect();
        let name = parts.pop().ok_or_else(|| MeshPartitionError::Dataset {
            path: s.to_string(),
            message: "empty dataset path".into(),
        })?;
        Ok(Self {
            groups: parts.into_iter().map(str::to_string).collect(),
            name: name.to_string(),
        })
    }
}

/// A source of 2D numeric datasets.
pub trait DatasetReader {
    /// `(rows, columns)` of the dataset at `path`.
    fn shape(&self, path: &DatasetPath) -> Result<(usize, usize), MeshPartitionError>;

    /// Fill `out` (row-major, `slab.len()` entries) with the rows of `slab`.
    fn read_hyperslab<T: Pod>(
        &self,
        path: &DatasetPath,
        slab: &Hyperslab,
        out: &mut [T],
    ) -> Result<(), MeshPartitionError>;
}

/// Collective: read this rank's block of rows of `path`.
///
/// Rows are block-distributed; rank `r` reads the hyperslab starting at
/// `(offset[r], 0)` with count `(size[r], ncol)`.
pub fn read_distributed<T, R, C>(
    reader: &R,
    path: &DatasetPath,
    comm: &C,
) -> Result<DistributedArray<T>, MeshPartitionError>
where
    T: Pod,
    R: DatasetReader + ?Sized,
    C: Communicator + ?Sized,
{
    let (nrow, ncol) = agree("read_distributed shape", reader.shape(path), comm)?;
    let mut array = DistributedArray::build(nrow, ncol, comm)?;
    let slab = array.hyperslab();
    log::debug!(
        "[rank {}] reading {path}: rows {:?} of {nrow}",
        comm.rank(),
        slab.rows()
    );
    let read = reader.read_hyperslab(path, &slab, array.as_mut_slice());
    agree("read_distributed", read, comm)?;
    Ok(array)
}

/// Collective: read the whole dataset on `root` only.
pub fn read_on_root<T, R, C>(
    reader: &R,
    path: &DatasetPath,
    root: usize,
    comm: &C,
) -> Result<RootHandle<Array2<T>>, MeshPartitionError>
where
    T: Pod,
    R: DatasetReader + ?Sized,
    C: Communicator + ?Sized,
{
    RootHandle::try_load(comm, root, || {
        let (nrow, ncol) = reader.shape(path)?;
        let slab = Hyperslab {
            row_offset: 0,
            row_count: nrow,
            ncol,
        };
        let mut data = vec![T::zeroed(); slab.len()];
        reader.read_hyperslab(path, &slab, &mut data)?;
        Array2::from_vec(data, ncol)
    })
}

#[derive(Clone, Debug)]
struct StoredDataset {
    nrow: usize,
    ncol: usize,
    width: usize,
    bytes: Vec<u8>,
}

/// In-memory datasets, keyed by path.
#[derive(Clone, Debug, Default)]
pub struct MemoryReader {
    datasets: BTreeMap<DatasetPath, StoredDataset>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `array` at `path`, replacing any previous dataset.
    pub fn insert<T: Pod>(&mut self, path: DatasetPath, array: &Array2<T>) {
        self.datasets.insert(
            path,
            StoredDataset {
                nrow: array.nrow(),
                ncol: array.ncol(),
                width: size_of::<T>(),
                bytes: bytemuck::cast_slice(array.as_slice()).to_vec(),
            },
        );
    }

    pub fn with<T: Pod>(mut self, path: DatasetPath, array: &Array2<T>) -> Self {
        self.insert(path, array);
        self
    }

    fn get(&self, path: &DatasetPath) -> Result<&StoredDataset, MeshPartitionError> {
        self.datasets.get(path).ok_or_else(|| MeshPartitionError::Dataset {
            path: path.to_string(),
            message: "no such dataset".into(),
        })
    }
}

impl DatasetReader for MemoryReader {
    fn shape(&self, path: &DatasetPath) -> Result<(usize, usize), MeshPartitionError> {
        self.get(path).map(|d| (d.nrow, d.ncol))
    }

    fn read_hyperslab<T: Pod>(
        &self,
        path: &DatasetPath,
        slab: &Hyperslab,
        out: &mut [T],
    ) -> Result<(), MeshPartitionError> {
        let d = self.get(path)?;
        let fail = |message: String| MeshPartitionError::Dataset {
            path: path.to_string(),
            message,
        };
        if d.width != size_of::<T>() {
            return Err(fail(format!(
                "stored elements are {} bytes wide, requested {}",
                d.width,
                size_of::<T>()
            )));
        }
        if slab.ncol != d.ncol || slab.row_offset + slab.row_count > d.nrow {
            return Err(fail(format!(
                "hyperslab rows {:?} x {} outside {} x {}",
                slab.rows(),
                slab.ncol,
                d.nrow,
                d.ncol
            )));
        }
        crate::algs::wire::expect_exact_len("read_hyperslab buffer", out.len(), slab.len())?;
        let row_bytes = d.ncol * d.width;
        let start = slab.row_offset * row_bytes;
        let end = start + slab.row_count * row_bytes;
        bytemuck::cast_slice_mut::<T, u8>(out).copy_from_slice(&d.bytes[start..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn nested_paths_parse() {
        let p: DatasetPath = "mesh/hex/ien".parse().unwrap();
        assert_eq!(p.groups(), &["mesh".to_string(), "hex".to_string()]);
        assert_eq!(p.name(), "ien");
        assert_eq!(p.to_string(), "mesh/hex/ien");
        assert_eq!(DatasetPath::new("ien").in_group("hex").in_group("mesh"), p);
        assert!("".parse::<DatasetPath>().is_err());
    }

    #[test]
    fn width_is_checked() {
        let reader = MemoryReader::new().with(
            DatasetPath::new("xcn"),
            &Array2::from_vec(vec![1.0f64, 2.0], 2).unwrap(),
        );
        let err = read_distributed::<f32, _, _>(&reader, &DatasetPath::new("xcn"), &NoComm)
            .unwrap_err();
        assert!(matches!(err, MeshPartitionError::Dataset { .. }));
        let ok = read_distributed::<f64, _, _>(&reader, &DatasetPath::new("xcn"), &NoComm).unwrap();
        assert_eq!(ok.row(0).unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn missing_dataset_on_root() {
        let reader = MemoryReader::new();
        let err = read_on_root::<i32, _, _>(&reader, &DatasetPath::new("ief"), 0, &NoComm)
            .unwrap_err();
        assert!(matches!(err, MeshPartitionError::Dataset { .. }));
    }
}
