//! Labeled point sets: coordinates plus named per-point descriptors.
//!
//! Points are stored column-wise in homogeneous form, a `(D + 1) x N` matrix
//! whose last row is 1. Every descriptor is a `rows x N` matrix aligned by
//! column with the features; all operations that drop or reorder points apply
//! the same permutation to every descriptor.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::{FilterError, Result};

/// Descriptor holding one unit normal per point (`D` rows).
pub const NORMALS: &str = "normals";
/// Descriptor holding one local density per point (1 row).
pub const DENSITIES: &str = "densities";
/// Descriptor holding ascending eigenvalues (`D` rows).
pub const EIG_VALUES: &str = "eigValues";
/// Descriptor holding eigenvectors, column-major (`D * D` rows).
pub const EIG_VECTORS: &str = "eigVectors";
/// Descriptor holding neighbor indices, `-1` for missing entries (`knn` rows).
pub const MATCHED_IDS: &str = "matchedIds";
/// Descriptor holding a covariance matrix, column-major (`D * D` rows).
pub const COVARIANCE: &str = "covariance";
/// Descriptor holding the number of input points a point stands for (1 row).
pub const NB_POINTS: &str = "nbPoints";

/// A point cloud with named per-point descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoints {
    features: DMatrix<f32>,
    descriptors: BTreeMap<String, DMatrix<f32>>,
}

impl LabeledPoints {
    /// Wrap a homogeneous feature matrix (`D + 1` rows, one column per point).
    pub fn new(features: DMatrix<f32>) -> Result<Self> {
        if features.nrows() < 2 {
            return Err(FilterError::InvalidFeatures(features.nrows()));
        }
        Ok(Self {
            features,
            descriptors: BTreeMap::new(),
        })
    }

    /// Build a cloud from plain coordinates, appending the homogeneous 1.
    ///
    /// # Example
    /// ```
    /// use cloud_filters::LabeledPoints;
    ///
    /// let cloud = LabeledPoints::from_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    /// assert_eq!(cloud.len(), 2);
    /// assert_eq!(cloud.euclidean_dim(), 3);
    /// assert_eq!(cloud.point(1), &[4.0, 5.0, 6.0]);
    /// ```
    pub fn from_points<const D: usize>(points: &[[f32; D]]) -> Self {
        let features =
            DMatrix::from_fn(D + 1, points.len(), |r, c| if r < D { points[c][r] } else { 1.0 });
        Self {
            features,
            descriptors: BTreeMap::new(),
        }
    }

    /// An empty cloud of the given euclidean dimension.
    pub fn empty(dim: usize) -> Self {
        Self {
            features: DMatrix::zeros(dim + 1, 0),
            descriptors: BTreeMap::new(),
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.features.ncols()
    }

    /// Check if the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.features.ncols() == 0
    }

    /// Euclidean dimension `D` (feature rows minus the homogeneous row).
    pub fn euclidean_dim(&self) -> usize {
        self.features.nrows() - 1
    }

    /// The homogeneous feature matrix.
    pub fn features(&self) -> &DMatrix<f32> {
        &self.features
    }

    /// Euclidean coordinates of one point.
    pub fn point(&self, index: usize) -> &[f32] {
        let rows = self.features.nrows();
        let start = index * rows;
        &self.features.as_slice()[start..start + rows - 1]
    }

    /// Overwrite the euclidean coordinates of one point.
    pub fn set_point(&mut self, index: usize, coords: &[f32]) {
        let dim = self.euclidean_dim();
        for (axis, &value) in coords.iter().take(dim).enumerate() {
            self.features[(axis, index)] = value;
        }
    }

    /// One coordinate of one point.
    pub fn coordinate(&self, axis: usize, index: usize) -> f32 {
        self.features[(axis, index)]
    }

    /// Check that `axis` addresses a euclidean coordinate.
    pub fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.euclidean_dim() {
            return Err(FilterError::AxisOutOfRange {
                axis,
                dim: self.euclidean_dim(),
            });
        }
        Ok(())
    }

    /// Look up a descriptor by name.
    pub fn descriptor(&self, name: &str) -> Option<&DMatrix<f32>> {
        self.descriptors.get(name)
    }

    /// Mutable access to a descriptor.
    ///
    /// Callers must not change the column count.
    pub fn descriptor_mut(&mut self, name: &str) -> Option<&mut DMatrix<f32>> {
        self.descriptors.get_mut(name)
    }

    /// Check if a descriptor exists.
    pub fn has_descriptor(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Look up a descriptor that a filter requires, checking its row count.
    pub fn require_descriptor(&self, name: &str, rows: usize) -> Result<&DMatrix<f32>> {
        let values = self
            .descriptors
            .get(name)
            .ok_or_else(|| FilterError::MissingDescriptor(name.to_string()))?;
        if values.nrows() != rows {
            return Err(FilterError::DescriptorDimension {
                name: name.to_string(),
                expected: rows,
                actual: values.nrows(),
            });
        }
        Ok(values)
    }

    /// Add or replace a descriptor. Its column count must equal [`Self::len`].
    pub fn add_descriptor(&mut self, name: impl Into<String>, values: DMatrix<f32>) -> Result<()> {
        let name = name.into();
        if values.ncols() != self.len() {
            return Err(FilterError::DescriptorLength {
                name,
                expected: self.len(),
                actual: values.ncols(),
            });
        }
        self.descriptors.insert(name, values);
        Ok(())
    }

    /// Builder form of [`Self::add_descriptor`].
    pub fn with_descriptor(mut self, name: impl Into<String>, values: DMatrix<f32>) -> Result<Self> {
        self.add_descriptor(name, values)?;
        Ok(self)
    }

    /// Remove a descriptor, returning it if present.
    pub fn remove_descriptor(&mut self, name: &str) -> Option<DMatrix<f32>> {
        self.descriptors.remove(name)
    }

    /// Drop all descriptors.
    pub fn clear_descriptors(&mut self) {
        self.descriptors.clear();
    }

    /// Iterate over descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &DMatrix<f32>)> {
        self.descriptors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Descriptor names in name order.
    pub fn descriptor_names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// New cloud made of the given points, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select_columns(indices),
            descriptors: self
                .descriptors
                .iter()
                .map(|(name, values)| (name.clone(), values.select_columns(indices)))
                .collect(),
        }
    }

    /// Keep only the listed points, compacting columns in place.
    ///
    /// `keep` must be strictly increasing.
    pub fn retain_indices(&mut self, keep: &[usize]) {
        debug_assert!(keep.windows(2).all(|w| w[0] < w[1]));
        compact_columns(&mut self.features, keep);
        for values in self.descriptors.values_mut() {
            compact_columns(values, keep);
        }
    }

    /// Keep the points whose mask entry is `true`.
    pub fn retain_mask(&mut self, mask: &[bool]) {
        debug_assert_eq!(mask.len(), self.len());
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        self.retain_indices(&keep);
    }
}

/// Move the kept columns to the front and shrink the matrix.
fn compact_columns(matrix: &mut DMatrix<f32>, keep: &[usize]) {
    let rows = matrix.nrows();
    {
        let data = matrix.as_mut_slice();
        for (dst, &src) in keep.iter().enumerate() {
            if dst != src {
                data.copy_within(src * rows..(src + 1) * rows, dst * rows);
            }
        }
    }
    matrix.resize_mut(rows, keep.len(), 0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cloud() -> LabeledPoints {
        let cloud = LabeledPoints::from_points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [3.0, 0.0, 0.0],
        ]);
        let ids = DMatrix::from_row_slice(1, 4, &[10.0, 11.0, 12.0, 13.0]);
        cloud.with_descriptor("ids", ids).unwrap()
    }

    #[test]
    fn test_from_points_is_homogeneous() {
        let cloud = LabeledPoints::from_points(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(cloud.euclidean_dim(), 2);
        assert_eq!(cloud.features().nrows(), 3);
        assert_eq!(cloud.features()[(2, 0)], 1.0);
        assert_eq!(cloud.features()[(2, 1)], 1.0);
        assert_eq!(cloud.point(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_new_rejects_missing_homogeneous_row() {
        let err = LabeledPoints::new(DMatrix::zeros(1, 4)).unwrap_err();
        assert_eq!(err, FilterError::InvalidFeatures(1));
    }

    #[test]
    fn test_add_descriptor_length_mismatch() {
        let mut cloud = sample_cloud();
        let err = cloud
            .add_descriptor(NORMALS, DMatrix::zeros(3, 2))
            .unwrap_err();
        assert!(matches!(err, FilterError::DescriptorLength { expected: 4, actual: 2, .. }));
    }

    #[test]
    fn test_require_descriptor() {
        let cloud = sample_cloud();
        assert!(cloud.require_descriptor("ids", 1).is_ok());
        assert!(matches!(
            cloud.require_descriptor("ids", 3),
            Err(FilterError::DescriptorDimension { .. })
        ));
        assert!(matches!(
            cloud.require_descriptor(NORMALS, 3),
            Err(FilterError::MissingDescriptor(_))
        ));
    }

    #[test]
    fn test_retain_keeps_descriptors_aligned() {
        let mut cloud = sample_cloud();
        cloud.retain_mask(&[true, false, true, true]);

        assert_eq!(cloud.len(), 3);
        let ids = cloud.descriptor("ids").unwrap();
        assert_eq!(ids.ncols(), 3);
        for i in 0..cloud.len() {
            assert_eq!(ids[(0, i)] - 10.0, cloud.coordinate(0, i));
        }
    }

    #[test]
    fn test_select_reorders() {
        let cloud = sample_cloud();
        let picked = cloud.select(&[3, 0]);
        assert_eq!(picked.point(0), &[3.0, 0.0, 0.0]);
        assert_eq!(picked.descriptor("ids").unwrap()[(0, 1)], 10.0);
    }

    #[test]
    fn test_check_axis() {
        let cloud = sample_cloud();
        assert!(cloud.check_axis(2).is_ok());
        assert_eq!(
            cloud.check_axis(3),
            Err(FilterError::AxisOutOfRange { axis: 3, dim: 3 })
        );
    }
}
