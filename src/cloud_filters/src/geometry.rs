//! Local surface geometry from point neighborhoods.
//!
//! The estimator computes the scatter matrix of a neighborhood about its
//! centroid, decomposes it and sorts the eigenpairs ascending, so the first
//! eigenvector is the surface normal. Accumulation runs in f64, results are
//! stored in f32.
//!
//! Neighborhoods with fewer than [`MIN_NEIGHBORS`] points are degenerate: the
//! result is isotropic (zero eigenvalues, identity eigenvectors) and flagged,
//! never an error.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::error::Result;
use crate::points::{LabeledPoints, DENSITIES, EIG_VALUES, EIG_VECTORS, NORMALS};

/// Smallest neighborhood with a meaningful scatter matrix.
pub const MIN_NEIGHBORS: usize = 3;

/// Sorted eigen-decomposition of a neighborhood.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalGeometry {
    /// Eigenvalues, ascending.
    pub eigenvalues: DVector<f32>,
    /// Eigenvectors as columns, matching `eigenvalues`.
    pub eigenvectors: DMatrix<f32>,
    /// Set when the neighborhood was too small to decompose.
    pub degenerate: bool,
}

impl LocalGeometry {
    /// Isotropic fallback for degenerate neighborhoods.
    pub fn isotropic(dim: usize) -> Self {
        Self {
            eigenvalues: DVector::zeros(dim),
            eigenvectors: DMatrix::identity(dim, dim),
            degenerate: true,
        }
    }

    /// Decompose a symmetric matrix (scatter or covariance).
    pub fn from_symmetric(matrix: &DMatrix<f64>) -> Self {
        let (values, vectors) = sorted_symmetric_eigen(matrix);
        Self {
            eigenvalues: values.cast::<f32>(),
            eigenvectors: vectors.cast::<f32>(),
            degenerate: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Eigenvector of the smallest eigenvalue, the unit surface normal.
    pub fn normal(&self) -> &[f32] {
        let dim = self.dim();
        &self.eigenvectors.as_slice()[..dim]
    }
}

/// Centroid and scatter matrix `(1/n) Σ (x - c)(x - c)ᵀ` of the given points.
///
/// Returns `None` for an empty index list.
pub fn scatter(cloud: &LabeledPoints, indices: &[usize]) -> Option<(DVector<f64>, DMatrix<f64>)> {
    if indices.is_empty() {
        return None;
    }
    let dim = cloud.euclidean_dim();
    let n = indices.len() as f64;

    let mut centroid = DVector::<f64>::zeros(dim);
    for &i in indices {
        for (axis, &v) in cloud.point(i).iter().enumerate() {
            centroid[axis] += v as f64;
        }
    }
    centroid /= n;

    // Two passes: centering first keeps the f64 sums well conditioned
    let mut scatter = DMatrix::<f64>::zeros(dim, dim);
    let mut delta = DVector::<f64>::zeros(dim);
    for &i in indices {
        for (axis, &v) in cloud.point(i).iter().enumerate() {
            delta[axis] = v as f64 - centroid[axis];
        }
        scatter += &delta * delta.transpose();
    }
    scatter /= n;

    Some((centroid, scatter))
}

/// Estimate local geometry over a neighborhood.
///
/// # Arguments
/// * `cloud` - Cloud holding the neighborhood
/// * `indices` - Columns of the neighborhood, the query point included
///
/// # Returns
/// Eigenpairs of the scatter matrix sorted ascending, or the isotropic
/// result flagged `degenerate` for fewer than [`MIN_NEIGHBORS`] points.
pub fn estimate(cloud: &LabeledPoints, indices: &[usize]) -> LocalGeometry {
    let dim = cloud.euclidean_dim();
    if indices.len() < MIN_NEIGHBORS {
        tracing::trace!(
            neighbors = indices.len(),
            "degenerate neighborhood, using isotropic geometry"
        );
        return LocalGeometry::isotropic(dim);
    }
    match scatter(cloud, indices) {
        Some((_, matrix)) => LocalGeometry::from_symmetric(&matrix),
        None => LocalGeometry::isotropic(dim),
    }
}

/// Symmetric eigen-decomposition with eigenpairs sorted ascending.
///
/// Equal eigenvalues keep the solver's order.
pub fn sorted_symmetric_eigen(matrix: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let eigen = matrix.clone().symmetric_eigen();
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let values = DVector::from_iterator(order.len(), order.iter().map(|&i| eigen.eigenvalues[i]));
    let vectors = eigen.eigenvectors.select_columns(&order);
    (values, vectors)
}

/// Volume of the unit ball in `dim` dimensions.
pub fn unit_ball_volume(dim: usize) -> f64 {
    match dim {
        0 => 1.0,
        1 => 2.0,
        d => unit_ball_volume(d - 2) * 2.0 * PI / d as f64,
    }
}

/// Points per unit volume of the ball of `radius` holding `count` points.
///
/// # Arguments
/// * `count` - Number of points in the ball
/// * `radius` - Ball radius, usually the farthest neighbor distance
/// * `dim` - Euclidean dimension
///
/// # Returns
/// `count / V_dim(radius)`, or 0 when `radius` is not positive.
pub fn density(count: usize, radius: f64, dim: usize) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    (count as f64 / (unit_ball_volume(dim) * radius.powi(dim as i32))) as f32
}

/// Largest euclidean distance from `center` to the given points.
pub fn max_distance(cloud: &LabeledPoints, indices: &[usize], center: &[f64]) -> f64 {
    indices
        .iter()
        .map(|&i| {
            cloud
                .point(i)
                .iter()
                .zip(center)
                .map(|(&p, &c)| (p as f64 - c).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .fold(0.0, f64::max)
}

/// Which geometry descriptors a filter emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometryOutputs {
    pub normals: bool,
    pub densities: bool,
    pub eigen_values: bool,
    pub eigen_vectors: bool,
}

impl GeometryOutputs {
    pub fn any(&self) -> bool {
        self.normals || self.densities || self.eigen_values || self.eigen_vectors
    }
}

/// Column buffers for geometry descriptors, filled point by point.
#[derive(Debug, Clone)]
pub struct GeometryColumns {
    dim: usize,
    normals: Option<DMatrix<f32>>,
    densities: Option<DMatrix<f32>>,
    eigen_values: Option<DMatrix<f32>>,
    eigen_vectors: Option<DMatrix<f32>>,
}

impl GeometryColumns {
    pub fn new(outputs: GeometryOutputs, dim: usize, len: usize) -> Self {
        let alloc = |on: bool, rows: usize| on.then(|| DMatrix::zeros(rows, len));
        Self {
            dim,
            normals: alloc(outputs.normals, dim),
            densities: alloc(outputs.densities, 1),
            eigen_values: alloc(outputs.eigen_values, dim),
            eigen_vectors: alloc(outputs.eigen_vectors, dim * dim),
        }
    }

    /// Write the descriptors of point `column`.
    pub fn set(&mut self, column: usize, geometry: &LocalGeometry, density: f32) {
        if let Some(m) = &mut self.normals {
            m.column_mut(column).copy_from_slice(geometry.normal());
        }
        if let Some(m) = &mut self.densities {
            m[(0, column)] = density;
        }
        if let Some(m) = &mut self.eigen_values {
            m.column_mut(column)
                .copy_from_slice(geometry.eigenvalues.as_slice());
        }
        if let Some(m) = &mut self.eigen_vectors {
            debug_assert_eq!(geometry.dim(), self.dim);
            m.column_mut(column)
                .copy_from_slice(geometry.eigenvectors.as_slice());
        }
    }

    /// Attach the filled descriptors to `cloud`, replacing existing ones.
    pub fn attach(self, cloud: &mut LabeledPoints) -> Result<()> {
        let named = [
            (NORMALS, self.normals),
            (DENSITIES, self.densities),
            (EIG_VALUES, self.eigen_values),
            (EIG_VECTORS, self.eigen_vectors),
        ];
        for (name, values) in named {
            if let Some(values) = values {
                cloud.add_descriptor(name, values)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_neighborhood() {
        let cloud = LabeledPoints::from_points(&[
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.5, 0.5, 1.0],
        ]);
        let geometry = estimate(&cloud, &[0, 1, 2, 3, 4]);

        assert!(!geometry.degenerate);
        assert_relative_eq!(geometry.eigenvalues[0], 0.0, epsilon = 1e-6);
        assert!(geometry.eigenvalues[0] <= geometry.eigenvalues[1]);
        assert!(geometry.eigenvalues[1] <= geometry.eigenvalues[2]);

        let n = geometry.normal();
        assert_relative_eq!(n[2].abs(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(n[0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(n[1], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_too_few_neighbors_is_isotropic() {
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let geometry = estimate(&cloud, &[0, 1]);
        assert!(geometry.degenerate);
        assert_eq!(geometry.eigenvalues, DVector::zeros(3));
        assert_eq!(geometry.eigenvectors, DMatrix::identity(3, 3));
    }

    #[test]
    fn test_duplicates_still_decompose() {
        let cloud = LabeledPoints::from_points(&[[2.0, 2.0]; 4]);
        let geometry = estimate(&cloud, &[0, 1, 2, 3]);
        assert!(!geometry.degenerate);
        assert_relative_eq!(geometry.eigenvalues[1], 0.0, epsilon = 1e-9);
        assert!(geometry.eigenvalues.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_scatter_is_biased_covariance() {
        let cloud = LabeledPoints::from_points(&[[-1.0, 0.0], [1.0, 0.0]]);
        let (centroid, matrix) = scatter(&cloud, &[0, 1]).unwrap();
        assert_relative_eq!(centroid[0], 0.0);
        assert_relative_eq!(matrix[(0, 0)], 1.0);
        assert_relative_eq!(matrix[(1, 1)], 0.0);
    }

    #[test]
    fn test_sorted_eigen_ascending() {
        let m = DMatrix::from_diagonal(&DVector::from_vec(vec![3.0, 1.0, 2.0]));
        let (values, vectors) = sorted_symmetric_eigen(&m);
        assert_relative_eq!(values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], 3.0, epsilon = 1e-12);
        assert_relative_eq!(vectors[(1, 0)].abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(vectors[(0, 2)].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_ball_volume() {
        assert_relative_eq!(unit_ball_volume(1), 2.0);
        assert_relative_eq!(unit_ball_volume(2), PI, epsilon = 1e-12);
        assert_relative_eq!(unit_ball_volume(3), 4.0 / 3.0 * PI, epsilon = 1e-12);
    }

    #[test]
    fn test_density() {
        assert_eq!(density(10, 0.0, 3), 0.0);
        let rho = density(4, 1.0, 2);
        assert_relative_eq!(rho, (4.0 / PI) as f32, epsilon = 1e-6);
    }

    #[test]
    fn test_columns_attach() {
        let mut cloud = LabeledPoints::from_points(&[[0.0, 0.0], [1.0, 1.0]]);
        let outputs = GeometryOutputs {
            normals: true,
            eigen_vectors: true,
            ..Default::default()
        };
        let mut columns = GeometryColumns::new(outputs, 2, 2);
        let g = LocalGeometry::isotropic(2);
        columns.set(0, &g, 1.0);
        columns.set(1, &g, 1.0);
        columns.attach(&mut cloud).unwrap();

        assert_eq!(cloud.descriptor(NORMALS).unwrap().nrows(), 2);
        assert_eq!(cloud.descriptor(EIG_VECTORS).unwrap().nrows(), 4);
        assert!(!cloud.has_descriptor(DENSITIES));
    }
}
