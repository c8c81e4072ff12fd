//! Lossy compression into local Gaussian distributions.
//!
//! Every point starts as a distribution: its position as mean, a covariance
//! (the `covariance` descriptor if present, `initial_variance * I` otherwise)
//! and a weight (`nbPoints` if present, 1 otherwise). Each pass greedily
//! merges neighboring distributions:
//!
//! 1. Seeds are visited in index order; consumed distributions are skipped.
//! 2. Candidates are the seed and its unconsumed k nearest neighbors within
//!    `max_dist` and within `max_deviation` of the seed.
//! 3. A moment-matched fit gives the weighted mean `μ` and covariance
//!    `Σ = Σ w_j (Σ_j + (x_j - μ)(x_j - μ)ᵀ) / W`.
//! 4. Candidates farther than `max_deviation` from `μ` are dropped and the fit
//!    is redone once. If the seed is dropped or fewer than two members
//!    remain, the seed passes through unchanged.
//! 5. The fitted one-sigma extent, sampled over directions on an angular grid
//!    of step `epsilon`, must not exceed `max_deviation`.
//!
//! Passes stop when one removes nothing or after `max_iteration_count`
//! passes. The output holds one point per distribution with `covariance`
//! and `nbPoints` descriptors; other descriptors are averaged by weight.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use super::{FilterDefinition, PointsFilter};
use crate::error::{ConfigError, Result};
use crate::geometry::{sorted_symmetric_eigen, GeometryColumns, GeometryOutputs, LocalGeometry};
use crate::params::{spec, ParamReader, ParamSpec, Parameters};
use crate::points::{LabeledPoints, COVARIANCE, NB_POINTS};
use crate::search::SearchBackend;

/// Configuration for [`CompressionFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionConfig {
    pub knn: usize,
    pub max_dist: f32,
    /// Angular step of the direction grid used by the shape check.
    pub epsilon: f64,
    pub max_iteration_count: usize,
    /// Isotropic variance of a single input point.
    pub initial_variance: f64,
    /// Maximum distance from the mean for a point to join a distribution.
    pub max_deviation: f64,
    pub keep_normals: bool,
    pub keep_eigen_values: bool,
    pub keep_eigen_vectors: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            knn: 10,
            max_dist: f32::INFINITY,
            epsilon: 0.09817477042,
            max_iteration_count: 5,
            initial_variance: 9e-4,
            max_deviation: 0.3,
            keep_normals: false,
            keep_eigen_values: false,
            keep_eigen_vectors: false,
        }
    }
}

/// Iterative distribution-merging compression filter.
#[derive(Debug, Clone)]
pub struct CompressionFilter {
    config: CompressionConfig,
}

impl CompressionFilter {
    pub fn new(config: CompressionConfig) -> Result<Self, ConfigError> {
        let table = Self::PARAMETERS;
        spec(table, "knn").check(config.knn)?;
        spec(table, "maxDist").check(config.max_dist)?;
        spec(table, "epsilon").check(config.epsilon)?;
        spec(table, "initialVariance").check(config.initial_variance)?;
        spec(table, "maxDeviation").check(config.max_deviation)?;
        Ok(Self { config })
    }
}

impl FilterDefinition for CompressionFilter {
    const NAME: &'static str = "CompressionDataPointsFilter";
    const DESCRIPTION: &'static str = "Lossy compression of a point cloud into local Gaussian distributions. Neighboring points are iteratively merged into distributions whose spread stays below maxDeviation.\n\
         Produced descriptors: covariance, nbPoints.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("knn", "number of nearest neighbors to consider in the reference", "10").range("1", "2147483647"),
        ParamSpec::new("maxDist", "maximum distance to consider for neighbors", "inf").min("0"),
        ParamSpec::new("epsilon", "Step of discretization for the angle spaces", "0.09817477042")
            .range("0", "3.14159265359"),
        ParamSpec::new("maxIterationCount", "Maximum number of iterations", "5").min("0"),
        ParamSpec::new("initialVariance", "Variance on individual point positions (isotropic)", "9e-4")
            .min("1e-6"),
        ParamSpec::new("maxDeviation", "Maximum distance from the mean for a point to represent a distribution.", "0.3")
            .min("0.0"),
        ParamSpec::new("keepNormals", "whether the normals should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenValues", "whether the eigen values should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenVectors", "whether the eigen vectors should be added as descriptors to the resulting cloud", "0"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(CompressionConfig {
            knn: p.get("knn")?,
            max_dist: p.get("maxDist")?,
            epsilon: p.get("epsilon")?,
            max_iteration_count: p.get("maxIterationCount")?,
            initial_variance: p.get("initialVariance")?,
            max_deviation: p.get("maxDeviation")?,
            keep_normals: p.flag("keepNormals")?,
            keep_eigen_values: p.flag("keepEigenValues")?,
            keep_eigen_vectors: p.flag("keepEigenVectors")?,
        })
    }
}

/// A weighted Gaussian standing for one or more input points.
#[derive(Debug, Clone, PartialEq)]
struct Distribution {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    weight: f64,
    /// Other descriptors, stacked in layout order.
    extras: DVector<f64>,
}

/// Descriptors carried through compression, with their row counts.
type Layout = Vec<(String, usize)>;

fn initial_state(
    cloud: &LabeledPoints,
    initial_variance: f64,
) -> Result<(Vec<Distribution>, Layout)> {
    let dim = cloud.euclidean_dim();
    let covariances = if cloud.has_descriptor(COVARIANCE) {
        Some(cloud.require_descriptor(COVARIANCE, dim * dim)?)
    } else {
        None
    };
    let weights = if cloud.has_descriptor(NB_POINTS) {
        Some(cloud.require_descriptor(NB_POINTS, 1)?)
    } else {
        None
    };
    let layout: Layout = cloud
        .descriptors()
        .filter(|(name, _)| *name != COVARIANCE && *name != NB_POINTS)
        .map(|(name, values)| (name.to_string(), values.nrows()))
        .collect();
    let extra_rows: usize = layout.iter().map(|(_, rows)| rows).sum();

    let state = (0..cloud.len())
        .map(|i| {
            let mean = DVector::from_iterator(dim, cloud.point(i).iter().map(|&v| v as f64));
            let covariance = match covariances {
                Some(c) => DMatrix::from_iterator(dim, dim, c.column(i).iter().map(|&v| v as f64)),
                None => DMatrix::identity(dim, dim) * initial_variance,
            };
            let weight = weights.map_or(1.0, |w| w[(0, i)] as f64);
            let mut extras = DVector::zeros(extra_rows);
            let mut row = 0;
            for (name, rows) in &layout {
                if let Some(values) = cloud.descriptor(name) {
                    for r in 0..*rows {
                        extras[row + r] = values[(r, i)] as f64;
                    }
                }
                row += rows;
            }
            Distribution {
                mean,
                covariance,
                weight,
                extras,
            }
        })
        .collect();
    Ok((state, layout))
}

/// Moment-matched fit of the given distributions.
fn fit(state: &[Distribution], members: &[usize]) -> Distribution {
    let first = &state[members[0]];
    let dim = first.mean.len();
    let weight: f64 = members.iter().map(|&j| state[j].weight).sum();

    let mut mean = DVector::zeros(dim);
    let mut extras = DVector::zeros(first.extras.len());
    for &j in members {
        mean += &state[j].mean * state[j].weight;
        extras += &state[j].extras * state[j].weight;
    }
    mean /= weight;
    extras /= weight;

    let mut covariance = DMatrix::zeros(dim, dim);
    for &j in members {
        let delta = &state[j].mean - &mean;
        covariance += (&state[j].covariance + &delta * delta.transpose()) * state[j].weight;
    }
    covariance /= weight;

    Distribution {
        mean,
        covariance,
        weight,
        extras,
    }
}

/// Largest one-sigma extent `sqrt(dᵀ Σ d)` over unit directions `d`.
///
/// # Arguments
/// * `covariance` - Fitted covariance of a candidate distribution
/// * `epsilon` - Angular step of the direction grid, in radians
///
/// # Returns
/// The largest sampled extent in 2-D and 3-D, or `sqrt(λ_max)` exactly in
/// other dimensions and when `epsilon == 0`.
fn max_extent(covariance: &DMatrix<f64>, epsilon: f64) -> f64 {
    let quadratic = |d: &[f64]| -> f64 {
        let mut sum = 0.0;
        for (r, dr) in d.iter().enumerate() {
            for (c, dc) in d.iter().enumerate() {
                sum += dr * covariance[(r, c)] * dc;
            }
        }
        sum.max(0.0).sqrt()
    };

    match covariance.nrows() {
        2 if epsilon > 0.0 => {
            // d and -d give the same extent
            let steps = (PI / epsilon).ceil() as usize;
            (0..steps)
                .map(|k| {
                    let theta = k as f64 * epsilon;
                    quadratic(&[theta.cos(), theta.sin()])
                })
                .fold(0.0, f64::max)
        }
        3 if epsilon > 0.0 => {
            let polar_steps = (PI / epsilon).ceil() as usize;
            let azimuth_steps = (PI / epsilon).ceil() as usize;
            let mut best = 0.0f64;
            for p in 0..=polar_steps {
                let phi = (p as f64 * epsilon).min(PI);
                for a in 0..azimuth_steps {
                    let theta = a as f64 * epsilon;
                    let d = [phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos()];
                    best = best.max(quadratic(&d));
                }
            }
            best
        }
        _ => {
            let (values, _) = sorted_symmetric_eigen(covariance);
            values.iter().copied().fold(0.0, f64::max).sqrt()
        }
    }
}

fn distance(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm()
}

impl CompressionFilter {
    /// One greedy merging pass.
    fn compress_once(&self, state: &[Distribution]) -> Result<Vec<Distribution>> {
        let CompressionConfig {
            knn,
            max_dist,
            epsilon,
            max_deviation,
            ..
        } = self.config;
        let dim = state.first().map_or(0, |d| d.mean.len());

        let features = DMatrix::from_fn(dim + 1, state.len(), |r, c| {
            if r < dim {
                state[c].mean[r] as f32
            } else {
                1.0
            }
        });
        let means = LabeledPoints::new(features)?;
        let search = SearchBackend::KdTree.build(&means);

        let mut consumed = vec![false; state.len()];
        let mut next = Vec::with_capacity(state.len());

        for seed in 0..state.len() {
            if consumed[seed] {
                continue;
            }
            consumed[seed] = true;

            let mut candidates = vec![seed];
            for n in search.knn(means.point(seed), knn, 0.0, max_dist) {
                if n.index != seed
                    && !consumed[n.index]
                    && distance(&state[n.index].mean, &state[seed].mean) <= max_deviation
                {
                    candidates.push(n.index);
                }
            }
            if candidates.len() < 2 {
                next.push(state[seed].clone());
                continue;
            }

            let rough = fit(state, &candidates);
            let members: Vec<usize> = candidates
                .into_iter()
                .filter(|&j| distance(&state[j].mean, &rough.mean) <= max_deviation)
                .collect();
            if members.len() < 2 || members[0] != seed {
                next.push(state[seed].clone());
                continue;
            }

            let merged = fit(state, &members);
            if max_extent(&merged.covariance, epsilon) > max_deviation {
                next.push(state[seed].clone());
                continue;
            }

            for &j in &members {
                consumed[j] = true;
            }
            next.push(merged);
        }
        Ok(next)
    }

    fn to_cloud(&self, state: &[Distribution], layout: &Layout, dim: usize) -> Result<LabeledPoints> {
        let len = state.len();
        let features = DMatrix::from_fn(dim + 1, len, |r, c| {
            if r < dim {
                state[c].mean[r] as f32
            } else {
                1.0
            }
        });
        let mut cloud = LabeledPoints::new(features)?;

        let mut row = 0;
        for (name, rows) in layout {
            let values = DMatrix::from_fn(*rows, len, |r, c| state[c].extras[row + r] as f32);
            cloud.add_descriptor(name.clone(), values)?;
            row += rows;
        }

        let covariance = DMatrix::from_fn(dim * dim, len, |r, c| state[c].covariance.as_slice()[r] as f32);
        cloud.add_descriptor(COVARIANCE, covariance)?;
        let weights = DMatrix::from_fn(1, len, |_, c| state[c].weight as f32);
        cloud.add_descriptor(NB_POINTS, weights)?;

        let outputs = GeometryOutputs {
            normals: self.config.keep_normals,
            densities: false,
            eigen_values: self.config.keep_eigen_values,
            eigen_vectors: self.config.keep_eigen_vectors,
        };
        if outputs.any() {
            let mut columns = GeometryColumns::new(outputs, dim, len);
            for (i, d) in state.iter().enumerate() {
                columns.set(i, &LocalGeometry::from_symmetric(&d.covariance), 0.0);
            }
            columns.attach(&mut cloud)?;
        }
        Ok(cloud)
    }
}

impl PointsFilter for CompressionFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&mut self, input: &LabeledPoints) -> Result<LabeledPoints> {
        let dim = input.euclidean_dim();
        let (mut state, layout) = initial_state(input, self.config.initial_variance)?;

        for iteration in 0..self.config.max_iteration_count {
            if state.is_empty() {
                break;
            }
            let next = self.compress_once(&state)?;
            let removed = state.len() - next.len();
            tracing::debug!(iteration, points = next.len(), removed, "compression pass");
            state = next;
            if removed == 0 {
                break;
            }
        }

        self.to_cloud(&state, &layout, dim)
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        *cloud = self.filter(cloud)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::params::parameters;
    use crate::points::NORMALS;
    use crate::test_utils::{make_clusters, make_random_sphere};
    use approx::assert_relative_eq;

    const CENTERS: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 1.0],
    ];

    #[test]
    fn test_clusters_collapse_to_one_point_each() {
        let cloud = make_clusters(&CENTERS, 0.02, 5, 1);
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        let out = filter.filter(&cloud).unwrap();

        assert_eq!(out.len(), 4);
        let weights = out.require_descriptor(NB_POINTS, 1).unwrap();
        assert!(weights.iter().all(|&w| w == 5.0));
        assert!(out.require_descriptor(COVARIANCE, 9).is_ok());

        for (i, c) in CENTERS.iter().enumerate() {
            for axis in 0..3 {
                assert_relative_eq!(out.coordinate(axis, i), c[axis], epsilon = 0.03);
            }
        }
    }

    #[test]
    fn test_distant_points_are_never_merged() {
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        let out = filter.filter(&cloud).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.point(1), &[1.0, 0.0]);
    }

    #[test]
    fn test_deterministic_and_never_grows() {
        let cloud = make_random_sphere([0.0, 0.0, 0.0], 1.0, 400, 21);
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        let a = filter.filter(&cloud).unwrap();
        let b = filter.filter(&cloud).unwrap();

        assert_eq!(a, b);
        assert!(a.len() < cloud.len());
        let total: f32 = a.descriptor(NB_POINTS).unwrap().iter().sum();
        assert_relative_eq!(total, 400.0);
    }

    #[test]
    fn test_existing_weights_and_descriptors_are_averaged() {
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0], [0.1, 0.0]])
            .with_descriptor(NB_POINTS, DMatrix::from_row_slice(1, 2, &[3.0, 1.0]))
            .unwrap()
            .with_descriptor("intensity", DMatrix::from_row_slice(1, 2, &[2.0, 6.0]))
            .unwrap();
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        let out = filter.filter(&cloud).unwrap();

        assert_eq!(out.len(), 1);
        assert_relative_eq!(out.coordinate(0, 0), 0.025, epsilon = 1e-6);
        assert_eq!(out.descriptor(NB_POINTS).unwrap()[(0, 0)], 4.0);
        assert_relative_eq!(out.descriptor("intensity").unwrap()[(0, 0)], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wide_input_covariance_blocks_merge() {
        let wide = DMatrix::from_fn(4, 2, |r, _| if r == 0 || r == 3 { 1.0 } else { 0.0 });
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0], [0.05, 0.0]])
            .with_descriptor(COVARIANCE, wide)
            .unwrap();
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        let out = filter.filter(&cloud).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.descriptor(COVARIANCE).unwrap()[(0, 0)], 1.0);
    }

    #[test]
    fn test_bad_covariance_descriptor() {
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0]])
            .with_descriptor(COVARIANCE, DMatrix::zeros(3, 1))
            .unwrap();
        let mut filter = CompressionFilter::new(CompressionConfig::default()).unwrap();
        assert!(matches!(
            filter.filter(&cloud),
            Err(FilterError::DescriptorDimension { .. })
        ));
    }

    #[test]
    fn test_zero_iterations_only_attaches_state() {
        let cloud = make_clusters(&CENTERS, 0.02, 3, 2);
        let mut filter = CompressionFilter::from_params(&parameters([("maxIterationCount", "0")])).unwrap();
        let out = filter.filter(&cloud).unwrap();

        assert_eq!(out.len(), cloud.len());
        assert_eq!(out.features(), cloud.features());
        let cov = out.descriptor(COVARIANCE).unwrap();
        assert_relative_eq!(cov[(0, 0)], 9e-4, epsilon = 1e-9);
        assert_relative_eq!(cov[(1, 0)], 0.0);
    }

    #[test]
    fn test_planar_cluster_normal() {
        let pts: Vec<[f32; 3]> = (0..9)
            .map(|i| [(i % 3) as f32 * 0.05, (i / 3) as f32 * 0.05, 0.0])
            .collect();
        let cloud = LabeledPoints::from_points(&pts);
        let mut filter = CompressionFilter::new(CompressionConfig {
            keep_normals: true,
            ..Default::default()
        })
        .unwrap();
        let out = filter.filter(&cloud).unwrap();

        assert_eq!(out.len(), 1);
        let n = out.require_descriptor(NORMALS, 3).unwrap();
        assert_relative_eq!(n[(2, 0)].abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_max_extent() {
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 1.0]));
        assert_relative_eq!(max_extent(&cov, 0.0), 2.0, epsilon = 1e-9);
        assert_relative_eq!(max_extent(&cov, 0.01), 2.0, epsilon = 1e-3);

        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 9.0, 4.0]));
        assert_relative_eq!(max_extent(&cov, 0.0), 3.0, epsilon = 1e-9);
        assert_relative_eq!(max_extent(&cov, 0.05), 3.0, epsilon = 1e-2);
    }

    #[test]
    fn test_invalid_config() {
        assert!(CompressionFilter::from_params(&parameters([("knn", "0")])).is_err());
        assert!(matches!(
            CompressionFilter::from_params(&parameters([("knn", "4000000000")])),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(CompressionFilter::from_params(&parameters([("maxIterationCount", "-1")])).is_err());
        assert!(CompressionFilter::from_params(&parameters([("initialVariance", "0")])).is_err());
    }
}
