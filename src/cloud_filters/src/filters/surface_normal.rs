//! Per-point surface normals from k-nearest-neighbor eigen-decomposition.
//!
//! For every point the filter gathers its `knn` nearest neighbors (the point
//! itself included) within `max_dist`, estimates the local geometry with
//! [`crate::geometry::estimate`] and appends the requested descriptors. No
//! point is removed and the order is preserved.
//!
//! Neighborhoods are processed in parallel with rayon; results are collected
//! in input order, so the output does not depend on scheduling.

use nalgebra::DMatrix;
use rayon::prelude::*;

use super::{FilterDefinition, PointsFilter};
use crate::error::{ConfigError, Result};
use crate::geometry::{self, GeometryColumns, GeometryOutputs, LocalGeometry};
use crate::params::{spec, ParamReader, ParamSpec, Parameters};
use crate::points::{LabeledPoints, MATCHED_IDS};
use crate::search::{Neighbor, SearchBackend};

/// Configuration for [`SurfaceNormalFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceNormalConfig {
    /// Neighbors per point, including the point itself.
    pub knn: usize,
    /// Approximation bound forwarded to the neighbor search.
    pub epsilon: f32,
    /// Neighbors farther than this are ignored.
    pub max_dist: f32,
    pub outputs: GeometryOutputs,
    pub keep_matched_ids: bool,
    pub backend: SearchBackend,
}

impl Default for SurfaceNormalConfig {
    fn default() -> Self {
        Self {
            knn: 5,
            epsilon: 0.0,
            max_dist: f32::INFINITY,
            outputs: GeometryOutputs {
                normals: true,
                ..GeometryOutputs::default()
            },
            keep_matched_ids: false,
            backend: SearchBackend::KdTree,
        }
    }
}

/// Surface normal estimation filter.
#[derive(Debug, Clone)]
pub struct SurfaceNormalFilter {
    config: SurfaceNormalConfig,
}

impl SurfaceNormalFilter {
    pub fn new(config: SurfaceNormalConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "knn").check(config.knn)?;
        spec(Self::PARAMETERS, "epsilon").check(config.epsilon)?;
        spec(Self::PARAMETERS, "maxDist").check(config.max_dist)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SurfaceNormalConfig {
        &self.config
    }
}

impl FilterDefinition for SurfaceNormalFilter {
    const NAME: &'static str = "SurfaceNormalDataPointsFilter";
    const DESCRIPTION: &'static str = "Normals. This filter extracts the normal to each point by taking the eigenvector corresponding to the smallest eigenvalue of its nearest neighbors.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("knn", "number of nearest neighbors to consider, including the point itself", "5").range("3", "2147483647"),
        ParamSpec::new("epsilon", "approximation to use for the nearest-neighbor search", "0").min("0"),
        ParamSpec::new("maxDist", "maximum distance to consider for neighbors", "inf").min("0"),
        ParamSpec::new("keepNormals", "whether the normals should be added as descriptors to the resulting cloud", "1"),
        ParamSpec::new("keepDensities", "whether the point densities should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenValues", "whether the eigen values should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenVectors", "whether the eigen vectors should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepMatchedIds", "whether the identifiers of matched points should be added as descriptors to the resulting cloud", "0"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(SurfaceNormalConfig {
            knn: p.get("knn")?,
            epsilon: p.get("epsilon")?,
            max_dist: p.get("maxDist")?,
            outputs: GeometryOutputs {
                normals: p.flag("keepNormals")?,
                densities: p.flag("keepDensities")?,
                eigen_values: p.flag("keepEigenValues")?,
                eigen_vectors: p.flag("keepEigenVectors")?,
            },
            keep_matched_ids: p.flag("keepMatchedIds")?,
            backend: SearchBackend::KdTree,
        })
    }
}

/// Result of one neighborhood.
struct PointEstimate {
    neighbors: Vec<Neighbor>,
    geometry: LocalGeometry,
    density: f32,
}

impl PointsFilter for SurfaceNormalFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let SurfaceNormalConfig {
            knn,
            epsilon,
            max_dist,
            outputs,
            keep_matched_ids,
            backend,
        } = self.config;
        if !outputs.any() && !keep_matched_ids {
            return Ok(());
        }

        let dim = cloud.euclidean_dim();
        let len = cloud.len();
        let search = backend.build(cloud);
        let source: &LabeledPoints = cloud;

        let estimates: Vec<PointEstimate> = (0..len)
            .into_par_iter()
            .map(|i| {
                let neighbors = search.knn(source.point(i), knn, epsilon, max_dist);
                let indices: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
                let geometry = geometry::estimate(source, &indices);
                let radius = neighbors.last().map_or(0.0, |n| n.distance as f64);
                PointEstimate {
                    density: geometry::density(neighbors.len(), radius, dim),
                    neighbors,
                    geometry,
                }
            })
            .collect();

        let degenerate = estimates.iter().filter(|e| e.geometry.degenerate).count();
        tracing::debug!(
            points = len,
            knn,
            degenerate,
            "estimated surface normals"
        );

        let mut columns = GeometryColumns::new(outputs, dim, len);
        let mut matched = keep_matched_ids.then(|| DMatrix::from_element(knn, len, -1.0f32));
        for (i, estimate) in estimates.iter().enumerate() {
            columns.set(i, &estimate.geometry, estimate.density);
            if let Some(ids) = &mut matched {
                for (row, n) in estimate.neighbors.iter().enumerate() {
                    ids[(row, i)] = n.index as f32;
                }
            }
        }

        columns.attach(cloud)?;
        if let Some(ids) = matched {
            cloud.add_descriptor(MATCHED_IDS, ids)?;
        }
        Ok(())
    }
}
