//! Recursive space partitioning with per-box normals.
//!
//! The cloud is split recursively by axis-aligned hyperplanes until every box
//! holds at most `bin_size` points. Each terminal box is fused into one output
//! point: the mean of its points, with normal, density and eigen-decomposition
//! computed over all of them.
//!
//! # Algorithm
//!
//! All boxes are `[first, last)` ranges of one shared index permutation. The
//! split axis maximizes `box_extent / cbrt(points_per_unit_length)`, which
//! favors cutting long, sparse directions and keeps box aspect ratios even.
//! The left part receives a whole number of `bin_size` blocks (half of them,
//! rounded up), so every leaf but one is full and the cloud yields exactly
//! `ceil(N / bin_size)` output points.
//!
//! Boxes are processed with an explicit stack, left child first; output order
//! is the traversal order.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};

use super::{FilterDefinition, PointsFilter};
use crate::error::{ConfigError, Result};
use crate::geometry::{self, GeometryColumns, GeometryOutputs};
use crate::params::{spec, ParamReader, ParamSpec, Parameters};
use crate::points::LabeledPoints;

/// Configuration for [`SamplingSurfaceNormalFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSurfaceNormalConfig {
    /// A box with more points than this is split in two.
    pub bin_size: usize,
    /// Average existing descriptors over each box instead of dropping them.
    pub average_existing_descriptors: bool,
    pub outputs: GeometryOutputs,
}

impl Default for SamplingSurfaceNormalConfig {
    fn default() -> Self {
        Self {
            bin_size: 7,
            average_existing_descriptors: true,
            outputs: GeometryOutputs {
                normals: true,
                ..GeometryOutputs::default()
            },
        }
    }
}

/// Subsampling filter computing one normal per spatial box.
#[derive(Debug, Clone)]
pub struct SamplingSurfaceNormalFilter {
    config: SamplingSurfaceNormalConfig,
}

impl SamplingSurfaceNormalFilter {
    pub fn new(config: SamplingSurfaceNormalConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "binSize").check(config.bin_size)?;
        Ok(Self { config })
    }
}

impl FilterDefinition for SamplingSurfaceNormalFilter {
    const NAME: &'static str = "SamplingSurfaceNormalDataPointsFilter";
    const DESCRIPTION: &'static str = "Subsampling, Normals. This filter decomposes the point-cloud space in boxes, by recursively splitting the cloud through axis-aligned hyperplanes such as to maximize the evenness of the aspect ratio of the box. When the number of points in a box reaches a value binSize or lower, the filter computes the center of mass of these points and its normal by taking the eigenvector corresponding to the smallest eigenvalue of all points in the box.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("binSize", "limit over which a box is splitted in two", "7").range("3", "2147483647"),
        ParamSpec::new("averageExistingDescriptors", "whether the filter keep the existing point descriptors and average them or should it drop them", "1"),
        ParamSpec::new("keepNormals", "whether the normals should be added as descriptors to the resulting cloud", "1"),
        ParamSpec::new("keepDensities", "whether the point densities should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenValues", "whether the eigen values should be added as descriptors to the resulting cloud", "0"),
        ParamSpec::new("keepEigenVectors", "whether the eigen vectors should be added as descriptors to the resulting cloud", "0"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(SamplingSurfaceNormalConfig {
            bin_size: p.get("binSize")?,
            average_existing_descriptors: p.flag("averageExistingDescriptors")?,
            outputs: GeometryOutputs {
                normals: p.flag("keepNormals")?,
                densities: p.flag("keepDensities")?,
                eigen_values: p.flag("keepEigenValues")?,
                eigen_vectors: p.flag("keepEigenVectors")?,
            },
        })
    }
}

/// A pending box: index range plus bounds.
#[derive(Debug, Clone)]
struct BoxRange {
    first: usize,
    last: usize,
    min: Vec<f32>,
    max: Vec<f32>,
}

/// Scratch state of one filter call.
struct BuildData<'a> {
    input: &'a LabeledPoints,
    indices: Vec<usize>,
    features: DMatrix<f32>,
    averaged: Vec<(String, DMatrix<f32>)>,
    columns: GeometryColumns,
    cursor: usize,
}

impl<'a> BuildData<'a> {
    fn new(input: &'a LabeledPoints, config: &SamplingSurfaceNormalConfig, leaves: usize) -> Self {
        let dim = input.euclidean_dim();
        let averaged = if config.average_existing_descriptors {
            input
                .descriptors()
                .map(|(name, values)| (name.to_string(), DMatrix::zeros(values.nrows(), leaves)))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            input,
            indices: (0..input.len()).collect(),
            features: DMatrix::zeros(dim + 1, leaves),
            averaged,
            columns: GeometryColumns::new(config.outputs, dim, leaves),
            cursor: 0,
        }
    }

    /// Partition `range` in two, returning the children.
    fn split(&mut self, range: BoxRange, bin_size: usize) -> (BoxRange, BoxRange) {
        let axis = self.split_axis(&range);
        let count = range.last - range.first;
        let blocks = count.div_ceil(bin_size);
        let left_len = bin_size * blocks.div_ceil(2);

        let input = self.input;
        let slice = &mut self.indices[range.first..range.last];
        slice.select_nth_unstable_by(left_len, |&a, &b| compare_on_axis(input, axis, a, b));
        let cut = input.coordinate(axis, slice[left_len]);

        let mid = range.first + left_len;
        let mut left = BoxRange {
            first: range.first,
            last: mid,
            min: range.min.clone(),
            max: range.max.clone(),
        };
        left.max[axis] = cut;
        let mut right = BoxRange {
            first: mid,
            last: range.last,
            min: range.min,
            max: range.max,
        };
        right.min[axis] = cut;
        (left, right)
    }

    /// Axis maximizing box extent over the cube root of linear point density.
    fn split_axis(&self, range: &BoxRange) -> usize {
        let count = (range.last - range.first) as f64;
        let indices = &self.indices[range.first..range.last];

        let mut best_axis = 0;
        let mut best_score = f64::NEG_INFINITY;
        for axis in 0..range.min.len() {
            let (lo, hi) = indices.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &i| {
                let v = self.input.coordinate(axis, i);
                (lo.min(v), hi.max(v))
            });
            let point_extent = (hi - lo) as f64;
            let score = if point_extent > 0.0 {
                let density = count / point_extent;
                (range.max[axis] - range.min[axis]) as f64 / density.cbrt()
            } else {
                0.0
            };
            if score > best_score {
                best_score = score;
                best_axis = axis;
            }
        }
        best_axis
    }

    /// Replace the points of `range` by their mean and local geometry.
    fn fuse(&mut self, range: &BoxRange) {
        let indices = &self.indices[range.first..range.last];
        let dim = self.input.euclidean_dim();
        let n = indices.len() as f64;

        let mut mean = DVector::<f64>::zeros(dim);
        for &i in indices {
            for (axis, &v) in self.input.point(i).iter().enumerate() {
                mean[axis] += v as f64;
            }
        }
        mean /= n;

        let col = self.cursor;
        for axis in 0..dim {
            self.features[(axis, col)] = mean[axis] as f32;
        }
        self.features[(dim, col)] = 1.0;

        for (name, out) in &mut self.averaged {
            if let Some(values) = self.input.descriptor(name) {
                for row in 0..values.nrows() {
                    let sum: f64 = indices.iter().map(|&i| values[(row, i)] as f64).sum();
                    out[(row, col)] = (sum / n) as f32;
                }
            }
        }

        let local = geometry::estimate(self.input, indices);
        let radius = geometry::max_distance(self.input, indices, mean.as_slice());
        let density = geometry::density(indices.len(), radius, dim);
        self.columns.set(col, &local, density);

        self.cursor += 1;
    }

    fn finish(self) -> Result<LabeledPoints> {
        debug_assert_eq!(self.cursor, self.features.ncols());
        let mut out = LabeledPoints::new(self.features)?;
        for (name, values) in self.averaged {
            out.add_descriptor(name, values)?;
        }
        self.columns.attach(&mut out)?;
        Ok(out)
    }
}

/// Total order on one coordinate, ties by index.
fn compare_on_axis(cloud: &LabeledPoints, axis: usize, a: usize, b: usize) -> Ordering {
    cloud
        .coordinate(axis, a)
        .total_cmp(&cloud.coordinate(axis, b))
        .then_with(|| a.cmp(&b))
}

impl PointsFilter for SamplingSurfaceNormalFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter(&mut self, input: &LabeledPoints) -> Result<LabeledPoints> {
        let bin_size = self.config.bin_size;
        let dim = input.euclidean_dim();
        let leaves = input.len().div_ceil(bin_size);
        let mut data = BuildData::new(input, &self.config, leaves);

        if !input.is_empty() {
            let (min, max): (Vec<f32>, Vec<f32>) = (0..dim)
                .map(|axis| {
                    (0..input.len()).fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), i| {
                        let v = input.coordinate(axis, i);
                        (lo.min(v), hi.max(v))
                    })
                })
                .unzip();
            let mut stack = vec![BoxRange {
                first: 0,
                last: input.len(),
                min,
                max,
            }];

            while let Some(range) = stack.pop() {
                if range.last - range.first <= bin_size {
                    data.fuse(&range);
                } else {
                    let (left, right) = data.split(range, bin_size);
                    stack.push(right);
                    stack.push(left);
                }
            }
        }

        tracing::debug!(
            input = input.len(),
            output = leaves,
            bin_size,
            "sampled surface normals"
        );
        data.finish()
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        *cloud = self.filter(cloud)?;
        Ok(())
    }
}
