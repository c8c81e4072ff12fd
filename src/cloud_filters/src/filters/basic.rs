//! Simple per-point filters: thresholds, subsampling and normal orientation.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FilterDefinition, PointsFilter};
use crate::error::{ConfigError, FilterError, Result};
use crate::params::{spec, ParamReader, ParamSpec, Parameters};
use crate::points::{LabeledPoints, NORMALS};

/// Coordinate a threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    /// Euclidean norm of the point.
    Radius,
    Axis(usize),
}

impl Dim {
    fn check(self, cloud: &LabeledPoints) -> Result<()> {
        match self {
            Dim::Radius => Ok(()),
            Dim::Axis(axis) => cloud.check_axis(axis),
        }
    }

    /// Absolute coordinate or norm of point `index`.
    fn magnitude(self, cloud: &LabeledPoints, index: usize) -> f32 {
        match self {
            Dim::Radius => cloud.point(index).iter().map(|v| v * v).sum::<f32>().sqrt(),
            Dim::Axis(axis) => cloud.coordinate(axis, index).abs(),
        }
    }
}

impl FromStr for Dim {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "-1" | "radius" => Ok(Dim::Radius),
            "x" => Ok(Dim::Axis(0)),
            "y" => Ok(Dim::Axis(1)),
            "z" => Ok(Dim::Axis(2)),
            other => other.parse::<usize>().map(Dim::Axis).map_err(|_| ()),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Radius => write!(f, "radius"),
            Dim::Axis(axis) => write!(f, "{axis}"),
        }
    }
}

fn keep_where(cloud: &mut LabeledPoints, keep: impl Fn(&LabeledPoints, usize) -> bool) {
    let mask: Vec<bool> = (0..cloud.len()).map(|i| keep(cloud, i)).collect();
    cloud.retain_mask(&mask);
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Does nothing.
#[derive(Debug, Clone, Default)]
pub struct IdentityFilter;

impl FilterDefinition for IdentityFilter {
    const NAME: &'static str = "IdentityDataPointsFilter";
    const DESCRIPTION: &'static str = "Does nothing.";
    const PARAMETERS: &'static [ParamSpec] = &[];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Ok(Self)
    }
}

impl PointsFilter for IdentityFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, _cloud: &mut LabeledPoints) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MaxDist / MinDist
// ---------------------------------------------------------------------------

/// Configuration for [`MaxDistFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxDistConfig {
    pub dim: Dim,
    pub max_dist: f32,
}

impl Default for MaxDistConfig {
    fn default() -> Self {
        Self {
            dim: Dim::Radius,
            max_dist: 1.0,
        }
    }
}

/// Keeps points strictly closer than `max_dist` along `dim`.
#[derive(Debug, Clone)]
pub struct MaxDistFilter {
    config: MaxDistConfig,
}

impl MaxDistFilter {
    pub fn new(config: MaxDistConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "maxDist").check(config.max_dist)?;
        Ok(Self { config })
    }
}

impl FilterDefinition for MaxDistFilter {
    const NAME: &'static str = "MaxDistDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Subsampling. Filter points beyond a maximum distance measured on a specific axis.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("dim", "dimension on which the filter will be applied. x=0, y=1, z=2, radius=-1", "-1"),
        ParamSpec::new("maxDist", "maximum distance authorized", "1").min("0"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(MaxDistConfig {
            dim: p.parsed("dim")?,
            max_dist: p.get("maxDist")?,
        })
    }
}

impl PointsFilter for MaxDistFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let MaxDistConfig { dim, max_dist } = self.config;
        dim.check(cloud)?;
        keep_where(cloud, |c, i| dim.magnitude(c, i) < max_dist);
        Ok(())
    }
}

/// Configuration for [`MinDistFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinDistConfig {
    pub dim: Dim,
    pub min_dist: f32,
}

impl Default for MinDistConfig {
    fn default() -> Self {
        Self {
            dim: Dim::Radius,
            min_dist: 1.0,
        }
    }
}

/// Keeps points strictly farther than `min_dist` along `dim`.
#[derive(Debug, Clone)]
pub struct MinDistFilter {
    config: MinDistConfig,
}

impl MinDistFilter {
    pub fn new(config: MinDistConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "minDist").check(config.min_dist)?;
        Ok(Self { config })
    }
}

impl FilterDefinition for MinDistFilter {
    const NAME: &'static str = "MinDistDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Subsampling. Filter points before a minimum distance measured on a specific axis.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("dim", "dimension on which the filter will be applied. x=0, y=1, z=2, radius=-1", "-1"),
        ParamSpec::new("minDist", "minimum value authorized", "1").min("0"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(MinDistConfig {
            dim: p.parsed("dim")?,
            min_dist: p.get("minDist")?,
        })
    }
}

impl PointsFilter for MinDistFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let MinDistConfig { dim, min_dist } = self.config;
        dim.check(cloud)?;
        keep_where(cloud, |c, i| dim.magnitude(c, i) > min_dist);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MaxQuantileOnAxis
// ---------------------------------------------------------------------------

/// Configuration for [`MaxQuantileOnAxisFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxQuantileOnAxisConfig {
    pub axis: usize,
    /// Fraction of points kept.
    pub ratio: f32,
}

impl Default for MaxQuantileOnAxisConfig {
    fn default() -> Self {
        Self {
            axis: 0,
            ratio: 0.5,
        }
    }
}

/// Keeps the `floor(N * ratio)` points with the smallest absolute coordinate.
///
/// Points are ranked by `|coord|` on the chosen axis, so the quantile is a
/// symmetric band around 0 rather than a one-sided cut of the signed value.
/// Ties are broken by index and the kept points stay in input order.
#[derive(Debug, Clone)]
pub struct MaxQuantileOnAxisFilter {
    config: MaxQuantileOnAxisConfig,
}

impl MaxQuantileOnAxisFilter {
    pub fn new(config: MaxQuantileOnAxisConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "ratio").check(config.ratio)?;
        Ok(Self { config })
    }
}

impl FilterDefinition for MaxQuantileOnAxisFilter {
    const NAME: &'static str = "MaxQuantileOnAxisDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Subsampling. Filter points beyond a maximum quantile measured on a specific axis.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("dim", "dimension on which the filter will be applied. x=0, y=1, z=2", "0"),
        ParamSpec::new("ratio", "maximum quantile authorized. All points beyond that will be filtered", "0.5")
            .range("0.0000001", "0.9999999"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        let axis = match p.parsed::<Dim>("dim")? {
            Dim::Axis(axis) => axis,
            Dim::Radius => {
                return Err(ConfigError::InvalidValue {
                    name: "dim".into(),
                    value: Dim::Radius.to_string(),
                })
            }
        };
        Self::new(MaxQuantileOnAxisConfig {
            axis,
            ratio: p.get("ratio")?,
        })
    }
}

impl PointsFilter for MaxQuantileOnAxisFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let MaxQuantileOnAxisConfig { axis, ratio } = self.config;
        cloud.check_axis(axis)?;

        let kept = (cloud.len() as f64 * ratio as f64).floor() as usize;
        let mut order: Vec<usize> = (0..cloud.len()).collect();
        order.sort_by(|&a, &b| {
            let va = cloud.coordinate(axis, a).abs();
            let vb = cloud.coordinate(axis, b).abs();
            va.total_cmp(&vb).then_with(|| a.cmp(&b))
        });
        order.truncate(kept);
        order.sort_unstable();

        cloud.retain_indices(&order);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RandomSampling
// ---------------------------------------------------------------------------

/// Configuration for [`RandomSamplingFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomSamplingConfig {
    /// Probability to keep a point.
    pub prob: f32,
    /// Seed for reproducible runs; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for RandomSamplingConfig {
    fn default() -> Self {
        Self {
            prob: 0.75,
            seed: None,
        }
    }
}

/// Keeps each point independently with probability `prob`.
#[derive(Debug, Clone)]
pub struct RandomSamplingFilter {
    config: RandomSamplingConfig,
    rng: StdRng,
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl RandomSamplingFilter {
    pub fn new(config: RandomSamplingConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "prob").check(config.prob)?;
        Ok(Self {
            config,
            rng: make_rng(config.seed),
        })
    }
}

impl FilterDefinition for RandomSamplingFilter {
    const NAME: &'static str = "RandomSamplingDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Subsampling. This filter reduces the size of the point cloud by randomly dropping points.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("prob", "probability to keep a point, one over decimation factor", "0.75")
            .range("0", "1"),
        ParamSpec::new("seed", "seed of the random generator", ""),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(RandomSamplingConfig {
            prob: p.get("prob")?,
            seed: p.optional("seed")?,
        })
    }
}

impl PointsFilter for RandomSamplingFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) {
        if self.config.seed.is_some() {
            self.rng = make_rng(self.config.seed);
        }
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let prob = self.config.prob;
        let mask: Vec<bool> = (0..cloud.len())
            .map(|_| self.rng.gen::<f32>() < prob)
            .collect();
        cloud.retain_mask(&mask);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixstepSampling
// ---------------------------------------------------------------------------

/// Configuration for [`FixstepSamplingFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixstepSamplingConfig {
    /// Initial decimation factor; only its integer part is used as a step.
    pub start_step: f64,
    pub end_step: f64,
    /// Factor applied to the step after each call.
    pub step_mult: f64,
}

impl Default for FixstepSamplingConfig {
    fn default() -> Self {
        Self {
            start_step: 10.0,
            end_step: 10.0,
            step_mult: 1.0,
        }
    }
}

/// Keeps every `step`-th point, the step evolving geometrically between calls.
#[derive(Debug, Clone)]
pub struct FixstepSamplingFilter {
    config: FixstepSamplingConfig,
    step: f64,
}

impl FixstepSamplingFilter {
    pub fn new(config: FixstepSamplingConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "startStep").check(config.start_step)?;
        spec(Self::PARAMETERS, "endStep").check(config.end_step)?;
        spec(Self::PARAMETERS, "stepMult").check(config.step_mult)?;
        Ok(Self {
            config,
            step: config.start_step,
        })
    }

    /// Step used by the next call.
    pub fn current_step(&self) -> usize {
        (self.step.floor() as usize).max(1)
    }
}

impl FilterDefinition for FixstepSamplingFilter {
    const NAME: &'static str = "FixstepSamplingDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Subsampling. This filter reduces the size of the point cloud by only keeping one point over step ones; with step varying in time from startStep to endStep, each iteration getting multiplied by stepMult.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("startStep", "initial number of point to skip (initial decimation factor)", "10").min("1"),
        ParamSpec::new("endStep", "maximal or minimal number of points to skip (final decimation factor)", "10").min("1"),
        ParamSpec::new("stepMult", "multiplication factor to compute the new decimation factor for each iteration", "1")
            .min("0.0000001"),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(FixstepSamplingConfig {
            start_step: p.get("startStep")?,
            end_step: p.get("endStep")?,
            step_mult: p.get("stepMult")?,
        })
    }
}

impl PointsFilter for FixstepSamplingFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) {
        self.step = self.config.start_step;
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let step = self.current_step();
        let keep: Vec<usize> = (0..cloud.len()).step_by(step).collect();
        cloud.retain_indices(&keep);

        let FixstepSamplingConfig {
            end_step,
            step_mult,
            ..
        } = self.config;
        self.step *= step_mult;
        if step_mult > 1.0 {
            self.step = self.step.min(end_step);
        } else if step_mult < 1.0 {
            self.step = self.step.max(end_step);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OrientNormals
// ---------------------------------------------------------------------------

/// Configuration for [`OrientNormalsFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientNormalsConfig {
    /// Orient normals toward the origin instead of away from it.
    pub toward_center: bool,
}

/// Flips normals so that they all face away from (or toward) the origin.
#[derive(Debug, Clone, Default)]
pub struct OrientNormalsFilter {
    config: OrientNormalsConfig,
}

impl OrientNormalsFilter {
    pub fn new(config: OrientNormalsConfig) -> Result<Self, ConfigError> {
        Ok(Self { config })
    }
}

impl FilterDefinition for OrientNormalsFilter {
    const NAME: &'static str = "OrientNormalsDataPointsFilter";
    const DESCRIPTION: &'static str =
        "Reorientation of normals. Normals are oriented away from the sensor origin, or toward it.\n\
         Required descriptors: normals.";
    const PARAMETERS: &'static [ParamSpec] = &[ParamSpec::new(
        "towardCenter",
        "If 1, normals point toward the origin; if 0, away from it",
        "0",
    )];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(OrientNormalsConfig {
            toward_center: p.flag("towardCenter")?,
        })
    }
}

impl PointsFilter for OrientNormalsFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let dim = cloud.euclidean_dim();
        let dots: Vec<f32> = {
            let normals = cloud.require_descriptor(NORMALS, dim)?;
            (0..cloud.len())
                .map(|i| {
                    cloud
                        .point(i)
                        .iter()
                        .zip(normals.column(i).iter())
                        .map(|(p, n)| p * n)
                        .sum()
                })
                .collect()
        };

        let toward = self.config.toward_center;
        let normals = cloud
            .descriptor_mut(NORMALS)
            .ok_or_else(|| FilterError::MissingDescriptor(NORMALS.to_string()))?;
        for (i, dot) in dots.into_iter().enumerate() {
            let flip = if toward { dot > 0.0 } else { dot < 0.0 };
            if flip {
                normals.column_mut(i).neg_mut();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::parameters;
    use nalgebra::DMatrix;

    fn line(values: &[f32]) -> LabeledPoints {
        let pts: Vec<[f32; 3]> = values.iter().map(|&v| [v, 0.0, 0.0]).collect();
        LabeledPoints::from_points(&pts)
    }

    #[test]
    fn test_dim_parsing() {
        assert_eq!("-1".parse::<Dim>(), Ok(Dim::Radius));
        assert_eq!("radius".parse::<Dim>(), Ok(Dim::Radius));
        assert_eq!("y".parse::<Dim>(), Ok(Dim::Axis(1)));
        assert_eq!("2".parse::<Dim>(), Ok(Dim::Axis(2)));
        assert!("-2".parse::<Dim>().is_err());
    }

    #[test]
    fn test_identity() {
        let cloud = line(&[1.0, 2.0]);
        let out = IdentityFilter.filter(&cloud).unwrap();
        assert_eq!(out, cloud);
    }

    #[test]
    fn test_max_dist_radius() {
        let cloud = LabeledPoints::from_points(&[
            [0.5, 0.0, 0.0],
            [3.0, 4.0, 0.0],
            [1.0, 1.0, 1.0],
            [-2.0, 0.0, 0.0],
        ]);
        let mut filter = MaxDistFilter::new(MaxDistConfig {
            dim: Dim::Radius,
            max_dist: 2.0,
        })
        .unwrap();
        let out = filter.filter(&cloud).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.point(0), &[0.5, 0.0, 0.0]);
        assert_eq!(out.point(1), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_max_dist_is_strict_on_axis() {
        let cloud = line(&[-1.0, 0.5, 1.0, 2.0]);
        let mut filter = MaxDistFilter::from_params(&parameters([("dim", "x"), ("maxDist", "1")])).unwrap();
        let out = filter.filter(&cloud).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.coordinate(0, 0), 0.5);
    }

    #[test]
    fn test_max_dist_axis_out_of_range() {
        let cloud = LabeledPoints::from_points(&[[1.0, 2.0]]);
        let mut filter = MaxDistFilter::new(MaxDistConfig {
            dim: Dim::Axis(2),
            max_dist: 1.0,
        })
        .unwrap();
        assert_eq!(
            filter.filter(&cloud),
            Err(FilterError::AxisOutOfRange { axis: 2, dim: 2 })
        );
    }

    #[test]
    fn test_min_dist_keeps_descriptors_aligned() {
        let cloud = line(&[0.2, 3.0, -5.0, 1.0])
            .with_descriptor("tag", DMatrix::from_row_slice(1, 4, &[0.0, 1.0, 2.0, 3.0]))
            .unwrap();
        let mut filter = MinDistFilter::new(MinDistConfig::default()).unwrap();
        let out = filter.filter(&cloud).unwrap();

        assert_eq!(out.len(), 2);
        let tag = out.descriptor("tag").unwrap();
        assert_eq!(tag[(0, 0)], 1.0);
        assert_eq!(tag[(0, 1)], 2.0);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = MinDistFilter::new(MinDistConfig {
            dim: Dim::Radius,
            min_dist: -1.0,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_max_quantile_exact_count() {
        let cloud = line(&[5.0, -1.0, 3.0, 2.0, -4.0, 0.0, 1.0]);
        let mut filter = MaxQuantileOnAxisFilter::new(MaxQuantileOnAxisConfig {
            axis: 0,
            ratio: 0.5,
        })
        .unwrap();
        let out = filter.filter(&cloud).unwrap();

        // floor(7 * 0.5) = 3 smallest |x|: -1, 0, 1 in input order
        assert_eq!(out.len(), 3);
        assert_eq!(out.coordinate(0, 0), -1.0);
        assert_eq!(out.coordinate(0, 1), 0.0);
        assert_eq!(out.coordinate(0, 2), 1.0);
    }

    #[test]
    fn test_max_quantile_ties_by_index() {
        let cloud = line(&[1.0, -1.0, 1.0, 1.0]);
        let mut filter = MaxQuantileOnAxisFilter::new(MaxQuantileOnAxisConfig {
            axis: 0,
            ratio: 0.5,
        })
        .unwrap();
        let out = filter.filter(&cloud).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.coordinate(0, 0), 1.0);
        assert_eq!(out.coordinate(0, 1), -1.0);
    }

    #[test]
    fn test_max_quantile_rejects_radius() {
        let err = MaxQuantileOnAxisFilter::from_params(&parameters([("dim", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_random_sampling_seeded() {
        let pts: Vec<[f32; 2]> = (0..1000).map(|i| [i as f32, 0.0]).collect();
        let cloud = LabeledPoints::from_points(&pts);
        let config = RandomSamplingConfig {
            prob: 0.3,
            seed: Some(7),
        };

        let a = RandomSamplingFilter::new(config).unwrap().filter(&cloud).unwrap();
        let b = RandomSamplingFilter::new(config).unwrap().filter(&cloud).unwrap();
        assert_eq!(a, b);
        assert!(a.len() > 200 && a.len() < 400, "kept {}", a.len());
    }

    #[test]
    fn test_random_sampling_extremes() {
        let cloud = line(&[1.0, 2.0, 3.0]);
        let mut all = RandomSamplingFilter::new(RandomSamplingConfig { prob: 1.0, seed: Some(1) }).unwrap();
        assert_eq!(all.filter(&cloud).unwrap().len(), 3);
        let mut none = RandomSamplingFilter::new(RandomSamplingConfig { prob: 0.0, seed: Some(1) }).unwrap();
        assert_eq!(none.filter(&cloud).unwrap().len(), 0);
    }

    #[test]
    fn test_fixstep_unit_step_is_identity() {
        let cloud = line(&[1.0, 2.0, 3.0, 4.0]);
        let mut filter = FixstepSamplingFilter::from_params(&parameters([
            ("startStep", "1"),
            ("endStep", "1"),
            ("stepMult", "1"),
        ]))
        .unwrap();
        assert_eq!(filter.filter(&cloud).unwrap(), cloud);
    }

    #[test]
    fn test_fixstep_step_growth_and_init() {
        let pts: Vec<[f32; 1]> = (0..20).map(|i| [i as f32]).collect();
        let cloud = LabeledPoints::from_points(&pts);
        let mut filter = FixstepSamplingFilter::new(FixstepSamplingConfig {
            start_step: 2.0,
            end_step: 5.0,
            step_mult: 2.0,
        })
        .unwrap();

        assert_eq!(filter.filter(&cloud).unwrap().len(), 10);
        assert_eq!(filter.current_step(), 4);
        assert_eq!(filter.filter(&cloud).unwrap().len(), 5);
        // clamped to endStep
        assert_eq!(filter.current_step(), 5);
        assert_eq!(filter.filter(&cloud).unwrap().len(), 4);

        filter.init();
        assert_eq!(filter.current_step(), 2);
    }

    #[test]
    fn test_fixstep_fractional_steps() {
        let pts: Vec<[f32; 1]> = (0..20).map(|i| [i as f32]).collect();
        let cloud = LabeledPoints::from_points(&pts);
        let mut filter = FixstepSamplingFilter::from_params(&parameters([
            ("startStep", "2.5"),
            ("endStep", "8.5"),
            ("stepMult", "1.5"),
        ]))
        .unwrap();

        // floor(2.5) = 2
        assert_eq!(filter.filter(&cloud).unwrap().len(), 10);
        // 3.75 -> 3
        assert_eq!(filter.current_step(), 3);
        assert_eq!(filter.filter(&cloud).unwrap().len(), 7);

        assert!(FixstepSamplingFilter::from_params(&parameters([("startStep", "0.5")])).is_err());
    }

    #[test]
    fn test_orient_normals() {
        let normals = DMatrix::from_column_slice(2, 3, &[1.0, 0.0, 0.0, 1.0, -1.0, 0.0]);
        let cloud = LabeledPoints::from_points(&[[-2.0, 0.0], [0.0, 3.0], [-1.0, 1.0]])
            .with_descriptor(NORMALS, normals)
            .unwrap();

        let mut away = OrientNormalsFilter::default();
        let out = away.filter(&cloud).unwrap();
        let n = out.descriptor(NORMALS).unwrap();
        for i in 0..out.len() {
            let dot: f32 = out.point(i).iter().zip(n.column(i).iter()).map(|(p, n)| p * n).sum();
            assert!(dot >= 0.0);
        }

        let mut toward = OrientNormalsFilter::new(OrientNormalsConfig { toward_center: true }).unwrap();
        let out = toward.filter(&cloud).unwrap();
        let n = out.descriptor(NORMALS).unwrap();
        for i in 0..out.len() {
            let dot: f32 = out.point(i).iter().zip(n.column(i).iter()).map(|(p, n)| p * n).sum();
            assert!(dot <= 0.0);
        }
    }

    #[test]
    fn test_orient_normals_requires_normals() {
        let cloud = line(&[1.0]);
        let err = OrientNormalsFilter::default().filter(&cloud).unwrap_err();
        assert_eq!(err, FilterError::MissingDescriptor(NORMALS.into()));
    }
}
