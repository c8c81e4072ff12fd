//! Density-driven subsampling.
//!
//! Removes a fraction `ratio` of the points while flattening the density
//! distribution: dense regions lose points, sparse regions are preserved.
//! Each point with density `ρ > 0` is kept with probability `min(1, t / ρ)`,
//! where the cap `t` is chosen so that the expected number of kept points
//! matches the target `floor(N * (1 - ratio))`.
//!
//! The expected count `E(t) = #(ρ <= t) + t * Σ_{ρ > t} 1/ρ` is evaluated
//! exactly at the edges of a `nb_bin` histogram over `[0, max ρ]`; `t` is
//! interpolated within the first bin reaching the target.

use rand::rngs::StdRng;
use rand::Rng;

use super::basic::make_rng;
use super::{FilterDefinition, PointsFilter};
use crate::error::{ConfigError, Result};
use crate::params::{spec, ParamReader, ParamSpec, Parameters};
use crate::points::{LabeledPoints, DENSITIES};

/// Configuration for [`UniformizeDensityFilter`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformizeDensityConfig {
    /// Fraction of points to remove.
    pub ratio: f32,
    /// Histogram bins used to estimate the density distribution.
    pub nb_bin: usize,
    pub seed: Option<u64>,
}

impl Default for UniformizeDensityConfig {
    fn default() -> Self {
        Self {
            ratio: 0.5,
            nb_bin: 1,
            seed: None,
        }
    }
}

/// Subsampling filter that uniformizes point density.
///
/// Requires the `densities` descriptor.
#[derive(Debug, Clone)]
pub struct UniformizeDensityFilter {
    config: UniformizeDensityConfig,
    rng: StdRng,
}

impl UniformizeDensityFilter {
    pub fn new(config: UniformizeDensityConfig) -> Result<Self, ConfigError> {
        spec(Self::PARAMETERS, "ratio").check(config.ratio)?;
        spec(Self::PARAMETERS, "nbBin").check(config.nb_bin)?;
        Ok(Self {
            config,
            rng: make_rng(config.seed),
        })
    }
}

impl FilterDefinition for UniformizeDensityFilter {
    const NAME: &'static str = "UniformizeDensityDataPointsFilter";
    const DESCRIPTION: &'static str = "Subsampling. Reduce the points number of a certain ration while trying to uniformize the density of the point cloud.\n\
         Required descriptors: densities.";
    const PARAMETERS: &'static [ParamSpec] = &[
        ParamSpec::new("ratio", "targeted reduction ratio", "0.5").range("0.0000001", "0.9999999"),
        ParamSpec::new("nbBin", "number of bin used to estimate the probability distribution of the density.", "1")
            .min("1"),
        ParamSpec::new("seed", "seed of the random generator", ""),
    ];

    fn from_params(params: &Parameters) -> Result<Self, ConfigError> {
        let p = ParamReader::new(Self::NAME, Self::PARAMETERS, params)?;
        Self::new(UniformizeDensityConfig {
            ratio: p.get("ratio")?,
            nb_bin: p.get("nbBin")?,
            seed: p.optional("seed")?,
        })
    }
}

/// Find the density cap `t` whose expected kept count reaches `target`.
///
/// Returns `None` when even `t = 0` keeps more than `target` points.
fn density_cap(densities: &[f32], nb_bin: usize, target: usize) -> Option<f64> {
    let max = densities.iter().copied().fold(0.0f32, f32::max) as f64;
    let always_kept = densities.iter().filter(|&&d| d <= 0.0).count();
    if max <= 0.0 {
        return Some(0.0);
    }

    let width = max / nb_bin as f64;
    let mut counts = vec![0usize; nb_bin];
    let mut inverse = vec![0.0f64; nb_bin];
    for &d in densities.iter().filter(|&&d| d > 0.0) {
        let d = d as f64;
        // Bin b holds densities in (b * width, (b + 1) * width]
        let bin = ((d / width).ceil() as usize).clamp(1, nb_bin) - 1;
        counts[bin] += 1;
        inverse[bin] += 1.0 / d;
    }

    let mut below = always_kept;
    let mut above: f64 = inverse.iter().sum();
    let mut previous = (0.0, always_kept as f64);
    if previous.1 > target as f64 {
        return None;
    }

    for bin in 0..nb_bin {
        below += counts[bin];
        above -= inverse[bin];
        let edge = (bin + 1) as f64 * width;
        let expected = below as f64 + edge * above.max(0.0);
        if expected >= target as f64 {
            let (t0, e0) = previous;
            let t = if expected > e0 {
                t0 + (target as f64 - e0) / (expected - e0) * (edge - t0)
            } else {
                edge
            };
            return Some(t);
        }
        previous = (edge, expected);
    }
    Some(max)
}

impl PointsFilter for UniformizeDensityFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) {
        if self.config.seed.is_some() {
            self.rng = make_rng(self.config.seed);
        }
    }

    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()> {
        let densities: Vec<f32> = cloud.require_descriptor(DENSITIES, 1)?.iter().copied().collect();
        let len = densities.len();
        if len == 0 {
            return Ok(());
        }

        let target = (len as f64 * (1.0 - self.config.ratio as f64)).floor() as usize;
        let cap = match density_cap(&densities, self.config.nb_bin, target) {
            Some(cap) => cap,
            None => {
                tracing::warn!(
                    points = len,
                    target,
                    "reduction target unreachable, keeping points without positive density"
                );
                0.0
            }
        };

        let mask: Vec<bool> = densities
            .iter()
            .map(|&d| {
                if d <= 0.0 {
                    return true;
                }
                let keep_prob = (cap / d as f64).min(1.0);
                self.rng.gen::<f64>() < keep_prob
            })
            .collect();
        cloud.retain_mask(&mask);

        tracing::debug!(input = len, target, output = cloud.len(), cap, "uniformized density");
        Ok(())
    }
}
