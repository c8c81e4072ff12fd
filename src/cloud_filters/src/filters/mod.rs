//! Point cloud filters and the name-based filter registry.
//!
//! Every filter implements [`PointsFilter`] and [`FilterDefinition`]. Filters
//! are built either from a typed config (`new(config)`) or from string
//! parameters through [`create_filter`], which looks them up by their
//! registry name.
//!
//! # Example
//!
//! ```ignore
//! use cloud_filters::filters::create_filter;
//! use cloud_filters::params::parameters;
//!
//! let mut filter = create_filter(
//!     "SurfaceNormalDataPointsFilter",
//!     &parameters([("knn", "10"), ("keepDensities", "1")]),
//! )?;
//! let with_normals = filter.filter(&cloud)?;
//! ```

pub mod basic;
pub mod compression;
pub mod density;
pub mod sampling_normal;
pub mod surface_normal;

use std::fmt;

use crate::error::{ConfigError, Result};
use crate::params::{describe, ParamSpec, Parameters};
use crate::points::LabeledPoints;

pub use basic::{
    Dim, FixstepSamplingConfig, FixstepSamplingFilter, IdentityFilter, MaxDistConfig,
    MaxDistFilter, MaxQuantileOnAxisConfig, MaxQuantileOnAxisFilter, MinDistConfig,
    MinDistFilter, OrientNormalsConfig, OrientNormalsFilter, RandomSamplingConfig,
    RandomSamplingFilter,
};
pub use compression::{CompressionConfig, CompressionFilter};
pub use density::{UniformizeDensityConfig, UniformizeDensityFilter};
pub use sampling_normal::{SamplingSurfaceNormalConfig, SamplingSurfaceNormalFilter};
pub use surface_normal::{SurfaceNormalConfig, SurfaceNormalFilter};

/// A transformation stage over labeled point clouds.
///
/// A failing call leaves its input untouched.
pub trait PointsFilter: Send + fmt::Debug {
    /// Registry name of the filter.
    fn name(&self) -> &'static str;

    /// Reset per-sequence state. Called before a new run of a chain.
    fn init(&mut self) {}

    /// Filter a cloud into a new one.
    fn filter(&mut self, input: &LabeledPoints) -> Result<LabeledPoints> {
        let mut cloud = input.clone();
        self.filter_in_place(&mut cloud)?;
        Ok(cloud)
    }

    /// Filter a cloud in place.
    fn filter_in_place(&mut self, cloud: &mut LabeledPoints) -> Result<()>;
}

/// Static description of a filter type.
pub trait FilterDefinition: Sized {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const PARAMETERS: &'static [ParamSpec];

    /// Build the filter from string parameters.
    fn from_params(params: &Parameters) -> Result<Self, ConfigError>;

    /// Human-readable documentation.
    fn documentation() -> String {
        describe(Self::NAME, Self::DESCRIPTION, Self::PARAMETERS)
    }
}

struct Entry {
    name: &'static str,
    build: fn(&Parameters) -> Result<Box<dyn PointsFilter>, ConfigError>,
    doc: fn() -> String,
}

fn build<F>(params: &Parameters) -> Result<Box<dyn PointsFilter>, ConfigError>
where
    F: FilterDefinition + PointsFilter + 'static,
{
    Ok(Box::new(F::from_params(params)?))
}

macro_rules! registry {
    ($($filter:ty),* $(,)?) => {
        &[$(Entry {
            name: <$filter as FilterDefinition>::NAME,
            build: build::<$filter>,
            doc: <$filter as FilterDefinition>::documentation,
        }),*]
    };
}

const REGISTRY: &[Entry] = registry![
    IdentityFilter,
    MaxDistFilter,
    MinDistFilter,
    MaxQuantileOnAxisFilter,
    RandomSamplingFilter,
    FixstepSamplingFilter,
    OrientNormalsFilter,
    SurfaceNormalFilter,
    SamplingSurfaceNormalFilter,
    UniformizeDensityFilter,
    CompressionFilter,
];

fn lookup(name: &str) -> Result<&'static Entry, ConfigError> {
    REGISTRY
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| ConfigError::UnknownFilter(name.to_string()))
}

/// Names of all registered filters.
pub fn filter_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|e| e.name)
}

/// Build a filter by registry name.
pub fn create_filter(name: &str, params: &Parameters) -> Result<Box<dyn PointsFilter>, ConfigError> {
    let entry = lookup(name)?;
    (entry.build)(params)
}

/// Documentation of a registered filter.
pub fn filter_documentation(name: &str) -> Result<String, ConfigError> {
    lookup(name).map(|e| (e.doc)())
}
