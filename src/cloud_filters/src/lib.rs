//! Point cloud preprocessing filters for registration pipelines.
//!
//! Clouds are [`LabeledPoints`]: homogeneous coordinates plus named,
//! column-aligned descriptors. Filters consume a cloud and produce a new one,
//! either fewer points (range, quantile, random and density-driven
//! subsampling, compression) or added descriptors (normals, densities,
//! eigen decompositions).
//!
//! # Filters
//!
//! - Range: `MaxDist`, `MinDist`, `MaxQuantileOnAxis`
//! - Sampling: `RandomSampling`, `FixstepSampling`, `UniformizeDensity`
//! - Geometry: `SurfaceNormal` (k nearest neighbors), `SamplingSurfaceNormal`
//!   (recursive box splitting), `OrientNormals`
//! - `Compression` into local Gaussian distributions
//!
//! # Usage
//!
//! ```ignore
//! use cloud_filters::{FilterChain, LabeledPoints};
//!
//! let mut chain = FilterChain::from_json(r#"[
//!     {"MaxDistDataPointsFilter": {"maxDist": 30}},
//!     {"SurfaceNormalDataPointsFilter": {"knn": 10, "keepDensities": true}},
//!     {"UniformizeDensityDataPointsFilter": {"ratio": 0.5, "seed": 7}}
//! ]"#)?;
//!
//! let scan = LabeledPoints::from_points(&lidar_points);
//! let reduced = chain.apply(&scan)?;
//! ```

pub mod chain;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod params;
pub mod points;
pub mod search;
pub mod test_utils;
pub mod timing;

pub use chain::FilterChain;
pub use error::{ConfigError, FilterError};
pub use filters::{create_filter, filter_documentation, filter_names, FilterDefinition, PointsFilter};
pub use params::{parameters, Parameters};
pub use points::LabeledPoints;
pub use search::{NeighborSearch, SearchBackend};
pub use timing::{ChainTiming, FilterTiming};
