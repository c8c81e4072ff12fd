//! Ordered filter pipelines.
//!
//! A chain document is a JSON array whose entries are either a filter name or
//! a single-key object mapping the name to its parameters:
//!
//! ```json
//! [
//!     {"SurfaceNormalDataPointsFilter": {"knn": 10, "keepDensities": true}},
//!     "IdentityDataPointsFilter"
//! ]
//! ```

use anyhow::{bail, Context};
use serde_json::Value;

use crate::error::Result;
use crate::filters::{create_filter, PointsFilter};
use crate::params::Parameters;
use crate::points::LabeledPoints;
use crate::timing::{ChainTiming, Timer, TimingCollector};

/// Filters applied one after another, each consuming the previous output.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn PointsFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Box<dyn PointsFilter>) {
        self.filters.push(filter);
    }

    /// Append a filter, builder style.
    pub fn with(mut self, filter: impl PointsFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Registry names of the stages, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Reset the per-sequence state of every stage.
    pub fn init(&mut self) {
        for filter in &mut self.filters {
            filter.init();
        }
    }

    /// Run the cloud through every stage.
    ///
    /// Stops at the first failing stage; the input is never modified.
    pub fn apply(&mut self, cloud: &LabeledPoints) -> Result<LabeledPoints> {
        let mut current = cloud.clone();
        for (stage, filter) in self.filters.iter_mut().enumerate() {
            let before = current.len();
            filter.filter_in_place(&mut current)?;
            tracing::debug!(
                stage,
                filter = filter.name(),
                input = before,
                output = current.len(),
                "applied filter"
            );
        }
        Ok(current)
    }

    /// Like [`apply`](Self::apply), also reporting per-stage timings.
    ///
    /// Elapsed times are zero unless the `profiling` feature is enabled.
    pub fn apply_with_timing(&mut self, cloud: &LabeledPoints) -> Result<(LabeledPoints, ChainTiming)> {
        let mut collector = TimingCollector::new();
        collector.start_chain(cloud.len());

        let mut current = cloud.clone();
        for filter in &mut self.filters {
            let before = current.len();
            let timer = Timer::start();
            filter.filter_in_place(&mut current)?;
            let elapsed_ms = timer.elapsed_ms();
            collector.record_stage(filter.name(), before, current.len(), elapsed_ms);
            tracing::debug!(
                filter = filter.name(),
                input = before,
                output = current.len(),
                elapsed_ms,
                "applied filter"
            );
        }
        Ok((current, collector.finish()))
    }

    /// Build a chain from a JSON document.
    pub fn from_json(document: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(document).context("Chain document is not valid JSON")?;
        let Value::Array(entries) = value else {
            bail!("Chain document must be a JSON array of filters");
        };

        let mut chain = Self::new();
        for (index, entry) in entries.iter().enumerate() {
            let (name, params) = parse_entry(entry).with_context(|| format!("Invalid chain entry {index}"))?;
            let filter = create_filter(&name, &params)
                .with_context(|| format!("Failed to build {name} (chain entry {index})"))?;
            chain.push(filter);
        }
        Ok(chain)
    }
}

fn parse_entry(entry: &Value) -> anyhow::Result<(String, Parameters)> {
    match entry {
        Value::String(name) => Ok((name.clone(), Parameters::new())),
        Value::Object(map) if map.len() == 1 => {
            let Some((name, body)) = map.iter().next() else {
                bail!("Empty filter object");
            };
            let params = match body {
                Value::Null => Parameters::new(),
                Value::Object(values) => values
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), param_value(key, value)?)))
                    .collect::<anyhow::Result<_>>()?,
                other => bail!("Parameters of {name} must be an object, got {other}"),
            };
            Ok((name.clone(), params))
        }
        Value::Object(_) => bail!("Filter object must have exactly one key"),
        other => bail!("Expected a filter name or object, got {other}"),
    }
}

fn param_value(key: &str, value: &Value) -> anyhow::Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        other => bail!("Unsupported value {other} for parameter {key}"),
    }
}
