//! Timing instrumentation for filter chains.
//!
//! Stage names and point counts are always recorded. Elapsed times are only
//! measured when the `profiling` feature is enabled; without it [`Timer`]
//! compiles to a no-op and reports zero.

use serde::{Deserialize, Serialize};
#[cfg(feature = "profiling")]
use std::time::Instant;

/// Timing breakdown for one pass through a filter chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainTiming {
    /// Total chain time
    pub total_ms: f64,
    /// Points entering the chain
    pub input_points: usize,
    /// Points leaving the chain
    pub output_points: usize,
    /// Per-filter breakdown, in chain order
    pub stages: Vec<FilterTiming>,
}

/// Timing for a single filter application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterTiming {
    pub name: String,
    pub elapsed_ms: f64,
    pub input_points: usize,
    pub output_points: usize,
}

impl FilterTiming {
    /// Fraction of the input removed by this stage.
    pub fn reduction(&self) -> f64 {
        if self.input_points == 0 {
            return 0.0;
        }
        1.0 - self.output_points as f64 / self.input_points as f64
    }
}

/// Wall-clock stopwatch for one chain stage.
#[cfg(feature = "profiling")]
#[derive(Debug, Clone, Copy)]
pub struct Timer(Instant);

#[cfg(feature = "profiling")]
impl Timer {
    #[inline]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.0.elapsed().as_secs_f64() * 1000.0
    }
}

/// Stand-in stopwatch that always reads zero.
#[cfg(not(feature = "profiling"))]
#[derive(Debug, Clone, Copy)]
pub struct Timer;

#[cfg(not(feature = "profiling"))]
impl Timer {
    #[inline(always)]
    pub fn start() -> Self {
        Self
    }

    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        0.0
    }
}

/// Collector for timing data while a chain runs.
#[derive(Debug, Default)]
pub struct TimingCollector {
    timing: ChainTiming,
}

impl TimingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_chain(&mut self, input_points: usize) {
        self.timing = ChainTiming {
            input_points,
            output_points: input_points,
            ..ChainTiming::default()
        };
    }

    pub fn record_stage(
        &mut self,
        name: &str,
        input_points: usize,
        output_points: usize,
        elapsed_ms: f64,
    ) {
        self.timing.total_ms += elapsed_ms;
        self.timing.output_points = output_points;
        self.timing.stages.push(FilterTiming {
            name: name.to_string(),
            elapsed_ms,
            input_points,
            output_points,
        });
    }

    pub fn finish(&mut self) -> ChainTiming {
        std::mem::take(&mut self.timing)
    }
}
