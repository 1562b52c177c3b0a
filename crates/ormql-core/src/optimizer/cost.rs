//! Access path costing.
//!
//! Costs combine IO (index seeks and rows read) and CPU (rows produced and
//! predicates evaluated) with fixed weights. Selectivities are heuristic:
//! this layer compares candidate ranges, it does not estimate cardinality
//! from statistics.

use crate::config::OptimizerConfig;
use crate::provider::IndexInfo;
use crate::range::{Entire, Range, RangeSet};

/// Cost estimate for an access path or a piece of one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostEstimate {
    /// Estimated number of rows returned.
    pub estimated_rows: u64,
    /// Estimated I/O operations (seeks, rows read).
    pub io_cost: u64,
    /// Estimated CPU cost (rows produced, predicate evaluations).
    pub cpu_cost: u64,
    /// Total weighted cost (io_cost * IO_WEIGHT + cpu_cost * CPU_WEIGHT).
    pub total_cost: f64,
}

impl CostEstimate {
    /// Weight for I/O operations in total cost calculation.
    const IO_WEIGHT: f64 = 10.0;
    /// Weight for CPU operations in total cost calculation.
    const CPU_WEIGHT: f64 = 1.0;

    /// Create a new cost estimate.
    pub fn new(estimated_rows: u64, io_cost: u64, cpu_cost: u64) -> Self {
        let total_cost = (io_cost as f64 * Self::IO_WEIGHT) + (cpu_cost as f64 * Self::CPU_WEIGHT);
        Self {
            estimated_rows,
            io_cost,
            cpu_cost,
            total_cost,
        }
    }

    /// Create a zero-cost estimate.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Add another cost estimate to this one.
    pub fn add(&self, other: &CostEstimate) -> CostEstimate {
        CostEstimate::new(
            self.estimated_rows + other.estimated_rows,
            self.io_cost + other.io_cost,
            self.cpu_cost + other.cpu_cost,
        )
    }

    /// Cost of evaluating a predicate on each of these rows.
    pub fn with_filter(&self) -> CostEstimate {
        CostEstimate::new(self.estimated_rows, self.io_cost, self.cpu_cost + self.estimated_rows)
    }
}

/// Scores reading a range set from an index.
///
/// Supplied by the domain model; the optimizer only compares the totals.
pub trait CostEvaluator: Send + Sync {
    fn evaluate(&self, index: &IndexInfo, ranges: &RangeSet) -> CostEstimate;
}

/// Fixed-selectivity cost evaluator.
///
/// A point costs `1 / rows` on a unique key and 0.1 otherwise; a range
/// bounded on one side 0.3, on both sides 0.09; an unbounded range 1.0.
/// Selectivities of disjoint ranges add up, capped at 1.0.
#[derive(Debug, Clone)]
pub struct HeuristicCostEvaluator {
    default_row_count: u64,
    secondary_seek_penalty: f64,
}

impl Default for HeuristicCostEvaluator {
    fn default() -> Self {
        Self::new(&OptimizerConfig::default())
    }
}

impl HeuristicCostEvaluator {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            default_row_count: config.default_row_count,
            secondary_seek_penalty: config.secondary_seek_penalty,
        }
    }

    fn row_count(&self, index: &IndexInfo) -> u64 {
        index.row_count.unwrap_or(self.default_row_count)
    }

    /// Fraction of the index's rows that `ranges` selects.
    pub fn selectivity(&self, index: &IndexInfo, ranges: &RangeSet) -> f64 {
        let rows = self.row_count(index).max(1) as f64;
        ranges
            .ranges()
            .iter()
            .map(|range| {
                if range.as_point().is_some() {
                    return if index.is_unique_on_leading_key() {
                        1.0 / rows
                    } else {
                        0.1
                    };
                }
                match (bounded_below(range), bounded_above(range)) {
                    (true, true) => 0.09,
                    (true, false) | (false, true) => 0.3,
                    (false, false) => 1.0,
                }
            })
            .sum::<f64>()
            .min(1.0)
    }
}

impl CostEvaluator for HeuristicCostEvaluator {
    fn evaluate(&self, index: &IndexInfo, ranges: &RangeSet) -> CostEstimate {
        let rows = self.row_count(index);
        let selected = (rows as f64 * self.selectivity(index, ranges)).ceil() as u64;
        let seeks = ranges.ranges().len() as u64;
        let seek_cost = if index.is_primary {
            seeks
        } else {
            (seeks as f64 * (1.0 + self.secondary_seek_penalty)).ceil() as u64
        };
        CostEstimate::new(selected, seek_cost + selected, selected)
    }
}

/// Null never satisfies a comparison, so a range starting at or just past
/// null is unbounded below for costing.
fn bounded_below(range: &Range) -> bool {
    match &range.low {
        Entire::NegativeInfinity => false,
        Entire::Value { value, .. } => !value.is_null(),
        Entire::PositiveInfinity => true,
    }
}

fn bounded_above(range: &Range) -> bool {
    !matches!(range.high, Entire::PositiveInfinity)
}
