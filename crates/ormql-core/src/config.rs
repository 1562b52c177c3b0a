//! Preprocessing configuration.

use serde::{Deserialize, Serialize};

/// Paging capabilities of the target dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Native LIMIT / TOP.
    pub take_supported: bool,
    /// Native OFFSET.
    pub skip_supported: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            take_supported: true,
            skip_supported: true,
        }
    }
}

impl ProviderCapabilities {
    pub fn new(take_supported: bool, skip_supported: bool) -> Self {
        Self {
            take_supported,
            skip_supported,
        }
    }

    /// A dialect without native paging; paging goes through row numbers.
    pub fn none() -> Self {
        Self::new(false, false)
    }

    /// Whether a window can be applied without row numbering.
    pub fn supports(&self, skip: bool, take: bool) -> bool {
        (!skip || self.skip_supported) && (!take || self.take_supported)
    }
}

/// Index selection tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Maximum number of clauses DNF normalization may produce before the
    /// optimizer falls back to parsing the predicate directly.
    pub dnf_clause_budget: usize,

    /// Capacity of the per-primary-index candidate cache.
    pub index_cache_capacity: usize,

    /// Extra IO cost charged per seek into a secondary index.
    pub secondary_seek_penalty: f64,

    /// Row count assumed for indexes without an estimate.
    pub default_row_count: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            dnf_clause_budget: 100,
            index_cache_capacity: 20,
            secondary_seek_penalty: 1.0,
            default_row_count: 1000,
        }
    }
}

impl OptimizerConfig {
    /// Set the DNF clause budget.
    pub fn dnf_clause_budget(mut self, budget: usize) -> Self {
        self.dnf_clause_budget = budget;
        self
    }

    /// Set the candidate cache capacity.
    pub fn index_cache_capacity(mut self, capacity: usize) -> Self {
        self.index_cache_capacity = capacity;
        self
    }

    /// Set the secondary seek penalty.
    pub fn secondary_seek_penalty(mut self, penalty: f64) -> Self {
        self.secondary_seek_penalty = penalty;
        self
    }

    /// Set the assumed row count.
    pub fn default_row_count(mut self, rows: u64) -> Self {
        self.default_row_count = rows;
        self
    }
}

/// Which passes the preprocessor runs, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    pub capabilities: ProviderCapabilities,
    pub optimizer: OptimizerConfig,
    pub correct_ordering: bool,
    pub rewrite_paging: bool,
    pub select_indexes: bool,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            capabilities: ProviderCapabilities::default(),
            optimizer: OptimizerConfig::default(),
            correct_ordering: true,
            rewrite_paging: true,
            select_indexes: true,
        }
    }
}

impl PreprocessorConfig {
    /// Set the dialect capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the optimizer configuration.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn correct_ordering(mut self, enabled: bool) -> Self {
        self.correct_ordering = enabled;
        self
    }

    pub fn rewrite_paging(mut self, enabled: bool) -> Self {
        self.rewrite_paging = enabled;
        self
    }

    pub fn select_indexes(mut self, enabled: bool) -> Self {
        self.select_indexes = enabled;
        self
    }
}
