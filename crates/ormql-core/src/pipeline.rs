//! Plan preprocessing: ordering correction, paging collapse and index
//! selection, in that order.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::PreprocessorConfig;
use crate::error::Error;
use crate::expr::ParameterContext;
use crate::optimizer::{IndexCatalog, IndexOptimizer};
use crate::provider::{default_ordering_descriptor, OrderingResolver, Provider};
use crate::rewrite::{OrderingCorrector, SkipTakeRewriter};

/// Runs the rewrite passes enabled by a [`PreprocessorConfig`].
///
/// Index selection only runs once an optimizer is attached, since it needs
/// an index catalog from the domain model.
pub struct Preprocessor {
    config: PreprocessorConfig,
    resolver: Arc<OrderingResolver>,
    optimizer: Option<IndexOptimizer>,
}

impl Preprocessor {
    pub fn new(config: PreprocessorConfig) -> Self {
        let resolver: Arc<OrderingResolver> = Arc::new(default_ordering_descriptor);
        Self {
            config,
            resolver,
            optimizer: None,
        }
    }

    /// Classify providers with a custom ordering resolver.
    ///
    /// The attached optimizer, if any, classifies with the same resolver.
    pub fn with_resolver(mut self, resolver: Arc<OrderingResolver>) -> Self {
        self.optimizer = self
            .optimizer
            .take()
            .map(|optimizer| optimizer.with_resolver(resolver.clone()));
        self.resolver = resolver;
        self
    }

    /// Attach an optimizer built from the configured optimizer settings.
    pub fn with_index_catalog(self, catalog: Arc<dyn IndexCatalog>) -> Self {
        let optimizer = IndexOptimizer::new(self.config.optimizer.clone(), catalog);
        self.with_optimizer(optimizer)
    }

    /// Attach a preconfigured optimizer, e.g. one sharing a cache. It takes
    /// over this preprocessor's ordering resolver.
    pub fn with_optimizer(mut self, optimizer: IndexOptimizer) -> Self {
        self.optimizer = Some(optimizer.with_resolver(self.resolver.clone()));
        self
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    pub fn optimizer(&self) -> Option<&IndexOptimizer> {
        self.optimizer.as_ref()
    }

    /// Rewrite `root` into a physically valid plan.
    ///
    /// `expected` holds the parameter values index costing assumes; the
    /// result is correct for any binding.
    #[instrument(skip(self, root, expected), fields(root = root.kind_name()))]
    pub fn process(
        &self,
        root: &Arc<Provider>,
        expected: &ParameterContext,
    ) -> Result<Arc<Provider>, Error> {
        let mut plan = root.clone();

        if self.config.correct_ordering {
            plan = OrderingCorrector::new(self.resolver.as_ref()).correct(&plan)?;
        }
        if self.config.rewrite_paging {
            plan = SkipTakeRewriter::new(self.config.capabilities).rewrite(&plan)?;
        }
        if self.config.select_indexes {
            match &self.optimizer {
                Some(optimizer) => plan = optimizer.optimize(&plan, expected)?,
                None => debug!("no index catalog attached, skipping index selection"),
            }
        }

        Ok(plan)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessorConfig::default())
    }
}
