//! Index selection.
//!
//! A Filter directly over a primary index scan is replaced, when an index
//! range is cheaper, by a Seek, MultiSeek, Range or RangeSet access path
//! over the primary index or a covering secondary, plus a residual Filter
//! for the conjuncts the ranges do not represent exactly. Disjunctive
//! predicates may also be split into one access path per DNF clause,
//! combined with a distinct Union.
//!
//! Failure to improve is never an error: the original subtree is kept.

pub mod cache;
pub mod cost;
pub mod dnf;
pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::config::OptimizerConfig;
use crate::error::Error;
use crate::expr::{Expr, ParameterContext};
use crate::flatten::{conjunction, flatten_and};
use crate::provider::{
    default_ordering_descriptor, IndexId, IndexInfo, OrderingResolver, Provider, ProviderKind,
};
use crate::range::{RangeSet, RangeSetExpr};
use crate::rewrite::rebuild;

pub use cache::{CacheStats, Candidates, IndexMetadataCache};
pub use cost::{CostEstimate, CostEvaluator, HeuristicCostEvaluator};
pub use dnf::{normalize, Dnf, DnfError};
pub use parser::{Extraction, PredicateParser};

/// Source of index metadata for a table.
pub trait IndexCatalog: Send + Sync {
    /// Every index over the rows of `primary`, other than `primary` itself.
    fn indexes_for(&self, primary: &IndexInfo) -> Vec<Arc<IndexInfo>>;
}

/// Catalog holding a fixed set of secondary indexes per primary.
#[derive(Debug, Clone, Default)]
pub struct StaticIndexCatalog {
    secondaries: HashMap<IndexId, Vec<Arc<IndexInfo>>>,
}

impl StaticIndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secondary index of `primary`.
    pub fn with_index(mut self, primary: IndexId, index: impl Into<Arc<IndexInfo>>) -> Self {
        self.secondaries
            .entry(primary)
            .or_default()
            .push(index.into());
        self
    }
}

impl IndexCatalog for StaticIndexCatalog {
    fn indexes_for(&self, primary: &IndexInfo) -> Vec<Arc<IndexInfo>> {
        self.secondaries
            .get(&primary.id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Ranges and residual predicate for one index.
#[derive(Debug, Clone)]
struct IndexPlan {
    index: Arc<IndexInfo>,
    ranges: RangeSetExpr,
    residual: Vec<Expr>,
    cost: CostEstimate,
}

/// A chosen way to read the filtered rows.
#[derive(Debug, Clone)]
enum AccessPlan {
    Single(IndexPlan),
    /// One plan per DNF clause, unioned.
    Union(Vec<IndexPlan>),
}

impl AccessPlan {
    fn cost(&self) -> f64 {
        match self {
            AccessPlan::Single(plan) => plan.cost.total_cost,
            AccessPlan::Union(branches) => {
                let total = branches
                    .iter()
                    .fold(CostEstimate::zero(), |acc, b| acc.add(&b.cost));
                // Deduplication touches every produced row once more.
                total.with_filter().total_cost
            }
        }
    }
}

/// Cost-based index selector.
pub struct IndexOptimizer {
    config: OptimizerConfig,
    catalog: Arc<dyn IndexCatalog>,
    cost: Arc<dyn CostEvaluator>,
    cache: Arc<IndexMetadataCache>,
    resolver: Arc<OrderingResolver>,
}

impl IndexOptimizer {
    /// Create an optimizer with the heuristic cost evaluator and its own
    /// candidate cache.
    pub fn new(config: OptimizerConfig, catalog: Arc<dyn IndexCatalog>) -> Self {
        let cost: Arc<dyn CostEvaluator> = Arc::new(HeuristicCostEvaluator::new(&config));
        let cache = Arc::new(IndexMetadataCache::new(config.index_cache_capacity));
        let resolver: Arc<OrderingResolver> = Arc::new(default_ordering_descriptor);
        Self {
            config,
            catalog,
            cost,
            cache,
            resolver,
        }
    }

    /// Use a different cost evaluator.
    pub fn with_cost_evaluator(mut self, cost: Arc<dyn CostEvaluator>) -> Self {
        self.cost = cost;
        self
    }

    /// Share a candidate cache with other optimizers over the same domain.
    pub fn with_cache(mut self, cache: Arc<IndexMetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Decide which filters feed an order-observing consumer with a custom
    /// ordering resolver. Must agree with the one ordering correction ran
    /// with.
    pub fn with_resolver(mut self, resolver: Arc<OrderingResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn cache(&self) -> &Arc<IndexMetadataCache> {
        &self.cache
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite every Filter over a primary index scan in `root`.
    ///
    /// Ranges are costed under `expected`, the values parameters are
    /// expected to take; the rewritten plan is valid for any values.
    #[instrument(skip(self, root, expected), fields(root = root.kind_name()))]
    pub fn optimize(
        &self,
        root: &Arc<Provider>,
        expected: &ParameterContext,
    ) -> Result<Arc<Provider>, Error> {
        self.visit(root, true, expected)
    }

    fn visit(
        &self,
        node: &Arc<Provider>,
        order_observed: bool,
        expected: &ParameterContext,
    ) -> Result<Arc<Provider>, Error> {
        if let ProviderKind::Filter { source, predicate } = node.kind() {
            if let ProviderKind::IndexScan { index } = source.kind() {
                if index.is_primary {
                    let rewritten =
                        self.rewrite_filter(index, predicate, order_observed, expected);
                    return Ok(rewritten.unwrap_or_else(|| node.clone()));
                }
            }
        }

        let descriptor = (self.resolver)(node);
        let observed = order_observed && !descriptor.is_sorter() && !descriptor.breaks_order();
        let sources = node
            .sources()
            .into_iter()
            .map(|s| self.visit(s, observed, expected))
            .collect::<Result<Vec<_>, _>>()?;
        rebuild(node, sources)
    }

    /// Primary first, then covering secondaries with the same row layout.
    fn candidates(&self, primary: &Arc<IndexInfo>) -> Candidates {
        self.cache.get_or_insert_with(primary.id, || {
            let mut candidates = vec![primary.clone()];
            candidates.extend(
                self.catalog
                    .indexes_for(primary)
                    .into_iter()
                    .filter(|i| {
                        i.id != primary.id
                            && !i.is_primary
                            && i.contains_all_data
                            && i.columns == primary.columns
                    }),
            );
            candidates
        })
    }

    fn rewrite_filter(
        &self,
        primary: &Arc<IndexInfo>,
        predicate: &Expr,
        order_observed: bool,
        expected: &ParameterContext,
    ) -> Option<Arc<Provider>> {
        let candidates = self.candidates(primary);
        let baseline = self
            .cost
            .evaluate(primary, &RangeSet::full())
            .with_filter();

        let conjuncts = flatten_and(predicate);
        let mut best: Option<AccessPlan> = candidates
            .iter()
            .filter_map(|index| self.index_plan(index, &conjuncts, expected))
            .min_by(|a, b| a.cost.total_cost.total_cmp(&b.cost.total_cost))
            .map(AccessPlan::Single);

        match normalize(predicate, self.config.dnf_clause_budget) {
            Ok(dnf) if dnf.len() > 1 && primary.unique => {
                if let Some(union) = self.union_plan(&dnf, &candidates, expected) {
                    if best.as_ref().map_or(true, |b| union.cost() < b.cost()) {
                        best = Some(union);
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                debug!(%error, "DNF normalization failed, parsing predicate directly");
            }
        }

        let best = best?;
        if best.cost() >= baseline.total_cost {
            trace!(
                cost = best.cost(),
                baseline = baseline.total_cost,
                "keeping primary scan"
            );
            return None;
        }

        let (provider, ordered) = match best {
            AccessPlan::Single(plan) => {
                debug!(
                    index = %plan.index.name,
                    ranges = %plan.ranges,
                    cost = plan.cost.total_cost,
                    baseline = baseline.total_cost,
                    "selected index access path"
                );
                let ordered = plan.index.id == primary.id;
                (access_path(plan), ordered)
            }
            AccessPlan::Union(branches) => {
                debug!(
                    branches = branches.len(),
                    baseline = baseline.total_cost,
                    "selected union of index access paths"
                );
                let mut paths = branches.into_iter().map(access_path);
                let first = paths.next()?;
                (paths.fold(first, |acc, p| Arc::new(Provider::union(acc, p))), false)
            }
        };

        if order_observed && !ordered {
            return Some(Arc::new(Provider::sort(provider, primary.key_columns.clone())));
        }
        Some(provider)
    }

    /// Intersect the ranges of every conjunct on the index's leading key.
    /// Returns `None` if the predicate does not constrain that key.
    fn index_plan(
        &self,
        index: &Arc<IndexInfo>,
        conjuncts: &[&Expr],
        expected: &ParameterContext,
    ) -> Option<IndexPlan> {
        let key = index.leading_key()?;
        let key_type = index.leading_key_type()?;
        let parser = PredicateParser::new(key.column, key_type);

        let mut ranges = RangeSetExpr::Full;
        let mut residual = Vec::new();
        for conjunct in conjuncts {
            let extraction = parser.parse(conjunct);
            if !extraction.exact {
                residual.push((*conjunct).clone());
            }
            ranges = ranges.intersect(extraction.ranges);
        }
        if ranges.is_full() {
            return None;
        }

        let mut cost = self.cost.evaluate(index, &ranges.evaluate(key_type, expected));
        if !residual.is_empty() {
            cost = cost.with_filter();
        }
        trace!(index = %index.name, ranges = %ranges, cost = cost.total_cost, "costed index");
        Some(IndexPlan {
            index: index.clone(),
            ranges,
            residual,
            cost,
        })
    }

    /// Cheapest index per DNF clause; `None` if some clause constrains no
    /// index key.
    fn union_plan(
        &self,
        dnf: &Dnf,
        candidates: &[Arc<IndexInfo>],
        expected: &ParameterContext,
    ) -> Option<AccessPlan> {
        let mut branches = Vec::with_capacity(dnf.len());
        for clause in &dnf.clauses {
            let conjuncts: Vec<&Expr> = clause.iter().collect();
            let branch = candidates
                .iter()
                .filter_map(|index| self.index_plan(index, &conjuncts, expected))
                .min_by(|a, b| a.cost.total_cost.total_cmp(&b.cost.total_cost))?;
            branches.push(branch);
        }
        Some(AccessPlan::Union(branches))
    }
}

/// Access provider for one index plan, with its residual filter.
fn access_path(plan: IndexPlan) -> Arc<Provider> {
    let IndexPlan {
        index,
        ranges,
        residual,
        ..
    } = plan;

    let access = match (ranges.as_seek_key(), ranges.as_point_keys()) {
        (Some(key), _) if index.is_unique_on_leading_key() => Provider::seek(index, key.clone()),
        (_, Some(keys)) => Provider::multi_seek(index, keys),
        _ if ranges.is_single_interval() => Provider::range(index, ranges),
        _ => Provider::range_set(index, ranges),
    };

    match conjunction(residual) {
        Some(predicate) => Arc::new(Provider::filter(access, predicate)),
        None => Arc::new(access),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Column, OrderItem};
    use crate::range::KeyExpr;
    use crate::value::{ColumnType, Value};

    fn primary() -> Arc<IndexInfo> {
        Arc::new(
            IndexInfo::primary(
                1,
                "Users.PK",
                vec![
                    Column::new("id", ColumnType::Int32),
                    Column::new("name", ColumnType::String),
                    Column::nullable("age", ColumnType::Int32),
                ],
                vec![OrderItem::asc(0)],
            )
            .with_row_count(1000),
        )
    }

    fn by_age(primary: &IndexInfo) -> Arc<IndexInfo> {
        Arc::new(IndexInfo::secondary(2, "Users.Age", primary, vec![OrderItem::asc(2)]))
    }

    fn optimizer(primary: &Arc<IndexInfo>) -> IndexOptimizer {
        let catalog = StaticIndexCatalog::new().with_index(primary.id, by_age(primary));
        IndexOptimizer::new(OptimizerConfig::default(), Arc::new(catalog))
    }

    fn optimize(optimizer: &IndexOptimizer, plan: Provider) -> Arc<Provider> {
        optimizer
            .optimize(&Arc::new(plan), &ParameterContext::new())
            .unwrap()
    }

    #[test]
    fn test_point_on_unique_key_becomes_seek() {
        let pk = primary();
        let plan = Provider::filter(
            Provider::index_scan(pk.clone()),
            Expr::eq(Expr::col(0), Expr::lit(5)),
        );
        let rewritten = optimize(&optimizer(&pk), plan);
        assert_eq!(
            *rewritten,
            Provider::seek(pk, KeyExpr::Literal(Value::Int32(5)))
        );
    }

    #[test]
    fn test_interval_on_secondary_becomes_range() {
        let pk = primary();
        let predicate = Expr::and(
            Expr::gt(Expr::col(2), Expr::lit(18)),
            Expr::lt(Expr::col(2), Expr::lit(65)),
        );
        let plan = Provider::filter(Provider::index_scan(pk.clone()), predicate);
        let rewritten = optimize(&optimizer(&pk), plan);

        let ProviderKind::Sort { source, order } = rewritten.kind() else {
            panic!("expected sort restoring primary order, got {}", rewritten.kind_name());
        };
        assert_eq!(order, &pk.key_columns);
        let ProviderKind::Range { index, range } = source.kind() else {
            panic!("expected range, got {}", source.kind_name());
        };
        assert_eq!(index.name, "Users.Age");
        assert!(range.is_single_interval());
    }

    #[test]
    fn test_unordered_consumer_skips_sort() {
        let pk = primary();
        let predicate = Expr::ge(Expr::col(2), Expr::lit(60));
        let plan = Provider::union(
            Provider::filter(Provider::index_scan(pk.clone()), predicate),
            Provider::index_scan(pk.clone()),
        );
        let rewritten = optimize(&optimizer(&pk), plan);
        let left = rewritten.sources()[0].clone();
        assert_eq!(left.kind_name(), "Range");
    }

    #[test]
    fn test_residual_kept_for_inexact_conjuncts() {
        let pk = primary();
        let name_like = Expr::call(crate::expr::Method::Contains, Expr::col(1), Expr::lit("a"));
        let predicate = Expr::and(Expr::eq(Expr::col(0), Expr::lit(7)), name_like.clone());
        let plan = Provider::filter(Provider::index_scan(pk.clone()), predicate);
        let rewritten = optimize(&optimizer(&pk), plan);

        let expected = Provider::filter(
            Provider::seek(pk, KeyExpr::Literal(Value::Int32(7))),
            name_like,
        );
        assert_eq!(*rewritten, expected);
    }

    #[test]
    fn test_in_list_becomes_multi_seek() {
        let pk = primary();
        let predicate = Expr::in_list(Expr::col(0), vec![Expr::lit(3), Expr::lit(1)]);
        let plan = Provider::filter(Provider::index_scan(pk.clone()), predicate);
        let rewritten = optimize(&optimizer(&pk), plan);
        assert_eq!(rewritten.kind_name(), "MultiSeek");
    }

    #[test]
    fn test_unconstrained_predicate_unchanged() {
        let pk = primary();
        let plan = Arc::new(Provider::filter(
            Provider::index_scan(pk.clone()),
            Expr::eq(Expr::col(1), Expr::lit("bob")),
        ));
        let rewritten = optimizer(&pk)
            .optimize(&plan, &ParameterContext::new())
            .unwrap();
        assert!(Arc::ptr_eq(&rewritten, &plan));
    }

    #[test]
    fn test_disjunction_over_two_indexes() {
        let pk = primary();
        let predicate = Expr::or(
            Expr::eq(Expr::col(0), Expr::lit(4)),
            Expr::eq(Expr::col(2), Expr::lit(30)),
        );
        let plan = Provider::filter(Provider::index_scan(pk.clone()), predicate);
        let rewritten = optimize(&optimizer(&pk), plan);

        let ProviderKind::Sort { source, .. } = rewritten.kind() else {
            panic!("expected sort, got {}", rewritten.kind_name());
        };
        let ProviderKind::Union { left, right } = source.kind() else {
            panic!("expected union, got {}", source.kind_name());
        };
        assert_eq!(left.kind_name(), "Seek");
        assert_eq!(right.kind_name(), "MultiSeek");
    }

    #[test]
    fn test_dnf_budget_fallback() {
        let pk = primary();
        let optimizer = IndexOptimizer::new(
            OptimizerConfig::default().dnf_clause_budget(1),
            Arc::new(StaticIndexCatalog::new()),
        );
        // Needs two clauses, so the budget forces the direct parse, which
        // still finds the union of both points on the key.
        let predicate = Expr::or(
            Expr::eq(Expr::col(0), Expr::lit(4)),
            Expr::eq(Expr::col(0), Expr::lit(9)),
        );
        let plan = Provider::filter(Provider::index_scan(pk), predicate);
        let rewritten = optimize(&optimizer, plan);
        let ProviderKind::MultiSeek { keys, .. } = rewritten.kind() else {
            panic!("expected multi seek, got {}", rewritten.kind_name());
        };
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_candidates_cached_per_primary() {
        let pk = primary();
        let optimizer = optimizer(&pk);
        let predicate = Expr::eq(Expr::col(2), Expr::lit(40));
        for _ in 0..3 {
            optimize(
                &optimizer,
                Provider::filter(Provider::index_scan(pk.clone()), predicate.clone()),
            );
        }
        assert_eq!(optimizer.cache().len(), 1);
        assert_eq!(optimizer.cache().stats().misses(), 1);
        assert_eq!(optimizer.cache().stats().hits(), 2);
    }

    #[test]
    fn test_non_covering_secondary_ignored() {
        let pk = primary();
        let partial = IndexInfo::secondary(3, "Users.Age.Partial", &pk, vec![OrderItem::asc(2)])
            .with_contains_all_data(false);
        let catalog = StaticIndexCatalog::new().with_index(pk.id, partial);
        let optimizer = IndexOptimizer::new(OptimizerConfig::default(), Arc::new(catalog));

        let plan = Arc::new(Provider::filter(
            Provider::index_scan(pk.clone()),
            Expr::eq(Expr::col(2), Expr::lit(40)),
        ));
        let rewritten = optimizer.optimize(&plan, &ParameterContext::new()).unwrap();
        assert!(Arc::ptr_eq(&rewritten, &plan));
    }
}
