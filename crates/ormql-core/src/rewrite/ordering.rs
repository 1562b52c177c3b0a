//! Ordering correction.
//!
//! Sort providers are pulled up through order-preserving operators and
//! re-materialized only where something depends on them: below an
//! order-sensitive consumer, below a projection that would otherwise lose a
//! sort column, or at the root. Sorts that nobody observes are dropped, and
//! sorts already satisfied by the physical order of their input are removed.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::error::Error;
use crate::provider::{
    default_ordering_descriptor, order_starts_with, remap_order, OrderingDescriptor,
    OrderingResolver, Provider, ProviderKind, SortOrder,
};

/// How much the consumers above a node care about its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demand {
    /// A sorter or order breaker above makes the order irrelevant.
    Ignored,
    /// The order is visible in the result but nothing computes with it.
    Observed,
    /// An order-sensitive consumer computes with it.
    Required,
}

/// Traversal state passed down by value.
#[derive(Debug, Clone, Copy)]
struct Context {
    consumer: Option<OrderingDescriptor>,
    demand: Demand,
}

impl Context {
    fn root() -> Self {
        Self {
            consumer: None,
            demand: Demand::Observed,
        }
    }

    fn below(self, descriptor: OrderingDescriptor) -> Self {
        let demand = match descriptor {
            OrderingDescriptor::Sorter | OrderingDescriptor::BreaksOrder => Demand::Ignored,
            OrderingDescriptor::OrderSensitive => Demand::Required,
            OrderingDescriptor::PreservesOrder => self.demand,
        };
        Self {
            consumer: Some(descriptor),
            demand,
        }
    }
}

/// A corrected subtree and the order its rows are expected in.
struct Corrected {
    provider: Arc<Provider>,
    order: SortOrder,
    /// Whether `provider` physically emits `order`. A pending order still
    /// needs a Sort somewhere above.
    materialized: bool,
}

/// Rewrites a provider tree so that order-sensitive consumers receive
/// sorted input, using as few Sort providers as possible.
pub struct OrderingCorrector<'a> {
    resolver: &'a OrderingResolver,
}

impl Default for OrderingCorrector<'static> {
    fn default() -> Self {
        Self {
            resolver: &default_ordering_descriptor,
        }
    }
}

impl<'a> OrderingCorrector<'a> {
    pub fn new(resolver: &'a OrderingResolver) -> Self {
        Self { resolver }
    }

    /// Correct the ordering of `root`.
    ///
    /// Fails with [`Error::OrderLost`] if a projection removes a column
    /// that an order-sensitive consumer above it still needs.
    #[instrument(skip(self, root), fields(root = root.kind_name()))]
    pub fn correct(&self, root: &Arc<Provider>) -> Result<Arc<Provider>, Error> {
        let corrected = self.visit(root, Context::root())?;
        if corrected.order.is_empty() || corrected.materialized {
            return Ok(corrected.provider);
        }
        debug!(order = ?corrected.order, "sorting result at root");
        Ok(Arc::new(Provider::sort(corrected.provider, corrected.order)))
    }

    fn visit(&self, node: &Arc<Provider>, ctx: Context) -> Result<Corrected, Error> {
        let descriptor = (self.resolver)(node);
        let inner = ctx.below(descriptor);

        let mut corrected = match node.kind() {
            ProviderKind::Sort { source, order } => {
                let child = self.visit(source, inner)?;
                let materialized = child.materialized && order_starts_with(&child.order, order);
                trace!(order = ?order, materialized, "pulling up sort");
                Corrected {
                    provider: child.provider,
                    order: order.clone(),
                    materialized,
                }
            }
            ProviderKind::Select { source, columns } => {
                self.visit_projection(node, source, columns, inner)?
            }
            ProviderKind::Aggregate {
                source,
                group_columns,
                ..
            } => self.visit_projection(node, source, group_columns, inner)?,
            ProviderKind::Join { left, right, .. }
            | ProviderKind::PredicateJoin { left, right, .. }
            | ProviderKind::Apply { left, right, .. }
            | ProviderKind::Union { left, right }
            | ProviderKind::Concat { left, right } => {
                let left = self.visit(left, inner)?;
                let right = self.visit(right, inner)?;
                let offset = left.provider.header().len();

                // Rows come out left-major, so a physical right order only
                // holds within one left row and is not claimed. A pending
                // right order is combined and sorted above.
                let mut order = left.order;
                if !right.materialized {
                    order.extend(right.order.iter().map(|item| item.shifted(offset)));
                }
                let materialized = left.materialized && right.materialized;
                Corrected {
                    provider: rebuild(node, vec![left.provider, right.provider])?,
                    order,
                    materialized,
                }
            }
            _ => match node.sources().first() {
                Some(source) => {
                    let child = self.visit(source, inner)?;
                    Corrected {
                        provider: rebuild(node, vec![child.provider])?,
                        order: child.order,
                        materialized: child.materialized,
                    }
                }
                None => Corrected {
                    provider: node.clone(),
                    order: node.header().order.clone(),
                    materialized: true,
                },
            },
        };

        if descriptor.breaks_order() {
            corrected.order.clear();
            corrected.materialized = true;
        }

        let consumer_sensitive = ctx.consumer.is_some_and(|c| c.is_order_sensitive());
        if consumer_sensitive
            && !descriptor.is_order_sensitive()
            && !corrected.order.is_empty()
            && !corrected.materialized
        {
            debug!(
                provider = node.kind_name(),
                order = ?corrected.order,
                "inserting sort below order-sensitive consumer"
            );
            corrected.provider = Arc::new(Provider::sort(
                corrected.provider,
                corrected.order.clone(),
            ));
            corrected.materialized = true;
        }

        Ok(corrected)
    }

    /// Select and Aggregate renumber columns; `mapping[i]` is the source
    /// position of output column `i`.
    fn visit_projection(
        &self,
        node: &Arc<Provider>,
        source: &Arc<Provider>,
        mapping: &[usize],
        inner: Context,
    ) -> Result<Corrected, Error> {
        let child = self.visit(source, inner)?;
        let (order, missing) = remap_order(&child.order, mapping);

        let (source, materialized) = match missing {
            None => (child.provider, child.materialized),
            // The physical order survives the projection even though the
            // header can no longer describe all of it.
            Some(_) if child.materialized => (child.provider, true),
            Some(column) => match inner.demand {
                Demand::Required => {
                    return Err(Error::OrderLost {
                        provider: node.kind_name(),
                        column,
                    })
                }
                Demand::Observed => {
                    debug!(
                        provider = node.kind_name(),
                        column, "sorting below projection that drops a sort column"
                    );
                    let sorted = Arc::new(Provider::sort(child.provider, child.order));
                    (sorted, true)
                }
                Demand::Ignored => (child.provider, false),
            },
        };

        Ok(Corrected {
            provider: rebuild(node, vec![source])?,
            order,
            materialized,
        })
    }
}

/// Rebuild `node` over `sources`, reusing it if nothing changed.
pub(crate) fn rebuild(
    node: &Arc<Provider>,
    sources: Vec<Arc<Provider>>,
) -> Result<Arc<Provider>, Error> {
    let unchanged = node.sources().len() == sources.len()
        && node
            .sources()
            .iter()
            .zip(&sources)
            .all(|(old, new)| Arc::ptr_eq(old, new));
    if unchanged {
        return Ok(node.clone());
    }
    Ok(Arc::new(node.with_sources(sources)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::provider::{Column, IndexInfo, JoinType, OrderItem};
    use crate::value::ColumnType;

    fn scan() -> Arc<Provider> {
        Arc::new(Provider::index_scan(IndexInfo::primary(
            1,
            "Users.PK",
            vec![
                Column::new("id", ColumnType::Int32),
                Column::new("name", ColumnType::String),
                Column::new("age", ColumnType::Int32),
            ],
            vec![OrderItem::asc(0)],
        )))
    }

    fn by_age() -> Vec<OrderItem> {
        vec![OrderItem::asc(2)]
    }

    fn adult() -> Expr {
        Expr::gt(Expr::col(2), Expr::lit(18))
    }

    fn correct(root: Provider) -> Result<Arc<Provider>, Error> {
        OrderingCorrector::default().correct(&Arc::new(root))
    }

    #[test]
    fn test_sort_pulled_to_root() {
        let plan = Provider::filter(Provider::sort(scan(), by_age()), adult());
        let corrected = correct(plan).unwrap();

        let expected = Provider::sort(Provider::filter(scan(), adult()), by_age());
        assert_eq!(*corrected, expected);
    }

    #[test]
    fn test_sort_kept_below_sensitive_consumer() {
        let plan = Provider::take(Provider::filter(Provider::sort(scan(), by_age()), adult()), 5);
        let corrected = correct(plan).unwrap();

        let expected = Provider::take(
            Provider::sort(Provider::filter(scan(), adult()), by_age()),
            5,
        );
        assert_eq!(*corrected, expected);
    }

    #[test]
    fn test_redundant_sort_removed() {
        let plan = Provider::sort(scan(), vec![OrderItem::asc(0)]);
        let corrected = correct(plan).unwrap();
        assert_eq!(corrected.kind_name(), "IndexScan");
    }

    #[test]
    fn test_sort_below_breaker_dropped() {
        let plan = Provider::union(Provider::sort(scan(), by_age()), scan());
        let corrected = correct(plan).unwrap();
        assert_eq!(*corrected, Provider::union(scan(), scan()));
    }

    #[test]
    fn test_inner_sort_superseded() {
        let plan = Provider::sort(Provider::sort(scan(), vec![OrderItem::desc(1)]), by_age());
        let corrected = correct(plan).unwrap();
        assert_eq!(*corrected, Provider::sort(scan(), by_age()));
    }

    #[test]
    fn test_projection_losing_required_order_fails() {
        let plan = Provider::take(Provider::select(Provider::sort(scan(), by_age()), vec![1]), 3);
        let err = correct(plan).unwrap_err();
        assert!(matches!(
            err,
            Error::OrderLost {
                provider: "Select",
                column: 2
            }
        ));
    }

    #[test]
    fn test_projection_losing_observed_order_sorts_below() {
        let plan = Provider::select(Provider::sort(scan(), by_age()), vec![1]);
        let corrected = correct(plan).unwrap();
        assert_eq!(
            *corrected,
            Provider::select(Provider::sort(scan(), by_age()), vec![1])
        );
    }

    #[test]
    fn test_projection_remaps_pending_order() {
        let plan = Provider::take(
            Provider::select(Provider::sort(scan(), by_age()), vec![2, 1]),
            3,
        );
        let corrected = correct(plan).unwrap();
        let expected = Provider::take(
            Provider::sort(Provider::select(scan(), vec![2, 1]), vec![OrderItem::asc(0)]),
            3,
        );
        assert_eq!(*corrected, expected);
    }

    #[test]
    fn test_join_offsets_right_order() {
        let plan = Provider::join(
            scan(),
            Provider::sort(scan(), by_age()),
            JoinType::Inner,
            vec![(0, 0)],
        );
        let corrected = correct(plan).unwrap();

        let expected = Provider::sort(
            Provider::join(scan(), scan(), JoinType::Inner, vec![(0, 0)]),
            vec![OrderItem::asc(0), OrderItem::asc(5)],
        );
        assert_eq!(*corrected, expected);
    }

    #[test]
    fn test_custom_resolver() {
        let resolver = |p: &Provider| match p.kind() {
            ProviderKind::Distinct { .. } => OrderingDescriptor::BreaksOrder,
            _ => default_ordering_descriptor(p),
        };
        let corrector = OrderingCorrector::new(&resolver);
        let plan = Arc::new(Provider::distinct(Provider::sort(scan(), by_age())));
        let corrected = corrector.correct(&plan).unwrap();
        assert_eq!(*corrected, Provider::distinct(scan()));
    }
}
