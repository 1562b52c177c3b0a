//! Flattening helpers for boolean trees and join chains.

use std::sync::Arc;

use crate::expr::Expr;
use crate::provider::{JoinType, Provider, ProviderKind};

/// Conjuncts of a nested `And` tree, left to right.
pub fn flatten_and(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect(expr, &mut out, |e| match e {
        Expr::And(l, r) => Some((l.as_ref(), r.as_ref())),
        _ => None,
    });
    out
}

/// Disjuncts of a nested `Or` tree, left to right.
pub fn flatten_or(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect(expr, &mut out, |e| match e {
        Expr::Or(l, r) => Some((l.as_ref(), r.as_ref())),
        _ => None,
    });
    out
}

fn collect<'a>(
    expr: &'a Expr,
    out: &mut Vec<&'a Expr>,
    split: impl Fn(&'a Expr) -> Option<(&'a Expr, &'a Expr)> + Copy,
) {
    match split(expr) {
        Some((left, right)) => {
            collect(left, out, split);
            collect(right, out, split);
        }
        None => out.push(expr),
    }
}

/// Left-deep conjunction; `None` for an empty list.
pub fn conjunction(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    parts.into_iter().reduce(Expr::and)
}

/// Left-deep disjunction; `None` for an empty list.
pub fn disjunction(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    parts.into_iter().reduce(Expr::or)
}

/// Join condition of one step in a flattened chain.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// Equalities between global column positions.
    Equalities(Vec<(usize, usize)>),
    /// Predicate over the row concatenated so far, global positions.
    Predicate(Expr),
}

/// One join step: the right source joined onto everything to its left.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinStep {
    /// Index of the right-hand source in [`JoinChain::sources`].
    pub source: usize,
    pub join_type: JoinType,
    pub condition: JoinCondition,
}

/// A left-deep join tree flattened into its sources and join steps.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinChain {
    pub sources: Vec<Arc<Provider>>,
    pub steps: Vec<JoinStep>,
}

impl JoinChain {
    /// Column offset of each source in the joined row.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.sources
            .iter()
            .map(|s| {
                let current = offset;
                offset += s.header().len();
                current
            })
            .collect()
    }
}

/// Flatten nested `Join`/`PredicateJoin` providers along their left spine.
///
/// Only left-deep nesting is flattened; a join on the right side is kept
/// as a single source. Right-hand column positions are rewritten to global
/// positions in the concatenated row. Returns `None` if `provider` is not
/// a join.
pub fn flatten_join_chain(provider: &Arc<Provider>) -> Option<JoinChain> {
    if !is_join(provider) {
        return None;
    }
    let mut chain = JoinChain {
        sources: Vec::new(),
        steps: Vec::new(),
    };
    let width = flatten_into(provider, &mut chain);
    debug_assert_eq!(width, provider.header().len());
    Some(chain)
}

fn is_join(provider: &Provider) -> bool {
    matches!(
        provider.kind(),
        ProviderKind::Join { .. } | ProviderKind::PredicateJoin { .. }
    )
}

/// Returns the width of the flattened prefix.
fn flatten_into(provider: &Arc<Provider>, chain: &mut JoinChain) -> usize {
    match provider.kind() {
        ProviderKind::Join {
            left,
            right,
            join_type,
            equalities,
        } => {
            let offset = flatten_into(left, chain);
            let global = equalities
                .iter()
                .map(|&(l, r)| (l, r + offset))
                .collect();
            chain.steps.push(JoinStep {
                source: chain.sources.len(),
                join_type: *join_type,
                condition: JoinCondition::Equalities(global),
            });
            chain.sources.push(right.clone());
            offset + right.header().len()
        }
        ProviderKind::PredicateJoin {
            left,
            right,
            join_type,
            predicate,
        } => {
            // The predicate already addresses the concatenated row, and the
            // flattened prefix has the same layout as `left`.
            let offset = flatten_into(left, chain);
            chain.steps.push(JoinStep {
                source: chain.sources.len(),
                join_type: *join_type,
                condition: JoinCondition::Predicate(predicate.clone()),
            });
            chain.sources.push(right.clone());
            offset + right.header().len()
        }
        _ => {
            chain.sources.push(provider.clone());
            provider.header().len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Column, Header};
    use crate::value::ColumnType;

    fn table(name: &str, width: usize) -> Arc<Provider> {
        let columns = (0..width)
            .map(|i| Column::new(format!("{}{}", name, i), ColumnType::Int32))
            .collect();
        Arc::new(Provider::raw(Header::new(columns), Vec::new()))
    }

    #[test]
    fn test_flatten_and_or() {
        let a = Expr::gt(Expr::col(0), Expr::lit(1));
        let b = Expr::lt(Expr::col(0), Expr::lit(9));
        let c = Expr::is_null(Expr::col(1));
        let expr = Expr::and(Expr::and(a.clone(), b.clone()), Expr::or(c.clone(), a.clone()));

        let conjuncts = flatten_and(&expr);
        assert_eq!(conjuncts.len(), 3);
        assert_eq!(conjuncts[0], &a);
        assert_eq!(flatten_or(conjuncts[2]), vec![&c, &a]);
        assert_eq!(flatten_or(&a), vec![&a]);
    }

    #[test]
    fn test_conjunction_rebuilds() {
        let parts = vec![Expr::col(0), Expr::col(1), Expr::col(2)];
        let expr = conjunction(parts).unwrap();
        assert_eq!(flatten_and(&expr).len(), 3);
        assert_eq!(conjunction(Vec::new()), None);
        assert_eq!(disjunction(vec![Expr::col(0)]), Some(Expr::col(0)));
    }

    #[test]
    fn test_join_chain_globalizes_columns() {
        let a = table("a", 2);
        let b = table("b", 3);
        let c = table("c", 1);
        let ab = Provider::join(a, b, JoinType::Inner, vec![(0, 1)]);
        let abc = Arc::new(Provider::join(ab, c, JoinType::LeftOuter, vec![(4, 0)]));

        let chain = flatten_join_chain(&abc).unwrap();
        assert_eq!(chain.sources.len(), 3);
        assert_eq!(chain.offsets(), vec![0, 2, 5]);
        assert_eq!(chain.steps[0].condition, JoinCondition::Equalities(vec![(0, 3)]));
        assert_eq!(chain.steps[1].condition, JoinCondition::Equalities(vec![(4, 5)]));
        assert_eq!(chain.steps[1].join_type, JoinType::LeftOuter);

        assert!(flatten_join_chain(&table("x", 1)).is_none());
    }
}
