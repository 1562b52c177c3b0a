//! Disjunctive normal form with a clause budget.

use thiserror::Error;

use crate::expr::Expr;
use crate::flatten::{conjunction, disjunction};

/// DNF normalization failure. The optimizer treats this as a signal to
/// parse the original predicate instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnfError {
    #[error("DNF expansion exceeds the budget of {budget} clauses")]
    BudgetExceeded { budget: usize },
}

/// A predicate as a disjunction of conjunctive clauses.
///
/// Negations are pushed down to the leaves, so every clause member is a
/// leaf or the negation of one.
#[derive(Debug, Clone, PartialEq)]
pub struct Dnf {
    pub clauses: Vec<Vec<Expr>>,
}

impl Dnf {
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// The whole normal form as an expression.
    pub fn to_expr(&self) -> Option<Expr> {
        disjunction(
            self.clauses
                .iter()
                .filter_map(|clause| conjunction(clause.iter().cloned())),
        )
    }
}

/// Rewrite `predicate` into DNF, failing once more than `budget` clauses
/// would be produced at any step.
pub fn normalize(predicate: &Expr, budget: usize) -> Result<Dnf, DnfError> {
    let clauses = expand(predicate, false, budget)?;
    Ok(Dnf { clauses })
}

fn expand(expr: &Expr, negated: bool, budget: usize) -> Result<Vec<Vec<Expr>>, DnfError> {
    match expr {
        Expr::Not(inner) => expand(inner, !negated, budget),
        // Conjunction, directly or by De Morgan.
        Expr::And(left, right) if !negated => product(left, right, negated, budget),
        Expr::Or(left, right) if negated => product(left, right, negated, budget),
        // Disjunction, directly or by De Morgan.
        Expr::Or(left, right) | Expr::And(left, right) => {
            let mut clauses = expand(left, negated, budget)?;
            clauses.extend(expand(right, negated, budget)?);
            check(clauses, budget)
        }
        leaf => {
            let leaf = if negated {
                Expr::not(leaf.clone())
            } else {
                leaf.clone()
            };
            Ok(vec![vec![leaf]])
        }
    }
}

fn product(
    left: &Expr,
    right: &Expr,
    negated: bool,
    budget: usize,
) -> Result<Vec<Vec<Expr>>, DnfError> {
    let left = expand(left, negated, budget)?;
    let right = expand(right, negated, budget)?;
    if left.len().saturating_mul(right.len()) > budget {
        return Err(DnfError::BudgetExceeded { budget });
    }
    let mut clauses = Vec::with_capacity(left.len() * right.len());
    for l in &left {
        for r in &right {
            let mut clause = l.clone();
            clause.extend(r.iter().cloned());
            clauses.push(clause);
        }
    }
    Ok(clauses)
}

fn check(clauses: Vec<Vec<Expr>>, budget: usize) -> Result<Vec<Vec<Expr>>, DnfError> {
    if clauses.len() > budget {
        return Err(DnfError::BudgetExceeded { budget });
    }
    Ok(clauses)
}
