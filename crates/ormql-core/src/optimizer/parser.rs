//! Predicate to range-set extraction.

use crate::expr::{CompareOp, Expr, Method};
use crate::range::{KeyExpr, LeafOp, RangeSetExpr};
use crate::value::{ColumnType, Value};

/// Range set extracted from a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Keys of every row the predicate may keep.
    pub ranges: RangeSetExpr,
    /// Whether the ranges keep exactly the rows the predicate keeps, so the
    /// predicate need not be re-checked.
    pub exact: bool,
}

impl Extraction {
    fn unconstrained() -> Self {
        Self {
            ranges: RangeSetExpr::Full,
            exact: false,
        }
    }
}

/// Extracts key ranges over one column from predicates.
///
/// Negation is tracked as a polarity flag while walking the tree: `And` and
/// `Or` swap under an odd number of enclosing `Not`s, and leaves are
/// extracted with the polarity in force. Shapes that do not constrain the
/// key column widen to the full range, so the result is never narrower
/// than the predicate.
#[derive(Debug, Clone, Copy)]
pub struct PredicateParser {
    key_column: usize,
    key_type: ColumnType,
}

impl PredicateParser {
    pub fn new(key_column: usize, key_type: ColumnType) -> Self {
        Self {
            key_column,
            key_type,
        }
    }

    pub fn parse(&self, predicate: &Expr) -> Extraction {
        self.visit(predicate, false)
    }

    fn visit(&self, expr: &Expr, inverted: bool) -> Extraction {
        match expr {
            Expr::Not(inner) => self.visit(inner, !inverted),
            Expr::And(left, right) | Expr::Or(left, right) => {
                let left = self.visit(left, inverted);
                let right = self.visit(right, inverted);
                let intersect = matches!(expr, Expr::And(..)) != inverted;
                let ranges = if intersect {
                    left.ranges.intersect(right.ranges)
                } else {
                    left.ranges.union(right.ranges)
                };
                Extraction {
                    ranges,
                    exact: left.exact && right.exact,
                }
            }
            Expr::Literal(Value::Bool(value)) => Extraction {
                ranges: if *value != inverted {
                    RangeSetExpr::Full
                } else {
                    RangeSetExpr::Empty
                },
                exact: true,
            },
            // A boolean key column used as a predicate: `key == true`.
            Expr::Column(_) if self.is_key(expr) && self.key_type == ColumnType::Bool => {
                self.leaf(
                    LeafOp::Compare(CompareOp::Eq, KeyExpr::Literal(Value::Bool(true))),
                    inverted,
                )
            }
            Expr::Compare { op, left, right } => {
                if self.is_key(left) {
                    self.compare(*op, right, inverted)
                } else if self.is_key(right) {
                    self.compare(op.mirror(), left, inverted)
                } else {
                    Extraction::unconstrained()
                }
            }
            Expr::In { expr: target, values } if self.is_key(target) => {
                let keys: Option<Vec<KeyExpr>> = values.iter().map(KeyExpr::from_expr).collect();
                match keys {
                    Some(keys) => self.leaf(LeafOp::In(keys), inverted),
                    None => Extraction::unconstrained(),
                }
            }
            Expr::IsNull(target) if self.is_key(target) => self.leaf(LeafOp::IsNull, inverted),
            Expr::Call {
                method: Method::StartsWith,
                target,
                argument,
            } if self.is_key(target) => match KeyExpr::from_expr(argument) {
                Some(prefix) => self.leaf(LeafOp::StartsWith(prefix), inverted),
                None => Extraction::unconstrained(),
            },
            _ => Extraction::unconstrained(),
        }
    }

    fn is_key(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Column(c) if *c == self.key_column)
    }

    fn compare(&self, op: CompareOp, operand: &Expr, inverted: bool) -> Extraction {
        match KeyExpr::from_expr(operand) {
            Some(key) => self.leaf(LeafOp::Compare(op, key), inverted),
            None => Extraction::unconstrained(),
        }
    }

    /// Literal leaves are exact. Parameter leaves are kept in the residual
    /// so an unbound parameter still fails the way the filter would.
    fn leaf(&self, op: LeafOp, inverted: bool) -> Extraction {
        let exact = match &op {
            LeafOp::Compare(_, key) | LeafOp::StartsWith(key) => !key.is_parameter(),
            LeafOp::In(keys) => keys.iter().all(|k| !k.is_parameter()),
            LeafOp::IsNull => true,
        };
        Extraction {
            ranges: RangeSetExpr::leaf(op, inverted),
            exact,
        }
    }
}
