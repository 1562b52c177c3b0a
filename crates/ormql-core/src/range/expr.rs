//! Value-independent range set templates.
//!
//! The optimizer builds a [`RangeSetExpr`] once per query shape; it is
//! evaluated into a concrete [`RangeSet`] under a [`ParameterContext`] each
//! time the access path runs, and under the expected values when costing.

use std::fmt;

use super::{Entire, Range, RangeSet};
use crate::expr::{CompareOp, Expr, ParameterContext};
use crate::value::{ColumnType, Value};

/// A key operand: a constant or a parameter bound later.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyExpr {
    Literal(Value),
    Parameter(String),
}

impl KeyExpr {
    /// Extract a key operand from a literal or parameter expression.
    pub fn from_expr(expr: &Expr) -> Option<KeyExpr> {
        match expr {
            Expr::Literal(value) => Some(KeyExpr::Literal(value.clone())),
            Expr::Parameter(name) => Some(KeyExpr::Parameter(name.clone())),
            _ => None,
        }
    }

    /// The bound value, or `None` if a parameter is unbound.
    pub fn resolve(&self, params: &ParameterContext) -> Option<Value> {
        match self {
            KeyExpr::Literal(value) => Some(value.clone()),
            KeyExpr::Parameter(name) => params.get(name).cloned(),
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, KeyExpr::Parameter(_))
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExpr::Literal(value) => write!(f, "{}", value),
            KeyExpr::Parameter(name) => write!(f, "${}", name),
        }
    }
}

/// Comparison shape of a leaf predicate on the key column.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafOp {
    Compare(CompareOp, KeyExpr),
    In(Vec<KeyExpr>),
    IsNull,
    StartsWith(KeyExpr),
}

/// A leaf predicate on the key column, possibly under negation.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRange {
    pub op: LeafOp,
    pub inverted: bool,
}

impl LeafRange {
    pub fn new(op: LeafOp, inverted: bool) -> Self {
        Self { op, inverted }
    }

    /// Keys satisfying the leaf, or `None` if a parameter is unbound.
    ///
    /// Operands that cannot be compared with the key type match nothing,
    /// exactly as predicate evaluation treats them.
    fn exact_set(&self, key_type: ColumnType, params: &ParameterContext) -> Option<RangeSet> {
        let comparable = |key: &KeyExpr| -> Option<Option<Value>> {
            let value = key.resolve(params)?;
            Some(value.is_comparable_with(key_type).then_some(value))
        };

        let set = match &self.op {
            LeafOp::Compare(op, key) => match comparable(key)? {
                Some(value) => compare_set(*op, value),
                None => RangeSet::empty(),
            },
            LeafOp::In(keys) => {
                let mut values = Vec::with_capacity(keys.len());
                for key in keys {
                    if let Some(value) = comparable(key)? {
                        values.push(value);
                    }
                }
                RangeSet::points(values)
            }
            LeafOp::IsNull => RangeSet::points([Value::Null]),
            LeafOp::StartsWith(key) => {
                let prefix = key.resolve(params)?;
                match (prefix.as_str(), key_type) {
                    (Some(prefix), ColumnType::String) => prefix_set(prefix),
                    _ => RangeSet::empty(),
                }
            }
        };
        Some(set)
    }

    /// Keys satisfying the leaf under its polarity.
    ///
    /// An unresolvable leaf is unconstrained under either polarity, so the
    /// result never excludes a row the predicate keeps.
    pub fn evaluate(&self, key_type: ColumnType, params: &ParameterContext) -> RangeSet {
        match self.exact_set(key_type, params) {
            Some(set) if self.inverted => set.complement(),
            Some(set) => set,
            None => RangeSet::full(),
        }
    }

    /// Whether the leaf always evaluates to at most one interval.
    pub fn is_interval(&self) -> bool {
        !self.inverted
            && matches!(
                self.op,
                LeafOp::Compare(
                    CompareOp::Eq | CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge,
                    _
                ) | LeafOp::IsNull
                    | LeafOp::StartsWith(_)
            )
    }

    /// Keys of a leaf that selects individual key values.
    pub fn point_keys(&self) -> Option<Vec<KeyExpr>> {
        if self.inverted {
            return None;
        }
        match &self.op {
            LeafOp::Compare(CompareOp::Eq, key) => Some(vec![key.clone()]),
            LeafOp::In(keys) => Some(keys.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for LeafRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "!")?;
        }
        match &self.op {
            LeafOp::Compare(op, key) => write!(f, "(key {} {})", op.symbol(), key),
            LeafOp::In(keys) => {
                write!(f, "(key in [")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", key)?;
                }
                write!(f, "])")
            }
            LeafOp::IsNull => write!(f, "(key is null)"),
            LeafOp::StartsWith(key) => write!(f, "(key starts_with {})", key),
        }
    }
}

fn compare_set(op: CompareOp, value: Value) -> RangeSet {
    let non_null = Entire::after(Value::Null);
    let range = match op {
        CompareOp::Eq => Range::point(value),
        CompareOp::Ne => {
            return RangeSet::from_ranges([
                Range::new(non_null, Entire::before(value.clone())),
                Range::new(Entire::after(value), Entire::PositiveInfinity),
            ])
        }
        CompareOp::Lt => Range::new(non_null, Entire::before(value)),
        CompareOp::Le => Range::new(non_null, Entire::exact(value)),
        CompareOp::Gt => Range::new(Entire::after(value), Entire::PositiveInfinity),
        CompareOp::Ge => Range::new(Entire::exact(value), Entire::PositiveInfinity),
    };
    RangeSet::from_ranges([range])
}

/// Strings starting with `prefix`: `[prefix, successor(prefix))`.
fn prefix_set(prefix: &str) -> RangeSet {
    let low = Entire::exact(Value::String(prefix.to_string()));
    let high = match prefix_successor(prefix) {
        Some(next) => Entire::before(Value::String(next)),
        None => Entire::PositiveInfinity,
    };
    RangeSet::from_ranges([Range::new(low, high)])
}

/// Smallest string greater than every string starting with `prefix`.
fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match last as u32 + 1 {
            0xD800 => Some('\u{E000}'),
            code => char::from_u32(code),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Range set template over the leading key column.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeSetExpr {
    Full,
    Empty,
    Leaf(LeafRange),
    Intersect(Vec<RangeSetExpr>),
    Union(Vec<RangeSetExpr>),
}

impl RangeSetExpr {
    pub fn leaf(op: LeafOp, inverted: bool) -> Self {
        RangeSetExpr::Leaf(LeafRange::new(op, inverted))
    }

    /// Intersection, simplifying identities and flattening nested
    /// intersections.
    pub fn intersect(self, other: RangeSetExpr) -> RangeSetExpr {
        match (self, other) {
            (RangeSetExpr::Full, x) | (x, RangeSetExpr::Full) => x,
            (RangeSetExpr::Empty, _) | (_, RangeSetExpr::Empty) => RangeSetExpr::Empty,
            (a, b) => {
                let mut parts = Vec::new();
                for part in [a, b] {
                    match part {
                        RangeSetExpr::Intersect(inner) => parts.extend(inner),
                        other => parts.push(other),
                    }
                }
                RangeSetExpr::Intersect(parts)
            }
        }
    }

    /// Union, simplifying identities and flattening nested unions.
    pub fn union(self, other: RangeSetExpr) -> RangeSetExpr {
        match (self, other) {
            (RangeSetExpr::Empty, x) | (x, RangeSetExpr::Empty) => x,
            (RangeSetExpr::Full, _) | (_, RangeSetExpr::Full) => RangeSetExpr::Full,
            (a, b) => {
                let mut parts = Vec::new();
                for part in [a, b] {
                    match part {
                        RangeSetExpr::Union(inner) => parts.extend(inner),
                        other => parts.push(other),
                    }
                }
                RangeSetExpr::Union(parts)
            }
        }
    }

    /// Evaluate into a concrete range set.
    pub fn evaluate(&self, key_type: ColumnType, params: &ParameterContext) -> RangeSet {
        match self {
            RangeSetExpr::Full => RangeSet::full(),
            RangeSetExpr::Empty => RangeSet::empty(),
            RangeSetExpr::Leaf(leaf) => leaf.evaluate(key_type, params),
            RangeSetExpr::Intersect(parts) => parts.iter().fold(RangeSet::full(), |acc, p| {
                acc.intersect(&p.evaluate(key_type, params))
            }),
            RangeSetExpr::Union(parts) => parts.iter().fold(RangeSet::empty(), |acc, p| {
                acc.union(&p.evaluate(key_type, params))
            }),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, RangeSetExpr::Full)
    }

    /// Key of a single equality leaf.
    pub fn as_seek_key(&self) -> Option<&KeyExpr> {
        match self {
            RangeSetExpr::Leaf(LeafRange {
                op: LeafOp::Compare(CompareOp::Eq, key),
                inverted: false,
            }) => Some(key),
            _ => None,
        }
    }

    /// Keys of an IN-list or a union of equalities.
    pub fn as_point_keys(&self) -> Option<Vec<KeyExpr>> {
        match self {
            RangeSetExpr::Leaf(leaf) => leaf.point_keys(),
            RangeSetExpr::Union(parts) => {
                let mut keys = Vec::new();
                for part in parts {
                    keys.extend(part.as_point_keys()?);
                }
                Some(keys)
            }
            _ => None,
        }
    }

    /// Whether every evaluation yields at most one interval.
    pub fn is_single_interval(&self) -> bool {
        match self {
            RangeSetExpr::Full | RangeSetExpr::Empty => true,
            RangeSetExpr::Leaf(leaf) => leaf.is_interval(),
            RangeSetExpr::Intersect(parts) => parts.iter().all(RangeSetExpr::is_single_interval),
            RangeSetExpr::Union(_) => false,
        }
    }
}

impl fmt::Display for RangeSetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[RangeSetExpr], sep: &str| {
            write!(f, "(")?;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", part)?;
            }
            write!(f, ")")
        };
        match self {
            RangeSetExpr::Full => write!(f, "full"),
            RangeSetExpr::Empty => write!(f, "empty"),
            RangeSetExpr::Leaf(leaf) => write!(f, "{}", leaf),
            RangeSetExpr::Intersect(parts) => join(f, parts, "&"),
            RangeSetExpr::Union(parts) => join(f, parts, "|"),
        }
    }
}
