//! Key interval sets over the leading column of an index.
//!
//! Bounds are [`Entire`] values: a key extended with an infinitesimal shift,
//! so that open and closed endpoints are both expressed as inclusive bounds.
//! `x > 5` becomes `[5+ε, +∞]` and `x < 5` becomes `[null+ε, 5-ε]` (null
//! sorts lowest and never satisfies a comparison).

mod expr;

pub use expr::{KeyExpr, LeafOp, LeafRange, RangeSetExpr};

use std::cmp::Ordering;
use std::fmt;

use crate::value::Value;

/// Infinitesimal shift applied to a key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Shift {
    Negative,
    None,
    Positive,
}

/// A key value, possibly shifted, or one of the infinities.
#[derive(Debug, Clone)]
pub enum Entire {
    NegativeInfinity,
    Value { value: Value, shift: Shift },
    PositiveInfinity,
}

impl Entire {
    /// The exact key value.
    pub fn exact(value: Value) -> Self {
        Entire::Value {
            value,
            shift: Shift::None,
        }
    }

    /// Just above every key equal to `value`.
    pub fn after(value: Value) -> Self {
        Entire::Value {
            value,
            shift: Shift::Positive,
        }
    }

    /// Just below every key equal to `value`.
    pub fn before(value: Value) -> Self {
        Entire::Value {
            value,
            shift: Shift::Negative,
        }
    }

    /// The exact value this bound denotes, if it is not shifted or infinite.
    pub fn exact_value(&self) -> Option<&Value> {
        match self {
            Entire::Value {
                value,
                shift: Shift::None,
            } => Some(value),
            _ => None,
        }
    }

    /// Largest bound that still excludes this one, as an inclusive upper
    /// bound of the gap below it.
    fn predecessor(&self) -> Entire {
        match self {
            Entire::Value {
                value,
                shift: Shift::None,
            } => Entire::before(value.clone()),
            Entire::Value {
                value,
                shift: Shift::Positive,
            } => Entire::exact(value.clone()),
            other => other.clone(),
        }
    }

    /// Smallest bound past this one, as an inclusive lower bound of the gap
    /// above it.
    fn successor(&self) -> Entire {
        match self {
            Entire::Value {
                value,
                shift: Shift::None,
            } => Entire::after(value.clone()),
            other => other.clone(),
        }
    }

    /// Whether no key can lie strictly between `self` and `next`.
    fn is_adjacent_to(&self, next: &Entire) -> bool {
        match (self, next) {
            (Entire::NegativeInfinity, Entire::Value { value, shift }) => {
                value.is_null() && *shift != Shift::Positive
            }
            (
                Entire::Value { value: a, shift: sa },
                Entire::Value { value: b, shift: sb },
            ) => {
                a.key_eq(b)
                    && matches!(
                        (sa, sb),
                        (Shift::Negative, Shift::None) | (Shift::None, Shift::Positive)
                    )
            }
            _ => false,
        }
    }
}

impl Ord for Entire {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Entire::NegativeInfinity, Entire::NegativeInfinity) => Ordering::Equal,
            (Entire::PositiveInfinity, Entire::PositiveInfinity) => Ordering::Equal,
            (Entire::NegativeInfinity, _) | (_, Entire::PositiveInfinity) => Ordering::Less,
            (_, Entire::NegativeInfinity) | (Entire::PositiveInfinity, _) => Ordering::Greater,
            (
                Entire::Value { value: a, shift: sa },
                Entire::Value { value: b, shift: sb },
            ) => a.key_cmp(b).then(sa.cmp(sb)),
        }
    }
}

impl PartialOrd for Entire {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entire {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entire {}

impl fmt::Display for Entire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entire::NegativeInfinity => write!(f, "-inf"),
            Entire::PositiveInfinity => write!(f, "+inf"),
            Entire::Value { value, shift } => match shift {
                Shift::None => write!(f, "{}", value),
                Shift::Negative => write!(f, "{}-e", value),
                Shift::Positive => write!(f, "{}+e", value),
            },
        }
    }
}

/// Inclusive interval of entire keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub low: Entire,
    pub high: Entire,
}

impl Range {
    pub fn new(low: Entire, high: Entire) -> Self {
        Self { low, high }
    }

    /// The single key `value`.
    pub fn point(value: Value) -> Self {
        Self::new(Entire::exact(value.clone()), Entire::exact(value))
    }

    pub fn full() -> Self {
        Self::new(Entire::NegativeInfinity, Entire::PositiveInfinity)
    }

    /// Whether `key` lies inside this interval.
    pub fn contains(&self, key: &Value) -> bool {
        let key = Entire::exact(key.clone());
        self.low <= key && key <= self.high
    }

    /// Whether the interval cannot contain any key.
    pub fn is_degenerate(&self) -> bool {
        match self.low.cmp(&self.high) {
            Ordering::Greater => true,
            Ordering::Equal => self.low.exact_value().is_none(),
            Ordering::Less => {
                matches!(self.low, Entire::NegativeInfinity)
                    && self.high <= Entire::before(Value::Null)
            }
        }
    }

    /// The single key of a point interval.
    pub fn as_point(&self) -> Option<&Value> {
        if self.low == self.high {
            self.low.exact_value()
        } else {
            None
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_point() {
            Some(value) => write!(f, "[{}]", value),
            None => write!(f, "[{}, {}]", self.low, self.high),
        }
    }
}

/// A normalized union of disjoint, sorted key intervals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every key.
    pub fn full() -> Self {
        Self {
            ranges: vec![Range::full()],
        }
    }

    /// Build a normalized set from arbitrary intervals.
    pub fn from_ranges(ranges: impl IntoIterator<Item = Range>) -> Self {
        let mut ranges: Vec<Range> = ranges.into_iter().filter(|r| !r.is_degenerate()).collect();
        ranges.sort_by(|a, b| a.low.cmp(&b.low));

        let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.low <= last.high || last.high.is_adjacent_to(&range.low) => {
                    if range.high > last.high {
                        last.high = range.high;
                    }
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// A set of single keys.
    pub fn points(values: impl IntoIterator<Item = Value>) -> Self {
        Self::from_ranges(values.into_iter().map(Range::point))
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether the set covers every possible key.
    pub fn is_full(&self) -> bool {
        match self.ranges.as_slice() {
            [only] => {
                only.high == Entire::PositiveInfinity
                    && (only.low == Entire::NegativeInfinity
                        || Entire::NegativeInfinity.is_adjacent_to(&only.low))
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.ranges.iter().any(|r| r.contains(key))
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        RangeSet::from_ranges(self.ranges.iter().chain(&other.ranges).cloned())
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let mut out = Vec::new();
        for a in &self.ranges {
            for b in &other.ranges {
                let low = std::cmp::max(&a.low, &b.low).clone();
                let high = std::cmp::min(&a.high, &b.high).clone();
                out.push(Range::new(low, high));
            }
        }
        RangeSet::from_ranges(out)
    }

    /// Every key not in this set.
    pub fn complement(&self) -> RangeSet {
        let mut out = Vec::with_capacity(self.ranges.len() + 1);
        let mut start = Entire::NegativeInfinity;
        for range in &self.ranges {
            if range.low != Entire::NegativeInfinity {
                out.push(Range::new(start.clone(), range.low.predecessor()));
            }
            if range.high == Entire::PositiveInfinity {
                return RangeSet::from_ranges(out);
            }
            start = range.high.successor();
        }
        out.push(Range::new(start, Entire::PositiveInfinity));
        RangeSet::from_ranges(out)
    }

    /// The keys of a set made only of point intervals.
    pub fn as_points(&self) -> Option<Vec<&Value>> {
        self.ranges.iter().map(Range::as_point).collect()
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            return write!(f, "{{}}");
        }
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " U ")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i32) -> Value {
        Value::Int32(v)
    }

    fn less_than(v: i32) -> RangeSet {
        RangeSet::from_ranges([Range::new(Entire::after(Value::Null), Entire::before(int(v)))])
    }

    fn greater_than(v: i32) -> RangeSet {
        RangeSet::from_ranges([Range::new(Entire::after(int(v)), Entire::PositiveInfinity)])
    }

    #[test]
    fn test_entire_order() {
        assert!(Entire::before(int(5)) < Entire::exact(int(5)));
        assert!(Entire::exact(int(5)) < Entire::after(int(5)));
        assert!(Entire::after(int(5)) < Entire::before(int(6)));
        assert!(Entire::NegativeInfinity < Entire::exact(Value::Null));
        assert!(Entire::exact(int(i32::MAX)) < Entire::PositiveInfinity);
    }

    #[test]
    fn test_open_interval_membership() {
        let set = greater_than(18).intersect(&less_than(65));
        assert_eq!(set.ranges().len(), 1);
        assert!(!set.contains(&int(18)));
        assert!(set.contains(&int(19)));
        assert!(set.contains(&int(64)));
        assert!(!set.contains(&int(65)));
        assert!(!set.contains(&Value::Null));
    }

    #[test]
    fn test_complement_of_point() {
        let not_five = RangeSet::points([int(5)]).complement();
        assert!(!not_five.contains(&int(5)));
        assert!(not_five.contains(&int(4)));
        assert!(not_five.contains(&int(6)));
        assert!(not_five.contains(&Value::Null));
        assert_eq!(not_five.ranges().len(), 2);
    }

    #[test]
    fn test_complement_round_trip() {
        let set = less_than(3).union(&RangeSet::points([int(7), int(9)]));
        let back = set.complement().complement();
        for v in -2..12 {
            assert_eq!(set.contains(&int(v)), back.contains(&int(v)), "key {}", v);
        }
        assert_eq!(set.contains(&Value::Null), back.contains(&Value::Null));
    }

    #[test]
    fn test_adjacent_ranges_merge_to_full() {
        let five = RangeSet::points([int(5)]);
        let everything = five.union(&five.complement());
        assert!(everything.is_full());

        let non_null = RangeSet::from_ranges([Range::new(
            Entire::after(Value::Null),
            Entire::PositiveInfinity,
        )]);
        assert!(!non_null.is_full());
        assert!(non_null.union(&RangeSet::points([Value::Null])).is_full());
    }

    #[test]
    fn test_degenerate_ranges_dropped() {
        let empty = greater_than(5).intersect(&less_than(5));
        assert!(empty.is_empty());
        assert!(RangeSet::full().complement().is_empty());
        assert!(RangeSet::empty().complement().is_full());
    }

    #[test]
    fn test_points() {
        let set = RangeSet::points([int(3), int(1), int(3)]);
        let points: Vec<_> = set.as_points().unwrap().into_iter().cloned().collect();
        assert_eq!(points, vec![int(1), int(3)]);
        assert!(greater_than(1).as_points().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(RangeSet::points([int(5)]).to_string(), "[5]");
        assert_eq!(greater_than(18).to_string(), "[18+e, +inf]");
        assert_eq!(RangeSet::empty().to_string(), "{}");
    }
}
