//! Row expressions used by filter, calculate and join predicates.
//!
//! Columns are addressed by position in the input header. Evaluation uses
//! two-valued logic: comparisons involving null are false and `Not` simply
//! negates.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Operator to use when the operands are swapped (`a < b` == `b > a`).
    pub fn mirror(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }

    /// Test an ordering against this operator.
    pub fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering.is_eq(),
            CompareOp::Ne => ordering.is_ne(),
            CompareOp::Lt => ordering.is_lt(),
            CompareOp::Le => ordering.is_le(),
            CompareOp::Gt => ordering.is_gt(),
            CompareOp::Ge => ordering.is_ge(),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// String methods callable from predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    StartsWith,
    EndsWith,
    Contains,
}

impl Method {
    fn apply(self, target: &str, argument: &str) -> bool {
        match self {
            Method::StartsWith => target.starts_with(argument),
            Method::EndsWith => target.ends_with(argument),
            Method::Contains => target.contains(argument),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Method::StartsWith => "starts_with",
            Method::EndsWith => "ends_with",
            Method::Contains => "contains",
        }
    }
}

/// A row expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column of the input row, by position.
    Column(usize),
    /// Constant value.
    Literal(Value),
    /// Value bound at execution time.
    Parameter(String),
    /// Comparison of two sub-expressions.
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Membership in a list of values.
    In { expr: Box<Expr>, values: Vec<Expr> },
    IsNull(Box<Expr>),
    /// String method call.
    Call {
        method: Method,
        target: Box<Expr>,
        argument: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
}

impl Expr {
    pub fn col(index: usize) -> Expr {
        Expr::Column(index)
    }

    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn param(name: impl Into<String>) -> Expr {
        Expr::Parameter(name.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Ne, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Lt, left, right)
    }

    pub fn le(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Le, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Gt, left, right)
    }

    pub fn ge(left: Expr, right: Expr) -> Expr {
        Expr::compare(CompareOp::Ge, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn in_list(expr: Expr, values: Vec<Expr>) -> Expr {
        Expr::In {
            expr: Box::new(expr),
            values,
        }
    }

    pub fn is_null(expr: Expr) -> Expr {
        Expr::IsNull(Box::new(expr))
    }

    pub fn call(method: Method, target: Expr, argument: Expr) -> Expr {
        Expr::Call {
            method,
            target: Box::new(target),
            argument: Box::new(argument),
        }
    }

    pub fn starts_with(target: Expr, prefix: Expr) -> Expr {
        Expr::call(Method::StartsWith, target, prefix)
    }

    pub fn conditional(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Evaluate against a row.
    pub fn evaluate(&self, row: &[Value], params: &ParameterContext) -> Result<Value, Error> {
        match self {
            Expr::Column(index) => row.get(*index).cloned().ok_or(Error::InvalidColumn {
                index: *index,
                width: row.len(),
            }),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Parameter(name) => params.resolve(name).cloned(),
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(row, params)?;
                let r = right.evaluate(row, params)?;
                Ok(Value::Bool(l.compare(&r).is_some_and(|o| op.test(o))))
            }
            Expr::And(left, right) => Ok(Value::Bool(
                left.is_satisfied(row, params)? && right.is_satisfied(row, params)?,
            )),
            Expr::Or(left, right) => Ok(Value::Bool(
                left.is_satisfied(row, params)? || right.is_satisfied(row, params)?,
            )),
            Expr::Not(inner) => Ok(Value::Bool(!inner.is_satisfied(row, params)?)),
            Expr::In { expr, values } => {
                let v = expr.evaluate(row, params)?;
                for candidate in values {
                    let c = candidate.evaluate(row, params)?;
                    if v.compare(&c) == Some(Ordering::Equal) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::IsNull(inner) => Ok(Value::Bool(inner.evaluate(row, params)?.is_null())),
            Expr::Call {
                method,
                target,
                argument,
            } => {
                let t = target.evaluate(row, params)?;
                let a = argument.evaluate(row, params)?;
                let result = match (t.as_str(), a.as_str()) {
                    (Some(t), Some(a)) => method.apply(t, a),
                    _ => false,
                };
                Ok(Value::Bool(result))
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                if test.is_satisfied(row, params)? {
                    if_true.evaluate(row, params)
                } else {
                    if_false.evaluate(row, params)
                }
            }
        }
    }

    /// Evaluate as a predicate. Anything but `true` is unsatisfied.
    pub fn is_satisfied(&self, row: &[Value], params: &ParameterContext) -> Result<bool, Error> {
        Ok(matches!(self.evaluate(row, params)?, Value::Bool(true)))
    }

    /// Columns referenced by this expression.
    pub fn columns(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<usize>) {
        match self {
            Expr::Column(i) => {
                out.insert(*i);
            }
            Expr::Literal(_) | Expr::Parameter(_) => {}
            Expr::Compare { left, right, .. }
            | Expr::And(left, right)
            | Expr::Or(left, right) => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not(inner) | Expr::IsNull(inner) => inner.collect_columns(out),
            Expr::In { expr, values } => {
                expr.collect_columns(out);
                for v in values {
                    v.collect_columns(out);
                }
            }
            Expr::Call {
                target, argument, ..
            } => {
                target.collect_columns(out);
                argument.collect_columns(out);
            }
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => {
                test.collect_columns(out);
                if_true.collect_columns(out);
                if_false.collect_columns(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(i) => write!(f, "#{}", i),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Parameter(name) => write!(f, "${}", name),
            Expr::Compare { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::And(l, r) => write!(f, "({} && {})", l, r),
            Expr::Or(l, r) => write!(f, "({} || {})", l, r),
            Expr::Not(inner) => write!(f, "!{}", inner),
            Expr::In { expr, values } => {
                write!(f, "{} in [", expr)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Expr::IsNull(inner) => write!(f, "{} is null", inner),
            Expr::Call {
                method,
                target,
                argument,
            } => write!(f, "{}.{}({})", target, method.name(), argument),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
        }
    }
}

/// Parameter bindings for one evaluation scope.
///
/// The optimizer evaluates range sets under a context of *expected* values
/// when costing; the interpreter evaluates under the actual values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterContext {
    values: HashMap<String, Value>,
}

impl ParameterContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter, returning the updated context.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Bind a parameter in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up a binding, failing if it is absent.
    pub fn resolve(&self, name: &str) -> Result<&Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }
}
