//! Reference in-memory executor for provider trees.
//!
//! Used to check that rewrites preserve results. Joins are nested loops and
//! every operator materializes its input; nothing here is tuned.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::Error;
use crate::expr::ParameterContext;
use crate::provider::{
    AggregateColumn, AggregateKind, ApplyType, Direction, IndexId, IndexInfo, JoinType, OrderItem,
    Provider, ProviderKind,
};
use crate::range::{KeyExpr, RangeSet};
use crate::value::{rows_key_eq, ColumnType, Value};

pub type Row = Vec<Value>;

/// Row storage addressed by index.
pub trait IndexStore {
    /// Every row of `index`, in index key order.
    fn scan(&self, index: &IndexInfo) -> Result<Vec<Row>, Error>;
}

/// Rows kept per primary index; secondaries read their primary's rows in
/// their own key order.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    tables: HashMap<IndexId, Arc<[Row]>>,
    primaries: HashMap<IndexId, IndexId>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the rows of a primary index.
    pub fn insert_table(&mut self, primary: &IndexInfo, rows: Vec<Row>) {
        self.tables.insert(primary.id, rows.into());
    }

    /// Make `secondary` read the rows of `primary`.
    pub fn register_secondary(&mut self, secondary: &IndexInfo, primary: &IndexInfo) {
        self.primaries.insert(secondary.id, primary.id);
    }
}

impl IndexStore for MemoryIndexStore {
    fn scan(&self, index: &IndexInfo) -> Result<Vec<Row>, Error> {
        let table = self.primaries.get(&index.id).unwrap_or(&index.id);
        let rows = self
            .tables
            .get(table)
            .ok_or_else(|| Error::InvalidPlan(format!("no rows stored for index {}", index.name)))?;
        let mut rows = rows.to_vec();
        sort_rows(&mut rows, &index.key_columns);
        Ok(rows)
    }
}

/// Stable sort by a sort order under key ordering.
pub fn sort_rows(rows: &mut [Row], order: &[OrderItem]) {
    rows.sort_by(|a, b| compare_rows(a, b, order));
}

/// Compare two rows under a sort order.
pub fn compare_rows(a: &[Value], b: &[Value], order: &[OrderItem]) -> Ordering {
    for item in order {
        let (x, y) = (a.get(item.column), b.get(item.column));
        let ordering = match (x, y) {
            (Some(x), Some(y)) => x.key_cmp(y),
            _ => Ordering::Equal,
        };
        let ordering = match item.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Whether `rows` are sorted by `order`.
pub fn is_sorted_by(rows: &[Row], order: &[OrderItem]) -> bool {
    rows.windows(2)
        .all(|pair| compare_rows(&pair[0], &pair[1], order) != Ordering::Greater)
}

/// Executes provider trees against an [`IndexStore`].
pub struct Interpreter<'a, S: IndexStore> {
    store: &'a S,
    params: ParameterContext,
}

impl<'a, S: IndexStore> Interpreter<'a, S> {
    pub fn new(store: &'a S, params: ParameterContext) -> Self {
        Self { store, params }
    }

    /// Enumerate the rows of `provider`.
    pub fn execute(&self, provider: &Provider) -> Result<Vec<Row>, Error> {
        self.run(provider, &self.params)
    }

    fn run(&self, provider: &Provider, params: &ParameterContext) -> Result<Vec<Row>, Error> {
        trace!(provider = provider.kind_name(), "executing");
        match provider.kind() {
            ProviderKind::IndexScan { index } => self.store.scan(index),
            ProviderKind::Raw { rows } => Ok(rows.to_vec()),
            ProviderKind::Filter { source, predicate } => {
                let mut out = Vec::new();
                for row in self.run(source, params)? {
                    if predicate.is_satisfied(&row, params)? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            ProviderKind::Select { source, columns } => self
                .run(source, params)?
                .into_iter()
                .map(|row| project(&row, columns))
                .collect(),
            ProviderKind::Calculate { source, columns } => {
                let mut out = Vec::new();
                for mut row in self.run(source, params)? {
                    let mut computed = Vec::with_capacity(columns.len());
                    for column in columns {
                        computed.push(column.expr.evaluate(&row, params)?);
                    }
                    row.extend(computed);
                    out.push(row);
                }
                Ok(out)
            }
            ProviderKind::Alias { source, .. } => self.run(source, params),
            ProviderKind::Sort { source, order } => {
                let mut rows = self.run(source, params)?;
                sort_rows(&mut rows, order);
                Ok(rows)
            }
            ProviderKind::Skip { source, count } => {
                Ok(window(self.run(source, params)?, *count, None))
            }
            ProviderKind::Take { source, count } => {
                Ok(window(self.run(source, params)?, 0, Some(*count)))
            }
            ProviderKind::Paging { source, skip, take } => {
                Ok(window(self.run(source, params)?, *skip, Some(*take)))
            }
            ProviderKind::RowNumber { source, .. } => Ok(self
                .run(source, params)?
                .into_iter()
                .enumerate()
                .map(|(i, mut row)| {
                    row.push(Value::Int64(i as i64 + 1));
                    row
                })
                .collect()),
            ProviderKind::Distinct { source } => Ok(distinct(self.run(source, params)?)),
            ProviderKind::Aggregate {
                source,
                group_columns,
                aggregates,
            } => aggregate(self.run(source, params)?, group_columns, aggregates),
            ProviderKind::Join {
                left,
                right,
                join_type,
                equalities,
            } => {
                let left_rows = self.run(left, params)?;
                let right_rows = self.run(right, params)?;
                let width = right.header().len();
                join(left_rows, &right_rows, *join_type, width, |l, r| {
                    Ok(equalities.iter().all(|&(a, b)| match (l.get(a), r.get(b)) {
                        (Some(x), Some(y)) => x.compare(y) == Some(Ordering::Equal),
                        _ => false,
                    }))
                })
            }
            ProviderKind::PredicateJoin {
                left,
                right,
                join_type,
                predicate,
            } => {
                let left_rows = self.run(left, params)?;
                let right_rows = self.run(right, params)?;
                let width = right.header().len();
                join(left_rows, &right_rows, *join_type, width, |l, r| {
                    let combined: Row = l.iter().chain(r).cloned().collect();
                    predicate.is_satisfied(&combined, params)
                })
            }
            ProviderKind::Apply {
                left,
                right,
                apply_type,
                bindings,
            } => {
                let width = right.header().len();
                let mut out = Vec::new();
                for row in self.run(left, params)? {
                    let mut scope = params.clone();
                    for (column, name) in bindings {
                        let value = row.get(*column).cloned().ok_or(Error::InvalidColumn {
                            index: *column,
                            width: row.len(),
                        })?;
                        scope.insert(name.clone(), value);
                    }
                    let matches = self.run(right, &scope)?;
                    if matches.is_empty() && *apply_type == ApplyType::Outer {
                        out.push(padded(&row, width));
                    }
                    for m in matches {
                        out.push(row.iter().chain(&m).cloned().collect());
                    }
                }
                Ok(out)
            }
            ProviderKind::Union { left, right } => {
                let mut rows = self.run(left, params)?;
                rows.extend(self.run(right, params)?);
                Ok(distinct(rows))
            }
            ProviderKind::Concat { left, right } => {
                let mut rows = self.run(left, params)?;
                rows.extend(self.run(right, params)?);
                Ok(rows)
            }
            ProviderKind::Seek { index, key } => {
                let value = key_value(key, params)?;
                let set = match index.leading_key_type() {
                    Some(ty) if value.is_comparable_with(ty) => RangeSet::points([value]),
                    _ => RangeSet::empty(),
                };
                self.scan_ranges(index, &set)
            }
            ProviderKind::Range { index, range: ranges }
            | ProviderKind::RangeSet { index, ranges } => {
                let ty = leading_type(index)?;
                self.scan_ranges(index, &ranges.evaluate(ty, params))
            }
            ProviderKind::MultiSeek { index, keys } => {
                let ty = leading_type(index)?;
                let mut values = Vec::with_capacity(keys.len());
                for key in keys {
                    let value = key_value(key, params)?;
                    if value.is_comparable_with(ty) {
                        values.push(value);
                    }
                }
                self.scan_ranges(index, &RangeSet::points(values))
            }
        }
    }

    /// Rows of `index` whose leading key lies in `set`, in index order.
    fn scan_ranges(&self, index: &IndexInfo, set: &RangeSet) -> Result<Vec<Row>, Error> {
        let key = index
            .leading_key()
            .ok_or_else(|| Error::InvalidPlan(format!("index {} has no key", index.name)))?;
        Ok(self
            .store
            .scan(index)?
            .into_iter()
            .filter(|row| row.get(key.column).is_some_and(|v| set.contains(v)))
            .collect())
    }
}

/// Seek keys must be bound at execution time.
fn key_value(key: &KeyExpr, params: &ParameterContext) -> Result<Value, Error> {
    match key {
        KeyExpr::Literal(value) => Ok(value.clone()),
        KeyExpr::Parameter(name) => params.resolve(name).cloned(),
    }
}

fn leading_type(index: &IndexInfo) -> Result<ColumnType, Error> {
    index
        .leading_key_type()
        .ok_or_else(|| Error::InvalidPlan(format!("index {} has no key", index.name)))
}

fn project(row: &[Value], columns: &[usize]) -> Result<Row, Error> {
    columns
        .iter()
        .map(|&i| {
            row.get(i).cloned().ok_or(Error::InvalidColumn {
                index: i,
                width: row.len(),
            })
        })
        .collect()
}

fn window(rows: Vec<Row>, skip: u64, take: Option<u64>) -> Vec<Row> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let take = take.map_or(usize::MAX, |t| usize::try_from(t).unwrap_or(usize::MAX));
    rows.into_iter().skip(skip).take(take).collect()
}

/// First occurrence of each row, in input order.
fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        if !out.iter().any(|seen| rows_key_eq(seen, &row)) {
            out.push(row);
        }
    }
    out
}

fn padded(row: &[Value], width: usize) -> Row {
    row.iter()
        .cloned()
        .chain(std::iter::repeat(Value::Null).take(width))
        .collect()
}

fn join(
    left: Vec<Row>,
    right: &[Row],
    join_type: JoinType,
    right_width: usize,
    matches: impl Fn(&Row, &Row) -> Result<bool, Error>,
) -> Result<Vec<Row>, Error> {
    let mut out = Vec::new();
    for l in left {
        let mut matched = false;
        for r in right {
            if matches(&l, r)? {
                matched = true;
                out.push(l.iter().chain(r).cloned().collect());
            }
        }
        if !matched && join_type == JoinType::LeftOuter {
            out.push(padded(&l, right_width));
        }
    }
    Ok(out)
}

/// Groups appear in order of their first row.
fn aggregate(
    rows: Vec<Row>,
    group_columns: &[usize],
    aggregates: &[AggregateColumn],
) -> Result<Vec<Row>, Error> {
    let mut groups: Vec<(Row, Vec<Row>)> = Vec::new();
    for row in rows {
        let key = project(&row, group_columns)?;
        match groups.iter_mut().find(|(k, _)| rows_key_eq(k, &key)) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(mut key, members)| {
            for aggregate in aggregates {
                key.push(compute_aggregate(aggregate, &members)?);
            }
            Ok(key)
        })
        .collect()
}

fn compute_aggregate(aggregate: &AggregateColumn, rows: &[Row]) -> Result<Value, Error> {
    let values = match aggregate.column {
        Some(column) => rows
            .iter()
            .map(|row| {
                row.get(column).cloned().ok_or(Error::InvalidColumn {
                    index: column,
                    width: row.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|v| !v.is_null())
            .collect::<Vec<_>>(),
        None if aggregate.kind == AggregateKind::Count => {
            return Ok(Value::Int64(rows.len() as i64));
        }
        None => {
            return Err(Error::InvalidPlan(format!(
                "aggregate {} needs a source column",
                aggregate.name
            )))
        }
    };

    Ok(match aggregate.kind {
        AggregateKind::Count => Value::Int64(values.len() as i64),
        AggregateKind::Min => values
            .into_iter()
            .min_by(|a, b| a.key_cmp(b))
            .unwrap_or(Value::Null),
        AggregateKind::Max => values
            .into_iter()
            .max_by(|a, b| a.key_cmp(b))
            .unwrap_or(Value::Null),
        AggregateKind::Sum => {
            if values.is_empty() {
                Value::Null
            } else if values.iter().all(|v| v.as_i64().is_some()) {
                Value::Int64(values.iter().filter_map(Value::as_i64).sum())
            } else {
                let mut sum = 0.0;
                for value in &values {
                    sum += value.as_f64().ok_or_else(|| {
                        Error::Evaluation(format!("cannot sum {}", value))
                    })?;
                }
                Value::Float64(sum)
            }
        }
    })
}
