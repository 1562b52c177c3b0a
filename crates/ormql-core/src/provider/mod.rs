//! Relational-algebra provider trees.
//!
//! Providers are immutable. Every rewrite builds new nodes and shares
//! untouched subtrees through `Arc`.

mod header;
mod index;
mod ordering;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use header::{order_starts_with, remap_order, Column, Direction, Header, OrderItem, SortOrder};
pub use index::{IndexId, IndexInfo};
pub use ordering::{default_ordering_descriptor, OrderingDescriptor, OrderingResolver};

use crate::error::Error;
use crate::expr::Expr;
use crate::range::{KeyExpr, RangeSetExpr};
use crate::value::{ColumnType, Value};

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
}

/// Apply flavor. `Outer` keeps left rows with no right match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplyType {
    Cross,
    Outer,
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
}

/// An aggregate output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    pub name: String,
    pub kind: AggregateKind,
    /// Source column; `None` only for `Count`, which then counts rows.
    pub column: Option<usize>,
}

impl AggregateColumn {
    pub fn new(name: impl Into<String>, kind: AggregateKind, column: Option<usize>) -> Self {
        Self {
            name: name.into(),
            kind,
            column,
        }
    }
}

/// A computed column appended by `Calculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    pub name: String,
    pub ty: ColumnType,
    pub expr: Expr,
}

impl CalculatedColumn {
    pub fn new(name: impl Into<String>, ty: ColumnType, expr: Expr) -> Self {
        Self {
            name: name.into(),
            ty,
            expr,
        }
    }
}

/// Operator-specific part of a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderKind {
    /// Full scan of an index, in key order.
    IndexScan { index: Arc<IndexInfo> },
    /// Literal rows.
    Raw { rows: Arc<[Vec<Value>]> },
    Filter { source: Arc<Provider>, predicate: Expr },
    /// Projection; `columns` are source positions.
    Select { source: Arc<Provider>, columns: Vec<usize> },
    Calculate { source: Arc<Provider>, columns: Vec<CalculatedColumn> },
    Alias { source: Arc<Provider>, alias: String },
    Sort { source: Arc<Provider>, order: SortOrder },
    Skip { source: Arc<Provider>, count: u64 },
    Take { source: Arc<Provider>, count: u64 },
    /// Skip then take, as one physical step.
    Paging { source: Arc<Provider>, skip: u64, take: u64 },
    /// Appends a 1-based row number column.
    RowNumber { source: Arc<Provider>, column: String },
    Distinct { source: Arc<Provider> },
    Aggregate {
        source: Arc<Provider>,
        group_columns: Vec<usize>,
        aggregates: Vec<AggregateColumn>,
    },
    /// Equi-join on (left column, right column) pairs.
    Join {
        left: Arc<Provider>,
        right: Arc<Provider>,
        join_type: JoinType,
        equalities: Vec<(usize, usize)>,
    },
    /// Join on an arbitrary predicate over the concatenated row.
    PredicateJoin {
        left: Arc<Provider>,
        right: Arc<Provider>,
        join_type: JoinType,
        predicate: Expr,
    },
    /// Correlated join: evaluates `right` once per left row with left
    /// columns bound to parameters.
    Apply {
        left: Arc<Provider>,
        right: Arc<Provider>,
        apply_type: ApplyType,
        bindings: Vec<(usize, String)>,
    },
    /// Distinct union.
    Union { left: Arc<Provider>, right: Arc<Provider> },
    Concat { left: Arc<Provider>, right: Arc<Provider> },
    /// Point lookup on a unique leading key.
    Seek { index: Arc<IndexInfo>, key: KeyExpr },
    /// Scan of a single key interval.
    Range { index: Arc<IndexInfo>, range: RangeSetExpr },
    /// Scan of a union of key intervals.
    RangeSet { index: Arc<IndexInfo>, ranges: RangeSetExpr },
    /// Lookups of several leading-key values.
    MultiSeek { index: Arc<IndexInfo>, keys: Vec<KeyExpr> },
}

/// A provider node: its operator plus the header it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    kind: ProviderKind,
    header: Header,
}

impl Provider {
    fn build(kind: ProviderKind) -> Provider {
        let header = compute_header(&kind);
        Provider { kind, header }
    }

    pub fn index_scan(index: impl Into<Arc<IndexInfo>>) -> Provider {
        Provider::build(ProviderKind::IndexScan {
            index: index.into(),
        })
    }

    /// Literal rows described by `header`, which may claim an order.
    pub fn raw(header: Header, rows: Vec<Vec<Value>>) -> Provider {
        Provider {
            kind: ProviderKind::Raw { rows: rows.into() },
            header,
        }
    }

    pub fn filter(source: impl Into<Arc<Provider>>, predicate: Expr) -> Provider {
        Provider::build(ProviderKind::Filter {
            source: source.into(),
            predicate,
        })
    }

    pub fn select(source: impl Into<Arc<Provider>>, columns: Vec<usize>) -> Provider {
        Provider::build(ProviderKind::Select {
            source: source.into(),
            columns,
        })
    }

    pub fn calculate(source: impl Into<Arc<Provider>>, columns: Vec<CalculatedColumn>) -> Provider {
        Provider::build(ProviderKind::Calculate {
            source: source.into(),
            columns,
        })
    }

    pub fn alias(source: impl Into<Arc<Provider>>, alias: impl Into<String>) -> Provider {
        Provider::build(ProviderKind::Alias {
            source: source.into(),
            alias: alias.into(),
        })
    }

    pub fn sort(source: impl Into<Arc<Provider>>, order: SortOrder) -> Provider {
        Provider::build(ProviderKind::Sort {
            source: source.into(),
            order,
        })
    }

    pub fn skip(source: impl Into<Arc<Provider>>, count: u64) -> Provider {
        Provider::build(ProviderKind::Skip {
            source: source.into(),
            count,
        })
    }

    pub fn take(source: impl Into<Arc<Provider>>, count: u64) -> Provider {
        Provider::build(ProviderKind::Take {
            source: source.into(),
            count,
        })
    }

    pub fn paging(source: impl Into<Arc<Provider>>, skip: u64, take: u64) -> Provider {
        Provider::build(ProviderKind::Paging {
            source: source.into(),
            skip,
            take,
        })
    }

    pub fn row_number(source: impl Into<Arc<Provider>>, column: impl Into<String>) -> Provider {
        Provider::build(ProviderKind::RowNumber {
            source: source.into(),
            column: column.into(),
        })
    }

    pub fn distinct(source: impl Into<Arc<Provider>>) -> Provider {
        Provider::build(ProviderKind::Distinct {
            source: source.into(),
        })
    }

    pub fn aggregate(
        source: impl Into<Arc<Provider>>,
        group_columns: Vec<usize>,
        aggregates: Vec<AggregateColumn>,
    ) -> Provider {
        Provider::build(ProviderKind::Aggregate {
            source: source.into(),
            group_columns,
            aggregates,
        })
    }

    pub fn join(
        left: impl Into<Arc<Provider>>,
        right: impl Into<Arc<Provider>>,
        join_type: JoinType,
        equalities: Vec<(usize, usize)>,
    ) -> Provider {
        Provider::build(ProviderKind::Join {
            left: left.into(),
            right: right.into(),
            join_type,
            equalities,
        })
    }

    pub fn predicate_join(
        left: impl Into<Arc<Provider>>,
        right: impl Into<Arc<Provider>>,
        join_type: JoinType,
        predicate: Expr,
    ) -> Provider {
        Provider::build(ProviderKind::PredicateJoin {
            left: left.into(),
            right: right.into(),
            join_type,
            predicate,
        })
    }

    pub fn apply(
        left: impl Into<Arc<Provider>>,
        right: impl Into<Arc<Provider>>,
        apply_type: ApplyType,
        bindings: Vec<(usize, String)>,
    ) -> Provider {
        Provider::build(ProviderKind::Apply {
            left: left.into(),
            right: right.into(),
            apply_type,
            bindings,
        })
    }

    pub fn union(left: impl Into<Arc<Provider>>, right: impl Into<Arc<Provider>>) -> Provider {
        Provider::build(ProviderKind::Union {
            left: left.into(),
            right: right.into(),
        })
    }

    pub fn concat(left: impl Into<Arc<Provider>>, right: impl Into<Arc<Provider>>) -> Provider {
        Provider::build(ProviderKind::Concat {
            left: left.into(),
            right: right.into(),
        })
    }

    pub fn seek(index: impl Into<Arc<IndexInfo>>, key: KeyExpr) -> Provider {
        Provider::build(ProviderKind::Seek {
            index: index.into(),
            key,
        })
    }

    pub fn range(index: impl Into<Arc<IndexInfo>>, range: RangeSetExpr) -> Provider {
        Provider::build(ProviderKind::Range {
            index: index.into(),
            range,
        })
    }

    pub fn range_set(index: impl Into<Arc<IndexInfo>>, ranges: RangeSetExpr) -> Provider {
        Provider::build(ProviderKind::RangeSet {
            index: index.into(),
            ranges,
        })
    }

    pub fn multi_seek(index: impl Into<Arc<IndexInfo>>, keys: Vec<KeyExpr>) -> Provider {
        Provider::build(ProviderKind::MultiSeek {
            index: index.into(),
            keys,
        })
    }

    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Short operator name used in diagnostics and errors.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ProviderKind::IndexScan { .. } => "IndexScan",
            ProviderKind::Raw { .. } => "Raw",
            ProviderKind::Filter { .. } => "Filter",
            ProviderKind::Select { .. } => "Select",
            ProviderKind::Calculate { .. } => "Calculate",
            ProviderKind::Alias { .. } => "Alias",
            ProviderKind::Sort { .. } => "Sort",
            ProviderKind::Skip { .. } => "Skip",
            ProviderKind::Take { .. } => "Take",
            ProviderKind::Paging { .. } => "Paging",
            ProviderKind::RowNumber { .. } => "RowNumber",
            ProviderKind::Distinct { .. } => "Distinct",
            ProviderKind::Aggregate { .. } => "Aggregate",
            ProviderKind::Join { .. } => "Join",
            ProviderKind::PredicateJoin { .. } => "PredicateJoin",
            ProviderKind::Apply { .. } => "Apply",
            ProviderKind::Union { .. } => "Union",
            ProviderKind::Concat { .. } => "Concat",
            ProviderKind::Seek { .. } => "Seek",
            ProviderKind::Range { .. } => "Range",
            ProviderKind::RangeSet { .. } => "RangeSet",
            ProviderKind::MultiSeek { .. } => "MultiSeek",
        }
    }

    /// Child providers, left to right.
    pub fn sources(&self) -> Vec<&Arc<Provider>> {
        match &self.kind {
            ProviderKind::IndexScan { .. }
            | ProviderKind::Raw { .. }
            | ProviderKind::Seek { .. }
            | ProviderKind::Range { .. }
            | ProviderKind::RangeSet { .. }
            | ProviderKind::MultiSeek { .. } => Vec::new(),
            ProviderKind::Filter { source, .. }
            | ProviderKind::Select { source, .. }
            | ProviderKind::Calculate { source, .. }
            | ProviderKind::Alias { source, .. }
            | ProviderKind::Sort { source, .. }
            | ProviderKind::Skip { source, .. }
            | ProviderKind::Take { source, .. }
            | ProviderKind::Paging { source, .. }
            | ProviderKind::RowNumber { source, .. }
            | ProviderKind::Distinct { source }
            | ProviderKind::Aggregate { source, .. } => vec![source],
            ProviderKind::Join { left, right, .. }
            | ProviderKind::PredicateJoin { left, right, .. }
            | ProviderKind::Apply { left, right, .. }
            | ProviderKind::Union { left, right }
            | ProviderKind::Concat { left, right } => vec![left, right],
        }
    }

    /// Rebuild this node over new children, recomputing the header.
    ///
    /// Leaves are returned unchanged. Fails if the number of children does
    /// not match the operator's arity.
    pub fn with_sources(&self, sources: Vec<Arc<Provider>>) -> Result<Provider, Error> {
        let arity = self.sources().len();
        if sources.len() != arity {
            return Err(Error::InvalidPlan(format!(
                "{} expects {} sources, got {}",
                self.kind_name(),
                arity,
                sources.len()
            )));
        }
        if arity == 0 {
            return Ok(self.clone());
        }

        let mut sources = sources.into_iter();
        let mut next = || sources.next().ok_or_else(|| Error::InvalidPlan("missing source".into()));

        let kind = match &self.kind {
            ProviderKind::Filter { predicate, .. } => ProviderKind::Filter {
                source: next()?,
                predicate: predicate.clone(),
            },
            ProviderKind::Select { columns, .. } => ProviderKind::Select {
                source: next()?,
                columns: columns.clone(),
            },
            ProviderKind::Calculate { columns, .. } => ProviderKind::Calculate {
                source: next()?,
                columns: columns.clone(),
            },
            ProviderKind::Alias { alias, .. } => ProviderKind::Alias {
                source: next()?,
                alias: alias.clone(),
            },
            ProviderKind::Sort { order, .. } => ProviderKind::Sort {
                source: next()?,
                order: order.clone(),
            },
            ProviderKind::Skip { count, .. } => ProviderKind::Skip {
                source: next()?,
                count: *count,
            },
            ProviderKind::Take { count, .. } => ProviderKind::Take {
                source: next()?,
                count: *count,
            },
            ProviderKind::Paging { skip, take, .. } => ProviderKind::Paging {
                source: next()?,
                skip: *skip,
                take: *take,
            },
            ProviderKind::RowNumber { column, .. } => ProviderKind::RowNumber {
                source: next()?,
                column: column.clone(),
            },
            ProviderKind::Distinct { .. } => ProviderKind::Distinct { source: next()? },
            ProviderKind::Aggregate {
                group_columns,
                aggregates,
                ..
            } => ProviderKind::Aggregate {
                source: next()?,
                group_columns: group_columns.clone(),
                aggregates: aggregates.clone(),
            },
            ProviderKind::Join {
                join_type,
                equalities,
                ..
            } => ProviderKind::Join {
                left: next()?,
                right: next()?,
                join_type: *join_type,
                equalities: equalities.clone(),
            },
            ProviderKind::PredicateJoin {
                join_type,
                predicate,
                ..
            } => ProviderKind::PredicateJoin {
                left: next()?,
                right: next()?,
                join_type: *join_type,
                predicate: predicate.clone(),
            },
            ProviderKind::Apply {
                apply_type,
                bindings,
                ..
            } => ProviderKind::Apply {
                left: next()?,
                right: next()?,
                apply_type: *apply_type,
                bindings: bindings.clone(),
            },
            ProviderKind::Union { .. } => ProviderKind::Union {
                left: next()?,
                right: next()?,
            },
            ProviderKind::Concat { .. } => ProviderKind::Concat {
                left: next()?,
                right: next()?,
            },
            ProviderKind::IndexScan { .. }
            | ProviderKind::Raw { .. }
            | ProviderKind::Seek { .. }
            | ProviderKind::Range { .. }
            | ProviderKind::RangeSet { .. }
            | ProviderKind::MultiSeek { .. } => return Ok(self.clone()),
        };
        Ok(Provider::build(kind))
    }
}

fn compute_header(kind: &ProviderKind) -> Header {
    match kind {
        ProviderKind::IndexScan { index }
        | ProviderKind::Seek { index, .. }
        | ProviderKind::Range { index, .. }
        | ProviderKind::RangeSet { index, .. }
        | ProviderKind::MultiSeek { index, .. } => index.header(),
        // Raw headers are supplied by the caller.
        ProviderKind::Raw { .. } => Header::default(),
        ProviderKind::Filter { source, .. }
        | ProviderKind::Alias { source, .. }
        | ProviderKind::Skip { source, .. }
        | ProviderKind::Take { source, .. }
        | ProviderKind::Paging { source, .. }
        | ProviderKind::Distinct { source } => source.header().clone(),
        ProviderKind::Select { source, columns } => source.header().select(columns),
        ProviderKind::Calculate { source, columns } => source
            .header()
            .append(columns.iter().map(|c| Column::nullable(c.name.clone(), c.ty))),
        ProviderKind::Sort { source, order } => source.header().clone().with_order(order.clone()),
        ProviderKind::RowNumber { source, column } => source
            .header()
            .append([Column::new(column.clone(), ColumnType::Int64)]),
        ProviderKind::Aggregate {
            source,
            group_columns,
            aggregates,
        } => {
            let input = source.header();
            let grouped = input.select(group_columns);
            grouped.append(aggregates.iter().map(|a| aggregate_column(input, a)))
        }
        ProviderKind::Join {
            left,
            right,
            join_type,
            ..
        }
        | ProviderKind::PredicateJoin {
            left,
            right,
            join_type,
            ..
        } => match join_type {
            JoinType::Inner => left.header().join(right.header()),
            JoinType::LeftOuter => left.header().outer_join(right.header()),
        },
        ProviderKind::Apply {
            left,
            right,
            apply_type,
            ..
        } => match apply_type {
            ApplyType::Cross => left.header().join(right.header()),
            ApplyType::Outer => left.header().outer_join(right.header()),
        },
        ProviderKind::Union { left, .. } | ProviderKind::Concat { left, .. } => {
            Header::new(left.header().columns.clone())
        }
    }
}

fn aggregate_column(input: &Header, aggregate: &AggregateColumn) -> Column {
    let source_type = aggregate
        .column
        .and_then(|i| input.column(i))
        .map(|c| c.ty);
    match aggregate.kind {
        AggregateKind::Count => Column::new(aggregate.name.clone(), ColumnType::Int64),
        AggregateKind::Sum => {
            let ty = match source_type {
                Some(ColumnType::Float64) => ColumnType::Float64,
                _ => ColumnType::Int64,
            };
            Column::nullable(aggregate.name.clone(), ty)
        }
        AggregateKind::Min | AggregateKind::Max => Column::nullable(
            aggregate.name.clone(),
            source_type.unwrap_or(ColumnType::Int64),
        ),
    }
}
