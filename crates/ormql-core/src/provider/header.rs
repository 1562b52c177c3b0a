//! Provider headers: ordered columns plus the physical row order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ColumnType;

/// Sort direction of an order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One column of a sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderItem {
    /// Column position in the header.
    pub column: usize,
    pub direction: Direction,
}

impl OrderItem {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            direction: Direction::Descending,
        }
    }

    /// The same item with its column shifted by `offset`.
    pub fn shifted(self, offset: usize) -> Self {
        Self {
            column: self.column + offset,
            direction: self.direction,
        }
    }
}

impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => write!(f, "#{} asc", self.column),
            Direction::Descending => write!(f, "#{} desc", self.column),
        }
    }
}

/// A direction-tagged list of column positions.
pub type SortOrder = Vec<OrderItem>;

/// Whether `order` starts with every item of `prefix`.
pub fn order_starts_with(order: &[OrderItem], prefix: &[OrderItem]) -> bool {
    order.len() >= prefix.len() && order.iter().zip(prefix).all(|(a, b)| a == b)
}

/// Remap an order through a column projection.
///
/// `mapping[i]` is the source position of output column `i`. Returns the
/// remapped order and, if some order column was projected away, the source
/// position of the first missing one. The remapped order is truncated at
/// that point since a prefix of a sort order is still a valid order.
pub fn remap_order(order: &[OrderItem], mapping: &[usize]) -> (SortOrder, Option<usize>) {
    let mut remapped = Vec::with_capacity(order.len());
    for item in order {
        match mapping.iter().position(|&source| source == item.column) {
            Some(position) => remapped.push(OrderItem {
                column: position,
                direction: item.direction,
            }),
            None => return (remapped, Some(item.column)),
        }
    }
    (remapped, None)
}

/// A header column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    /// Create a non-nullable column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    /// Create a nullable column.
    pub fn nullable(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }
}

/// Ordered column list of a provider plus the order its rows come in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    pub columns: Vec<Column>,
    pub order: SortOrder,
}

impl Header {
    /// Create an unordered header.
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            order: Vec::new(),
        }
    }

    /// Replace the order.
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Position of the first column with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Project the given source columns.
    pub fn select(&self, columns: &[usize]) -> Header {
        let selected = columns
            .iter()
            .filter_map(|&i| self.columns.get(i).cloned())
            .collect();
        let (order, _) = remap_order(&self.order, columns);
        Header {
            columns: selected,
            order,
        }
    }

    /// Append columns, keeping the order.
    pub fn append(&self, extra: impl IntoIterator<Item = Column>) -> Header {
        let mut columns = self.columns.clone();
        columns.extend(extra);
        Header {
            columns,
            order: self.order.clone(),
        }
    }

    /// Concatenate with a right-hand header; the right order is shifted by
    /// this header's width.
    pub fn join(&self, right: &Header) -> Header {
        let offset = self.len();
        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        let mut order = self.order.clone();
        order.extend(right.order.iter().map(|item| item.shifted(offset)));
        Header { columns, order }
    }

    /// Join with every right-hand column made nullable.
    pub fn outer_join(&self, right: &Header) -> Header {
        let mut joined = self.join(right);
        for column in &mut joined.columns[self.len()..] {
            column.nullable = true;
        }
        joined
    }
}
