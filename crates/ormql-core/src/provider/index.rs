//! Index metadata supplied by the domain model.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::header::{Column, Header, OrderItem};
use crate::value::ColumnType;

/// Identity of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub u32);

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idx{}", self.0)
    }
}

/// Description of a primary or secondary index.
///
/// `columns` is the row layout produced by scanning the index. A secondary
/// index that contains all data shares the row layout of its primary index,
/// so it can replace a primary scan without a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub id: IndexId,
    pub name: String,
    pub columns: Vec<Column>,
    /// Key columns with sort direction, as positions in `columns`.
    pub key_columns: Vec<OrderItem>,
    pub unique: bool,
    pub is_primary: bool,
    /// Whether the index stores every column of the row.
    pub contains_all_data: bool,
    /// Row count estimate for costing, if known.
    pub row_count: Option<u64>,
}

impl IndexInfo {
    /// Create a unique primary index.
    pub fn primary(
        id: u32,
        name: impl Into<String>,
        columns: Vec<Column>,
        key_columns: Vec<OrderItem>,
    ) -> Self {
        Self {
            id: IndexId(id),
            name: name.into(),
            columns,
            key_columns,
            unique: true,
            is_primary: true,
            contains_all_data: true,
            row_count: None,
        }
    }

    /// Create a secondary index over the row layout of `primary`.
    pub fn secondary(
        id: u32,
        name: impl Into<String>,
        primary: &IndexInfo,
        key_columns: Vec<OrderItem>,
    ) -> Self {
        Self {
            id: IndexId(id),
            name: name.into(),
            columns: primary.columns.clone(),
            key_columns,
            unique: false,
            is_primary: false,
            contains_all_data: true,
            row_count: primary.row_count,
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_contains_all_data(mut self, contains_all_data: bool) -> Self {
        self.contains_all_data = contains_all_data;
        self
    }

    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    /// Header of a scan over this index, ordered by its key.
    pub fn header(&self) -> Header {
        Header::new(self.columns.clone()).with_order(self.key_columns.clone())
    }

    /// Leading key column, which range sets constrain.
    pub fn leading_key(&self) -> Option<OrderItem> {
        self.key_columns.first().copied()
    }

    /// Type of the leading key column.
    pub fn leading_key_type(&self) -> Option<ColumnType> {
        self.leading_key()
            .and_then(|item| self.columns.get(item.column))
            .map(|c| c.ty)
    }

    /// Whether a single leading-key value identifies at most one row.
    pub fn is_unique_on_leading_key(&self) -> bool {
        self.unique && self.key_columns.len() == 1
    }
}
