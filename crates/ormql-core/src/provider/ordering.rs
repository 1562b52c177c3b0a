//! Classification of providers by their effect on row order.

use serde::{Deserialize, Serialize};

use super::{Provider, ProviderKind};

/// How a provider treats the order of its input.
///
/// Exactly one holds per provider kind. The classification is supplied by
/// a resolver rather than stored on the provider, so a dialect can override
/// it without touching the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderingDescriptor {
    /// Establishes a new order regardless of its input.
    Sorter,
    /// Emits rows in the order of its input.
    PreservesOrder,
    /// Emits rows in no defined order.
    BreaksOrder,
    /// Produces a result that depends on the order of its input.
    OrderSensitive,
}

impl OrderingDescriptor {
    pub fn is_sorter(self) -> bool {
        self == OrderingDescriptor::Sorter
    }

    pub fn breaks_order(self) -> bool {
        self == OrderingDescriptor::BreaksOrder
    }

    pub fn is_order_sensitive(self) -> bool {
        self == OrderingDescriptor::OrderSensitive
    }
}

/// Resolver function type for ordering descriptors.
pub type OrderingResolver = dyn Fn(&Provider) -> OrderingDescriptor + Send + Sync;

/// Standard classification of the built-in provider kinds.
pub fn default_ordering_descriptor(provider: &Provider) -> OrderingDescriptor {
    match provider.kind() {
        ProviderKind::Sort { .. } => OrderingDescriptor::Sorter,
        ProviderKind::Skip { .. }
        | ProviderKind::Take { .. }
        | ProviderKind::Paging { .. }
        | ProviderKind::RowNumber { .. } => OrderingDescriptor::OrderSensitive,
        ProviderKind::Union { .. } | ProviderKind::Concat { .. } => {
            OrderingDescriptor::BreaksOrder
        }
        _ => OrderingDescriptor::PreservesOrder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Column, Header, OrderItem};
    use crate::value::ColumnType;

    #[test]
    fn test_default_descriptors() {
        let raw = Provider::raw(
            Header::new(vec![Column::new("id", ColumnType::Int32)]),
            Vec::new(),
        );
        let sorted = Provider::sort(raw.clone(), vec![OrderItem::asc(0)]);
        let taken = Provider::take(sorted.clone(), 5);
        let union = Provider::union(raw.clone(), raw.clone());

        assert_eq!(default_ordering_descriptor(&raw), OrderingDescriptor::PreservesOrder);
        assert!(default_ordering_descriptor(&sorted).is_sorter());
        assert!(default_ordering_descriptor(&taken).is_order_sensitive());
        assert!(default_ordering_descriptor(&union).breaks_order());
    }
}
