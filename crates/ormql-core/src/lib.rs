//! ORMQL Core - Provider-tree rewrites and index selection.
//!
//! This crate turns a logical provider tree into a physically valid plan:
//! order-sensitive consumers get sorted input, skip/take chains collapse
//! into single paging steps, and filters over primary index scans become
//! seeks and range scans where an index is cheaper.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ormql_core::{
//!     Column, ColumnType, Expr, IndexInfo, OrderItem, ParameterContext, Preprocessor, Provider,
//!     ProviderKind, StaticIndexCatalog,
//! };
//!
//! let users = IndexInfo::primary(
//!     1,
//!     "Users.PK",
//!     vec![Column::new("id", ColumnType::Int32)],
//!     vec![OrderItem::asc(0)],
//! );
//! let plan = Arc::new(Provider::filter(
//!     Provider::index_scan(users),
//!     Expr::eq(Expr::col(0), Expr::lit(5)),
//! ));
//!
//! let preprocessor = Preprocessor::default()
//!     .with_index_catalog(Arc::new(StaticIndexCatalog::new()));
//! let plan = preprocessor.process(&plan, &ParameterContext::new()).unwrap();
//! assert!(matches!(plan.kind(), ProviderKind::Seek { .. }));
//! ```

pub mod config;
pub mod error;
pub mod explain;
pub mod expr;
pub mod flatten;
pub mod interpreter;
pub mod optimizer;
pub mod pipeline;
pub mod provider;
pub mod range;
pub mod rewrite;
pub mod value;

pub use config::{OptimizerConfig, PreprocessorConfig, ProviderCapabilities};
pub use error::Error;
pub use explain::{explain, explain_json};
pub use expr::{CompareOp, Expr, Method, ParameterContext};
pub use flatten::{
    conjunction, disjunction, flatten_and, flatten_join_chain, flatten_or, JoinChain,
    JoinCondition, JoinStep,
};
pub use interpreter::{IndexStore, Interpreter, MemoryIndexStore, Row};
pub use optimizer::{
    CacheStats, CostEstimate, CostEvaluator, HeuristicCostEvaluator, IndexCatalog,
    IndexMetadataCache, IndexOptimizer, StaticIndexCatalog,
};
pub use pipeline::Preprocessor;
pub use provider::{
    default_ordering_descriptor, AggregateColumn, AggregateKind, ApplyType, CalculatedColumn,
    Column, Direction, Header, IndexId, IndexInfo, JoinType, OrderItem, OrderingDescriptor,
    OrderingResolver, Provider, ProviderKind, SortOrder,
};
pub use range::{Entire, KeyExpr, LeafOp, Range, RangeSet, RangeSetExpr, Shift};
pub use rewrite::{OrderingCorrector, PagingWindow, SkipTakeRewriter, ROW_NUMBER_COLUMN};
pub use value::{ColumnType, Value};
