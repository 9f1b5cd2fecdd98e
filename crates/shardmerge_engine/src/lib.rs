//! Distributed query result merging for the sharding proxy.
//!
//! A logical SELECT is rewritten into one statement per shard; each shard
//! hands back a forward-only [`RowSource`]. [`MergeEngine::merge`] combines
//! those cursors into a single [`MergedCursor`] that honors the original
//! statement's GROUP BY, aggregation, ORDER BY and LIMIT semantics:
//!
//! - no ORDER BY / GROUP BY: sources are concatenated
//! - ORDER BY only: k-way merge of the pre-sorted shard streams
//! - GROUP BY matching ORDER BY: streaming aggregation, one open group
//! - any other grouped/aggregated shape: full in-memory grouping and sort
//!
//! A dialect-specific pagination decorator is wrapped around the result when
//! the statement carries a LIMIT clause.

pub mod aggregation;
pub mod comparator;
pub mod cursor;
pub mod engine;
pub mod group_key;
pub mod label;
pub mod memory;
pub mod pagination;
pub mod row;
pub mod shape;
pub mod source;
pub mod stream;

pub use aggregation::AggregationUnit;
pub use comparator::{RowComparator, SortItem, SortTypeGuard};
pub use cursor::{MergeStats, MergeStrategy, MergedCursor};
pub use engine::MergeEngine;
pub use group_key::GroupKey;
pub use label::ColumnLabelIndex;
pub use pagination::{
    LimitDecorator, PaginationDecorator, RowNumberDecorator, TopAndRowNumberDecorator,
};
pub use row::MaterializedRow;
pub use shape::{
    AggregationFunction, AggregationItem, ColumnRef, GroupByItem, LimitBound, LimitClause,
    OrderByItem, OrderItem, StatementShape,
};
pub use source::{MemoryRowSource, RowSource};

pub use shardmerge_common::config::MergeConfig;
pub use shardmerge_common::datum::Datum;
pub use shardmerge_common::error::{MergeError, MergeResult};
pub use shardmerge_common::types::{DataType, DialectTag, Direction, NullsOrder};
