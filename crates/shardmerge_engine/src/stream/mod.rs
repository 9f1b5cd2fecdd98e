//! Streaming mergers: rows flow from the shard cursors to the caller without
//! buffering more than one row (or one group) per shard.

mod group_by;
mod iterator;
mod order_by;

pub(crate) use group_by::GroupByStreamMerger;
pub(crate) use iterator::IteratorStreamMerger;
pub(crate) use order_by::OrderByStreamMerger;

use crate::row::MaterializedRow;

/// Where a merger's current row can be read from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RowRef<'a> {
    /// The shard cursor at this position is sitting on the row.
    Shard(usize),
    /// The merger holds a detached copy.
    Row(&'a MaterializedRow),
}
