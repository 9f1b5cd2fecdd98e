use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;

use super::{OrderByStreamMerger, RowRef};
use crate::aggregation::Grouping;
use crate::comparator::RowComparator;
use crate::group_key::GroupKey;
use crate::row::MaterializedRow;
use crate::source::ShardCursor;

/// Streaming aggregation over shard streams sorted by the GROUP BY items.
///
/// The underlying k-way merge yields each group's rows contiguously, so one
/// group is folded at a time: rows are consumed until the group key changes,
/// and the first row of the next group is held back for the following call.
pub(crate) struct GroupByStreamMerger {
    inner: OrderByStreamMerger,
    grouping: Grouping,
    /// First row of the next group, already pulled from `inner`.
    pending: Option<(GroupKey, Vec<Datum>)>,
    started: bool,
    current: Option<MaterializedRow>,
    groups_built: u64,
}

impl GroupByStreamMerger {
    pub fn new(comparator: RowComparator, grouping: Grouping) -> Self {
        Self {
            inner: OrderByStreamMerger::new(comparator),
            grouping,
            pending: None,
            started: false,
            current: None,
            groups_built: 0,
        }
    }

    pub fn advance(&mut self, shards: &mut [ShardCursor]) -> MergeResult<bool> {
        if !self.started {
            self.started = true;
            self.pending = self.next_row(shards)?;
        }
        let Some((key, first)) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };

        let mut group = self.grouping.open(first)?;
        while let Some((next_key, row)) = self.next_row(shards)? {
            if next_key != key {
                self.pending = Some((next_key, row));
                break;
            }
            group.feed(&self.grouping, &row)?;
        }
        self.current = Some(group.finish(&self.grouping)?);
        self.groups_built += 1;
        tracing::trace!(group = %key, "group emitted");
        Ok(true)
    }

    pub fn current(&self) -> Option<RowRef<'_>> {
        self.current.as_ref().map(RowRef::Row)
    }

    pub fn groups_built(&self) -> u64 {
        self.groups_built
    }

    fn next_row(&mut self, shards: &mut [ShardCursor]) -> MergeResult<Option<(GroupKey, Vec<Datum>)>> {
        if !self.inner.advance(shards)? {
            return Ok(None);
        }
        let Some(shard) = self.inner.current_shard() else {
            return Ok(None);
        };
        let row = shards[shard].read_row(self.grouping.column_count)?;
        Ok(Some((self.grouping.key_of(&row), row)))
    }
}
