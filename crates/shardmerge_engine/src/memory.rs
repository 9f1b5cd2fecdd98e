//! In-memory GROUP BY merge for shapes whose shard streams are not ordered
//! by the grouping columns.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use shardmerge_common::config::MergeConfig;
use shardmerge_common::error::{MergeError, MergeResult};

use crate::aggregation::{GroupState, Grouping};
use crate::comparator::RowComparator;
use crate::group_key::GroupKey;
use crate::row::MaterializedRow;
use crate::source::ShardCursor;
use crate::stream::RowRef;

/// Drains every shard on the first `advance()`, groups rows by key in a hash
/// table, finalizes the aggregates and sorts the groups.
///
/// Groups that compare equal under the comparator keep first-seen order.
pub(crate) struct GroupByMemoryMerger {
    grouping: Grouping,
    comparator: RowComparator,
    config: MergeConfig,
    rows: Option<std::vec::IntoIter<MaterializedRow>>,
    current: Option<MaterializedRow>,
    groups_built: u64,
}

impl GroupByMemoryMerger {
    pub fn new(grouping: Grouping, comparator: RowComparator, config: &MergeConfig) -> Self {
        Self {
            grouping,
            comparator,
            config: config.clone(),
            rows: None,
            current: None,
            groups_built: 0,
        }
    }

    pub fn advance(&mut self, shards: &mut [ShardCursor]) -> MergeResult<bool> {
        if self.rows.is_none() {
            let rows = self.drain(shards)?;
            self.groups_built = rows.len() as u64;
            self.rows = Some(rows.into_iter());
        }
        self.current = self.rows.as_mut().and_then(Iterator::next);
        Ok(self.current.is_some())
    }

    pub fn current(&self) -> Option<RowRef<'_>> {
        self.current.as_ref().map(RowRef::Row)
    }

    pub fn groups_built(&self) -> u64 {
        self.groups_built
    }

    fn drain(&self, shards: &mut [ShardCursor]) -> MergeResult<Vec<MaterializedRow>> {
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<GroupState> = Vec::new();
        let mut buffered = 0usize;

        for shard in shards.iter_mut() {
            while shard.advance()? {
                buffered += 1;
                if self.config.exceeds_buffer_limit(buffered) {
                    return Err(MergeError::resource_exhausted(
                        format!(
                            "group-by merge buffered more than {} rows",
                            self.config.max_rows_buffered
                        ),
                        0,
                    ));
                }
                let row = shard.read_row(self.grouping.column_count)?;
                match index.entry(self.grouping.key_of(&row)) {
                    Entry::Occupied(e) => groups[*e.get()].feed(&self.grouping, &row)?,
                    Entry::Vacant(e) => {
                        e.insert(groups.len());
                        groups.push(self.grouping.open(row)?);
                    }
                }
            }
        }

        let mut rows = groups
            .into_iter()
            .map(|group| group.finish(&self.grouping))
            .collect::<MergeResult<Vec<_>>>()?;

        let mut guard = self.comparator.type_guard();
        for row in &rows {
            guard.validate(&self.comparator.key_of(row.values()))?;
        }
        rows.sort_by(|a, b| self.comparator.compare_rows(a.values(), b.values()));

        tracing::debug!(
            rows = buffered,
            groups = rows.len(),
            "group-by memory merge drained all shards"
        );
        Ok(rows)
    }
}
