use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use shardmerge_common::datum::Datum;
use shardmerge_common::error::MergeResult;

use super::RowRef;
use crate::comparator::{RowComparator, SortTypeGuard};
use crate::source::ShardCursor;

/// Head of one shard stream: the sort key of the row its cursor sits on.
struct HeapEntry {
    key: Vec<Datum>,
    shard: usize,
    comparator: Arc<RowComparator>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Equal keys: the earlier shard goes first.
        self.comparator
            .compare_keys(&self.key, &other.key)
            .then_with(|| self.shard.cmp(&other.shard))
    }
}

/// K-way merge of shard streams that are each sorted by the same items.
///
/// Every shard cursor sits on its head row; the heap orders the heads. Only
/// the shard whose row was last emitted is advanced on the next call.
pub(crate) struct OrderByStreamMerger {
    comparator: Arc<RowComparator>,
    key_columns: Vec<usize>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    guard: SortTypeGuard,
    primed: bool,
    current: Option<usize>,
}

impl OrderByStreamMerger {
    pub fn new(comparator: RowComparator) -> Self {
        let key_columns = comparator.columns();
        let guard = comparator.type_guard();
        Self {
            comparator: Arc::new(comparator),
            key_columns,
            heap: BinaryHeap::new(),
            guard,
            primed: false,
            current: None,
        }
    }

    pub fn advance(&mut self, shards: &mut [ShardCursor]) -> MergeResult<bool> {
        if !self.primed {
            self.primed = true;
            for shard in 0..shards.len() {
                self.push_head(shards, shard)?;
            }
        } else if let Some(previous) = self.current.take() {
            self.push_head(shards, previous)?;
        }
        match self.heap.pop() {
            Some(Reverse(entry)) => {
                self.current = Some(entry.shard);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    /// Index of the shard holding the current row.
    pub fn current_shard(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<RowRef<'_>> {
        self.current.map(RowRef::Shard)
    }

    fn push_head(&mut self, shards: &mut [ShardCursor], shard: usize) -> MergeResult<()> {
        let cursor = &mut shards[shard];
        if !cursor.advance()? {
            return Ok(());
        }
        let key = cursor.read_columns(&self.key_columns)?;
        self.guard.validate(&key)?;
        self.heap.push(Reverse(HeapEntry {
            key,
            shard,
            comparator: Arc::clone(&self.comparator),
        }));
        Ok(())
    }
}
