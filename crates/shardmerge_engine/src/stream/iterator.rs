use shardmerge_common::error::MergeResult;

use super::RowRef;
use crate::source::ShardCursor;

/// Concatenates the shard streams in input order.
#[derive(Debug, Default)]
pub(crate) struct IteratorStreamMerger {
    position: usize,
    current: Option<usize>,
}

impl IteratorStreamMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, shards: &mut [ShardCursor]) -> MergeResult<bool> {
        while let Some(shard) = shards.get_mut(self.position) {
            if shard.advance()? {
                self.current = Some(self.position);
                return Ok(true);
            }
            self.position += 1;
        }
        self.current = None;
        Ok(false)
    }

    pub fn current(&self) -> Option<RowRef<'_>> {
        self.current.map(RowRef::Shard)
    }
}
