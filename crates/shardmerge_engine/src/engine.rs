use shardmerge_common::config::MergeConfig;
use shardmerge_common::error::{ErrorContext, MergeError, MergeResult};

use crate::aggregation::Grouping;
use crate::comparator::RowComparator;
use crate::cursor::{MergeStrategy, MergedCursor, Merger};
use crate::label::ColumnLabelIndex;
use crate::memory::GroupByMemoryMerger;
use crate::pagination::PaginationDecorator;
use crate::shape::{BoundShape, StatementShape};
use crate::source::{RowSource, ShardCursor};
use crate::stream::{GroupByStreamMerger, IteratorStreamMerger, OrderByStreamMerger};

/// Entry point: turns the per-shard cursors of one statement into a single
/// merged cursor.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Build the merged cursor for `shape` over `sources`, in shard order.
    ///
    /// No row is read here. If construction fails, every source is closed
    /// before the error is returned.
    pub fn merge(
        &self,
        sources: Vec<Box<dyn RowSource>>,
        shape: &StatementShape,
    ) -> MergeResult<MergedCursor> {
        if sources.is_empty() {
            return Err(MergeError::Configuration("no row sources to merge".into()));
        }
        let mut shards: Vec<ShardCursor> = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| ShardCursor::new(i, source))
            .collect();

        match self.plan(&shards, shape) {
            Ok((labels, merger, pagination)) => {
                let row_number_label = shape
                    .limit
                    .as_ref()
                    .and_then(|limit| limit.row_number_label.as_deref());
                Ok(MergedCursor::new(
                    shards,
                    labels,
                    merger,
                    pagination,
                    row_number_label,
                ))
            }
            Err(e) => {
                for (i, shard) in shards.iter_mut().enumerate() {
                    if let Err(close_err) = shard.close() {
                        tracing::warn!(shard = i, error = %close_err, "failed to close row source");
                    }
                }
                Err(e)
            }
        }
    }

    fn plan(
        &self,
        shards: &[ShardCursor],
        shape: &StatementShape,
    ) -> MergeResult<(ColumnLabelIndex, Merger, Option<PaginationDecorator>)> {
        let labels = ColumnLabelIndex::from_source(shards[0].source()).ctx("stage=bind, shard=0")?;
        for (i, shard) in shards.iter().enumerate().skip(1) {
            labels.check_source(i, shard.source())?;
        }
        let bound = BoundShape::bind(shape, &labels)?;

        let strategy = self.select_strategy(&bound);
        let merger = match strategy {
            MergeStrategy::Iterator => Merger::Iterator(IteratorStreamMerger::new()),
            MergeStrategy::OrderByStream => {
                Merger::OrderBy(OrderByStreamMerger::new(RowComparator::new(bound.order_by.clone())))
            }
            MergeStrategy::GroupByStream => Merger::GroupByStream(GroupByStreamMerger::new(
                RowComparator::new(bound.group_by.clone()),
                Grouping::new(&bound, self.config.avg_scale),
            )),
            MergeStrategy::GroupByMemory => Merger::GroupByMemory(GroupByMemoryMerger::new(
                Grouping::new(&bound, self.config.avg_scale),
                RowComparator::new(bound.effective_order_by().to_vec()),
                &self.config,
            )),
        };
        tracing::debug!(
            strategy = %strategy,
            shards = shards.len(),
            columns = bound.column_count,
            "selected merger"
        );

        let pagination = match &shape.limit {
            None => None,
            Some(limit) => {
                let dialect = limit.dialect.unwrap_or(self.config.default_dialect);
                let decorator = PaginationDecorator::for_clause(limit, dialect);
                match &decorator {
                    Some(_) => tracing::debug!(dialect = %dialect, "pagination decorator applied"),
                    None => tracing::debug!(
                        dialect = %dialect,
                        "limit clause left undecorated for unknown dialect"
                    ),
                }
                decorator
            }
        };

        Ok((labels, merger, pagination))
    }

    fn select_strategy(&self, bound: &BoundShape) -> MergeStrategy {
        if bound.is_grouped() {
            if self.config.stream_group_by && bound.is_same_group_by_and_order_by() {
                MergeStrategy::GroupByStream
            } else {
                MergeStrategy::GroupByMemory
            }
        } else if !bound.order_by.is_empty() {
            MergeStrategy::OrderByStream
        } else {
            MergeStrategy::Iterator
        }
    }
}
