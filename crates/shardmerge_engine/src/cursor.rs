use std::fmt;

use shardmerge_common::datum::Datum;
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::DataType;

use crate::label::ColumnLabelIndex;
use crate::memory::GroupByMemoryMerger;
use crate::pagination::PaginationDecorator;
use crate::row::MaterializedRow;
use crate::source::{RowSource, ShardCursor};
use crate::stream::{GroupByStreamMerger, IteratorStreamMerger, OrderByStreamMerger, RowRef};

/// Merge algorithm chosen for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    Iterator,
    OrderByStream,
    GroupByStream,
    GroupByMemory,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStrategy::Iterator => "iterator",
            MergeStrategy::OrderByStream => "order-by-stream",
            MergeStrategy::GroupByStream => "group-by-stream",
            MergeStrategy::GroupByMemory => "group-by-memory",
        };
        f.write_str(name)
    }
}

/// Counters collected over a cursor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub rows_emitted: u64,
    pub groups_built: u64,
    pub sources_closed: usize,
}

pub(crate) enum Merger {
    Iterator(IteratorStreamMerger),
    OrderBy(OrderByStreamMerger),
    GroupByStream(GroupByStreamMerger),
    GroupByMemory(GroupByMemoryMerger),
}

impl Merger {
    fn strategy(&self) -> MergeStrategy {
        match self {
            Merger::Iterator(_) => MergeStrategy::Iterator,
            Merger::OrderBy(_) => MergeStrategy::OrderByStream,
            Merger::GroupByStream(_) => MergeStrategy::GroupByStream,
            Merger::GroupByMemory(_) => MergeStrategy::GroupByMemory,
        }
    }

    fn advance(&mut self, shards: &mut [ShardCursor]) -> MergeResult<bool> {
        match self {
            Merger::Iterator(m) => m.advance(shards),
            Merger::OrderBy(m) => m.advance(shards),
            Merger::GroupByStream(m) => m.advance(shards),
            Merger::GroupByMemory(m) => m.advance(shards),
        }
    }

    fn current(&self) -> Option<RowRef<'_>> {
        match self {
            Merger::Iterator(m) => m.current(),
            Merger::OrderBy(m) => m.current(),
            Merger::GroupByStream(m) => m.current(),
            Merger::GroupByMemory(m) => m.current(),
        }
    }

    fn groups_built(&self) -> u64 {
        match self {
            Merger::GroupByStream(m) => m.groups_built(),
            Merger::GroupByMemory(m) => m.groups_built(),
            Merger::Iterator(_) | Merger::OrderBy(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    OnRow,
    Exhausted,
    Closed,
}

/// Where the row-number decorators publish the global row number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowNumberColumn {
    /// Overrides a selected column (the shard-local row number).
    Replace(usize),
    /// A synthesized column after the source columns.
    Append(usize),
}

impl RowNumberColumn {
    fn index(self) -> usize {
        match self {
            RowNumberColumn::Replace(i) | RowNumberColumn::Append(i) => i,
        }
    }
}

/// The single forward-only cursor handed back to the dispatch layer.
///
/// Owns every shard's row source. All of them are closed exactly once: by
/// [`MergedCursor::close`], by an error raised from `advance()`, or on drop.
pub struct MergedCursor {
    shards: Vec<ShardCursor>,
    labels: ColumnLabelIndex,
    source_columns: usize,
    merger: Merger,
    pagination: Option<PaginationDecorator>,
    row_number_column: Option<RowNumberColumn>,
    state: CursorState,
    was_null: bool,
    stats: MergeStats,
    reported: bool,
}

impl MergedCursor {
    pub(crate) fn new(
        shards: Vec<ShardCursor>,
        labels: ColumnLabelIndex,
        merger: Merger,
        pagination: Option<PaginationDecorator>,
        row_number_label: Option<&str>,
    ) -> Self {
        let source_columns = labels.len();
        let (labels, row_number_column) = match (row_number_label, &pagination) {
            (Some(label), Some(p)) if p.exposes_row_number() => match labels.get(label) {
                Some(i) => (labels, Some(RowNumberColumn::Replace(i))),
                None => {
                    let mut all: Vec<String> = (1..=source_columns)
                        .filter_map(|i| labels.label(i).map(str::to_string))
                        .collect();
                    all.push(label.to_string());
                    (
                        ColumnLabelIndex::from_labels(&all),
                        Some(RowNumberColumn::Append(source_columns + 1)),
                    )
                }
            },
            _ => (labels, None),
        };
        Self {
            shards,
            labels,
            source_columns,
            merger,
            pagination,
            row_number_column,
            state: CursorState::BeforeFirst,
            was_null: false,
            stats: MergeStats::default(),
            reported: false,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.merger.strategy()
    }

    pub fn pagination(&self) -> Option<&PaginationDecorator> {
        self.pagination.as_ref()
    }

    pub fn stats(&self) -> MergeStats {
        MergeStats {
            groups_built: self.merger.groups_built(),
            ..self.stats
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn column_count(&self) -> usize {
        self.labels.len()
    }

    pub fn column_label(&self, index: usize) -> MergeResult<String> {
        self.labels
            .label(index)
            .map(str::to_string)
            .ok_or(MergeError::ColumnOutOfBounds(index))
    }

    /// 1-based position of a column, looked up case-insensitively.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label)
    }

    pub fn advance(&mut self) -> MergeResult<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Closed => {
                return Err(MergeError::PrematureAccess("advance() on a closed cursor".into()))
            }
            CursorState::BeforeFirst | CursorState::OnRow => {}
        }

        let merger = &mut self.merger;
        let shards = &mut self.shards;
        let result = match self.pagination.as_mut() {
            Some(pagination) => pagination.advance(|| merger.advance(shards)),
            None => merger.advance(shards),
        };

        match result {
            Ok(true) => {
                self.state = CursorState::OnRow;
                self.stats.rows_emitted += 1;
                Ok(true)
            }
            Ok(false) => {
                self.state = CursorState::Exhausted;
                self.report(true);
                tracing::debug!(
                    strategy = %self.strategy(),
                    rows = self.stats.rows_emitted,
                    "merged cursor exhausted"
                );
                Ok(false)
            }
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    /// Close every source after a failure surfaced during iteration.
    fn abort(&mut self, e: &MergeError) {
        e.log_if_fatal();
        tracing::debug!(strategy = %self.strategy(), error = %e, "merge failed, closing sources");
        self.report(false);
        self.close_sources();
        self.state = CursorState::Closed;
    }

    /// Read a column of the current row, coerced to `expected`.
    ///
    /// A shard failure while reading closes the cursor like a failed
    /// `advance()`; a coercion failure leaves it on the current row.
    pub fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        match self.state {
            CursorState::OnRow => {}
            CursorState::BeforeFirst => {
                return Err(MergeError::PrematureAccess(
                    "value read before the first advance()".into(),
                ))
            }
            CursorState::Exhausted => {
                return Err(MergeError::PrematureAccess(
                    "value read after the merged cursor was exhausted".into(),
                ))
            }
            CursorState::Closed => {
                return Err(MergeError::PrematureAccess("value read on a closed cursor".into()))
            }
        }
        if index == 0 || index > self.column_count() {
            return Err(MergeError::ColumnOutOfBounds(index));
        }

        match self.read_current(index, expected) {
            Ok(datum) => {
                self.was_null = datum.is_null();
                Ok(datum)
            }
            Err(e) if e.is_transient() => {
                self.abort(&e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn read_current(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        Ok(match (self.row_number_column, self.pagination.as_ref()) {
            (Some(rn), Some(p)) if rn.index() == index => {
                Datum::Int64(p.row_number() as i64).coerce_to(expected)?
            }
            _ => match self.merger.current() {
                Some(RowRef::Shard(s)) => self.shards[s].value(index, expected)?,
                Some(RowRef::Row(row)) => row
                    .get(index - 1)
                    .ok_or(MergeError::ColumnOutOfBounds(index))?
                    .coerce_to(expected)?,
                None => {
                    return Err(MergeError::internal_bug(
                        "E-MERGE-001",
                        "merged cursor is on a row but the merger has none",
                        format!("strategy={}", self.strategy()),
                    ))
                }
            },
        })
    }

    pub fn value_by_label(&mut self, label: &str, expected: DataType) -> MergeResult<Datum> {
        let index = self
            .column_index(label)
            .ok_or_else(|| MergeError::UnknownColumn(label.to_string()))?;
        self.value(index, expected)
    }

    /// Whether the last value read was SQL NULL.
    pub fn was_null(&self) -> MergeResult<bool> {
        match self.state {
            CursorState::OnRow => Ok(self.was_null),
            _ => Err(MergeError::PrematureAccess(
                "was_null() without a current row".into(),
            )),
        }
    }

    /// Detached copy of the current row, synthesized columns included.
    pub fn current_row(&mut self) -> MergeResult<MaterializedRow> {
        let values = (1..=self.column_count())
            .map(|i| self.value(i, DataType::Any))
            .collect::<MergeResult<Vec<_>>>()?;
        Ok(MaterializedRow::new(values))
    }

    /// Close every row source. Each source is closed exactly once even when
    /// some fail; the first failure is returned.
    pub fn close(&mut self) -> MergeResult<()> {
        self.state = CursorState::Closed;
        self.report(true);
        match self.close_sources() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    fn report(&mut self, success: bool) {
        if self.reported {
            return;
        }
        self.reported = true;
        let stats = self.stats();
        shardmerge_observability::record_merge_metrics(
            &self.strategy().to_string(),
            stats.rows_emitted,
            stats.groups_built,
            success,
        );
    }

    fn close_sources(&mut self) -> Option<MergeError> {
        let mut first_error = None;
        for (shard, cursor) in self.shards.iter_mut().enumerate() {
            if cursor.is_closed() {
                continue;
            }
            match cursor.close() {
                Ok(()) => self.stats.sources_closed += 1,
                Err(e) => {
                    self.stats.sources_closed += 1;
                    tracing::warn!(shard, error = %e, "failed to close row source");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }

    #[cfg(test)]
    pub(crate) fn source_columns(&self) -> usize {
        self.source_columns
    }
}

impl Drop for MergedCursor {
    fn drop(&mut self) {
        if self.shards.iter().any(|s| !s.is_closed()) {
            tracing::debug!(strategy = %self.strategy(), "dropping unclosed merged cursor");
            self.report(true);
            self.close_sources();
        }
    }
}

impl fmt::Debug for MergedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedCursor")
            .field("strategy", &self.strategy())
            .field("shards", &self.shards.len())
            .field("source_columns", &self.source_columns)
            .field("columns", &self.column_count())
            .field("state", &self.state)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A merged cursor can stand in wherever a shard cursor is expected.
impl RowSource for MergedCursor {
    fn column_count(&self) -> usize {
        MergedCursor::column_count(self)
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        MergedCursor::column_label(self, index)
    }

    fn advance(&mut self) -> MergeResult<bool> {
        MergedCursor::advance(self)
    }

    fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        MergedCursor::value(self, index, expected)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn close(&mut self) -> MergeResult<()> {
        MergedCursor::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::LimitDecorator;
    use crate::source::MemoryRowSource;
    use shardmerge_common::datum::Datum;

    fn cursor(pagination: Option<PaginationDecorator>, row_number_label: Option<&str>) -> MergedCursor {
        let shards = vec![
            ShardCursor::new(
                0,
                Box::new(MemoryRowSource::new(
                    vec!["id", "name"],
                    vec![vec![Datum::Int64(1), Datum::Null]],
                )),
            ),
            ShardCursor::new(
                1,
                Box::new(MemoryRowSource::new(
                    vec!["id", "name"],
                    vec![vec![Datum::Int64(2), Datum::Text("b".into())]],
                )),
            ),
        ];
        let labels = ColumnLabelIndex::from_labels(&["id", "name"]);
        MergedCursor::new(
            shards,
            labels,
            Merger::Iterator(IteratorStreamMerger::new()),
            pagination,
            row_number_label,
        )
    }

    #[test]
    fn test_premature_access() {
        let mut c = cursor(None, None);
        assert!(matches!(c.value(1, DataType::Any), Err(MergeError::PrematureAccess(_))));
        assert!(c.was_null().is_err());
        while c.advance().unwrap() {}
        assert!(matches!(c.value(1, DataType::Any), Err(MergeError::PrematureAccess(_))));
        assert!(!c.advance().unwrap());
    }

    #[test]
    fn test_value_and_was_null() {
        let mut c = cursor(None, None);
        assert!(c.advance().unwrap());
        assert_eq!(c.value(1, DataType::Int64).unwrap(), Datum::Int64(1));
        assert!(!c.was_null().unwrap());
        assert!(c.value_by_label("NAME", DataType::Text).unwrap().is_null());
        assert!(c.was_null().unwrap());
        assert!(matches!(c.value(3, DataType::Any), Err(MergeError::ColumnOutOfBounds(3))));
        assert!(matches!(
            c.value_by_label("missing", DataType::Any),
            Err(MergeError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut c = cursor(None, None);
        c.advance().unwrap();
        c.close().unwrap();
        c.close().unwrap();
        assert!(c.is_closed());
        assert_eq!(c.stats().sources_closed, 2);
        assert!(matches!(c.advance(), Err(MergeError::PrematureAccess(_))));
    }

    #[test]
    fn test_row_number_column_is_appended() {
        let limit = crate::shape::LimitClause::new(
            None,
            None,
            shardmerge_common::types::DialectTag::RownumPseudocolumn,
        );
        let pagination = PaginationDecorator::for_clause(&limit, limit.dialect.unwrap_or_default());
        let mut c = cursor(pagination, Some("rn"));
        assert_eq!(c.source_columns(), 2);
        assert_eq!(c.column_count(), 3);
        assert_eq!(c.column_label(3).unwrap(), "rn");
        c.advance().unwrap();
        c.advance().unwrap();
        assert_eq!(c.value_by_label("RN", DataType::Int64).unwrap(), Datum::Int64(2));
        let row = c.current_row().unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(&Datum::Int64(2)));
    }

    #[test]
    fn test_native_limit_has_no_row_number_column() {
        let pagination = Some(PaginationDecorator::Limit(LimitDecorator::new(Some(1), None)));
        let mut c = cursor(pagination, Some("rn"));
        assert_eq!(c.column_count(), 2);
        assert!(c.advance().unwrap());
        assert_eq!(c.value(1, DataType::Any).unwrap(), Datum::Int64(2));
        assert!(!c.advance().unwrap());
        assert_eq!(c.stats().rows_emitted, 1);
    }
}
