//! Per-shard row cursors.

use shardmerge_common::datum::Datum;
use shardmerge_common::error::{ErrorContext, MergeError, MergeResult};
use shardmerge_common::types::DataType;

/// Forward-only cursor over the rows one shard returned for the rewritten
/// statement. Implemented by the connection layer.
///
/// Column indices are 1-based.
pub trait RowSource: Send {
    fn column_count(&self) -> usize;

    fn column_label(&self, index: usize) -> MergeResult<String>;

    /// Move to the next row. Returns `false` once the cursor is exhausted.
    fn advance(&mut self) -> MergeResult<bool>;

    /// Read a column of the current row, coerced to `expected`.
    fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum>;

    /// Whether the last value read was SQL NULL.
    fn was_null(&self) -> bool;

    fn close(&mut self) -> MergeResult<()>;
}

/// A [`RowSource`] over rows that are already in memory.
///
/// Used for results the proxy computes locally and for driving the merge
/// engine in tests.
#[derive(Debug, Clone)]
pub struct MemoryRowSource {
    labels: Vec<String>,
    rows: Vec<Vec<Datum>>,
    /// Number of rows advanced over; the current row is `rows[position - 1]`.
    position: usize,
    was_null: bool,
    closed: bool,
}

impl MemoryRowSource {
    pub fn new<S: Into<String>>(labels: Vec<S>, rows: Vec<Vec<Datum>>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            rows,
            position: 0,
            was_null: false,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn current(&self) -> MergeResult<&Vec<Datum>> {
        if self.closed {
            return Err(MergeError::PrematureAccess("row source is closed".into()));
        }
        match self.position {
            0 => Err(MergeError::PrematureAccess(
                "value read before the first advance()".into(),
            )),
            p => self.rows.get(p - 1).ok_or_else(|| {
                MergeError::PrematureAccess("value read after the row source was exhausted".into())
            }),
        }
    }
}

impl RowSource for MemoryRowSource {
    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        index
            .checked_sub(1)
            .and_then(|i| self.labels.get(i))
            .cloned()
            .ok_or(MergeError::ColumnOutOfBounds(index))
    }

    fn advance(&mut self) -> MergeResult<bool> {
        if self.closed {
            return Err(MergeError::PrematureAccess("advance() on a closed row source".into()));
        }
        if self.position <= self.rows.len() {
            self.position += 1;
        }
        Ok(self.position <= self.rows.len())
    }

    fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        let row = self.current()?;
        let datum = index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .ok_or(MergeError::ColumnOutOfBounds(index))?
            .coerce_to(expected)?;
        self.was_null = datum.is_null();
        Ok(datum)
    }

    fn was_null(&self) -> bool {
        self.was_null
    }

    fn close(&mut self) -> MergeResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// A shard's source as owned by a merged cursor: remembers exhaustion and
/// guarantees `close()` reaches the underlying source at most once.
pub(crate) struct ShardCursor {
    shard: usize,
    source: Box<dyn RowSource>,
    exhausted: bool,
    closed: bool,
}

impl ShardCursor {
    pub(crate) fn new(shard: usize, source: Box<dyn RowSource>) -> Self {
        Self {
            shard,
            source,
            exhausted: false,
            closed: false,
        }
    }

    pub(crate) fn source(&self) -> &dyn RowSource {
        self.source.as_ref()
    }

    pub(crate) fn advance(&mut self) -> MergeResult<bool> {
        if self.exhausted || self.closed {
            return Ok(false);
        }
        let has_row = self
            .source
            .advance()
            .ctx_with(|| format!("stage=advance, shard={}", self.shard))?;
        if !has_row {
            tracing::trace!(shard = self.shard, "row source exhausted");
            self.exhausted = true;
        }
        Ok(has_row)
    }

    pub(crate) fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        let shard = self.shard;
        self.source
            .value(index, expected)
            .ctx_with(|| format!("stage=read, shard={shard}"))
    }

    pub(crate) fn was_null(&self) -> bool {
        self.source.was_null()
    }

    /// Values of the given 0-based columns of the current row.
    pub(crate) fn read_columns(&mut self, columns: &[usize]) -> MergeResult<Vec<Datum>> {
        columns
            .iter()
            .map(|&c| self.value(c + 1, DataType::Any))
            .collect()
    }

    /// Detached copy of the first `column_count` columns of the current row.
    pub(crate) fn read_row(&mut self, column_count: usize) -> MergeResult<Vec<Datum>> {
        (1..=column_count)
            .map(|c| self.value(c, DataType::Any))
            .collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) -> MergeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemoryRowSource {
        MemoryRowSource::new(
            vec!["id", "name"],
            vec![
                vec![Datum::Int64(1), Datum::Text("a".into())],
                vec![Datum::Int64(2), Datum::Null],
            ],
        )
    }

    #[test]
    fn test_memory_source_iterates_rows() {
        let mut src = source();
        assert_eq!(src.column_count(), 2);
        assert_eq!(src.column_label(2).unwrap(), "name");
        assert!(src.advance().unwrap());
        assert_eq!(src.value(1, DataType::Int64).unwrap(), Datum::Int64(1));
        assert!(!src.was_null());
        assert!(src.advance().unwrap());
        assert!(src.value(2, DataType::Text).unwrap().is_null());
        assert!(src.was_null());
        assert!(!src.advance().unwrap());
        assert!(!src.advance().unwrap());
    }

    #[test]
    fn test_memory_source_premature_access() {
        let mut src = source();
        assert!(matches!(
            src.value(1, DataType::Any),
            Err(MergeError::PrematureAccess(_))
        ));
        while src.advance().unwrap() {}
        assert!(matches!(
            src.value(1, DataType::Any),
            Err(MergeError::PrematureAccess(_))
        ));
    }

    #[test]
    fn test_memory_source_bounds_and_coercion() {
        let mut src = source();
        assert!(matches!(src.column_label(0), Err(MergeError::ColumnOutOfBounds(0))));
        src.advance().unwrap();
        assert!(matches!(src.value(3, DataType::Any), Err(MergeError::ColumnOutOfBounds(3))));
        assert!(matches!(
            src.value(2, DataType::Int64),
            Err(MergeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_shard_cursor_closes_once() {
        let mut cursor = ShardCursor::new(0, Box::new(source()));
        assert!(cursor.advance().unwrap());
        cursor.close().unwrap();
        assert!(cursor.is_closed());
        cursor.close().unwrap();
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn test_shard_cursor_read_row() {
        let mut cursor = ShardCursor::new(0, Box::new(source()));
        cursor.advance().unwrap();
        let row = cursor.read_row(2).unwrap();
        assert_eq!(row[0], Datum::Int64(1));
        assert_eq!(cursor.read_columns(&[1]).unwrap(), vec![Datum::Text("a".into())]);
    }

    struct DroppedConnection(usize);

    impl RowSource for DroppedConnection {
        fn column_count(&self) -> usize {
            1
        }
        fn column_label(&self, _index: usize) -> MergeResult<String> {
            Ok("id".into())
        }
        fn advance(&mut self) -> MergeResult<bool> {
            Err(MergeError::shard_failure(self.0, "connection reset"))
        }
        fn value(&mut self, _index: usize, _expected: DataType) -> MergeResult<Datum> {
            Err(MergeError::shard_failure(self.0, "connection reset"))
        }
        fn was_null(&self) -> bool {
            false
        }
        fn close(&mut self) -> MergeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_shard_cursor_errors_name_stage_and_shard() {
        let mut cursor = ShardCursor::new(4, Box::new(DroppedConnection(4)));
        let err = cursor.advance().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "Shard 4 source error: stage=advance, shard=4: connection reset"
        );

        let err = cursor.read_row(1).unwrap_err();
        assert!(err.to_string().contains("stage=read, shard=4"));

        // Structured errors pass through unchanged.
        let mut cursor = ShardCursor::new(1, Box::new(source()));
        cursor.advance().unwrap();
        assert!(matches!(
            cursor.value(2, DataType::Int64),
            Err(MergeError::TypeMismatch { .. })
        ));
    }
}
