//! Shared fixtures for the merge-engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use shardmerge_engine::{
    DataType, Datum, MemoryRowSource, MergeError, MergeResult, MergedCursor, RowSource,
};

/// What a [`RecordingSource`] observed.
#[derive(Debug, Default, Clone)]
pub struct SourceLog {
    pub advances: usize,
    pub closes: usize,
}

/// Row source that records how it is driven and can be told to fail.
pub struct RecordingSource {
    shard: usize,
    inner: MemoryRowSource,
    log: Arc<Mutex<SourceLog>>,
    /// Fail the advance that would produce row number `n + 1`.
    fail_after: Option<usize>,
    fail_close: bool,
    fail_value: bool,
    rows_read: usize,
}

impl RecordingSource {
    pub fn new(shard: usize, labels: &[&str], rows: Vec<Vec<Datum>>) -> (Self, Arc<Mutex<SourceLog>>) {
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let source = Self {
            shard,
            inner: MemoryRowSource::new(labels.to_vec(), rows),
            log: Arc::clone(&log),
            fail_after: None,
            fail_close: false,
            fail_value: false,
            rows_read: 0,
        };
        (source, log)
    }

    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Every `value()` read fails as if the connection dropped.
    pub fn failing_value(mut self) -> Self {
        self.fail_value = true;
        self
    }
}

impl RowSource for RecordingSource {
    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, index: usize) -> MergeResult<String> {
        self.inner.column_label(index)
    }

    fn advance(&mut self) -> MergeResult<bool> {
        self.log.lock().advances += 1;
        if self.fail_after == Some(self.rows_read) {
            return Err(MergeError::shard_failure(self.shard, "connection reset by peer"));
        }
        let has_row = self.inner.advance()?;
        if has_row {
            self.rows_read += 1;
        }
        Ok(has_row)
    }

    fn value(&mut self, index: usize, expected: DataType) -> MergeResult<Datum> {
        if self.fail_value {
            return Err(MergeError::shard_failure(self.shard, "connection lost while reading"));
        }
        self.inner.value(index, expected)
    }

    fn was_null(&self) -> bool {
        self.inner.was_null()
    }

    fn close(&mut self) -> MergeResult<()> {
        self.log.lock().closes += 1;
        self.inner.close()?;
        if self.fail_close {
            return Err(MergeError::shard_failure(self.shard, "close failed"));
        }
        Ok(())
    }
}

pub fn text(s: &str) -> Datum {
    Datum::Text(s.into())
}

pub fn int(v: i64) -> Datum {
    Datum::Int64(v)
}

/// In-memory source boxed for [`shardmerge_engine::MergeEngine::merge`].
pub fn source(labels: &[&str], rows: Vec<Vec<Datum>>) -> Box<dyn RowSource> {
    Box::new(MemoryRowSource::new(labels.to_vec(), rows))
}

/// Drain a cursor into detached rows.
pub fn collect_rows(cursor: &mut MergedCursor) -> Vec<Vec<Datum>> {
    let mut rows = Vec::new();
    while cursor.advance().expect("advance") {
        rows.push(cursor.current_row().expect("current row").into_values());
    }
    rows
}

/// Drain a cursor, keeping one column (1-based).
pub fn collect_column(cursor: &mut MergedCursor, column: usize) -> Vec<Datum> {
    let mut out = Vec::new();
    while cursor.advance().expect("advance") {
        out.push(cursor.value(column, DataType::Any).expect("value"));
    }
    out
}
