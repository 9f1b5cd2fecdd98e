//! LIMIT / OFFSET applied on top of a merged stream.
//!
//! Shards receive a rewritten limit (`LIMIT offset + count`), so every shard
//! may contribute rows that fall before the global offset. The decorators
//! number the merged rows and emit only those inside the window.

use shardmerge_common::error::MergeResult;
use shardmerge_common::types::DialectTag;

use crate::shape::{LimitBound, LimitClause};

/// Absolute row window over the inner stream: rows numbered
/// `skip + 1 ..= ceiling` are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowWindow {
    skip: u64,
    ceiling: Option<u64>,
    /// Number of inner rows consumed so far.
    position: u64,
}

impl RowWindow {
    fn new(skip: u64, ceiling: Option<u64>) -> Self {
        Self {
            skip,
            ceiling,
            position: 0,
        }
    }

    fn advance(&mut self, mut next: impl FnMut() -> MergeResult<bool>) -> MergeResult<bool> {
        if let Some(ceiling) = self.ceiling {
            // Stop without pulling more rows from the inner merger.
            if self.position >= ceiling || ceiling <= self.skip {
                return Ok(false);
            }
        }
        loop {
            if !next()? {
                return Ok(false);
            }
            self.position += 1;
            if self.position > self.skip {
                return Ok(true);
            }
        }
    }
}

/// Row-number floor of an offset: `rn > v`, or `rn >= v` when inclusive.
fn floor_of(offset: Option<LimitBound>) -> u64 {
    match offset {
        None => 0,
        Some(b) if b.inclusive => b.value.saturating_sub(1),
        Some(b) => b.value,
    }
}

/// `LIMIT row_count OFFSET offset`.
#[derive(Debug, Clone)]
pub struct LimitDecorator {
    window: RowWindow,
}

impl LimitDecorator {
    pub fn new(offset: Option<u64>, row_count: Option<u64>) -> Self {
        let skip = offset.unwrap_or(0);
        let ceiling = row_count.map(|n| skip.saturating_add(n));
        Self {
            window: RowWindow::new(skip, ceiling),
        }
    }
}

/// Oracle-style `ROWNUM` pagination: the offset is a floor on the row
/// number and the row count a ceiling.
#[derive(Debug, Clone)]
pub struct RowNumberDecorator {
    window: RowWindow,
}

impl RowNumberDecorator {
    pub fn new(offset: Option<LimitBound>, row_count: Option<LimitBound>) -> Self {
        let ceiling = row_count.map(|b| {
            if b.inclusive {
                b.value
            } else {
                b.value.saturating_sub(1)
            }
        });
        Self {
            window: RowWindow::new(floor_of(offset), ceiling),
        }
    }
}

/// SQL Server-style `TOP n` combined with a `ROW_NUMBER()` floor.
#[derive(Debug, Clone)]
pub struct TopAndRowNumberDecorator {
    window: RowWindow,
}

impl TopAndRowNumberDecorator {
    pub fn new(offset: Option<LimitBound>, top: Option<LimitBound>) -> Self {
        Self {
            window: RowWindow::new(floor_of(offset), top.map(|b| b.value)),
        }
    }
}

/// The pagination decorator wrapped around a merged cursor.
#[derive(Debug, Clone)]
pub enum PaginationDecorator {
    Limit(LimitDecorator),
    RowNumber(RowNumberDecorator),
    TopAndRowNumber(TopAndRowNumberDecorator),
}

impl PaginationDecorator {
    /// Decorator for `limit` under `dialect`; `None` for an unknown dialect.
    pub fn for_clause(limit: &LimitClause, dialect: DialectTag) -> Option<Self> {
        match dialect {
            DialectTag::NativeLimitOffset => Some(PaginationDecorator::Limit(LimitDecorator::new(
                limit.offset.map(|b| b.value),
                limit.row_count.map(|b| b.value),
            ))),
            DialectTag::RownumPseudocolumn => Some(PaginationDecorator::RowNumber(
                RowNumberDecorator::new(limit.offset, limit.row_count),
            )),
            DialectTag::TopPlusRowNumber => Some(PaginationDecorator::TopAndRowNumber(
                TopAndRowNumberDecorator::new(limit.offset, limit.row_count),
            )),
            DialectTag::Unknown => None,
        }
    }

    fn window(&self) -> &RowWindow {
        match self {
            PaginationDecorator::Limit(d) => &d.window,
            PaginationDecorator::RowNumber(d) => &d.window,
            PaginationDecorator::TopAndRowNumber(d) => &d.window,
        }
    }

    fn window_mut(&mut self) -> &mut RowWindow {
        match self {
            PaginationDecorator::Limit(d) => &mut d.window,
            PaginationDecorator::RowNumber(d) => &mut d.window,
            PaginationDecorator::TopAndRowNumber(d) => &mut d.window,
        }
    }

    /// Advance to the next row inside the window, pulling inner rows through
    /// `next`.
    pub(crate) fn advance(&mut self, next: impl FnMut() -> MergeResult<bool>) -> MergeResult<bool> {
        self.window_mut().advance(next)
    }

    /// 1-based number of the current row within the merged stream.
    pub fn row_number(&self) -> u64 {
        self.window().position
    }

    pub fn dialect(&self) -> DialectTag {
        match self {
            PaginationDecorator::Limit(_) => DialectTag::NativeLimitOffset,
            PaginationDecorator::RowNumber(_) => DialectTag::RownumPseudocolumn,
            PaginationDecorator::TopAndRowNumber(_) => DialectTag::TopPlusRowNumber,
        }
    }

    /// Whether the dialect selects the row number as a result column.
    pub fn exposes_row_number(&self) -> bool {
        !matches!(self, PaginationDecorator::Limit(_))
    }
}
