use std::cmp::Ordering;

use shardmerge_common::datum::{Datum, TypeFamily};
use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{Direction, NullsOrder};

/// One sort column with its 0-based position in the result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortItem {
    pub column: usize,
    pub direction: Direction,
    pub nulls_order: NullsOrder,
}

impl SortItem {
    pub fn new(column: usize, direction: Direction) -> Self {
        Self {
            column,
            direction,
            nulls_order: NullsOrder::default_for(direction),
        }
    }
}

/// Total order over result rows defined by a list of sort items, compared
/// left to right; the first non-equal item decides.
///
/// NULL placement follows each item's `nulls_order` regardless of direction.
/// Values of unrelated type families never compare equal: they fall back to
/// a fixed family rank so the order stays total. Use [`SortTypeGuard`] to
/// reject such rows instead.
#[derive(Debug, Clone, Default)]
pub struct RowComparator {
    items: Vec<SortItem>,
}

impl RowComparator {
    pub fn new(items: Vec<SortItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Compare two full rows, reading each item's column.
    pub fn compare_rows(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for item in &self.items {
            let av = a.get(item.column).unwrap_or(&Datum::Null);
            let bv = b.get(item.column).unwrap_or(&Datum::Null);
            let ord = compare_values(av, bv, item);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compare two sort keys, i.e. the item columns already extracted in
    /// item order.
    pub fn compare_keys(&self, a: &[Datum], b: &[Datum]) -> Ordering {
        for (i, item) in self.items.iter().enumerate() {
            let av = a.get(i).unwrap_or(&Datum::Null);
            let bv = b.get(i).unwrap_or(&Datum::Null);
            let ord = compare_values(av, bv, item);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Extract this comparator's sort key from a full row.
    pub fn key_of(&self, row: &[Datum]) -> Vec<Datum> {
        self.items
            .iter()
            .map(|item| row.get(item.column).cloned().unwrap_or(Datum::Null))
            .collect()
    }

    pub fn columns(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.column).collect()
    }

    pub fn type_guard(&self) -> SortTypeGuard {
        SortTypeGuard {
            families: vec![None; self.items.len()],
        }
    }
}

fn compare_values(a: &Datum, b: &Datum, item: &SortItem) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return nulls_first(item.nulls_order),
        (false, true) => return nulls_first(item.nulls_order).reverse(),
        (false, false) => {}
    }
    let ord = a
        .partial_cmp(b)
        .unwrap_or_else(|| family_rank(a).cmp(&family_rank(b)));
    match item.direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

fn nulls_first(order: NullsOrder) -> Ordering {
    match order {
        NullsOrder::First => Ordering::Less,
        NullsOrder::Last => Ordering::Greater,
    }
}

fn family_rank(d: &Datum) -> u8 {
    match d.family() {
        None => 0,
        Some(TypeFamily::Boolean) => 1,
        Some(TypeFamily::Numeric) => 2,
        Some(TypeFamily::Text) => 3,
        Some(TypeFamily::Date) => 4,
        Some(TypeFamily::Timestamp) => 5,
        Some(TypeFamily::Bytes) => 6,
    }
}

/// Remembers the type family seen for each sort column and rejects keys
/// whose values cannot be ordered against earlier ones.
#[derive(Debug, Clone)]
pub struct SortTypeGuard {
    families: Vec<Option<TypeFamily>>,
}

impl SortTypeGuard {
    /// Check a sort key (values in item order). NULLs are always accepted.
    pub fn validate(&mut self, key: &[Datum]) -> MergeResult<()> {
        for (slot, value) in self.families.iter_mut().zip(key) {
            let Some(family) = value.family() else {
                continue;
            };
            match slot {
                None => *slot = Some(family),
                Some(seen) if *seen == family => {}
                Some(seen) => {
                    return Err(MergeError::TypeMismatch {
                        expected: seen.to_string(),
                        got: family.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
