//! Cross-shard aggregation accumulators.
//!
//! Every shard has already aggregated its own rows, so the units here merge
//! partial results: COUNT sums shard counts, SUM sums shard sums, MAX/MIN
//! keep the running extremum and AVG divides the merged SUM by the merged
//! COUNT of its derived columns.

use std::cmp::Ordering;

use shardmerge_common::datum::{decimal_div_round, Datum};
use shardmerge_common::error::{MergeError, MergeResult};

use crate::group_key::GroupKey;
use crate::row::MaterializedRow;
use crate::shape::{AggregationFunction, BoundAggregation, BoundShape};

/// Accumulator for one aggregation item within one group.
#[derive(Debug, Clone)]
pub enum AggregationUnit {
    Count(Option<Datum>),
    Sum(Option<Datum>),
    Max(Option<Datum>),
    Min(Option<Datum>),
    Avg {
        sum: Box<AggregationUnit>,
        count: Box<AggregationUnit>,
        /// Fractional digits of an exact (integer or decimal) average.
        scale: u8,
    },
}

impl AggregationUnit {
    pub fn new(function: AggregationFunction, avg_scale: u8) -> Self {
        match function {
            AggregationFunction::Count => AggregationUnit::Count(None),
            AggregationFunction::Sum => AggregationUnit::Sum(None),
            AggregationFunction::Max => AggregationUnit::Max(None),
            AggregationFunction::Min => AggregationUnit::Min(None),
            AggregationFunction::Avg => AggregationUnit::Avg {
                sum: Box::new(AggregationUnit::Sum(None)),
                count: Box::new(AggregationUnit::Count(None)),
                scale: avg_scale,
            },
        }
    }

    pub fn function(&self) -> AggregationFunction {
        match self {
            AggregationUnit::Count(_) => AggregationFunction::Count,
            AggregationUnit::Sum(_) => AggregationFunction::Sum,
            AggregationUnit::Max(_) => AggregationFunction::Max,
            AggregationUnit::Min(_) => AggregationFunction::Min,
            AggregationUnit::Avg { .. } => AggregationFunction::Avg,
        }
    }

    /// Fold one shard row's partial values in. AVG expects `[sum, count]`,
    /// every other function a single value. NULL inputs are ignored.
    pub fn merge(&mut self, values: &[Datum]) -> MergeResult<()> {
        match self {
            AggregationUnit::Avg { sum, count, .. } => {
                let [s, c] = values else {
                    return Err(arity_error(AggregationFunction::Avg, 2, values.len()));
                };
                sum.merge(std::slice::from_ref(s))?;
                count.merge(std::slice::from_ref(c))
            }
            _ => {
                let [value] = values else {
                    return Err(arity_error(self.function(), 1, values.len()));
                };
                self.merge_value(value)
            }
        }
    }

    fn merge_value(&mut self, value: &Datum) -> MergeResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            AggregationUnit::Count(acc) | AggregationUnit::Sum(acc) => {
                let next = match acc.take() {
                    None => numeric(value)?.clone(),
                    Some(current) => current.add(numeric(value)?).ok_or_else(|| {
                        MergeError::TypeMismatch {
                            expected: "numeric".into(),
                            got: family_name(value),
                        }
                    })?,
                };
                *acc = Some(next);
            }
            AggregationUnit::Max(acc) => keep_extremum(acc, value, Ordering::Greater)?,
            AggregationUnit::Min(acc) => keep_extremum(acc, value, Ordering::Less)?,
            AggregationUnit::Avg { .. } => {
                return Err(arity_error(AggregationFunction::Avg, 2, 1));
            }
        }
        Ok(())
    }

    /// Final value of the aggregate. May be called repeatedly.
    pub fn result(&self) -> MergeResult<Datum> {
        Ok(match self {
            AggregationUnit::Count(acc) => acc.clone().unwrap_or(Datum::Int64(0)),
            AggregationUnit::Sum(acc) | AggregationUnit::Max(acc) | AggregationUnit::Min(acc) => {
                acc.clone().unwrap_or(Datum::Null)
            }
            AggregationUnit::Avg { sum, count, scale } => average(&sum.result()?, &count.result()?, *scale),
        })
    }
}

/// Grouping layout of a query, shared by the streaming and in-memory
/// group-by mergers.
#[derive(Debug, Clone)]
pub(crate) struct Grouping {
    pub column_count: usize,
    pub group_columns: Vec<usize>,
    pub aggregations: Vec<BoundAggregation>,
    pub avg_scale: u8,
}

impl Grouping {
    pub fn new(shape: &BoundShape, avg_scale: u8) -> Self {
        Self {
            column_count: shape.column_count,
            group_columns: shape.group_columns(),
            aggregations: shape.aggregations.clone(),
            avg_scale,
        }
    }

    pub fn key_of(&self, row: &[Datum]) -> GroupKey {
        GroupKey::new(
            self.group_columns
                .iter()
                .map(|&c| row.get(c).cloned().unwrap_or(Datum::Null))
                .collect(),
        )
    }

    /// Start a group from its first row.
    pub fn open(&self, row: Vec<Datum>) -> MergeResult<GroupState> {
        let mut state = GroupState {
            units: self
                .aggregations
                .iter()
                .map(|agg| AggregationUnit::new(agg.function, self.avg_scale))
                .collect(),
            row: MaterializedRow::default(),
        };
        state.feed(self, &row)?;
        state.row = MaterializedRow::new(row);
        Ok(state)
    }
}

/// One open group: the snapshot of its first row plus one unit per
/// aggregation item.
#[derive(Debug)]
pub(crate) struct GroupState {
    row: MaterializedRow,
    units: Vec<AggregationUnit>,
}

impl GroupState {
    pub fn feed(&mut self, grouping: &Grouping, row: &[Datum]) -> MergeResult<()> {
        for (agg, unit) in grouping.aggregations.iter().zip(self.units.iter_mut()) {
            let inputs: Vec<Datum> = agg
                .inputs
                .iter()
                .map(|&c| row.get(c).cloned().unwrap_or(Datum::Null))
                .collect();
            unit.merge(&inputs)?;
        }
        Ok(())
    }

    /// Write the aggregate results into their output columns.
    pub fn finish(mut self, grouping: &Grouping) -> MergeResult<MaterializedRow> {
        for (agg, unit) in grouping.aggregations.iter().zip(&self.units) {
            self.row.set(agg.output, unit.result()?)?;
        }
        Ok(self.row)
    }
}

fn average(sum: &Datum, count: &Datum, scale: u8) -> Datum {
    if sum.is_null() {
        return Datum::Null;
    }
    let exact_count = match count {
        Datum::Int32(_) | Datum::Int64(_) => count.as_i64().map(i128::from),
        Datum::Decimal(m, 0) => Some(*m),
        _ => None,
    };
    if exact_count == Some(0) || count.as_f64() == Some(0.0) {
        return Datum::Null;
    }
    let exact_sum = match sum {
        Datum::Int32(_) | Datum::Int64(_) => sum.as_i64().map(|v| (i128::from(v), 0u8)),
        Datum::Decimal(m, s) => Some((*m, *s)),
        _ => None,
    };
    if let (Some((mantissa, sum_scale)), Some(divisor)) = (exact_sum, exact_count) {
        if let Some(avg) = decimal_div_round(mantissa, sum_scale, divisor, scale) {
            return avg;
        }
    }
    match (sum.as_f64(), count.as_f64()) {
        (Some(s), Some(c)) => Datum::Float64(s / c),
        _ => Datum::Null,
    }
}

fn keep_extremum(acc: &mut Option<Datum>, value: &Datum, wanted: Ordering) -> MergeResult<()> {
    let replace = match acc.as_ref() {
        None => true,
        Some(current) => match value.partial_cmp(current) {
            Some(ord) => ord == wanted,
            None => {
                return Err(MergeError::TypeMismatch {
                    expected: family_name(current),
                    got: family_name(value),
                })
            }
        },
    };
    if replace {
        *acc = Some(value.clone());
    }
    Ok(())
}

fn numeric(value: &Datum) -> MergeResult<&Datum> {
    match value {
        Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => Ok(value),
        other => Err(MergeError::TypeMismatch {
            expected: "numeric".into(),
            got: family_name(other),
        }),
    }
}

fn family_name(value: &Datum) -> String {
    value
        .family()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "NULL".into())
}

fn arity_error(function: AggregationFunction, expected: usize, got: usize) -> MergeError {
    MergeError::internal_bug(
        "E-AGG-001",
        format!("{} expects {} input value(s)", function, expected),
        format!("got {}", got),
    )
}
