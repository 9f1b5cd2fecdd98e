//! Statement-shape metadata supplied by the SQL binding layer.

use serde::{Deserialize, Serialize};
use std::fmt;

use shardmerge_common::error::{MergeError, MergeResult};
use shardmerge_common::types::{DialectTag, Direction, NullsOrder};

use crate::comparator::SortItem;
use crate::label::ColumnLabelIndex;

/// Reference to a result column, by 1-based position or by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRef {
    Index(usize),
    Label(String),
}

impl From<usize> for ColumnRef {
    fn from(index: usize) -> Self {
        ColumnRef::Index(index)
    }
}

impl From<&str> for ColumnRef {
    fn from(label: &str) -> Self {
        ColumnRef::Label(label.to_string())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{}", i),
            ColumnRef::Label(l) => write!(f, "{}", l),
        }
    }
}

/// One ORDER BY or GROUP BY item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub column: ColumnRef,
    pub direction: Direction,
    pub nulls_order: NullsOrder,
}

pub type GroupByItem = OrderItem;
pub type OrderByItem = OrderItem;

impl OrderItem {
    /// Item with the SQL-default NULL placement for `direction`.
    pub fn new(column: impl Into<ColumnRef>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
            nulls_order: NullsOrder::default_for(direction),
        }
    }

    pub fn asc(column: impl Into<ColumnRef>) -> Self {
        Self::new(column, Direction::Asc)
    }

    pub fn desc(column: impl Into<ColumnRef>) -> Self {
        Self::new(column, Direction::Desc)
    }

    pub fn with_nulls(mut self, nulls_order: NullsOrder) -> Self {
        self.nulls_order = nulls_order;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationFunction {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationFunction::Count => "COUNT",
            AggregationFunction::Sum => "SUM",
            AggregationFunction::Max => "MAX",
            AggregationFunction::Min => "MIN",
            AggregationFunction::Avg => "AVG",
        };
        f.write_str(name)
    }
}

/// An aggregate in the select list.
///
/// `source` is the column carrying the shard-level partial result and
/// `output` the column the merged result is written to; they coincide unless
/// the rewriter moved the partial elsewhere. AVG cannot be merged from shard
/// averages, so the rewriter adds hidden SUM and COUNT columns and lists
/// them in `derived`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationItem {
    pub function: AggregationFunction,
    pub output: ColumnRef,
    pub source: ColumnRef,
    #[serde(default)]
    pub derived: Vec<AggregationItem>,
}

impl AggregationItem {
    pub fn new(function: AggregationFunction, column: impl Into<ColumnRef>) -> Self {
        let column = column.into();
        Self {
            function,
            output: column.clone(),
            source: column,
            derived: Vec::new(),
        }
    }

    pub fn count(column: impl Into<ColumnRef>) -> Self {
        Self::new(AggregationFunction::Count, column)
    }

    pub fn sum(column: impl Into<ColumnRef>) -> Self {
        Self::new(AggregationFunction::Sum, column)
    }

    pub fn max(column: impl Into<ColumnRef>) -> Self {
        Self::new(AggregationFunction::Max, column)
    }

    pub fn min(column: impl Into<ColumnRef>) -> Self {
        Self::new(AggregationFunction::Min, column)
    }

    /// AVG written to `output`, merged from the derived SUM and COUNT columns.
    pub fn avg(
        output: impl Into<ColumnRef>,
        sum: impl Into<ColumnRef>,
        count: impl Into<ColumnRef>,
    ) -> Self {
        let mut item = Self::new(AggregationFunction::Avg, output);
        item.derived = vec![Self::sum(sum), Self::count(count)];
        item
    }

    pub fn with_source(mut self, source: impl Into<ColumnRef>) -> Self {
        self.source = source.into();
        self
    }
}

/// A LIMIT / OFFSET operand. `inclusive` matters only for row-number
/// emulations, where the bound is a comparison on the row number
/// (`rn >= v` / `rownum <= v` versus `rn > v` / `rownum < v`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitBound {
    pub value: u64,
    #[serde(default)]
    pub inclusive: bool,
}

impl LimitBound {
    pub fn new(value: u64) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }

    pub fn inclusive(value: u64) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitClause {
    #[serde(default)]
    pub offset: Option<LimitBound>,
    #[serde(default)]
    pub row_count: Option<LimitBound>,
    /// `None` falls back to `MergeConfig::default_dialect`.
    #[serde(default)]
    pub dialect: Option<DialectTag>,
    /// Label of the row-number column the statement selects, if any. The
    /// row-number decorators expose it as a trailing synthesized column.
    #[serde(default)]
    pub row_number_label: Option<String>,
}

impl LimitClause {
    /// Native `LIMIT row_count OFFSET offset`.
    pub fn limit_offset(offset: u64, row_count: u64) -> Self {
        Self {
            offset: Some(LimitBound::new(offset)),
            row_count: Some(LimitBound::new(row_count)),
            dialect: Some(DialectTag::NativeLimitOffset),
            row_number_label: None,
        }
    }

    pub fn new(
        offset: Option<LimitBound>,
        row_count: Option<LimitBound>,
        dialect: DialectTag,
    ) -> Self {
        Self {
            offset,
            row_count,
            dialect: Some(dialect),
            row_number_label: None,
        }
    }

    pub fn with_row_number_label(mut self, label: impl Into<String>) -> Self {
        self.row_number_label = Some(label.into());
        self
    }
}

/// Immutable description of the bound SELECT the merge must reproduce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementShape {
    #[serde(default)]
    pub group_by: Vec<GroupByItem>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default)]
    pub aggregations: Vec<AggregationItem>,
    #[serde(default)]
    pub limit: Option<LimitClause>,
}

impl StatementShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by(mut self, items: Vec<GroupByItem>) -> Self {
        self.group_by = items;
        self
    }

    pub fn order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn aggregations(mut self, items: Vec<AggregationItem>) -> Self {
        self.aggregations = items;
        self
    }

    pub fn limit(mut self, limit: LimitClause) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }
}

/// An aggregation item with columns resolved to 0-based row positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BoundAggregation {
    pub function: AggregationFunction,
    pub output: usize,
    /// Columns fed to the unit: `[source]`, or `[sum, count]` for AVG.
    pub inputs: Vec<usize>,
}

/// The statement shape resolved against one query's result columns.
#[derive(Debug, Clone)]
pub(crate) struct BoundShape {
    pub column_count: usize,
    pub group_by: Vec<SortItem>,
    pub order_by: Vec<SortItem>,
    pub aggregations: Vec<BoundAggregation>,
}

impl BoundShape {
    pub fn bind(shape: &StatementShape, index: &ColumnLabelIndex) -> MergeResult<Self> {
        let sort_items = |items: &[OrderItem]| -> MergeResult<Vec<SortItem>> {
            items
                .iter()
                .map(|item| {
                    Ok(SortItem {
                        column: index.resolve(&item.column)? - 1,
                        direction: item.direction,
                        nulls_order: item.nulls_order,
                    })
                })
                .collect()
        };
        let aggregations = shape
            .aggregations
            .iter()
            .map(|item| bind_aggregation(item, index))
            .collect::<MergeResult<Vec<_>>>()?;
        Ok(Self {
            column_count: index.len(),
            group_by: sort_items(&shape.group_by)?,
            order_by: sort_items(&shape.order_by)?,
            aggregations,
        })
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty()
    }

    /// ORDER BY as the shards sorted: a grouped query without ORDER BY is
    /// ordered by its GROUP BY items.
    pub fn effective_order_by(&self) -> &[SortItem] {
        if self.order_by.is_empty() {
            &self.group_by
        } else {
            &self.order_by
        }
    }

    /// Whether grouped rows arrive contiguous, allowing streaming aggregation.
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty() && self.group_by.as_slice() == self.effective_order_by()
    }

    pub fn group_columns(&self) -> Vec<usize> {
        self.group_by.iter().map(|item| item.column).collect()
    }
}

fn bind_aggregation(item: &AggregationItem, index: &ColumnLabelIndex) -> MergeResult<BoundAggregation> {
    let output = index.resolve(&item.output)? - 1;
    let inputs = if item.function == AggregationFunction::Avg {
        let derived_column = |function: AggregationFunction| -> MergeResult<usize> {
            let derived = item
                .derived
                .iter()
                .find(|d| d.function == function)
                .ok_or_else(|| {
                    MergeError::Configuration(format!(
                        "AVG({}) is missing its derived {} item",
                        item.output, function
                    ))
                })?;
            Ok(index.resolve(&derived.source)? - 1)
        };
        vec![
            derived_column(AggregationFunction::Sum)?,
            derived_column(AggregationFunction::Count)?,
        ]
    } else {
        vec![index.resolve(&item.source)? - 1]
    };
    Ok(BoundAggregation {
        function: item.function,
        output,
        inputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ColumnLabelIndex {
        ColumnLabelIndex::from_labels(&["dept", "total", "avg_salary", "sum_salary", "cnt_salary"])
    }

    #[test]
    fn test_bind_resolves_labels_and_indices() {
        let shape = StatementShape::new()
            .group_by(vec![OrderItem::asc("DEPT")])
            .order_by(vec![OrderItem::desc(ColumnRef::Index(2))])
            .aggregations(vec![AggregationItem::sum("total")]);
        let bound = BoundShape::bind(&shape, &index()).unwrap();
        assert_eq!(bound.column_count, 5);
        assert_eq!(bound.group_by[0].column, 0);
        assert_eq!(bound.order_by[0].column, 1);
        assert_eq!(bound.order_by[0].nulls_order, NullsOrder::Last);
        assert_eq!(bound.aggregations[0].inputs, vec![1]);
        assert!(!bound.is_same_group_by_and_order_by());
    }

    #[test]
    fn test_bind_avg_uses_derived_columns() {
        let shape = StatementShape::new().aggregations(vec![AggregationItem::avg(
            "avg_salary",
            "sum_salary",
            "cnt_salary",
        )]);
        let bound = BoundShape::bind(&shape, &index()).unwrap();
        assert_eq!(bound.aggregations[0].output, 2);
        assert_eq!(bound.aggregations[0].inputs, vec![3, 4]);
    }

    #[test]
    fn test_bind_avg_without_derived_items_fails() {
        let shape = StatementShape::new()
            .aggregations(vec![AggregationItem::new(AggregationFunction::Avg, "avg_salary")]);
        let err = BoundShape::bind(&shape, &index()).unwrap_err();
        assert!(err.to_string().contains("derived SUM"));
    }

    #[test]
    fn test_bind_unknown_column_fails() {
        let shape = StatementShape::new().order_by(vec![OrderItem::asc("bonus")]);
        assert!(matches!(
            BoundShape::bind(&shape, &index()),
            Err(MergeError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_order_by_follows_group_by() {
        let shape = StatementShape::new().group_by(vec![OrderItem::desc("dept")]);
        let bound = BoundShape::bind(&shape, &index()).unwrap();
        assert!(bound.is_same_group_by_and_order_by());
        assert_eq!(bound.effective_order_by()[0].direction, Direction::Desc);

        let shape = StatementShape::new()
            .group_by(vec![OrderItem::asc("dept")])
            .order_by(vec![OrderItem::asc("dept").with_nulls(NullsOrder::Last)]);
        let bound = BoundShape::bind(&shape, &index()).unwrap();
        assert!(!bound.is_same_group_by_and_order_by());
    }

    #[test]
    fn test_shape_deserializes_from_json() {
        let json = r#"{
            "group_by": [{"column": {"label": "dept"}, "direction": "asc", "nulls_order": "first"}],
            "aggregations": [{"function": "SUM", "output": {"index": 2}, "source": {"index": 2}}],
            "limit": {"offset": {"value": 5}, "row_count": {"value": 10}, "dialect": "native-limit-offset"}
        }"#;
        let shape: StatementShape = serde_json::from_str(json).unwrap();
        assert!(shape.is_grouped());
        assert!(shape.order_by.is_empty());
        let limit = shape.limit.unwrap();
        assert_eq!(limit.offset, Some(LimitBound::new(5)));
        assert_eq!(limit.dialect, Some(DialectTag::NativeLimitOffset));
    }
}
