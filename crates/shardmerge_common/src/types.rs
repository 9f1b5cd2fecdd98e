use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type requested when reading a value out of a row cursor.
///
/// `Any` returns the value in whatever representation the shard produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Any,
    Boolean,
    Int32,
    Int64,
    Float64,
    Decimal,
    Text,
    Date,
    Timestamp,
    Bytea,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Any => "ANY",
            DataType::Boolean => "BOOLEAN",
            DataType::Int32 => "INT",
            DataType::Int64 => "BIGINT",
            DataType::Float64 => "FLOAT8",
            DataType::Decimal => "DECIMAL",
            DataType::Text => "TEXT",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Bytea => "BYTEA",
        };
        f.write_str(name)
    }
}

/// Sort direction of an ORDER BY / GROUP BY item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn is_asc(self) -> bool {
        matches!(self, Direction::Asc)
    }
}

/// Placement of NULLs relative to non-NULL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    /// SQL default: NULLs are the smallest value, so they lead an ascending
    /// sort and trail a descending one.
    pub fn default_for(direction: Direction) -> Self {
        match direction {
            Direction::Asc => NullsOrder::First,
            Direction::Desc => NullsOrder::Last,
        }
    }
}

/// How the target dialect expresses row limiting, which decides the
/// pagination decorator wrapped around a merged cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialectTag {
    /// `LIMIT n OFFSET m` (MySQL, PostgreSQL, H2).
    NativeLimitOffset,
    /// `ROWNUM` pseudo-column filtering (Oracle).
    RownumPseudocolumn,
    /// `TOP n` combined with `ROW_NUMBER()` (SQL Server).
    TopPlusRowNumber,
    /// No emulation known; results are left undecorated.
    #[default]
    Unknown,
}

impl DialectTag {
    /// Parse a tag name; anything unrecognized maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "native-limit-offset" | "limit-offset" => DialectTag::NativeLimitOffset,
            "rownum-pseudocolumn" | "rownum" => DialectTag::RownumPseudocolumn,
            "top-plus-rownumber" | "top-plus-row-number" | "top" => DialectTag::TopPlusRowNumber,
            _ => DialectTag::Unknown,
        }
    }
}

impl fmt::Display for DialectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialectTag::NativeLimitOffset => "native-limit-offset",
            DialectTag::RownumPseudocolumn => "rownum-pseudocolumn",
            DialectTag::TopPlusRowNumber => "top-plus-rownumber",
            DialectTag::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_tag_parse() {
        assert_eq!(DialectTag::parse("native-limit-offset"), DialectTag::NativeLimitOffset);
        assert_eq!(DialectTag::parse(" ROWNUM "), DialectTag::RownumPseudocolumn);
        assert_eq!(DialectTag::parse("top"), DialectTag::TopPlusRowNumber);
        assert_eq!(DialectTag::parse("fetch-first"), DialectTag::Unknown);
        assert_eq!(DialectTag::parse(&DialectTag::TopPlusRowNumber.to_string()), DialectTag::TopPlusRowNumber);
    }

    #[test]
    fn test_default_nulls_order() {
        assert_eq!(NullsOrder::default_for(Direction::Asc), NullsOrder::First);
        assert_eq!(NullsOrder::default_for(Direction::Desc), NullsOrder::Last);
    }
}
