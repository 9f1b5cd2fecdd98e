use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{MergeError, MergeResult};
use crate::types::DataType;

/// A single SQL scalar value as delivered by a shard cursor.
/// Small enum, no heap allocation for fixed-size types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    /// Fixed-point decimal: mantissa × 10^(-scale).
    /// e.g. Decimal(12345, 2) = 123.45
    Decimal(i128, u8),
    Text(String),
    Date(i32),      // days since Unix epoch (1970-01-01)
    Timestamp(i64), // microseconds since Unix epoch
    Bytea(Vec<u8>),
}

/// Groups of types whose values can be ordered against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Boolean,
    Numeric,
    Text,
    Date,
    Timestamp,
    Bytes,
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeFamily::Boolean => "boolean",
            TypeFamily::Numeric => "numeric",
            TypeFamily::Text => "text",
            TypeFamily::Date => "date",
            TypeFamily::Timestamp => "timestamp",
            TypeFamily::Bytes => "bytea",
        };
        f.write_str(name)
    }
}

impl Datum {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(DataType::Boolean),
            Datum::Int32(_) => Some(DataType::Int32),
            Datum::Int64(_) => Some(DataType::Int64),
            Datum::Float64(_) => Some(DataType::Float64),
            Datum::Decimal(_, _) => Some(DataType::Decimal),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Date(_) => Some(DataType::Date),
            Datum::Timestamp(_) => Some(DataType::Timestamp),
            Datum::Bytea(_) => Some(DataType::Bytea),
        }
    }

    pub fn family(&self) -> Option<TypeFamily> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(TypeFamily::Boolean),
            Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => {
                Some(TypeFamily::Numeric)
            }
            Datum::Text(_) => Some(TypeFamily::Text),
            Datum::Date(_) => Some(TypeFamily::Date),
            Datum::Timestamp(_) => Some(TypeFamily::Timestamp),
            Datum::Bytea(_) => Some(TypeFamily::Bytes),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int32(v) => Some(*v as f64),
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(m, s) => {
                let (m, s) = decimal_trim(*m, *s);
                Some(decimal_to_f64(m, s))
            }
            _ => None,
        }
    }

    /// Exact (mantissa, scale) form of an integer or decimal.
    fn exact_decimal(&self) -> Option<(i128, u8)> {
        match self {
            Datum::Int32(v) => Some((*v as i128, 0)),
            Datum::Int64(v) => Some((*v as i128, 0)),
            Datum::Decimal(m, s) => Some((*m, *s)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn type_name(&self) -> String {
        match self.data_type() {
            Some(t) => t.to_string(),
            None => "NULL".into(),
        }
    }

    /// Add two datums (SUM / COUNT accumulation).
    ///
    /// Integers stay integers and overflow into Decimal. Any Decimal operand
    /// keeps the exact domain until the mantissa overflows, then the sum
    /// degrades to Float64. Any Float64 operand yields Float64.
    pub fn add(&self, other: &Datum) -> Option<Datum> {
        match (self, other) {
            (Datum::Int32(_) | Datum::Int64(_), Datum::Int32(_) | Datum::Int64(_)) => {
                let (a, b) = (self.as_i64()?, other.as_i64()?);
                Some(match a.checked_add(b) {
                    Some(v) => Datum::Int64(v),
                    None => Datum::Decimal(a as i128 + b as i128, 0),
                })
            }
            (Datum::Float64(a), _) => Some(Datum::Float64(a + other.as_f64()?)),
            (_, Datum::Float64(b)) => Some(Datum::Float64(self.as_f64()? + b)),
            (Datum::Decimal(_, _), Datum::Int32(_) | Datum::Int64(_) | Datum::Decimal(_, _))
            | (Datum::Int32(_) | Datum::Int64(_), Datum::Decimal(_, _)) => {
                let (a, sa) = self.exact_decimal()?;
                let (b, sb) = other.exact_decimal()?;
                decimal_add(a, sa, b, sb)
                    .or_else(|| Some(Datum::Float64(self.as_f64()? + other.as_f64()?)))
            }
            _ => None,
        }
    }

    /// Coerce to the requested logical type.
    ///
    /// NULL coerces to every type. Narrowing that would lose information is a
    /// `TypeMismatch`, as is any conversion between unrelated families.
    pub fn coerce_to(&self, target: DataType) -> MergeResult<Datum> {
        if self.is_null() || target == DataType::Any {
            return Ok(self.clone());
        }
        let mismatch = || MergeError::TypeMismatch {
            expected: target.to_string(),
            got: self.type_name(),
        };
        let coerced = match target {
            DataType::Any => None,
            DataType::Boolean => match self {
                Datum::Boolean(_) => Some(self.clone()),
                Datum::Int32(_) | Datum::Int64(_) => self.as_i64().map(|v| Datum::Boolean(v != 0)),
                Datum::Text(s) => match s.to_lowercase().as_str() {
                    "true" | "t" | "1" | "yes" => Some(Datum::Boolean(true)),
                    "false" | "f" | "0" | "no" => Some(Datum::Boolean(false)),
                    _ => None,
                },
                _ => None,
            },
            DataType::Int32 => self
                .integral_value()
                .and_then(|v| i32::try_from(v).ok())
                .map(Datum::Int32),
            DataType::Int64 => self
                .integral_value()
                .and_then(|v| i64::try_from(v).ok())
                .map(Datum::Int64),
            DataType::Float64 => match self {
                Datum::Text(s) => s.trim().parse::<f64>().ok().map(Datum::Float64),
                _ => self.as_f64().map(Datum::Float64),
            },
            DataType::Decimal => match self {
                Datum::Decimal(_, _) => Some(self.clone()),
                Datum::Int32(_) | Datum::Int64(_) => {
                    self.as_i64().map(|v| Datum::Decimal(v as i128, 0))
                }
                Datum::Float64(v) if v.is_finite() => Datum::parse_decimal(&v.to_string()),
                Datum::Text(s) => Datum::parse_decimal(s),
                _ => None,
            },
            DataType::Text => Some(Datum::Text(self.to_string())),
            DataType::Date => match self {
                Datum::Date(_) => Some(self.clone()),
                Datum::Text(s) => chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .ok()
                    .map(|d| Datum::Date((d - epoch_date()).num_days() as i32)),
                _ => None,
            },
            DataType::Timestamp => match self {
                Datum::Timestamp(_) => Some(self.clone()),
                Datum::Date(days) => Some(Datum::Timestamp(*days as i64 * 86_400_000_000)),
                Datum::Text(s) => {
                    chrono::NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|dt| Datum::Timestamp(dt.and_utc().timestamp_micros()))
                }
                _ => None,
            },
            DataType::Bytea => match self {
                Datum::Bytea(_) => Some(self.clone()),
                Datum::Text(s) => Some(Datum::Bytea(s.as_bytes().to_vec())),
                _ => None,
            },
        };
        coerced.ok_or_else(mismatch)
    }

    /// Exact integral value, if this datum holds one.
    fn integral_value(&self) -> Option<i128> {
        match self {
            Datum::Int32(v) => Some(*v as i128),
            Datum::Int64(v) => Some(*v as i128),
            Datum::Float64(v) if v.fract() == 0.0 && v.abs() < TWO_POW_127 => Some(*v as i128),
            Datum::Decimal(m, s) => {
                let (tm, ts) = decimal_trim(*m, *s);
                (ts == 0).then_some(tm)
            }
            Datum::Text(s) => s.trim().parse::<i128>().ok(),
            _ => None,
        }
    }

    /// Create a Decimal from a string like "123.45" or "-0.001".
    pub fn parse_decimal(s: &str) -> Option<Datum> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let (int_part, frac_part) = match s.find('.') {
            Some(dot) => (&s[..dot], &s[dot + 1..]),
            None => (s, ""),
        };
        let scale = u8::try_from(frac_part.len()).ok()?;
        let mantissa: i128 = format!("{}{}", int_part, frac_part).parse().ok()?;
        Some(Datum::Decimal(mantissa, scale))
    }

    fn write_hash_key<H: Hasher>(&self, state: &mut H) {
        // Numeric values hash through one canonical form so that every
        // cross-type pair that compares equal also hashes equal.
        match self {
            Datum::Null => 0u8.hash(state),
            Datum::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Datum::Int32(_) | Datum::Int64(_) | Datum::Float64(_) | Datum::Decimal(_, _) => {
                match self.integral_value() {
                    Some(v) => match i64::try_from(v) {
                        Ok(v) => {
                            2u8.hash(state);
                            v.hash(state);
                        }
                        Err(_) => {
                            3u8.hash(state);
                            (v as f64).to_bits().hash(state);
                        }
                    },
                    None => {
                        3u8.hash(state);
                        let f = self.as_f64().unwrap_or(f64::NAN);
                        let f = if f == 0.0 { 0.0 } else { f };
                        f.to_bits().hash(state);
                    }
                }
            }
            Datum::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Datum::Date(days) => {
                5u8.hash(state);
                days.hash(state);
            }
            Datum::Timestamp(us) => {
                6u8.hash(state);
                us.hash(state);
            }
            Datum::Bytea(bytes) => {
                7u8.hash(state);
                bytes.hash(state);
            }
        }
    }
}

/// 2^127: every integer or decimal value is smaller in magnitude.
const TWO_POW_127: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;

/// Compare an integer or decimal against a float without rounding the
/// exact side.
fn cmp_with_float(exact: &Datum, f: f64) -> Option<Ordering> {
    let (m, s) = exact.exact_decimal()?;
    if f.is_nan() {
        return None;
    }
    if f.abs() >= TWO_POW_127 {
        return Some(if f > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = f.floor() as i128;
    if f == f.floor() {
        return Some(decimal_cmp(m, s, floor, 0));
    }
    // f lies strictly between floor and floor + 1.
    if decimal_cmp(m, s, floor, 0) != Ordering::Greater {
        return Some(Ordering::Less);
    }
    if decimal_cmp(m, s, floor + 1, 0) != Ordering::Less {
        return Some(Ordering::Greater);
    }
    exact.as_f64()?.partial_cmp(&f)
}

fn numeric_cmp(a: &Datum, b: &Datum) -> Option<Ordering> {
    match (a, b) {
        (Datum::Float64(x), Datum::Float64(y)) => x.partial_cmp(y),
        (Datum::Float64(x), _) => cmp_with_float(b, *x).map(Ordering::reverse),
        (_, Datum::Float64(y)) => cmp_with_float(a, *y),
        _ => {
            let (am, sa) = a.exact_decimal()?;
            let (bm, sb) = b.exact_decimal()?;
            Some(decimal_cmp(am, sa, bm, sb))
        }
    }
}

fn epoch_date() -> chrono::NaiveDate {
    // 1970-01-01 is always valid; the fallback is unreachable.
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(chrono::NaiveDate::MIN)
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Decimal(m, s) => write!(f, "{}", decimal_to_string(*m, *s)),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Date(days) => {
                match epoch_date().checked_add_signed(chrono::Duration::days(*days as i64)) {
                    Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            Datum::Timestamp(us) => {
                let secs = us.div_euclid(1_000_000);
                let nsecs = (us.rem_euclid(1_000_000) * 1000) as u32;
                match chrono::DateTime::from_timestamp(secs, nsecs) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                    None => write!(f, "{}", us),
                }
            }
            Datum::Bytea(bytes) => {
                write!(f, "\\x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => false, // NULL != NULL in SQL
            _ => self.partial_cmp(other) == Some(Ordering::Equal),
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.write_hash_key(state);
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (a, b)
                if a.family() == Some(TypeFamily::Numeric)
                    && b.family() == Some(TypeFamily::Numeric) =>
            {
                numeric_cmp(a, b)
            }
            (Datum::Text(a), Datum::Text(b)) => a.partial_cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.partial_cmp(b),
            (Datum::Bytea(a), Datum::Bytea(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

// ── Decimal helper functions ────────────────────────────────────────────

/// Convert a (mantissa, scale) decimal to its string representation.
/// e.g. (12345, 2) → "123.45", (-1, 3) → "-0.001", (100, 0) → "100"
pub fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let negative = mantissa < 0;
    let s = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let result = if s.len() <= scale {
        format!("0.{}{}", "0".repeat(scale - s.len()), s)
    } else {
        let (int_part, frac_part) = s.split_at(s.len() - scale);
        format!("{}.{}", int_part, frac_part)
    };
    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

pub fn decimal_to_f64(mantissa: i128, scale: u8) -> f64 {
    mantissa as f64 / 10f64.powi(scale as i32)
}

/// `value × 10^digits`, or `None` when it leaves the i128 range.
fn rescale(value: i128, digits: u8) -> Option<i128> {
    if value == 0 {
        return Some(0);
    }
    value.checked_mul(10i128.checked_pow(digits as u32)?)
}

/// Exact comparison of two decimals of any scale.
pub fn decimal_cmp(a: i128, sa: u8, b: i128, sb: u8) -> Ordering {
    match sa.cmp(&sb) {
        Ordering::Equal => a.cmp(&b),
        // A side that overflows when rescaled outweighs any i128 mantissa.
        Ordering::Greater => match rescale(b, sa - sb) {
            Some(nb) => a.cmp(&nb),
            None => 0.cmp(&b),
        },
        Ordering::Less => match rescale(a, sb - sa) {
            Some(na) => na.cmp(&b),
            None => a.cmp(&0),
        },
    }
}

/// Add two decimals at the larger scale; `None` on mantissa overflow.
fn decimal_add(a: i128, sa: u8, b: i128, sb: u8) -> Option<Datum> {
    let scale = sa.max(sb);
    let sum = rescale(a, scale - sa)?.checked_add(rescale(b, scale - sb)?)?;
    Some(Datum::Decimal(sum, scale))
}

/// Remove trailing zeros from a decimal for canonical form.
fn decimal_trim(mut mantissa: i128, mut scale: u8) -> (i128, u8) {
    if mantissa == 0 {
        return (0, 0);
    }
    while scale > 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    (mantissa, scale)
}

/// Divide `a` (scale `sa`) by the integer `divisor`, rounding half away
/// from zero to `result_scale` digits. Returns `None` on division by zero.
pub fn decimal_div_round(a: i128, sa: u8, divisor: i128, result_scale: u8) -> Option<Datum> {
    if divisor == 0 {
        return None;
    }
    // One extra digit drives the rounding decision.
    let shift = result_scale as i32 + 1 - sa as i32;
    let scaled = if shift >= 0 {
        a.checked_mul(10i128.checked_pow(shift as u32)?)?
    } else {
        match 10i128.checked_pow((-shift) as u32) {
            Some(p) => a / p,
            None => 0,
        }
    };
    let q = scaled / divisor;
    let rounded = if q.rem_euclid(10) >= 5 && q >= 0 {
        q / 10 + 1
    } else if q < 0 && (-q) % 10 >= 5 {
        q / 10 - 1
    } else {
        q / 10
    };
    Some(Datum::Decimal(rounded, result_scale))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_datum(d: &Datum) -> u64 {
        let mut h = DefaultHasher::new();
        d.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_null_is_not_equal_to_null() {
        assert_ne!(Datum::Null, Datum::Null);
        assert!(Datum::Null.partial_cmp(&Datum::Null).is_none());
    }

    #[test]
    fn test_cross_numeric_equality_hashes_consistently() {
        let forms = [
            Datum::Int32(2),
            Datum::Int64(2),
            Datum::Float64(2.0),
            Datum::Decimal(200, 2),
        ];
        for a in &forms {
            for b in &forms {
                assert_eq!(a, b);
                assert_eq!(hash_datum(a), hash_datum(b));
            }
        }
        assert_eq!(hash_datum(&Datum::Float64(1.5)), hash_datum(&Datum::Decimal(15, 1)));
        assert_eq!(hash_datum(&Datum::Decimal(15, 1)), hash_datum(&Datum::Decimal(1500, 3)));
        let huge = 2f64.powi(70);
        assert_eq!(Datum::Float64(huge), Datum::Decimal(huge as i128, 0));
        assert_eq!(hash_datum(&Datum::Float64(huge)), hash_datum(&Datum::Decimal(huge as i128, 0)));
    }

    #[test]
    fn test_add_preserves_domain() {
        assert_eq!(Datum::Int32(1).add(&Datum::Int32(2)), Some(Datum::Int64(3)));
        assert!(matches!(
            Datum::Int64(1).add(&Datum::Float64(0.5)),
            Some(Datum::Float64(v)) if v == 1.5
        ));
        assert!(matches!(
            Datum::Decimal(105, 1).add(&Datum::Int64(2)),
            Some(Datum::Decimal(125, 1))
        ));
        assert!(Datum::Text("a".into()).add(&Datum::Int64(1)).is_none());
    }

    #[test]
    fn test_add_overflow_promotes_to_decimal() {
        let sum = Datum::Int64(i64::MAX).add(&Datum::Int64(1));
        assert!(matches!(sum, Some(Datum::Decimal(m, 0)) if m == i64::MAX as i128 + 1));
    }

    #[test]
    fn test_coerce_numeric() {
        assert!(matches!(Datum::Int64(7).coerce_to(DataType::Int32), Ok(Datum::Int32(7))));
        assert!(matches!(Datum::Decimal(700, 2).coerce_to(DataType::Int64), Ok(Datum::Int64(7))));
        assert!(matches!(
            Datum::Int32(3).coerce_to(DataType::Decimal),
            Ok(Datum::Decimal(3, 0))
        ));
        assert!(matches!(
            Datum::Text("2.5".into()).coerce_to(DataType::Float64),
            Ok(Datum::Float64(v)) if v == 2.5
        ));
    }

    #[test]
    fn test_coerce_rejects_lossy_and_unrelated() {
        let err = Datum::Float64(1.5).coerce_to(DataType::Int64).unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatch { .. }));
        assert!(Datum::Int64(i64::MAX).coerce_to(DataType::Int32).is_err());
        assert!(Datum::Bytea(vec![1]).coerce_to(DataType::Date).is_err());
    }

    #[test]
    fn test_coerce_null_and_any() {
        assert!(Datum::Null.coerce_to(DataType::Int64).unwrap().is_null());
        assert_eq!(
            Datum::Text("x".into()).coerce_to(DataType::Any).unwrap(),
            Datum::Text("x".into())
        );
    }

    #[test]
    fn test_coerce_temporal() {
        assert!(matches!(
            Datum::Text("1970-01-11".into()).coerce_to(DataType::Date),
            Ok(Datum::Date(10))
        ));
        assert!(matches!(
            Datum::Date(1).coerce_to(DataType::Timestamp),
            Ok(Datum::Timestamp(86_400_000_000))
        ));
        assert_eq!(Datum::Date(10).to_string(), "1970-01-11");
    }

    #[test]
    fn test_family() {
        assert_eq!(Datum::Int32(1).family(), Datum::Decimal(1, 0).family());
        assert_ne!(Datum::Int32(1).family(), Datum::Text("1".into()).family());
        assert_eq!(Datum::Null.family(), None);
    }
}
