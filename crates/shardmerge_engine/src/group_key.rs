use std::fmt;
use std::hash::{Hash, Hasher};

use shardmerge_common::datum::Datum;

/// Values of the GROUP BY columns for one row.
///
/// Components compare with SQL value equality (Int32(2) == Decimal(200, 2)),
/// except that NULL equals NULL: all NULL keys fall into one group. Hashing
/// goes through `Datum`'s canonical form so equal keys hash equal.
#[derive(Debug, Clone, Default)]
pub struct GroupKey {
    values: Vec<Datum>,
}

impl GroupKey {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }
}

fn component_eq(a: &Datum, b: &Datum) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (false, false) => a == b,
        _ => false,
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| component_eq(a, b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.len().hash(state);
        for value in &self.values {
            value.hash(state);
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}
