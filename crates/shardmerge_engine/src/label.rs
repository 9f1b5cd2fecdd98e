use std::collections::HashMap;

use shardmerge_common::error::{MergeError, MergeResult};

use crate::shape::ColumnRef;
use crate::source::RowSource;

/// Case-insensitive column label → 1-based column position, built from the
/// first shard's metadata. Every shard ran the same rewritten statement, so
/// the index is valid for all of them once [`Self::check_source`] passes.
#[derive(Debug, Clone)]
pub struct ColumnLabelIndex {
    labels: Vec<String>,
    positions: HashMap<String, usize>,
}

/// Strip identifier quoting: `` `name` ``, `"name"`, `[name]`.
fn exact_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
        .collect()
}

impl ColumnLabelIndex {
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let labels: Vec<String> = labels.iter().map(|l| exact_label(l.as_ref())).collect();
        let mut positions = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            // First occurrence wins for duplicated labels.
            positions.entry(label.to_lowercase()).or_insert(i + 1);
        }
        Self { labels, positions }
    }

    pub fn from_source(source: &dyn RowSource) -> MergeResult<Self> {
        let labels = (1..=source.column_count())
            .map(|i| source.column_label(i))
            .collect::<MergeResult<Vec<_>>>()?;
        Ok(Self::from_labels(&labels))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 1-based position of `label`, if present.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.positions.get(&exact_label(label).to_lowercase()).copied()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }

    /// Resolve a column reference to its 1-based position.
    pub fn resolve(&self, column: &ColumnRef) -> MergeResult<usize> {
        match column {
            ColumnRef::Index(i) if *i >= 1 && *i <= self.len() => Ok(*i),
            ColumnRef::Index(i) => Err(MergeError::Configuration(format!(
                "column index {} out of range 1..={}",
                i,
                self.len()
            ))),
            ColumnRef::Label(label) => self.get(label).ok_or_else(|| {
                MergeError::Configuration(format!("unknown column label '{}'", label))
            }),
        }
    }

    /// Verify that `source` has the same column shape as the indexed one.
    pub fn check_source(&self, shard: usize, source: &dyn RowSource) -> MergeResult<()> {
        if source.column_count() != self.len() {
            return Err(MergeError::Configuration(format!(
                "shard {} returned {} columns, expected {}",
                shard,
                source.column_count(),
                self.len()
            )));
        }
        for (i, expected) in self.labels.iter().enumerate() {
            let got = exact_label(&source.column_label(i + 1)?);
            if got.to_lowercase() != expected.to_lowercase() {
                return Err(MergeError::Configuration(format!(
                    "shard {} column {} is '{}', expected '{}'",
                    shard,
                    i + 1,
                    got,
                    expected
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryRowSource;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let index = ColumnLabelIndex::from_labels(&["ID", "user_name", "`Amount`"]);
        assert_eq!(index.get("id"), Some(1));
        assert_eq!(index.get("USER_NAME"), Some(2));
        assert_eq!(index.get("amount"), Some(3));
        assert_eq!(index.get("\"amount\""), Some(3));
        assert_eq!(index.get("missing"), None);
        assert_eq!(index.label(3), Some("Amount"));
        assert_eq!(index.label(0), None);
    }

    #[test]
    fn test_duplicate_label_keeps_first_position() {
        let index = ColumnLabelIndex::from_labels(&["a", "b", "A"]);
        assert_eq!(index.get("a"), Some(1));
    }

    #[test]
    fn test_resolve() {
        let index = ColumnLabelIndex::from_labels(&["dept", "salary"]);
        assert_eq!(index.resolve(&ColumnRef::Label("SALARY".into())).unwrap(), 2);
        assert_eq!(index.resolve(&ColumnRef::Index(1)).unwrap(), 1);
        assert!(index.resolve(&ColumnRef::Index(0)).is_err());
        assert!(index.resolve(&ColumnRef::Index(3)).is_err());
        assert!(matches!(
            index.resolve(&ColumnRef::Label("bonus".into())),
            Err(MergeError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_source_shape() {
        let index = ColumnLabelIndex::from_labels(&["dept", "salary"]);
        let same = MemoryRowSource::new(vec!["DEPT", "Salary"], vec![]);
        assert!(index.check_source(1, &same).is_ok());

        let fewer = MemoryRowSource::new(vec!["dept"], vec![]);
        assert!(matches!(index.check_source(1, &fewer), Err(MergeError::Configuration(_))));

        let renamed = MemoryRowSource::new(vec!["dept", "bonus"], vec![]);
        let err = index.check_source(2, &renamed).unwrap_err();
        assert!(err.to_string().contains("shard 2"));
    }
}
