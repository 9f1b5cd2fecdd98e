use shardmerge_common::datum::Datum;
use shardmerge_common::error::{MergeError, MergeResult};

/// A detached copy of one result row, owned by a merger after its source
/// has moved on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedRow {
    values: Vec<Datum>,
}

impl MaterializedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell at the 0-based column `index`.
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    /// Overwrite a cell; used when writing finalized aggregates.
    pub(crate) fn set(&mut self, index: usize, value: Datum) -> MergeResult<()> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(MergeError::ColumnOutOfBounds(index + 1))?;
        *slot = value;
        Ok(())
    }
}

impl From<Vec<Datum>> for MaterializedRow {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}
