//! Training-alphabet to evaluation-alphabet index folding.

use crate::error::{MetricError, Result};
use crate::phoneme::PhonemeInventory;

/// Precomputed many-to-one map from training indices to evaluation indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelFolder {
    table: Vec<usize>,
    groups: Vec<String>,
}

impl LabelFolder {
    /// Build the table from the inventory's evaluation fold.
    ///
    /// # Errors
    ///
    /// [`crate::error::DataError::UnknownSymbol`] if a training symbol folds
    /// to something outside the evaluation alphabet.
    pub fn new(inventory: &PhonemeInventory) -> Result<Self> {
        let table = inventory
            .training_symbols()
            .iter()
            .map(|symbol| inventory.evaluation_index(inventory.fold_evaluation_symbol(symbol)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            table,
            groups: inventory.evaluation_symbols().to_vec(),
        })
    }

    /// Training alphabet size.
    pub fn num_classes(&self) -> usize {
        self.table.len()
    }

    /// Evaluation alphabet size.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Evaluation symbols in index order.
    pub fn group_symbols(&self) -> &[String] {
        &self.groups
    }

    pub fn fold(&self, index: usize) -> Result<usize> {
        self.table.get(index).copied().ok_or_else(|| {
            MetricError::LabelOutOfRange {
                label: index,
                classes: self.table.len(),
            }
            .into()
        })
    }

    pub fn fold_sequence(&self, indices: &[usize]) -> Result<Vec<usize>> {
        indices.iter().map(|&i| self.fold(i)).collect()
    }
}
