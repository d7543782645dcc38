//! Feature table and supervised pairing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One surviving bar of the feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Position of the source bar in the original history.
    pub bar_index: usize,
    pub values: Vec<f64>,
}

/// Ordered columns plus rows with every value defined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    names: Vec<String>,
    rows: Vec<FeatureRow>,
}

/// Feature matrix with next-bar labels.
#[derive(Debug, Clone, Default)]
pub struct SupervisedSet {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub dates: Vec<NaiveDate>,
}

impl SupervisedSet {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Contiguous sub-range, used for chronological splits.
    pub fn slice(&self, range: std::ops::Range<usize>) -> SupervisedSet {
        SupervisedSet {
            x: self.x[range.clone()].to_vec(),
            y: self.y[range.clone()].to_vec(),
            dates: self.dates[range].to_vec(),
        }
    }
}

impl FeatureTable {
    pub fn new(names: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        debug_assert!(rows.iter().all(|r| r.values.len() == names.len()));
        Self { names, rows }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    /// Pair each row with the `target` value of the next source bar.
    ///
    /// The label comes from the following table row, and only when that row's
    /// `bar_index` is exactly one greater. The last row never has a label.
    /// Returns `None` for an unknown target column.
    pub fn supervised(&self, target: &str) -> Option<SupervisedSet> {
        let target_idx = self.column_index(target)?;
        let mut set = SupervisedSet::default();
        for pair in self.rows.windows(2) {
            let (row, next) = (&pair[0], &pair[1]);
            if next.bar_index != row.bar_index + 1 {
                continue;
            }
            set.x.push(row.values.clone());
            set.y.push(next.values[target_idx]);
            set.dates.push(row.date);
        }
        Some(set)
    }
}
