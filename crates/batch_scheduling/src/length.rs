//! Arity-generic storage for per-sample sequence lengths.

use crate::error::{Error, Result};

/// Row-major matrix of per-sample sequence lengths.
///
/// Scalar datasets have arity 1; multi-attribute datasets (e.g. source and
/// target lengths of a translation pair) have a fixed arity > 1. The arity is
/// constant across the dataset, so bucketing code can treat both cases as the
/// same per-dimension computation.
///
/// Construction validates that the table is non-empty, every row has the same
/// arity, and every length is strictly positive.
///
/// # Example
/// ```ignore
/// let scalars = LengthTable::from_scalars(vec![12, 7, 31])?;
/// let pairs = LengthTable::from_tuples(vec![vec![12, 14], vec![7, 9]])?;
/// ```
#[derive(Debug, Clone)]
pub struct LengthTable {
    data: Vec<i64>,
    arity: usize,
}

impl LengthTable {
    /// Builds a table of scalar lengths (arity 1).
    pub fn from_scalars(lengths: Vec<i64>) -> Result<Self> {
        Self::validated(lengths, 1)
    }

    /// Builds a table of fixed-arity length tuples.
    pub fn from_tuples(lengths: Vec<Vec<i64>>) -> Result<Self> {
        let arity = match lengths.first() {
            Some(row) if !row.is_empty() => row.len(),
            Some(_) => return Err(Error::config("length tuples must not be empty")),
            None => return Err(Error::config("lengths must not be empty")),
        };
        let mut data = Vec::with_capacity(lengths.len() * arity);
        for (sample_id, row) in lengths.iter().enumerate() {
            if row.len() != arity {
                return Err(Error::config(format!(
                    "length tuple for sample {} has {} attributes, expected {}",
                    sample_id,
                    row.len(),
                    arity
                )));
            }
            data.extend_from_slice(row);
        }
        Self::validated(data, arity)
    }

    fn validated(data: Vec<i64>, arity: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::config("lengths must not be empty"));
        }
        if let Some(&bad) = data.iter().find(|&&v| v <= 0) {
            return Err(Error::config(format!(
                "sequence lengths must all be larger than 0, got {}",
                bad
            )));
        }
        Ok(Self { data, arity })
    }

    /// Number of samples in the table.
    pub fn num_samples(&self) -> usize {
        self.data.len() / self.arity
    }

    /// Number of length attributes per sample.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The length row for one sample.
    pub fn row(&self, sample_id: usize) -> &[i64] {
        &self.data[sample_id * self.arity..(sample_id + 1) * self.arity]
    }

    /// Iterates over all length rows in sample order.
    pub fn rows(&self) -> impl Iterator<Item = &[i64]> {
        self.data.chunks_exact(self.arity)
    }

    /// Per-attribute maximum over all samples.
    pub fn max_lengths(&self) -> Vec<i64> {
        let mut max = self.row(0).to_vec();
        for row in self.rows().skip(1) {
            for (current, &value) in max.iter_mut().zip(row) {
                if value > *current {
                    *current = value;
                }
            }
        }
        max
    }

    /// Per-attribute minimum over all samples.
    pub fn min_lengths(&self) -> Vec<i64> {
        let mut min = self.row(0).to_vec();
        for row in self.rows().skip(1) {
            for (current, &value) in min.iter_mut().zip(row) {
                if value < *current {
                    *current = value;
                }
            }
        }
        min
    }
}

/// Renders length or key rows the way they were supplied: scalars for arity 1,
/// parenthesized tuples otherwise.
pub(crate) fn format_rows(rows: &[Vec<i64>]) -> String {
    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            if row.len() == 1 {
                row[0].to_string()
            } else {
                let parts: Vec<String> = row.iter().map(i64::to_string).collect();
                format!("({})", parts.join(", "))
            }
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}
