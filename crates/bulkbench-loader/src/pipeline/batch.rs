//! Fixed-size batch accumulation

use super::types::{Batch, Row};

/// Buffers rows into batches of `batch_size`.
///
/// A sealed batch owns its rows outright. The accumulator allocates fresh
/// storage for the next batch, so nothing it holds afterwards aliases a batch
/// that has been handed to a worker.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    arity: usize,
    next_number: u64,
    open: Vec<Row>,
}

impl BatchAccumulator {
    /// `batch_size` must be non-zero; configuration validation rejects zero.
    pub fn new(batch_size: usize, arity: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            arity,
            next_number: 1,
            open: Vec::with_capacity(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows buffered in the open batch
    pub fn pending(&self) -> usize {
        self.open.len()
    }

    /// Append a row; returns the sealed batch when it reaches `batch_size`
    pub fn add(&mut self, row: Row) -> Option<Batch> {
        self.open.push(row);
        if self.open.len() >= self.batch_size {
            Some(self.seal())
        } else {
            None
        }
    }

    /// End of stream: the trailing batch, if any rows are left over
    pub fn finish(mut self) -> Option<Batch> {
        if self.open.is_empty() {
            None
        } else {
            Some(self.seal())
        }
    }

    fn seal(&mut self) -> Batch {
        let rows = std::mem::replace(&mut self.open, Vec::with_capacity(self.batch_size));
        let batch = Batch::new(self.next_number, self.arity, rows);
        self.next_number += 1;
        batch
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(i: usize) -> Row {
        vec![i.to_string(), format!("name-{}", i)]
    }

    #[test]
    fn test_seals_at_batch_size() {
        let mut acc = BatchAccumulator::new(2, 2);
        assert!(acc.add(row(1)).is_none());
        let batch = acc.add(row(2)).expect("full batch");
        assert_eq!(batch.number(), 1);
        assert_eq!(batch.rows(), &[row(1), row(2)]);
        assert_eq!(acc.pending(), 0);

        assert!(acc.add(row(3)).is_none());
        let trailing = acc.finish().expect("trailing batch");
        assert_eq!(trailing.number(), 2);
        assert_eq!(trailing.rows(), &[row(3)]);
    }

    #[test]
    fn test_no_trailing_batch_on_exact_multiple() {
        let mut acc = BatchAccumulator::new(3, 2);
        let full: Vec<Batch> = (1..=6).filter_map(|i| acc.add(row(i))).collect();
        assert_eq!(full.len(), 2);
        assert!(acc.finish().is_none());
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let acc = BatchAccumulator::new(2000, 4);
        assert!(acc.finish().is_none());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let mut acc = BatchAccumulator::new(0, 1);
        assert_eq!(acc.batch_size(), 1);
        assert!(acc.add(row(1)).is_some());
    }

    proptest! {
        #[test]
        fn prop_batches_conserve_rows_and_order(n in 0usize..500, b in 1usize..64) {
            let mut acc = BatchAccumulator::new(b, 2);
            let mut full = Vec::new();
            for i in 0..n {
                if let Some(batch) = acc.add(row(i)) {
                    full.push(batch);
                }
            }
            let trailing = acc.finish();

            prop_assert_eq!(full.len(), n / b);
            for batch in &full {
                prop_assert_eq!(batch.len(), b);
            }
            match &trailing {
                Some(t) => {
                    prop_assert!(t.len() >= 1 && t.len() < b);
                    prop_assert_eq!(t.len(), n % b);
                }
                None => prop_assert_eq!(n % b, 0),
            }

            let replayed: Vec<Row> = full
                .into_iter()
                .chain(trailing)
                .flat_map(Batch::into_rows)
                .collect();
            let expected: Vec<Row> = (0..n).map(row).collect();
            prop_assert_eq!(replayed, expected);
        }
    }
}
