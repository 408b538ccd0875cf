use crate::error::{Result, VectorStoreError};
use ndarray::{Array1, Array2, ArrayView1};
use std::cmp::Ordering;

/// Dense row-per-section matrix of unit vectors (brute-force search)
#[derive(Debug, Clone)]
pub struct VectorIndex {
    matrix: Array2<f32>,
}

impl VectorIndex {
    /// Stack `vectors` as rows; every row must share one dimension
    pub fn from_vectors(vectors: &[Vec<f32>], dimension: usize) -> Result<Self> {
        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for vector in vectors {
            if vector.len() != dimension {
                return Err(VectorStoreError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
        }
        let matrix = Array2::from_shape_vec((vectors.len(), dimension), flat)
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        Ok(Self { matrix })
    }

    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn row(&self, idx: usize) -> Option<ArrayView1<'_, f32>> {
        (idx < self.len()).then(|| self.matrix.row(idx))
    }

    /// Dot product of `query` with every row
    pub fn similarities(&self, query: &[f32]) -> Result<Array1<f32>> {
        if query.len() != self.dimension() {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        Ok(self.matrix.dot(&ArrayView1::from(query)))
    }

    /// Top `k` of `candidates` by similarity, descending, ties to the lower row.
    /// Returns `(row, score)`.
    pub fn top_k(&self, query: &[f32], candidates: &[usize], k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let sims = self.similarities(query)?;
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .filter(|&&i| i < sims.len())
            .map(|&i| (i, sims[i]))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn top_k_orders_by_score_then_row() {
        let index = VectorIndex::from_vectors(
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.6, 0.8, 0.0],
            ],
            3,
        )
        .unwrap();
        assert_eq!(index.len(), 4);

        let results = index.top_k(&[1.0, 0.0, 0.0], &[0, 1, 2, 3], 3).unwrap();
        let rows: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(rows, vec![0, 2, 3]);
        assert!((results[2].1 - 0.6).abs() < 1e-6);

        let restricted = index.top_k(&[1.0, 0.0, 0.0], &[1, 3], 5).unwrap();
        assert_eq!(restricted.len(), 2);
        assert_eq!(restricted[0].0, 3);
    }

    #[test]
    fn dimension_mismatch() {
        let err = VectorIndex::from_vectors(&[vec![1.0, 0.0], vec![1.0]], 2).unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidDimension { expected: 2, actual: 1 }));

        let index = VectorIndex::from_vectors(&[vec![1.0, 0.0, 0.0]], 3).unwrap();
        assert!(index.similarities(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn empty_index() {
        let index = VectorIndex::from_vectors(&[], 8).unwrap();
        assert!(index.is_empty());
        assert!(index.top_k(&[0.0; 8], &[], 3).unwrap().is_empty());
    }
}
