//! Índice vectorial plano en memoria.
//!
//! Búsqueda por fuerza bruta con distancia euclídea al cuadrado. El índice se
//! construye de una vez y no admite inserciones ni borrados: reconstruir
//! significa crear un índice nuevo y sustituir el anterior.

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Embedding};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub embedding: Embedding,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl VectorIndex {
    /// Construye el índice. El orden de `entries` se conserva y sólo se usa para desempatar.
    pub fn build(entries: Vec<(Embedding, Chunk)>) -> Result<Self> {
        let dimensions = match entries.first() {
            Some((embedding, _)) => embedding.len(),
            None => return Err(RagError::EmptyIndex),
        };

        if let Some((embedding, _)) = entries.iter().find(|(e, _)| e.len() != dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: embedding.len(),
            });
        }

        let entries = entries
            .into_iter()
            .map(|(embedding, chunk)| IndexEntry { embedding, chunk })
            .collect();

        Ok(Self { entries, dimensions })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Los `min(k, len)` chunks más cercanos a `query`, del más cercano al más lejano.
    pub fn search(&self, query: &[f64], k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .search_with_distance(query, k)?
            .into_iter()
            .map(|(chunk, _)| chunk.clone())
            .collect())
    }

    /// Como [`search`](Self::search), devolviendo también la distancia de cada resultado.
    pub fn search_with_distance(&self, query: &[f64], k: usize) -> Result<Vec<(&Chunk, f64)>> {
        if k == 0 {
            return Err(RagError::InvalidConfig("top_k debe ser mayor que cero".to_string()));
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(&Chunk, f64)> = self
            .entries
            .iter()
            .map(|entry| (&entry.chunk, squared_euclidean(&entry.embedding, query)))
            .collect();

        // `sort_by` es estable: a igual distancia gana el orden de inserción.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }
}

pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk(doc: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            document_id: doc.to_string(),
            index,
            text: text.to_string(),
        }
    }

    #[test]
    fn build_rejects_empty_entries() {
        assert!(matches!(VectorIndex::build(Vec::new()), Err(RagError::EmptyIndex)));
    }

    #[test]
    fn build_rejects_mixed_dimensions() {
        let result = VectorIndex::build(vec![
            (vec![0.0, 1.0], chunk("d", 0, "a")),
            (vec![0.0, 1.0, 2.0], chunk("d", 1, "b")),
        ]);
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let index = VectorIndex::build(vec![
            (vec![10.0, 0.0], chunk("d", 0, "lejos")),
            (vec![1.0, 0.0], chunk("d", 1, "cerca")),
            (vec![3.0, 0.0], chunk("d", 2, "medio")),
        ])
        .unwrap();

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        let texts: Vec<_> = results.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["cerca", "medio"]);

        let with_distance = index.search_with_distance(&[0.0, 0.0], 3).unwrap();
        assert_eq!(with_distance[0].1, 1.0);
        assert_eq!(with_distance[2].1, 100.0);
    }

    #[test]
    fn equal_distances_keep_insertion_order() {
        let index = VectorIndex::build(vec![
            (vec![1.0, 1.0], chunk("d", 0, "A")),
            (vec![1.0, 1.0], chunk("d", 1, "B")),
        ])
        .unwrap();
        let results = index.search(&[0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].text, "A");
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let index = VectorIndex::build(vec![(vec![0.5], chunk("d", 0, "solo"))]).unwrap();
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn query_dimension_mismatch_is_an_error() {
        let index = VectorIndex::build(vec![(vec![0.5, 0.5], chunk("d", 0, "x"))]).unwrap();
        assert!(matches!(
            index.search(&[0.5], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn zero_k_is_rejected() {
        let index = VectorIndex::build(vec![(vec![0.5], chunk("d", 0, "x"))]).unwrap();
        assert!(matches!(index.search(&[0.5], 0), Err(RagError::InvalidConfig(_))));
    }

    const DIM: usize = 4;

    proptest! {
        #[test]
        fn search_is_sorted_and_bounded(
            vectors in proptest::collection::vec(proptest::collection::vec(-10.0f64..10.0, DIM), 1..30),
            query in proptest::collection::vec(-10.0f64..10.0, DIM),
            k in 1usize..40,
        ) {
            let n = vectors.len();
            let entries = vectors
                .into_iter()
                .enumerate()
                .map(|(i, v)| (v, chunk("p", i, &format!("c{i}"))))
                .collect();
            let index = VectorIndex::build(entries).unwrap();
            let results = index.search_with_distance(&query, k).unwrap();

            prop_assert_eq!(results.len(), k.min(n));
            for pair in results.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].1);
                if pair[0].1 == pair[1].1 {
                    prop_assert!(pair[0].0.index < pair[1].0.index);
                }
            }
        }
    }
}
