//! Property tests for flat index search ordering and dimensionality.

use dreamlens_rag::error::RagError;
use dreamlens_rag::index::FlatL2Index;
use proptest::prelude::*;

const DIM: usize = 16;

/// Generate an embedding of the given dimension with bounded components.
fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim)
}

/// *For any* set of vectors stored in a [`FlatL2Index`], searching with
/// a query embedding SHALL return `(position, distance)` pairs ordered
/// by non-decreasing squared L2 distance, with at most `min(k, n)`
/// results and every position in bounds.
mod prop_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ascending_and_bounded(
            vectors in proptest::collection::vec(arb_embedding(DIM), 1..30),
            query in arb_embedding(DIM),
            k in 1usize..40,
        ) {
            let mut index = FlatL2Index::new();
            index.add(&vectors).unwrap();

            let hits = index.search(&query, k).unwrap();

            prop_assert_eq!(hits.len(), k.min(vectors.len()));
            for (position, distance) in &hits {
                prop_assert!(*position < vectors.len());
                prop_assert!(*distance >= 0.0);
            }
            for window in hits.windows(2) {
                prop_assert!(
                    window[0].1 <= window[1].1,
                    "distances not ascending: {} > {}",
                    window[0].1,
                    window[1].1,
                );
            }
        }

        #[test]
        fn self_query_is_nearest(
            vectors in proptest::collection::vec(arb_embedding(DIM), 1..20),
        ) {
            let mut index = FlatL2Index::new();
            index.add(&vectors).unwrap();

            for target in &vectors {
                let hits = index.search(target, 1).unwrap();
                prop_assert!((hits[0].1).abs() < 1e-6, "self-distance {} not ≈ 0", hits[0].1);
            }
        }

        #[test]
        fn round_trip_preserves_search(
            vectors in proptest::collection::vec(arb_embedding(DIM), 1..20),
            query in arb_embedding(DIM),
        ) {
            let mut index = FlatL2Index::new();
            index.add(&vectors).unwrap();

            let restored = FlatL2Index::from_bytes(&index.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(
                restored.search(&query, vectors.len()).unwrap(),
                index.search(&query, vectors.len()).unwrap(),
            );
        }
    }
}

/// *For any* index whose dimensionality has been fixed by a first add,
/// adding or searching with a vector of any other length SHALL be
/// rejected with a dimension mismatch and leave the index unchanged.
mod prop_dimensionality {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn mismatched_add_rejected(
            vectors in proptest::collection::vec(arb_embedding(DIM), 1..10),
            wrong in arb_embedding(DIM - 3),
        ) {
            let mut index = FlatL2Index::new();
            index.add(&vectors).unwrap();
            let before = index.len();

            let err = index.add(&[wrong.clone()]).unwrap_err();
            prop_assert!(
                matches!(
                    err,
                    RagError::DimensionMismatch { expected: DIM, actual } if actual == wrong.len()
                ),
                "expected DimensionMismatch, got {:?}",
                err,
            );
            prop_assert_eq!(index.len(), before);

            let err = index.search(&wrong, 1).unwrap_err();
            prop_assert!(
                matches!(err, RagError::DimensionMismatch { .. }),
                "expected DimensionMismatch, got {:?}",
                err,
            );
        }
    }
}
