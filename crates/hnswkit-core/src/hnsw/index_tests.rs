//! Tests for the `HnswIndex` facade.

use super::index::HnswIndex;
use super::params::{HnswParams, SearchQuality, DEFAULT_EF};
use crate::config::HnswKitConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, ErrorKind};
use std::time::Duration;

fn grid_index(side: usize) -> HnswIndex {
    let index = HnswIndex::with_params(
        2,
        DistanceMetric::L2,
        HnswParams::custom(8, 64, side * side),
    )
    .expect("index");
    for x in 0..side {
        for y in 0..side {
            index
                .insert((x * side + y) as u64, &[x as f32, y as f32])
                .expect("insert");
        }
    }
    index
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_concrete_three_point_scenario() {
    // Arrange
    let index =
        HnswIndex::with_params(4, DistanceMetric::L2, HnswParams::custom(16, 200, 10)).expect("index");
    index.insert(1, &[0.0, 0.0, 0.0, 0.0]).expect("insert");
    index.insert(2, &[1.0, 0.0, 0.0, 0.0]).expect("insert");
    index.insert(3, &[0.0, 1.0, 0.0, 0.0]).expect("insert");

    // Act
    let hits = index.search_with_ef(&[0.0, 0.0, 0.0, 0.0], 1, 10).expect("search");

    // Assert
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[0].distance, 0.0);
}

#[test]
fn test_zero_dimension_rejected() {
    let result = HnswIndex::new(0, DistanceMetric::L2);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_params_rejected() {
    let result = HnswIndex::with_params(4, DistanceMetric::L2, HnswParams::custom(1, 10, 10));

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_from_config_applies_every_section() {
    // Arrange
    let mut config = HnswKitConfig::default();
    config.index.dimension = 8;
    config.index.metric = DistanceMetric::Cosine;
    config.index.max_elements = 64;
    config.index.allow_replace_deleted = true;
    config.search.ef = 32;
    config.search.concurrency = 2;
    config.runtime.resize_timeout_ms = 250;

    // Act
    let index = HnswIndex::from_config(&config).expect("index");

    // Assert
    assert_eq!(index.dimension(), 8);
    assert_eq!(index.metric(), DistanceMetric::Cosine);
    assert_eq!(index.max_elements(), 64);
    assert!(index.allow_replace_deleted());
    assert_eq!(index.ef(), 32);
    assert_eq!(index.concurrency(), 2);
    assert_eq!(index.resize_timeout(), Duration::from_millis(250));
}

#[test]
fn test_from_config_rejects_invalid_config() {
    let mut config = HnswKitConfig::default();
    config.search.ef = 0;

    let err = HnswIndex::from_config(&config).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_params_report_current_capacity() {
    let index =
        HnswIndex::with_params(2, DistanceMetric::L2, HnswParams::custom(12, 80, 5)).expect("index");

    index.resize(50).expect("resize");
    let params = index.params();

    assert_eq!(params.max_elements, 50);
    assert_eq!(params.max_connections, 12);
    assert_eq!(params.ef_construction, 80);
}

#[test]
fn test_debug_output_names_shape() {
    let index = HnswIndex::new(3, DistanceMetric::InnerProduct).expect("index");

    let debug = format!("{index:?}");

    assert!(debug.contains("HnswIndex"));
    assert!(debug.contains("dimension: 3"));
}

// =========================================================================
// Insertion
// =========================================================================

#[test]
fn test_insert_wrong_dimension_leaves_index_unchanged() {
    let index = HnswIndex::new(3, DistanceMetric::L2).expect("index");

    let result = index.insert(1, &[1.0, 2.0]);

    assert!(matches!(
        result,
        Err(Error::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(index.current_count(), 0);
}

#[test]
fn test_insert_non_finite_rejected() {
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");

    let result = index.insert(1, &[f32::NAN, 0.0]);

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(index.is_empty());
}

#[test]
fn test_upsert_keeps_one_live_point_with_latest_vector() {
    // Arrange
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");
    index.insert(9, &[1.0, 1.0]).expect("insert");

    // Act
    index.insert(9, &[4.0, -2.0]).expect("upsert");

    // Assert
    assert_eq!(index.len(), 1);
    assert_eq!(index.current_count(), 1);
    assert_eq!(index.get_vector(9).expect("vector"), vec![4.0, -2.0]);
}

#[test]
fn test_add_points_rejects_empty_and_mismatched_batches() {
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");

    assert!(matches!(
        index.add_points(&[], &[], 1, false),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        index.add_points(&[vec![0.0, 0.0]], &[1, 2], 1, false),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_add_points_replace_deleted_requires_reuse() {
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");

    let result = index.add_points(&[vec![0.0, 0.0]], &[1], 1, true);

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(index.is_empty());
}

#[test]
fn test_add_points_validates_all_vectors_first() {
    // Arrange
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");
    let vectors = vec![vec![0.0, 0.0], vec![1.0], vec![2.0, 2.0]];

    // Act
    let err = index.add_points(&vectors, &[1, 2, 3], 1, false).unwrap_err();

    // Assert
    match err {
        Error::Batch { index: at, source } => {
            assert_eq!(at, 1);
            assert!(matches!(*source, Error::DimensionMismatch { .. }));
        }
        other => panic!("expected batch error, got {other:?}"),
    }
    assert_eq!(index.current_count(), 0);
}

#[test]
fn test_add_points_capacity_failure_keeps_committed_points() {
    // Arrange
    let index =
        HnswIndex::with_params(1, DistanceMetric::L2, HnswParams::custom(4, 10, 3)).expect("index");
    let vectors: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32]).collect();

    // Act
    let err = index
        .add_points(&vectors, &[10, 11, 12, 13, 14], 1, false)
        .unwrap_err();

    // Assert
    assert!(matches!(err, Error::Batch { index: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::Capacity);
    assert_eq!(index.labels(), vec![10, 11, 12]);
}

#[test]
fn test_parallel_capacity_failure_keeps_every_earlier_point() {
    let vectors: Vec<Vec<f32>> = (0..200).map(|i| vec![i as f32, (i % 7) as f32]).collect();
    let labels: Vec<u64> = (0..200).collect();

    for round in 0..20 {
        // Arrange
        let index = HnswIndex::with_params(2, DistanceMetric::L2, HnswParams::custom(4, 16, 20))
            .expect("index");

        // Act
        let err = index.add_points(&vectors, &labels, 8, false).unwrap_err();

        // Assert
        let Error::Batch { index: at, .. } = &err else {
            panic!("expected batch error, got {err:?}");
        };
        assert_eq!(err.kind(), ErrorKind::Capacity, "round {round}");
        assert!(*at <= 20, "round {round}: failed at {at}");
        let committed = index.labels();
        for label in 0..*at as u64 {
            assert!(
                committed.contains(&label),
                "round {round}: label {label} below failing item {at} is missing"
            );
        }
        assert_eq!(index.current_count(), 20, "round {round}");
    }
}

#[test]
fn test_add_points_parallel_matches_sequential() {
    let vectors: Vec<Vec<f32>> = (0..200)
        .map(|i| vec![(i % 20) as f32, (i / 20) as f32])
        .collect();
    let labels: Vec<u64> = (0..200).collect();

    for concurrency in [0, 1, 4] {
        let index = HnswIndex::with_params(2, DistanceMetric::L2, HnswParams::custom(8, 64, 200))
            .expect("index");
        index
            .add_points(&vectors, &labels, concurrency, false)
            .expect("batch");

        assert_eq!(index.len(), 200, "concurrency {concurrency}");
        index.check_integrity().expect("valid graph");
        let hits = index.search_with_ef(&[5.0, 5.0], 1, 64).expect("search");
        assert_eq!(hits[0].label, 105, "concurrency {concurrency}");
    }
}

#[test]
fn test_add_points_reuses_tombstoned_slots() {
    // Arrange
    let params = HnswParams::custom(8, 40, 4).with_slot_reuse(true);
    let index = HnswIndex::with_params(2, DistanceMetric::L2, params).expect("index");
    index
        .add_points(
            &[vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]],
            &[1, 2, 3, 4],
            1,
            false,
        )
        .expect("fill");
    index.mark_deleted(2).expect("mark");
    index.mark_deleted(3).expect("mark");

    // Act
    index
        .add_points(&[vec![7.0, 7.0], vec![8.0, 8.0]], &[20, 21], 1, true)
        .expect("reuse");

    // Assert
    assert_eq!(index.current_count(), 4);
    assert_eq!(index.labels(), vec![1, 4, 20, 21]);
    assert_eq!(index.deleted_count(), 0);
}

// =========================================================================
// Search
// =========================================================================

#[test]
fn test_search_k_zero_is_config_error() {
    let index = grid_index(3);

    assert!(matches!(index.search(&[0.0, 0.0], 0), Err(Error::Config(_))));
}

#[test]
fn test_search_ef_below_k_is_config_error() {
    let index = grid_index(3);

    let result = index.search_with_ef(&[0.0, 0.0], 5, 4);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_search_query_dimension_mismatch() {
    let index = grid_index(3);

    let result = index.search(&[0.0, 0.0, 0.0], 1);

    assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
}

#[test]
fn test_search_on_empty_index_returns_nothing() {
    let index = HnswIndex::new(2, DistanceMetric::L2).expect("index");

    assert!(index.search(&[0.0, 0.0], 3).expect("search").is_empty());
}

#[test]
fn test_search_returns_fewer_when_index_is_small() {
    let index = grid_index(2);

    let hits = index.search(&[0.0, 0.0], 10).expect("search");

    assert_eq!(hits.len(), 4);
}

#[test]
fn test_default_ef_raised_to_k() {
    // Arrange
    let index = grid_index(6);
    assert_eq!(index.ef(), DEFAULT_EF);

    // Act
    let hits = index.search(&[2.0, 2.0], 20).expect("search");

    // Assert
    assert_eq!(hits.len(), 20);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_set_ef_rejects_zero() {
    let index = grid_index(2);

    assert!(matches!(index.set_ef(0), Err(Error::Config(_))));
    index.set_ef(64).expect("set ef");
    assert_eq!(index.ef(), 64);
}

#[test]
fn test_search_with_quality_profiles() {
    let index = grid_index(8);

    for quality in [
        SearchQuality::Fast,
        SearchQuality::Balanced,
        SearchQuality::Accurate,
        SearchQuality::HighRecall,
        SearchQuality::Custom(48),
    ] {
        let hits = index
            .search_with_quality(&[3.0, 4.0], 5, quality)
            .expect("search");
        assert_eq!(hits.len(), 5, "{quality:?}");
        assert_eq!(hits[0].label, 3 * 8 + 4, "{quality:?}");
    }
}

#[test]
fn test_search_filtered_only_returns_accepted_labels() {
    let index = grid_index(6);

    let hits = index
        .search_filtered(&[0.0, 0.0], 3, Some(36), |label| label >= 30)
        .expect("search");

    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.label >= 30));
    assert_eq!(hits[0].label, 30);
}

#[test]
fn test_search_batch_preserves_query_order() {
    // Arrange
    let index = grid_index(5);
    let queries: Vec<Vec<f32>> = (0..25)
        .rev()
        .map(|i| vec![(i / 5) as f32, (i % 5) as f32])
        .collect();

    for concurrency in [0, 1, 4] {
        // Act
        let results = index
            .search_batch(&queries, 1, Some(25), concurrency)
            .expect("batch search");

        // Assert
        let labels: Vec<u64> = results.iter().map(|hits| hits[0].label).collect();
        assert_eq!(labels, (0..25).rev().collect::<Vec<u64>>());
    }
}

#[test]
fn test_search_batch_names_first_invalid_query() {
    let index = grid_index(3);
    let queries = vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![1.0]];

    let err = index.search_batch(&queries, 1, None, 1).unwrap_err();

    assert!(matches!(err, Error::Batch { index: 2, .. }));
}

#[test]
fn test_inner_product_ranks_by_dot_product() {
    let index = HnswIndex::new(2, DistanceMetric::InnerProduct).expect("index");
    index.insert(1, &[1.0, 0.0]).expect("insert");
    index.insert(2, &[0.0, 1.0]).expect("insert");
    index.insert(3, &[0.7, 0.7]).expect("insert");

    let hits = index.search_with_ef(&[1.0, 0.2], 3, 10).expect("search");

    assert_eq!(hits[0].label, 1);
    assert_eq!(hits[2].label, 2);
}

#[test]
fn test_cosine_stores_normalized_vectors() {
    // Arrange
    let index = HnswIndex::new(2, DistanceMetric::Cosine).expect("index");
    index.insert(1, &[3.0, 4.0]).expect("insert");
    index.insert(2, &[-4.0, 3.0]).expect("insert");

    // Act
    let stored = index.get_vector(1).expect("vector");
    let hits = index.search_with_ef(&[30.0, 40.0], 2, 10).expect("search");

    // Assert
    assert!((stored[0] - 0.6).abs() < 1e-6);
    assert!((stored[1] - 0.8).abs() < 1e-6);
    assert_eq!(hits[0].label, 1);
    assert!(hits[0].distance.abs() < 1e-6);
    assert!((hits[1].distance - 1.0).abs() < 1e-6);
}

// =========================================================================
// Tombstones and introspection
// =========================================================================

#[test]
fn test_mark_deleted_excludes_and_unmark_restores() {
    // Arrange
    let index = grid_index(4);

    // Act
    index.mark_deleted(5).expect("mark");
    let hidden = index.search_with_ef(&[1.0, 1.0], 4, 16).expect("search");
    index.unmark_deleted(5);
    let restored = index.search_with_ef(&[1.0, 1.0], 1, 16).expect("search");

    // Assert
    assert!(hidden.iter().all(|h| h.label != 5));
    assert_eq!(restored[0].label, 5);
}

#[test]
fn test_introspection_tracks_tombstones() {
    let index = grid_index(3);

    index.mark_deleted(4).expect("mark");

    assert_eq!(index.current_count(), 9);
    assert_eq!(index.len(), 8);
    assert_eq!(index.deleted_count(), 1);
    assert!(!index.contains(4));
    assert!(index.contains(3));
    assert!(!index.contains(99));
    assert!(!index.labels().contains(&4));
}

#[test]
fn test_get_vector_not_found_for_unknown_or_deleted() {
    let index = grid_index(2);
    index.mark_deleted(1).expect("mark");

    assert!(matches!(index.get_vector(1), Err(Error::NotFound(1))));
    assert!(matches!(index.get_vector(42), Err(Error::NotFound(42))));
    assert_eq!(index.get_vector(3).expect("vector"), vec![1.0, 1.0]);
}

#[test]
fn test_mark_deleted_unknown_label_is_not_found() {
    let index = grid_index(2);

    assert_eq!(index.mark_deleted(77).unwrap_err().kind(), ErrorKind::NotFound);
}

// =========================================================================
// Capacity
// =========================================================================

#[test]
fn test_capacity_boundary_and_resize() {
    // Arrange
    let index =
        HnswIndex::with_params(2, DistanceMetric::L2, HnswParams::custom(4, 10, 2)).expect("index");
    index.insert(1, &[0.0, 0.0]).expect("insert");
    index.insert(2, &[1.0, 0.0]).expect("insert");

    // Act
    let full = index.insert(3, &[2.0, 0.0]);
    index.resize(3).expect("resize");
    let after = index.insert(3, &[2.0, 0.0]);

    // Assert
    assert_eq!(full.unwrap_err().kind(), ErrorKind::Capacity);
    assert!(after.is_ok());
    assert_eq!(index.max_elements(), 3);
}

#[test]
fn test_resize_timeout_is_configurable() {
    let mut index = HnswIndex::new(2, DistanceMetric::L2).expect("index");

    index.set_resize_timeout(Duration::from_millis(10));

    assert_eq!(index.resize_timeout(), Duration::from_millis(10));
}

// =========================================================================
// Persistence
// =========================================================================

#[test]
fn test_bytes_roundtrip_reproduces_results() {
    // Arrange
    let index = grid_index(6);
    index.mark_deleted(7).expect("mark");
    let bytes = index.to_bytes().expect("encode");

    // Act
    let loaded =
        HnswIndex::from_bytes(&bytes, 2, DistanceMetric::L2, HnswParams::custom(8, 64, 36))
            .expect("decode");

    // Assert
    assert_eq!(index.serialized_size(), bytes.len());
    assert_eq!(loaded.len(), 35);
    for query in [[0.5, 0.5], [2.2, 3.9], [5.0, 0.0]] {
        assert_eq!(
            loaded.search_with_ef(&query, 5, 20).expect("search"),
            index.search_with_ef(&query, 5, 20).expect("search")
        );
    }
}

#[test]
fn test_save_load_file_roundtrip() {
    // Arrange
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("grid.hnsw");
    let index = grid_index(5);

    // Act
    let size = index.save(&path).expect("save");
    let loaded = HnswIndex::load(&path, 2, DistanceMetric::L2, HnswParams::custom(8, 64, 25))
        .expect("load");

    // Assert
    assert_eq!(size as usize, index.serialized_size());
    assert_eq!(loaded.labels(), index.labels());
    assert_eq!(loaded.ef(), DEFAULT_EF);
}

#[test]
fn test_load_rejects_shape_mismatch() {
    let bytes = grid_index(2).to_bytes().expect("encode");

    let wrong_dim = HnswIndex::from_bytes(&bytes, 3, DistanceMetric::L2, HnswParams::default());
    let wrong_metric =
        HnswIndex::from_bytes(&bytes, 2, DistanceMetric::Cosine, HnswParams::default());

    assert_eq!(wrong_dim.unwrap_err().kind(), ErrorKind::Format);
    assert_eq!(wrong_metric.unwrap_err().kind(), ErrorKind::Format);
}

// =========================================================================
// Property-based tests
// =========================================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn dataset() -> impl Strategy<Value = Vec<Vec<f32>>> {
        prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 3), 1..40)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_results_sorted_unique_and_bounded(data in dataset(), k in 1usize..10) {
            let index = HnswIndex::with_params(
                3,
                DistanceMetric::L2,
                HnswParams::custom(8, 50, data.len()),
            ).expect("index");
            for (i, v) in data.iter().enumerate() {
                index.insert(i as u64, v).expect("insert");
            }

            let hits = index.search_with_ef(&data[0], k, k.max(40)).expect("search");

            prop_assert_eq!(hits.len(), k.min(data.len()));
            prop_assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
            let mut labels: Vec<u64> = hits.iter().map(|h| h.label).collect();
            labels.sort_unstable();
            labels.dedup();
            prop_assert_eq!(labels.len(), hits.len());
            prop_assert!(hits[0].distance.abs() < 1e-4);
        }

        #[test]
        fn prop_tombstoned_labels_never_returned(
            data in dataset(),
            deleted in prop::collection::vec(any::<bool>(), 40),
        ) {
            let index = HnswIndex::with_params(
                3,
                DistanceMetric::L2,
                HnswParams::custom(8, 50, data.len()),
            ).expect("index");
            for (i, v) in data.iter().enumerate() {
                index.insert(i as u64, v).expect("insert");
            }
            for (i, _) in data.iter().enumerate().filter(|(i, _)| deleted[*i]) {
                index.mark_deleted(i as u64).expect("mark");
            }

            let hits = index.search_with_ef(&[0.0, 0.0, 0.0], 10, 40).expect("search");

            prop_assert!(hits.iter().all(|h| !deleted[h.label as usize]));
            prop_assert_eq!(index.len() + index.deleted_count(), data.len());
            index.check_integrity().expect("valid graph");
        }
    }
}
