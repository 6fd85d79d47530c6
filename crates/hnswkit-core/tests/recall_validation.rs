//! Recall quality validation against brute-force ground truth.
//!
//! # Recall Definition
//!
//! Recall@k = |retrieved ∩ `ground_truth`| / k
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test recall_validation
//! cargo test --test recall_validation -- --ignored --nocapture  # Larger sweep
//! ```

use hnswkit_core::{DistanceMetric, HnswIndex, HnswParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Compute recall@k between retrieved results and ground truth.
#[allow(clippy::cast_precision_loss)]
fn compute_recall(retrieved: &[u64], ground_truth: &[u64], k: usize) -> f64 {
    let k = k.min(retrieved.len()).min(ground_truth.len());
    if k == 0 {
        return 0.0;
    }

    let retrieved_set: HashSet<_> = retrieved.iter().take(k).collect();
    let ground_truth_set: HashSet<_> = ground_truth.iter().take(k).collect();

    let intersection = retrieved_set.intersection(&ground_truth_set).count();
    intersection as f64 / k as f64
}

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

/// Brute-force k nearest labels under squared L2.
fn ground_truth(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<u64> {
    let mut distances: Vec<(u64, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let d = v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
            (i as u64, d)
        })
        .collect();

    distances.sort_by(|a, b| a.1.total_cmp(&b.1));
    distances.truncate(k);
    distances.into_iter().map(|(id, _)| id).collect()
}

#[allow(clippy::cast_precision_loss)]
fn mean_recall(
    index: &HnswIndex,
    vectors: &[Vec<f32>],
    queries: &[Vec<f32>],
    k: usize,
    ef: usize,
) -> f64 {
    let total: f64 = queries
        .iter()
        .map(|query| {
            let truth = ground_truth(vectors, query, k);
            let retrieved: Vec<u64> = index
                .search_with_ef(query, k, ef)
                .expect("search")
                .iter()
                .map(|h| h.label)
                .collect();
            compute_recall(&retrieved, &truth, k)
        })
        .sum();
    total / queries.len() as f64
}

fn build(vectors: &[Vec<f32>], params: HnswParams) -> HnswIndex {
    let index = HnswIndex::with_params(vectors[0].len(), DistanceMetric::L2, params)
        .expect("create index");
    let labels: Vec<u64> = (0..vectors.len() as u64).collect();
    index.add_points(vectors, &labels, 0, false).expect("add points");
    index
}

#[test]
fn test_compute_recall_partial() {
    let retrieved = vec![1, 2, 3, 4, 5];
    let ground_truth = vec![1, 2, 6, 7, 8];

    let recall = compute_recall(&retrieved, &ground_truth, 5);
    assert!((recall - 0.4).abs() < f64::EPSILON);
}

#[test]
fn test_recall_grows_with_ef() {
    // Arrange
    let vectors = random_vectors(2_000, 16, 11);
    let queries = random_vectors(50, 16, 12);
    let index = build(&vectors, HnswParams::custom(16, 200, 2_000));

    // Act
    let recalls: Vec<f64> = [10, 50, 250]
        .iter()
        .map(|&ef| mean_recall(&index, &vectors, &queries, 10, ef))
        .collect();

    // Assert
    println!("recall@10 at ef 10/50/250: {recalls:?}");
    assert!(recalls.windows(2).all(|w| w[0] <= w[1]), "{recalls:?}");
    assert!(recalls[2] >= 0.95, "{recalls:?}");
}

#[test]
fn test_exhaustive_ef_matches_brute_force() {
    // Arrange
    let vectors = random_vectors(300, 8, 13);
    let queries = random_vectors(20, 8, 14);
    let index = build(&vectors, HnswParams::custom(16, 200, 300));

    // Act
    let recall = mean_recall(&index, &vectors, &queries, 10, 300);

    // Assert
    assert!(recall >= 0.99, "recall {recall}");
}

#[test]
fn test_recall_survives_tombstones() {
    // Arrange
    let vectors = random_vectors(1_000, 12, 15);
    let queries = random_vectors(30, 12, 16);
    let index = build(&vectors, HnswParams::custom(16, 200, 1_000));
    for label in (0..1_000).step_by(3) {
        index.mark_deleted(label).expect("mark");
    }
    let live: Vec<(u64, Vec<f32>)> = vectors
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(i, v)| (i as u64, v.clone()))
        .collect();

    // Act
    let mut total = 0.0;
    for query in &queries {
        let live_vectors: Vec<Vec<f32>> = live.iter().map(|(_, v)| v.clone()).collect();
        let truth: Vec<u64> = ground_truth(&live_vectors, query, 10)
            .into_iter()
            .map(|pos| live[pos as usize].0)
            .collect();
        let retrieved: Vec<u64> = index
            .search_with_ef(query, 10, 200)
            .expect("search")
            .iter()
            .map(|h| h.label)
            .collect();
        total += compute_recall(&retrieved, &truth, 10);
    }

    // Assert
    #[allow(clippy::cast_precision_loss)]
    let recall = total / queries.len() as f64;
    assert!(recall >= 0.9, "recall {recall}");
}

/// Larger sweep, run manually.
#[test]
#[ignore = "Benchmark test - run manually with --ignored"]
fn test_recall_vs_ef() {
    let vectors = random_vectors(20_000, 64, 21);
    let queries = random_vectors(100, 64, 22);
    let index = build(&vectors, HnswParams::custom(16, 200, 20_000));

    println!("\n=== Recall vs ef Trade-off ===");
    for ef in [16, 32, 64, 128, 256] {
        let recall = mean_recall(&index, &vectors, &queries, 10, ef);
        println!("ef={ef:3}: Recall@10 = {recall:.3}");
    }
}
