use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spatio_knn::{
    CoordinateSpace, CoordinateStore, ExpansionPolicy, JoinConfig, JoinResult, KnnJoin,
    KnnJoinBuilder, Metric, MetricKind, PartitionIndex, Planar, Point, SearchState, Tessellation,
    brute_force_knn,
};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn grid_index(candidates: &[Point], step: f64) -> PartitionIndex {
    spatio_knn::build_index(candidates.to_vec(), Tessellation::Grid { step }).unwrap()
}

fn geographic(points: &[Point]) -> CoordinateStore {
    CoordinateStore::try_new(points.to_vec()).unwrap()
}

fn projected(points: &[Point]) -> CoordinateStore {
    CoordinateStore::try_new_in(points.to_vec(), CoordinateSpace::Projected).unwrap()
}

fn scattered(
    rng: &mut ChaCha8Rng,
    first_id: u64,
    n: u64,
    lon: (f64, f64),
    lat: (f64, f64),
) -> Vec<Point> {
    (0..n)
        .map(|i| {
            Point::new(
                first_id + i,
                rng.gen_range(lon.0..lon.1),
                rng.gen_range(lat.0..lat.1),
            )
        })
        .collect()
}

/// Every query result must equal an exhaustive scan.
fn assert_matches_brute_force(
    result: &JoinResult,
    queries: &[Point],
    candidates: &[Point],
    metric: &dyn Metric,
) {
    assert_eq!(result.len(), queries.len());
    for query in queries {
        let got = result.get(query.id).expect("query missing from result");
        let expected = brute_force_knn(query, candidates, result.k(), metric, None);
        assert_eq!(got.entries, expected, "query {}", query.id);
        assert_eq!(got.state, SearchState::Saturated, "query {}", query.id);
    }
}

#[test]
fn test_unit_grid_matches_brute_force() {
    init_logging();

    let grid: Vec<(f64, f64)> = (0..3)
        .flat_map(|x| (0..3).map(move |y| (x as f64, y as f64)))
        .collect();
    let candidates: Vec<Point> = grid
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Point::new(i as u64, x, y))
        .collect();
    let queries: Vec<Point> = grid
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| Point::new(100 + i as u64, x, y))
        .collect();

    let grid = Tessellation::Grid { step: 1.0 };
    let index = PartitionIndex::build(projected(&candidates), grid).unwrap();
    let query_store = projected(&queries);

    for k in 1..=4 {
        let engine = KnnJoinBuilder::new()
            .k(k)
            .metric(Arc::new(Planar))
            .build()
            .unwrap();
        let result = engine.join(&query_store, &index).unwrap();
        assert!(result.is_complete());
        assert_matches_brute_force(&result, &queries, &candidates, &Planar);

        for query in result.iter() {
            assert_eq!(query.entries.len(), k);
            // A query sitting on a candidate finds it first.
            assert_eq!(query.entries[0].distance, 0.0);
            assert_eq!(query.entries[0].candidate_id, query.query_id - 100);
        }
    }
}

#[test]
fn test_geographic_grid_matches_brute_force() {
    let candidates: Vec<Point> = (0..3)
        .flat_map(|x| {
            (0..3).map(move |y| {
                Point::new(
                    (x * 3 + y) as u64,
                    -74.0 + x as f64 * 0.001,
                    40.7 + y as f64 * 0.001,
                )
            })
        })
        .collect();
    let queries: Vec<Point> = candidates
        .iter()
        .map(|p| Point::new(p.id + 100, p.lon + 0.0004, p.lat - 0.0003))
        .collect();

    let index = grid_index(&candidates, 0.002);
    let metric = MetricKind::Haversine.metric();

    for k in 1..=4 {
        let result =
            spatio_knn::knn_join(&queries, &index, k, 0, None, Arc::clone(&metric)).unwrap();
        assert_matches_brute_force(&result, &queries, &candidates, metric.as_ref());
    }
}

#[test]
fn test_corner_queries_with_scattered_candidates() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let (lon, lat) = ((-74.01, -73.99), (40.70, 40.72));
    let candidates = scattered(&mut rng, 0, 20, lon, lat);
    let queries = vec![
        Point::new(100, lon.0, lat.0),
        Point::new(101, lon.1, lat.0),
        Point::new(102, lon.0, lat.1),
        Point::new(103, lon.1, lat.1),
        Point::new(104, (lon.0 + lon.1) / 2.0, (lat.0 + lat.1) / 2.0),
    ];

    let index = grid_index(&candidates, 0.002);
    let engine = KnnJoinBuilder::new().k(5).build().unwrap();
    let result = engine.join(&geographic(&queries), &index).unwrap();

    assert!(result.iter().all(|q| q.saturated()));
    assert_matches_brute_force(&result, &queries, &candidates, engine.metric().as_ref());
}

#[test]
fn test_every_tessellation_and_metric_is_exact() {
    init_logging();
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let (lon, lat) = ((-74.05, -73.95), (40.70, 40.80));
    let candidates = scattered(&mut rng, 0, 400, lon, lat);
    let queries = scattered(&mut rng, 10_000, 60, (-74.07, -73.93), (40.68, 40.82));
    let query_store = geographic(&queries);

    let tessellations = [
        Tessellation::Grid { step: 0.005 },
        Tessellation::Hex { size: 0.004 },
        Tessellation::Geohash { precision: 6 },
    ];
    let metrics = [MetricKind::Haversine, MetricKind::Geodesic, MetricKind::Rhumb];

    for tessellation in tessellations {
        let index = PartitionIndex::build(geographic(&candidates), tessellation).unwrap();

        for metric in metrics {
            for expansion in [ExpansionPolicy::Linear, ExpansionPolicy::Doubling] {
                let engine = KnnJoinBuilder::new()
                    .k(6)
                    .metric_kind(metric)
                    .expansion(expansion)
                    .build()
                    .unwrap();
                let result = engine.join(&query_store, &index).unwrap();
                let metric = engine.metric().as_ref();
                assert_matches_brute_force(&result, &queries, &candidates, metric);
            }
        }
    }
}

#[test]
fn test_distances_non_decreasing_and_length() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let candidates = scattered(&mut rng, 0, 150, (10.0, 10.1), (50.0, 50.1));
    let queries = scattered(&mut rng, 1000, 40, (10.0, 10.1), (50.0, 50.1));
    let index = spatio_knn::build_index(candidates, Tessellation::Hex { size: 0.003 }).unwrap();

    let engine = KnnJoinBuilder::new().k(7).build().unwrap();
    let result = engine.join(&geographic(&queries), &index).unwrap();

    assert_eq!(result.expected_len(), 7);
    for query in &result {
        assert_eq!(query.entries.len(), 7);
        assert!(
            query
                .entries
                .windows(2)
                .all(|w| w[0].distance <= w[1].distance)
        );
    }
}

#[test]
fn test_equidistant_candidates_tie_break_by_id() {
    let candidates = vec![
        Point::new(42, 1.0, 0.0),
        Point::new(7, -1.0, 0.0),
        Point::new(19, 0.0, 1.0),
        Point::new(3, 0.0, -3.0),
    ];
    let query = Point::new(500, 0.0, 0.0);
    let grid = Tessellation::Grid { step: 0.5 };
    let index = PartitionIndex::build(projected(&candidates), grid).unwrap();

    for _ in 0..5 {
        let result =
            spatio_knn::knn_join(&[query], &index, 2, 0, None, Arc::new(Planar)).unwrap();
        let q = result.get(500).unwrap();
        assert_eq!(q.candidate_ids(), vec![7, 19]);
        assert_eq!(q.entries[0].distance, q.entries[1].distance);
    }
}

#[test]
fn test_output_independent_of_input_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    let mut candidates = scattered(&mut rng, 0, 300, (2.30, 2.40), (48.80, 48.90));
    let mut queries = scattered(&mut rng, 5000, 50, (2.30, 2.40), (48.80, 48.90));
    // Duplicate coordinates force distance ties.
    candidates.push(Point::new(900, candidates[0].lon, candidates[0].lat));
    candidates.push(Point::new(901, candidates[0].lon, candidates[0].lat));

    let engine = KnnJoinBuilder::new().k(4).build().unwrap();
    let run = |candidates: &[Point], queries: &[Point]| {
        let index = grid_index(candidates, 0.004);
        engine
            .join(&geographic(queries), &index)
            .unwrap()
            .to_json()
            .unwrap()
    };

    let baseline = run(&candidates, &queries);
    for _ in 0..3 {
        candidates.shuffle(&mut rng);
        queries.shuffle(&mut rng);
        assert_eq!(run(&candidates, &queries), baseline);
    }
}

#[test]
fn test_monotonic_refinement() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let candidates = scattered(&mut rng, 0, 80, (-0.2, 0.2), (51.3, 51.7));
    let queries = geographic(&scattered(&mut rng, 1000, 40, (-0.3, 0.3), (51.2, 51.8)));
    let index = grid_index(&candidates, 0.02);

    let run = |max_ring: u32| {
        let config = JoinConfig::default()
            .with_k(3)
            .with_max_ring(Some(max_ring));
        KnnJoin::new(config)
            .unwrap()
            .join(&queries, &index)
            .unwrap()
    };

    let mut previous = run(0);
    for ring in 1..8 {
        let next = run(ring);
        for before in previous.iter().filter(|q| q.saturated()) {
            assert_eq!(next.get(before.query_id), Some(before), "ring {ring}");
        }
        assert!(
            next.iter().filter(|q| q.saturated()).count()
                >= previous.iter().filter(|q| q.saturated()).count()
        );
        previous = next;
    }
}

#[test]
fn test_unbounded_always_returns_min_k_b() {
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    // Two far-apart clusters leave many empty rings between them.
    let mut candidates = scattered(&mut rng, 0, 5, (20.0, 20.01), (-10.0, -9.99));
    candidates.extend(scattered(&mut rng, 100, 5, (25.0, 25.01), (-5.0, -4.99)));
    let queries = scattered(&mut rng, 1000, 10, (19.0, 26.0), (-11.0, -4.0));
    let index = grid_index(&candidates, 0.01);
    let query_store = geographic(&queries);

    for k in [1, 4, 10, 25] {
        let result = KnnJoinBuilder::new()
            .k(k)
            .expansion(ExpansionPolicy::Doubling)
            .build()
            .unwrap()
            .join(&query_store, &index)
            .unwrap();
        assert!(result.is_complete());
        for query in &result {
            assert_eq!(query.entries.len(), k.min(candidates.len()));
        }
    }
}

#[test]
fn test_antimeridian_neighbors() {
    let candidates = vec![
        Point::new(1, 179.995, 0.0),
        Point::new(2, -179.0, 0.0),
        Point::new(3, 179.0, 0.5),
    ];
    let query = Point::new(10, -179.995, 0.0);
    let index = grid_index(&candidates, 0.002);

    let engine = KnnJoinBuilder::new()
        .k(2)
        .expansion(ExpansionPolicy::Doubling)
        .build()
        .unwrap();
    let result = engine.join(&geographic(&[query]), &index).unwrap();

    let q = result.get(10).unwrap();
    assert!(q.saturated());
    assert_eq!(q.candidate_ids()[0], 1);
    assert!(q.entries[0].distance < 2_000.0);
    assert_matches_brute_force(&result, &[query], &candidates, engine.metric().as_ref());
}

#[test]
fn test_exhausted_queries_retry_to_completion() {
    init_logging();
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let mut candidates = scattered(&mut rng, 0, 50, (-74.01, -74.00), (40.70, 40.71));
    // A lone candidate far from the dense cluster.
    candidates.push(Point::new(999, -73.80, 40.90));
    let queries = vec![
        Point::new(1, -74.005, 40.705),
        Point::new(2, -73.801, 40.899),
        Point::new(3, -73.60, 41.10),
    ];
    let query_store = geographic(&queries);
    let index = grid_index(&candidates, 0.002);

    let engine = KnnJoinBuilder::new().k(3).max_ring(2).build().unwrap();
    let partial = engine.join(&query_store, &index).unwrap();

    assert!(!partial.is_complete());
    let report = spatio_knn::CompletenessReport::from_result(&partial);
    assert_eq!(report.exhausted, partial.exhausted_ids().len());
    assert!(report.to_string().starts_with("INCOMPLETE"));
    for id in partial.exhausted_ids() {
        let q = partial.get(id).unwrap();
        assert!(matches!(q.state, SearchState::Exhausted(_)));
        assert_eq!(q.stop_ring(), Some(2));
    }
    assert!(partial.get(1).unwrap().saturated());

    let retried = engine
        .retry_exhausted(&partial, &query_store, &index, None)
        .unwrap();
    assert!(retried.is_complete());
    assert_eq!(retried.get(1), partial.get(1));
    assert_matches_brute_force(&retried, &queries, &candidates, engine.metric().as_ref());
}

#[test]
fn test_distance_cap_is_exact_within_cap() {
    let mut rng = ChaCha8Rng::seed_from_u64(64);
    let candidates = scattered(&mut rng, 0, 200, (-74.02, -73.98), (40.70, 40.74));
    let queries = scattered(&mut rng, 1000, 30, (-74.06, -73.94), (40.66, 40.78));
    let candidate_store = geographic(&candidates);
    let query_store = geographic(&queries);
    let index = grid_index(&candidates, 0.002);

    let cap = 600.0;
    let engine = KnnJoinBuilder::new()
        .k(8)
        .max_distance(cap)
        .build()
        .unwrap();
    let result = engine.join(&query_store, &index).unwrap();

    assert!(result.is_complete());
    for query in &result {
        assert!(query.entries.iter().all(|e| e.distance <= cap));
        match query.state {
            SearchState::Saturated => assert_eq!(query.entries.len(), 8),
            SearchState::Capped => assert!(query.entries.len() < 8),
            other => panic!("unexpected state {other:?}"),
        }
    }

    let verification = engine.verify_sample(&result, &query_store, &candidate_store, 30);
    assert_eq!(verification.checked, 30);
    assert!(verification.is_clean(), "{:?}", verification.mismatches);
}

#[test]
fn test_verify_sample_on_large_join() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let candidates = geographic(&scattered(&mut rng, 0, 2000, (-1.0, 1.0), (-1.0, 1.0)));
    let queries = geographic(&scattered(&mut rng, 10_000, 500, (-1.2, 1.2), (-1.2, 1.2)));
    let tessellation = Tessellation::suggest_grid(&candidates, 4).unwrap();
    let index = PartitionIndex::build(candidates.clone(), tessellation).unwrap();

    let engine = KnnJoinBuilder::new().k(5).build().unwrap();
    let result = engine.join(&queries, &index).unwrap();
    let report = engine.verify_sample(&result, &queries, &candidates, 50);

    assert_eq!(report.checked + report.skipped, 50);
    assert!(report.is_clean());
}
