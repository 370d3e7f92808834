mod common;

use axum::http::StatusCode;
use cbir::config::{ExtractOptions, FeatureDir};
use cbir::extract::DefaultExtractor;
use cbir::server::{AppError, AppState};
use cbir::store::FeatureStoreBuilder;
use cbir::{FeatureType, Match};
use common::histogram_record;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let mut store = FeatureStoreBuilder::new(FeatureDir::new(dir.path())).open().unwrap();
    store.insert("a", histogram_record(&[0.0])).unwrap();
    store.insert("b", histogram_record(&[1.0])).unwrap();
    store.insert("c", histogram_record(&[3.0])).unwrap();
    let state = AppState {
        store,
        extractor: DefaultExtractor::from(&ExtractOptions::default()),
        count: 2,
        token: "secret".to_string(),
    };
    (dir, state)
}

#[rstest]
fn search_by_id_uses_default_count(state: (TempDir, AppState)) {
    let (_dir, state) = state;
    let response = state.search_id("a", "HISTOGRAM", None).unwrap();
    assert_eq!(response.result, vec![Match::new("a", 0.0), Match::new("b", 2.0)]);

    let response = state.search_id("a", "HISTOGRAM", Some(3)).unwrap();
    assert_eq!(response.result.len(), 3);
}

#[rstest]
fn errors_map_to_status_codes(state: (TempDir, AppState)) {
    let (_dir, state) = state;
    let not_found = AppError::from(state.search_id("zzz", "HISTOGRAM", None).unwrap_err());
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

    let bad_type = AppError::from(state.search_id("a", "INVALID_TYPE", None).unwrap_err());
    assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

    let bad_type = AppError::from(state.search_bytes(b"", "INVALID_TYPE", None).unwrap_err());
    assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
fn stats_count_queries(state: (TempDir, AppState)) {
    let (_dir, state) = state;
    let before = state.stats().queries[&FeatureType::Correlogram];
    state.search_id("b", "CORRELOGRAM", None).unwrap();
    let stats = state.stats();
    assert_eq!(stats.records, 3);
    assert!(stats.queries[&FeatureType::Correlogram] > before);
}

#[rstest]
fn empty_results_are_counted(state: (TempDir, AppState)) {
    let (_dir, state) = state;
    let before = state.stats().queries[&FeatureType::Histogram];
    let response = state.search_id("a", "HISTOGRAM", Some(0)).unwrap();
    assert!(response.result.is_empty());
    assert!(state.stats().queries[&FeatureType::Histogram] > before);
}

#[rstest]
fn token_check(state: (TempDir, AppState)) {
    let (_dir, state) = state;
    assert!(state.check_token("secret"));
    assert!(!state.check_token("Secret"));
    assert!(!state.check_token(""));
}
