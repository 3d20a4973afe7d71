// Integration tests for thresholds and parameter selection over a real store

mod common;

use anyhow::Result;
use std::sync::Arc;

use adaptgen::feedback::{Confidence, FeedbackStore, ParamValue, SelectionTier};
use adaptgen::config::GateConfig;
use adaptgen::learning::{Diversifier, ParameterSelector, SweetSpotAnalyzer, ThresholdManager};
use common::{attempt, config, params, CONFIG};

const SUCCESS_SCORES: [f64; 12] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.75, 0.82, 0.82, 0.85, 0.9];

async fn seeded_store(scores: &[f64], accepted: bool) -> Result<Arc<FeedbackStore>> {
    let store = FeedbackStore::open_in_memory()?;
    for (i, score) in scores.iter().enumerate() {
        store
            .append(&attempt(
                &format!("subject-{}", i),
                i as i64,
                params(0.8, 300),
                *score,
                accepted,
            ))
            .await?;
    }
    Ok(Arc::new(store))
}

#[tokio::test]
async fn test_empty_log_uses_exact_default() -> Result<()> {
    let manager = ThresholdManager::new(Arc::new(config()), seeded_store(&[], true).await?);

    for n in 1..=5 {
        assert_eq!(manager.get_threshold("caption", n, 5, true).await?, 0.7);
    }
    let base = manager.base_record("caption").await?;
    assert_eq!(base.confidence, Confidence::Insufficient);
    assert!(!base.learned);

    Ok(())
}

#[tokio::test]
async fn test_nine_successes_are_not_enough() -> Result<()> {
    let store = seeded_store(&SUCCESS_SCORES[..9], true).await?;
    // Failures never count towards the threshold sample
    for i in 0..20 {
        store
            .append(&attempt("loser", 100 + i, params(0.8, 300), 0.3, false))
            .await?;
    }

    let manager = ThresholdManager::new(Arc::new(config()), store);
    assert_eq!(manager.get_threshold("caption", 1, 5, true).await?, 0.7);

    Ok(())
}

#[tokio::test]
async fn test_learned_threshold_from_successes() -> Result<()> {
    let manager = ThresholdManager::new(
        Arc::new(config()),
        seeded_store(&SUCCESS_SCORES, true).await?,
    );

    let base = manager.base_record("caption").await?;
    assert!(base.learned);
    assert_eq!(base.sample_count, 12);
    assert_eq!(base.confidence, Confidence::Medium);
    assert!((base.value - 0.779).abs() < 1e-9);

    let first = manager.get_threshold("caption", 1, 5, true).await?;
    let last = manager.get_threshold("caption", 5, 5, true).await?;
    assert!((first - 0.779).abs() < 1e-9);
    assert_eq!(last, 0.45);

    // Static override ignores the learned value
    assert_eq!(manager.get_threshold("caption", 1, 5, false).await?, 0.7);

    Ok(())
}

#[tokio::test]
async fn test_learned_threshold_is_clamped() -> Result<()> {
    let manager = ThresholdManager::new(
        Arc::new(config()),
        seeded_store(&[0.99; 15], true).await?,
    );
    assert_eq!(manager.get_threshold("caption", 1, 5, true).await?, 0.9);

    Ok(())
}

#[tokio::test]
async fn test_refresh_appends_history() -> Result<()> {
    let store = seeded_store(&SUCCESS_SCORES, true).await?;
    let manager = ThresholdManager::new(Arc::new(config()), store.clone());

    manager.refresh("caption").await?;
    manager.refresh("caption").await?;

    let history = store.threshold_history("caption").await?;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.learned));

    Ok(())
}

#[tokio::test]
async fn test_unknown_category_is_an_error() -> Result<()> {
    let manager = ThresholdManager::new(Arc::new(config()), seeded_store(&[], true).await?);
    assert!(manager.get_threshold("haiku", 1, 5, true).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_selector_falls_back_to_static_default() -> Result<()> {
    let selector = ParameterSelector::new(Arc::new(config()), seeded_store(&[], true).await?);
    let selection = selector.select("caption", "beam-7").await?;

    assert_eq!(selection.tier, SelectionTier::StaticDefault);
    assert_eq!(selection.parameters, params(0.8, 300));
    Ok(())
}

#[tokio::test]
async fn test_selector_replays_best_success_for_subject() -> Result<()> {
    let store = Arc::new(FeedbackStore::open_in_memory()?);
    store.append(&attempt("beam-7", 1, params(0.6, 200), 0.72, true)).await?;
    store.append(&attempt("beam-7", 2, params(0.7, 220), 0.88, true)).await?;
    // Higher score, but rejected
    store.append(&attempt("beam-7", 3, params(0.9, 400), 0.95, false)).await?;
    // Another subject's success is not replayed here
    store.append(&attempt("beam-8", 4, params(1.0, 500), 0.99, true)).await?;

    let selector = ParameterSelector::new(Arc::new(config()), store);
    let selection = selector.select("caption", "beam-7").await?;

    assert_eq!(selection.tier, SelectionTier::ExactReplay);
    assert_eq!(selection.parameters, params(0.7, 220));
    assert!(selection.source_attempt.is_some());
    Ok(())
}

#[tokio::test]
async fn test_replay_tie_prefers_most_recent() -> Result<()> {
    let store = Arc::new(FeedbackStore::open_in_memory()?);
    store.append(&attempt("beam-7", 1, params(0.6, 200), 0.8, true)).await?;
    let newer = store.append(&attempt("beam-7", 2, params(0.7, 240), 0.8, true)).await?;

    let selector = ParameterSelector::new(Arc::new(config()), store);
    let selection = selector.select("caption", "beam-7").await?;

    assert_eq!(selection.source_attempt, Some(newer));
    assert_eq!(selection.parameters, params(0.7, 240));
    Ok(())
}

/// 40 attempts where a higher max_tokens means a better score and
/// temperature never changes
async fn sweet_spot_store() -> Result<Arc<FeedbackStore>> {
    let store = FeedbackStore::open_in_memory()?;
    for i in 0..40i64 {
        let max_tokens = 200 + i * 5;
        let composite = 0.3 + 0.015 * i as f64;
        store
            .append(&attempt(
                &format!("subject-{}", i),
                i,
                params(0.7, max_tokens),
                composite,
                composite >= 0.7,
            ))
            .await?;
    }
    Ok(Arc::new(store))
}

#[tokio::test]
async fn test_selector_uses_trusted_sweet_spots() -> Result<()> {
    let config = Arc::new(config());
    let store = sweet_spot_store().await?;
    let analyzer = SweetSpotAnalyzer::new(config.clone(), store.clone());
    let report = analyzer.analyze("caption").await?;

    assert_eq!(report.sample_count, 40);
    assert_eq!(report.top_count, 10);
    let tokens = &report.recommendations["max_tokens"];
    assert_eq!(tokens.min, 350.0);
    assert_eq!(tokens.max, 395.0);
    assert!(tokens.correlation > 0.99);

    let selector = ParameterSelector::new(config, store);
    let selection = selector.select("caption", "new-subject").await?;
    assert_eq!(selection.tier, SelectionTier::SweetSpot);
    match selection.parameters["max_tokens"] {
        ParamValue::Integer(v) => assert!((350..=395).contains(&v)),
        ref other => panic!("max_tokens lost its integer kind: {:?}", other),
    }
    assert_eq!(selection.parameters["temperature"].as_f64(), Some(0.7));

    Ok(())
}

#[tokio::test]
async fn test_selection_is_deterministic() -> Result<()> {
    let selector = ParameterSelector::new(Arc::new(config()), sweet_spot_store().await?);

    let first = selector.select("caption", "new-subject").await?;
    let second = selector.select("caption", "new-subject").await?;
    assert_eq!(first.tier, second.tier);
    assert_eq!(first.parameters, second.parameters);

    Ok(())
}

/// 40 attempts where scores rise with max_tokens while temperature falls
async fn anti_correlated_store() -> Result<Arc<FeedbackStore>> {
    let store = FeedbackStore::open_in_memory()?;
    for i in 0..40i64 {
        let composite = 0.3 + 0.015 * i as f64;
        store
            .append(&attempt(
                &format!("subject-{}", i),
                i,
                params(1.2 - 0.01 * i as f64, 200 + i * 5),
                composite,
                composite >= 0.7,
            ))
            .await?;
    }
    Ok(Arc::new(store))
}

#[tokio::test]
async fn test_negatively_correlated_knob_keeps_default() -> Result<()> {
    let config = Arc::new(config());
    let store = anti_correlated_store().await?;

    let report = SweetSpotAnalyzer::new(config.clone(), store.clone())
        .analyze("caption")
        .await?;
    let excluded: Vec<&str> = report.excluded.iter().map(|e| e.parameter.as_str()).collect();
    assert_eq!(excluded, vec!["temperature"]);
    assert!(report.excluded[0].correlation < -0.3);
    assert!(report.recommendations.contains_key("max_tokens"));

    let selection = ParameterSelector::new(config.clone(), store)
        .select("caption", "new-subject")
        .await?;
    assert_eq!(selection.tier, SelectionTier::SweetSpot);
    assert_eq!(selection.parameters["temperature"], ParamValue::Float(0.8));
    assert!(!selection.recommendations.contains_key("temperature"));

    // Retries resample only recommended knobs
    let descriptor = config.categories.get("caption")?;
    for n in 2..=5 {
        let (parameters, _) = Diversifier::apply(descriptor, "new-subject", n, &selection);
        assert_eq!(parameters["temperature"], ParamValue::Float(0.8));
    }

    Ok(())
}

#[tokio::test]
async fn test_fractional_sweet_spot_under_integer_default() -> Result<()> {
    // `temperature = 1` parses as an integer default
    let config = Arc::new(GateConfig::from_toml_str(
        &CONFIG.replace("temperature = 0.8", "temperature = 1"),
    )?);

    let store = FeedbackStore::open_in_memory()?;
    for i in 0..40i64 {
        let composite = 0.3 + 0.015 * i as f64;
        store
            .append(&attempt(
                &format!("subject-{}", i),
                i,
                params(0.5 + 0.01 * i as f64, 300),
                composite,
                composite >= 0.7,
            ))
            .await?;
    }

    let selection = ParameterSelector::new(config, Arc::new(store))
        .select("caption", "new-subject")
        .await?;
    assert_eq!(selection.tier, SelectionTier::SweetSpot);
    match selection.parameters["temperature"] {
        ParamValue::Float(t) => assert!((0.8..=0.89).contains(&t), "{}", t),
        ref other => panic!("temperature rounded to {:?}", other),
    }

    Ok(())
}
