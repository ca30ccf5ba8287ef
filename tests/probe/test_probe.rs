//! Tests for the bounded-concurrency health probe

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use kodegen_agent_panels::{
    HealthProbe, ModelId, PanelUpdate, ProbeOutcome, ProbeTarget, ScriptedProvider,
};
use tokio::sync::broadcast;

fn targets() -> Vec<ProbeTarget> {
    let mut targets = vec![ProbeTarget::provider("claude"), ProbeTarget::provider("codex")];
    for model in ["opus", "sonnet", "haiku", "large"] {
        targets.push(ProbeTarget::model("claude", model));
    }
    for model in ["mini", "max", "pro", "base"] {
        targets.push(ProbeTarget::model("codex", model));
    }
    targets
}

#[tokio::test]
async fn test_probe_respects_pool_size() {
    common::init_logging();
    let provider = ScriptedProvider::new();
    provider.set_ping_delay(Duration::from_millis(30));
    provider.fail_ping("codex", Some(ModelId::from("max")));

    let probe = HealthProbe::new(4);
    let results = probe.probe_all(&provider, targets()).await;

    assert_eq!(results.len(), 10);
    assert!(provider.max_pings_in_flight() <= 4);
    assert!(provider.max_pings_in_flight() >= 2);

    let failed = &results[&ProbeTarget::model("codex", "max")];
    assert!(matches!(failed, ProbeOutcome::Failed { error } if error.contains("codex/max")));
    assert_eq!(results.values().filter(|o| o.is_ok()).count(), 9);

    assert!(probe.pending().is_empty());
    assert_eq!(probe.results(), results);
}

#[tokio::test]
async fn test_duplicate_targets_are_pinged_once() {
    let provider = ScriptedProvider::new();
    let probe = HealthProbe::new(2);

    let duplicated = vec![
        ProbeTarget::provider("claude"),
        ProbeTarget::provider("claude"),
        ProbeTarget::model("claude", "opus"),
    ];
    let results = probe.probe_all(&provider, duplicated).await;

    assert_eq!(results.len(), 2);
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn test_empty_target_list() {
    let provider = ScriptedProvider::new();
    let results = HealthProbe::new(4).probe_all(&provider, Vec::new()).await;
    assert!(results.is_empty());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_each_outcome_is_published() {
    let provider = ScriptedProvider::new();
    let (tx, mut rx) = broadcast::channel(32);
    let probe = HealthProbe::new(3).with_updates(tx);

    probe.probe_all(&provider, targets()).await;

    let mut published = 0;
    while let Ok(update) = rx.try_recv() {
        if let PanelUpdate::Probe { outcome, .. } = update {
            assert!(outcome.is_ok());
            published += 1;
        }
    }
    assert_eq!(published, 10);
}

#[tokio::test]
async fn test_pending_tracks_run_in_progress() {
    let provider = ScriptedProvider::new();
    provider.set_ping_delay(Duration::from_millis(200));
    let probe = HealthProbe::new(1);

    let running = {
        let probe = probe.clone();
        let provider = provider.clone();
        tokio::spawn(async move {
            probe
                .probe_all(
                    &provider,
                    vec![ProbeTarget::provider("claude"), ProbeTarget::provider("codex")],
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.pending().len(), 2);
    assert!(probe.results().is_empty());

    let results = running.await.expect("probe task");
    assert_eq!(results.len(), 2);
    assert!(probe.pending().is_empty());
}
