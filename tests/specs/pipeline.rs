// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery-to-publication specs for a single stage.

use crate::prelude::*;

#[tokio::test]
async fn happy_path_runs_plugin_and_publishes_result() {
    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage(registry, true).await;

    stage.deliver(r#"{"wx_result":{"id":"j1","status":0,"plugin":"email"}}"#).await;
    wait_until(|| stage.broker.published().len() == 1).await;

    // The plugin saw the ingested record.
    let invocations = plugin.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].id, "j1");
    assert_eq!(invocations[0].selector("plugin"), Some("email"));

    // One publication on the stage's own exchange, wrapping the record.
    let record = stage.published_record(0);
    assert_eq!(record.id, "j1");
    assert_eq!(record.status, Status::SUCCESS);
    assert!(stage.broker.published()[0].body.contains("notif_result"));

    // The job file was created and then removed.
    assert!(!stage.store.contains("j1"));
    assert_eq!(stage.broker.acked(), 1);

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_plugin_with_no_op_okay_passes_through_clean() {
    let stage = start_stage(PluginRegistry::new(), true).await;

    stage.deliver(r#"{"wx_result":{"id":"j2","status":0,"plugin":"does-not-exist"}}"#).await;
    wait_until(|| stage.broker.published().len() == 1).await;

    let record = stage.published_record(0);
    assert_eq!(record.status, Status::SUCCESS);
    assert!(record.errors.is_empty());

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_plugin_without_no_op_publishes_an_exception() {
    let stage = start_stage(PluginRegistry::new(), false).await;

    stage.deliver(r#"{"wx_result":{"id":"j2","status":0,"plugin":"does-not-exist"}}"#).await;
    wait_until(|| stage.broker.published().len() == 1).await;

    let record = stage.published_record(0);
    assert_eq!(record.status, Status::EXCEPTION);
    assert!(!record.errors.is_empty());

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn upstream_failure_propagates_without_invoking_the_plugin() {
    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage(registry, true).await;

    stage.deliver(r#"{"wx_result":{"id":"j3","status":2,"plugin":"email"}}"#).await;
    wait_until(|| stage.broker.published().len() == 1).await;

    assert!(plugin.invocations().is_empty());
    let record = stage.published_record(0);
    assert_eq!(record.id, "j3");
    assert_eq!(record.status, Status::EXCEPTION);

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn duplicate_deliveries_collapse_to_one_run_and_one_result() {
    let plugin = CountingPlugin::new(Status::SUCCESS).with_delay(Duration::from_millis(50));
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage(registry, true).await;

    stage.deliver(listener_body("j4", 0, Some("email"))).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    stage.deliver(listener_body("j4", 0, Some("email"))).await;

    // Both deliveries are acknowledged either way.
    wait_until(|| stage.broker.acked() == 2).await;
    wait_until(|| stage.broker.published().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(plugin.invocations().len(), 1);
    assert_eq!(stage.broker.published().len(), 1);

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn each_ingestion_publishes_exactly_one_result() {
    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage(registry, true).await;

    for n in 0..5 {
        stage.deliver(listener_body(&format!("j{n}"), 0, Some("email"))).await;
    }
    wait_until(|| stage.broker.published().len() == 5).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(stage.broker.published().len(), 5);
    let mut ids: Vec<String> =
        (0..5).map(|n| stage.published_record(n).id).collect();
    ids.sort();
    assert_eq!(ids, vec!["j0", "j1", "j2", "j3", "j4"]);

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn payload_mutations_reach_the_next_stage() {
    #[derive(Debug)]
    struct Stamping;

    #[async_trait::async_trait]
    impl JobPlugin for Stamping {
        async fn run_task(
            &self,
            record: &mut JobRecord,
            _log: &LogCallback,
        ) -> Result<(), PluginError> {
            record.set_field("wx_data", json!({ "Temp": "22C" }));
            record.status = Status::SUCCESS;
            Ok(())
        }
    }

    let mut registry = PluginRegistry::new();
    registry.register("current", Arc::new(Stamping));
    let stage = start_stage(registry, true).await;

    stage.deliver(listener_body("j6", 0, Some("current"))).await;
    wait_until(|| stage.broker.published().len() == 1).await;

    let record = stage.published_record(0);
    assert_eq!(record.field("wx_data"), Some(&json!({ "Temp": "22C" })));

    stage.stop().await.unwrap();
}
