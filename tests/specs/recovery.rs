// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery specs: jobs whose files survived a restart.

use crate::prelude::*;
use tempfile::TempDir;

fn seeded_record(id: &str, status: Status, plugin: &str) -> JobRecord {
    let mut record = JobRecord::new(id, status);
    record.set_field("plugin", json!(plugin));
    record
}

#[tokio::test]
async fn persisted_job_is_rescheduled_on_startup() {
    let tmp = TempDir::new().unwrap();
    let config = stage_config(&tmp, true);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    store.persist(&seeded_record("j5", Status::SUCCESS, "email")).unwrap();

    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage_in(registry, true, tmp).await;

    wait_until(|| stage.broker.published().len() == 1).await;

    assert_eq!(plugin.invocations().len(), 1);
    assert_eq!(plugin.invocations()[0].id, "j5");
    assert!(!stage.store.contains("j5"));
    assert_eq!(stage.published_record(0).id, "j5");

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn every_surviving_file_restarts_exactly_one_job() {
    let tmp = TempDir::new().unwrap();
    let config = stage_config(&tmp, true);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    for n in 0..3 {
        store.persist(&seeded_record(&format!("j{n}"), Status::SUCCESS, "email")).unwrap();
    }

    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage_in(registry, true, tmp).await;

    wait_until(|| stage.broker.published().len() == 3).await;

    let mut ids: Vec<String> = plugin.invocations().into_iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["j0", "j1", "j2"]);
    // Recovery consumed no deliveries.
    assert_eq!(stage.broker.acked(), 0);

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn recovered_jobs_run_before_new_deliveries() {
    let tmp = TempDir::new().unwrap();
    let config = stage_config(&tmp, true);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    store.persist(&seeded_record("old", Status::SUCCESS, "email")).unwrap();

    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage_in(registry, true, tmp).await;

    stage.deliver(listener_body("new", 0, Some("email"))).await;
    wait_until(|| stage.broker.published().len() == 2).await;

    let first = plugin.invocations().first().map(|r| r.id.clone());
    assert_eq!(first.as_deref(), Some("old"));

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn persisted_upstream_failure_propagates_without_running() {
    let tmp = TempDir::new().unwrap();
    let config = stage_config(&tmp, true);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    store.persist(&seeded_record("j7", Status::EXCEPTION, "email")).unwrap();

    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage_in(registry, true, tmp).await;

    wait_until(|| stage.broker.published().len() == 1).await;

    assert!(plugin.invocations().is_empty());
    assert_eq!(stage.published_record(0).status, Status::EXCEPTION);
    assert!(!stage.store.contains("j7"));

    stage.stop().await.unwrap();
}

#[tokio::test]
async fn unreadable_job_file_does_not_block_recovery() {
    let tmp = TempDir::new().unwrap();
    let config = stage_config(&tmp, true);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    store.persist(&seeded_record("good", Status::SUCCESS, "email")).unwrap();
    std::fs::write(store.job_file("corrupt"), "{truncated").unwrap();

    let plugin = CountingPlugin::new(Status::SUCCESS);
    let mut registry = PluginRegistry::new();
    registry.register("email", Arc::new(plugin.clone()));
    let stage = start_stage_in(registry, true, tmp).await;

    wait_until(|| stage.broker.published().len() == 1).await;
    assert_eq!(plugin.invocations().len(), 1);
    assert_eq!(plugin.invocations()[0].id, "good");

    stage.stop().await.unwrap();
}
