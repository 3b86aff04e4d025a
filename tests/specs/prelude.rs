// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the stage specs.

pub use mqsf_broker::FakeBroker;
pub use mqsf_core::{Config, JobRecord, Status};
pub use mqsf_engine::{
    Engine, EngineError, EngineHandle, JobPlugin, LogCallback, PluginError, PluginRegistry,
};
pub use mqsf_storage::JobStore;
pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

/// The stage under test is always `notif`, fed by a `wx` stage upstream.
pub const SERVICE: &str = "notif";
pub const PREV_SERVICE: &str = "wx";

/// Plugin that records every record it is handed and applies a status.
#[derive(Clone, Debug)]
pub struct CountingPlugin {
    invocations: Arc<Mutex<Vec<JobRecord>>>,
    status: Status,
    delay: Duration,
}

impl CountingPlugin {
    pub fn new(status: Status) -> Self {
        Self { invocations: Arc::new(Mutex::new(Vec::new())), status, delay: Duration::ZERO }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<JobRecord> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl JobPlugin for CountingPlugin {
    async fn run_task(
        &self,
        record: &mut JobRecord,
        log: &LogCallback,
    ) -> Result<(), PluginError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        log.info("counting plugin invoked");
        self.invocations.lock().push(record.clone());
        record.status = self.status;
        Ok(())
    }
}

/// A running stage plus handles into its fake broker and job store.
pub struct Stage {
    pub broker: FakeBroker,
    pub handle: EngineHandle,
    pub task: tokio::task::JoinHandle<Result<(), EngineError>>,
    pub store: JobStore,
    _tmp: TempDir,
}

impl Stage {
    pub async fn deliver(&self, body: impl Into<Vec<u8>>) {
        assert!(self.broker.deliver(body).await, "no consumer attached");
    }

    /// Parsed record out of the nth published result message.
    pub fn published_record(&self, index: usize) -> JobRecord {
        let published = self.broker.published();
        let message = published.get(index).unwrap_or_else(|| panic!("no publication {index}"));
        assert_eq!(message.exchange, SERVICE);
        assert_eq!(message.routing_key, "listener_msg");
        let value: serde_json::Value = serde_json::from_str(&message.body).unwrap();
        serde_json::from_value(value[format!("{SERVICE}_result")].clone()).unwrap()
    }

    pub async fn stop(self) -> Result<(), EngineError> {
        self.handle.stop();
        self.task.await.unwrap_or_else(|join_error| panic!("engine task died: {join_error}"))
    }
}

/// Write a config file into the temp dir and parse it, end to end.
pub fn stage_config(tmp: &TempDir, no_op_okay: bool) -> Config {
    let path = tmp.path().join("mqsf_config.yaml");
    let contents = format!(
        "previous_service: {PREV_SERVICE}\n\
         base_job_dir: {base}\n\
         log_dir: {logs}\n\
         base_thread_pool_count: 4\n\
         no_op_okay: {no_op_okay}\n",
        base = tmp.path().display(),
        logs = tmp.path().join("logs").display(),
    );
    std::fs::write(&path, contents).unwrap();
    Config::load(&path).unwrap()
}

pub async fn start_stage(registry: PluginRegistry, no_op_okay: bool) -> Stage {
    let tmp = TempDir::new().unwrap();
    start_stage_in(registry, no_op_okay, tmp).await
}

/// Start the stage against an existing temp dir (whose job directory may
/// be pre-seeded with persisted jobs).
pub async fn start_stage_in(registry: PluginRegistry, no_op_okay: bool, tmp: TempDir) -> Stage {
    let config = stage_config(&tmp, no_op_okay);
    let store = JobStore::open(config.job_directory(SERVICE)).unwrap();
    let broker = FakeBroker::new();
    let engine = Engine::new(SERVICE, &config, broker.clone(), registry).unwrap();
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());
    wait_until(|| broker.has_consumer()).await;
    Stage { broker, handle, task, store, _tmp: tmp }
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

/// Wire body for a listener message from the upstream stage.
pub fn listener_body(id: &str, status: i64, plugin: Option<&str>) -> String {
    let mut inner = json!({ "id": id, "status": status });
    if let Some(plugin) = plugin {
        inner["plugin"] = json!(plugin);
    }
    let mut envelope = serde_json::Map::new();
    envelope.insert(format!("{PREV_SERVICE}_result"), inner);
    serde_json::Value::Object(envelope).to_string()
}
