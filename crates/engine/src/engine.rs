// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stage engine.
//!
//! Owns the in-memory job table and couples the broker client, job store,
//! factory, and scheduler. Each job moves through ingest → persist →
//! schedule → execute → report → cleanup, finishing with a result message
//! on this stage's exchange. Deletion happens before publication: after a
//! post-publish crash the job file is gone and the result is committed,
//! while a pre-publish crash leaves the file for recovery to re-run.

use crate::factory::JobFactory;
use crate::plugin::{LogCallback, PluginError};
use crate::registry::PluginRegistry;
use crate::scheduler::{ExecutionOutcome, Scheduler, SubmitError};
use mqsf_broker::{BrokerAdapter, BrokerError, Delivery, LISTENER_MSG_KEY};
use mqsf_core::{envelope, Config, ConfigError, JobRecord, Status};
use mqsf_storage::{JobStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("listener consumer stream closed unexpectedly")]
    ConsumerClosed,
}

/// Cloneable handle for requesting graceful shutdown.
///
/// Signal handlers installed in `main` call [`stop`](EngineHandle::stop);
/// repeated calls are harmless.
#[derive(Clone)]
pub struct EngineHandle {
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One pipeline stage: binds the upstream listener queue, runs plugins on
/// a bounded pool, and publishes results on its own exchange.
pub struct Engine<B: BrokerAdapter> {
    service: String,
    prev_service: String,
    worker_count: usize,
    broker: Arc<B>,
    store: JobStore,
    factory: Arc<JobFactory>,
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
    cancel: CancellationToken,
}

impl<B: BrokerAdapter> Engine<B> {
    /// Build the engine for one stage.
    ///
    /// Creates the job directory and wires the factory with the stage's
    /// skip policy; when `no_op_okay` is set the no-op plugin is added to
    /// the registry.
    pub fn new(
        service: impl Into<String>,
        config: &Config,
        broker: B,
        registry: PluginRegistry,
    ) -> Result<Self, EngineError> {
        let service = service.into();
        let prev_service = config.previous_service()?.to_string();
        let store = JobStore::open(config.job_directory(&service))?;
        let registry = if config.no_op_okay { registry.with_no_op() } else { registry };
        let factory =
            JobFactory::new(&service, &config.plugin_key, config.no_op_okay, registry);

        Ok(Self {
            service,
            prev_service,
            worker_count: config.base_thread_pool_count,
            broker: Arc::new(broker),
            store,
            factory: Arc::new(factory),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle { cancel: self.cancel.clone() }
    }

    /// Run the stage until shutdown is requested or the broker connection
    /// is lost.
    ///
    /// Jobs whose files survived a previous run are re-ingested before any
    /// new delivery is taken. On exit the scheduler is drained — outcomes
    /// of in-flight jobs are still processed and published — and the
    /// broker connection is closed. A lost consumer stream surfaces as
    /// [`EngineError::ConsumerClosed`] after the same graceful drain.
    pub async fn run(self) -> Result<(), EngineError> {
        self.broker.declare_exchange(&self.service).await?;
        let queue = self.broker.bind_listener(&self.prev_service).await?;

        let (outcome_tx, mut outcomes) = mpsc::channel(64);
        let scheduler = Scheduler::new(self.worker_count, outcome_tx);

        // Restart every job still on disk before consuming new work.
        for record in self.store.enumerate()? {
            info!(job_id = %record.id, "restarting persisted job");
            self.ingest(record, false, &scheduler).await;
        }

        let mut deliveries = self.broker.consume(&queue).await?;
        info!(service = %self.service, queue = %queue, "consuming listener queue");

        let mut failure = None;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => self.on_listener_message(delivery, &scheduler).await,
                    None => {
                        failure = Some(EngineError::ConsumerClosed);
                        break;
                    }
                },
                Some(outcome) = outcomes.recv() => self.on_job_executed(outcome).await,
            }
        }

        if failure.is_some() {
            error!("listener consumer stream closed, shutting down gracefully");
        } else {
            info!("shutdown requested, draining running jobs");
        }

        let drained = scheduler.shutdown();
        tokio::pin!(drained);
        loop {
            tokio::select! {
                _ = &mut drained => break,
                Some(outcome) = outcomes.recv() => self.on_job_executed(outcome).await,
            }
        }
        while let Ok(outcome) = outcomes.try_recv() {
            self.on_job_executed(outcome).await;
        }

        if let Err(close_error) = self.broker.close().await {
            warn!("error closing broker connection: {close_error}");
        }

        match failure {
            Some(consumer_error) => Err(consumer_error),
            None => Ok(()),
        }
    }

    /// Delivery callback for the listener queue.
    ///
    /// Malformed envelopes are logged and dropped — the delivery is still
    /// acknowledged to prevent poison-message loops.
    async fn on_listener_message(&self, delivery: Delivery, scheduler: &Scheduler) {
        match envelope::extract_record(delivery.body(), &self.prev_service) {
            Ok(record) => self.ingest(record, true, scheduler).await,
            Err(parse_error) => error!("{parse_error}"),
        }
        if let Err(ack_error) = delivery.ack().await {
            warn!("failed acknowledging listener message: {ack_error}");
        }
    }

    /// Shared ingest path for fresh deliveries and restart recovery.
    ///
    /// Unknown ids enter the table (and, for fresh deliveries, the store)
    /// and are scheduled; jobs that already failed upstream skip straight
    /// to cleanup. Known ids are duplicates and are only logged.
    async fn ingest(&self, record: JobRecord, persist: bool, scheduler: &Scheduler) {
        let id = record.id.clone();
        let status = record.status;
        {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&id) {
                warn!(job_id = %id, "job already queued, ignoring duplicate listener message");
                return;
            }
            jobs.insert(id.clone(), record.clone());
        }
        if persist {
            if let Err(store_error) = self.store.persist(&record) {
                error!(job_id = %id, "failed persisting job: {store_error}");
            }
        }
        if status.is_success() {
            self.schedule(&id, scheduler);
        } else {
            self.cleanup_failed_upstream(&id).await;
        }
    }

    fn schedule(&self, id: &str, scheduler: &Scheduler) {
        let jobs = Arc::clone(&self.jobs);
        let factory = Arc::clone(&self.factory);
        match scheduler.submit(id, run_job(jobs, factory, id.to_string())) {
            Ok(()) => info!(job_id = %id, "job scheduled"),
            Err(SubmitError::Conflict(_)) => {
                warn!(job_id = %id, "job already running, received multiple listener messages");
            }
            Err(SubmitError::ShuttingDown) => {
                warn!(job_id = %id, "scheduler is shutting down, job will restart from disk");
            }
        }
    }

    /// The job failed in a previous stage: delete local state and notify
    /// the next stage without running a plugin.
    async fn cleanup_failed_upstream(&self, id: &str) {
        warn!(job_id = %id, "failed upstream");
        if let Some(record) = self.delete_job(id) {
            self.publish_result(&record).await;
        }
    }

    /// Remove the job from table and store, returning the record if known.
    fn delete_job(&self, id: &str) -> Option<JobRecord> {
        let record = self.jobs.lock().remove(id);
        if record.is_some() {
            info!(job_id = %id, "deleting job");
        } else {
            warn!(job_id = %id, "job deletion failed, job is not queued");
        }
        if let Err(store_error) = self.store.remove(id) {
            warn!(job_id = %id, "failed removing job file: {store_error}");
        }
        record
    }

    /// Outcome callback: finalize status, delete before publishing, and
    /// forward the result downstream.
    ///
    /// An ERROR outcome overwrites whatever status the plugin set with
    /// EXCEPTION and appends the formatted message to the record's errors.
    async fn on_job_executed(&self, outcome: ExecutionOutcome) {
        if let ExecutionOutcome::Missed { job_id } = &outcome {
            warn!(job_id = %job_id, "job missed during {}", self.service);
            return;
        }
        let id = outcome.job_id().to_string();
        let Some(mut record) = self.delete_job(&id) else { return };

        match outcome {
            ExecutionOutcome::Error { error, .. } => {
                let message = format!("Exception in {}: {}", self.service, error);
                record.status = Status::EXCEPTION;
                record.push_error(message.clone());
                error!(job_id = %id, "{message}");
            }
            _ if record.status.is_success() => {
                info!(job_id = %id, "{} successful", self.service);
            }
            _ => {
                error!(job_id = %id, "error occurred in {}", self.service);
            }
        }

        self.publish_result(&record).await;
    }

    /// Publish the result envelope on this stage's exchange.
    ///
    /// Failure is non-fatal: the job is already complete locally, so the
    /// loss is logged with the job id and the stage moves on.
    async fn publish_result(&self, record: &JobRecord) {
        let message = match envelope::result_message(&self.service, record) {
            Ok(message) => message,
            Err(encode_error) => {
                error!(job_id = %record.id, "failed encoding result message: {encode_error}");
                return;
            }
        };
        if let Err(publish_error) =
            self.broker.publish(&self.service, LISTENER_MSG_KEY, message).await
        {
            warn!(job_id = %record.id, "result message not delivered: {publish_error}");
        }
    }
}

/// One scheduled run: resolve the plugin and let it mutate the record.
///
/// Factory failures are handled here — the record is marked EXCEPTION and
/// the run still counts as executed, so the outcome path performs the
/// cleanup. Only errors raised by the plugin itself become ERROR outcomes.
async fn run_job(
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
    factory: Arc<JobFactory>,
    job_id: String,
) -> Result<(), PluginError> {
    let Some(mut record) = jobs.lock().get(&job_id).cloned() else {
        return Err(PluginError::new(format!("job {job_id} vanished before execution")));
    };
    match factory.create_job(&record) {
        Ok(plugin) => {
            let log = LogCallback::new(&job_id);
            let result = plugin.run_task(&mut record, &log).await;
            jobs.lock().insert(job_id, record);
            result
        }
        Err(factory_error) => {
            error!(job_id = %job_id, "invalid job: {factory_error}");
            record.status = Status::EXCEPTION;
            record.push_error(factory_error.to_string());
            jobs.lock().insert(job_id, record);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
