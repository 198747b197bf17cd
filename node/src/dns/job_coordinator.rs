//! Asynchronous Job Coordination
//!
//! Executes the operations of one update request against the zone
//! management API. Operations are submitted in registration order, every
//! submitted job is awaited concurrently, and the batch then either applies
//! the pending zone changes or cancels them as a whole.
//!
//! Rollback relies on the API staging record changes until the zone is
//! applied: a single `cancel` discards every change of the batch. Rollback
//! and apply job failures are logged and never change the batch outcome.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::{Action, ApiError, DnsError, DnsRecordType, JobState, JobStatus, Operation, RequestId, ZoneApi, ZoneInfo};

/// A record job that did not succeed
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub name: String,
    pub record_type: DnsRecordType,
    pub action: Action,
    pub request_id: RequestId,
    pub error: ApiError,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({}): {}",
            self.action, self.name, self.record_type, self.request_id, self.error
        )
    }
}

/// Counts of the record changes a batch persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn record(&mut self, action: Action) {
        match action {
            Action::Create => self.created += 1,
            Action::Update => self.updated += 1,
            Action::Delete => self.deleted += 1,
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

/// Operation paired with the action it submits
struct PendingJob {
    operation: Operation,
    action: Action,
}

/// Drives record jobs to completion and commits or rolls back the batch
pub struct JobCoordinator {
    api: Arc<dyn ZoneApi>,
    apply_description: String,
}

impl JobCoordinator {
    pub fn new(api: Arc<dyn ZoneApi>, apply_description: impl Into<String>) -> Self {
        Self {
            api,
            apply_description: apply_description.into(),
        }
    }

    /// Execute a batch.
    ///
    /// Operations without an action are skipped; a batch with nothing to
    /// submit makes no remote calls at all.
    pub async fn execute(
        &self,
        zone: &ZoneInfo,
        operations: Vec<Operation>,
    ) -> Result<BatchReport, DnsError> {
        let mut jobs: Vec<PendingJob> = operations
            .into_iter()
            .filter_map(|operation| {
                operation
                    .action()
                    .map(|action| PendingJob { operation, action })
            })
            .collect();

        if jobs.is_empty() {
            debug!("Nothing to submit for zone {}", zone.name);
            return Ok(BatchReport::default());
        }

        let submit_error = self.submit_all(zone, &mut jobs).await;
        let failures = self.wait_all(&mut jobs).await;

        if let Some(err) = submit_error {
            self.rollback(zone).await;
            return Err(err);
        }
        if !failures.is_empty() {
            for failure in &failures {
                warn!("Record job failed in zone {}: {}", zone.name, failure);
            }
            self.rollback(zone).await;
            return Err(DnsError::BatchFailed(failures));
        }

        self.apply(zone).await?;

        let mut report = BatchReport::default();
        for job in &jobs {
            report.record(job.action);
        }
        info!("Applied zone {}: {}", zone.name, report);
        Ok(report)
    }

    /// Submit jobs in order, stopping at the first failed submission
    async fn submit_all(&self, zone: &ZoneInfo, jobs: &mut [PendingJob]) -> Option<DnsError> {
        for job in jobs.iter_mut() {
            let target = job.operation.target();
            let (name, record_type) = (target.name().to_string(), target.record_type());

            match self.submit(zone, &job.operation, job.action).await {
                Ok(request_id) => {
                    debug!("Submitted {} {} {} as {}", job.action, name, record_type, request_id);
                    job.operation.mark_submitted(request_id);
                }
                Err(source) => {
                    error!("Failed to {} {} {}: {}", job.action, name, record_type, source);
                    return Some(DnsError::Submit {
                        action: job.action,
                        name,
                        record_type,
                        source,
                    });
                }
            }
        }
        None
    }

    async fn submit(
        &self,
        zone: &ZoneInfo,
        operation: &Operation,
        action: Action,
    ) -> Result<RequestId, ApiError> {
        let record = operation.target().to_remote();
        match action {
            Action::Create => self.api.create_record(&zone.id, &record).await,
            Action::Update => self.api.update_record(&zone.id, &record).await,
            Action::Delete => self.api.delete_record(&zone.id, &record.id).await,
        }
    }

    /// Wait on every submitted job concurrently, collecting the failures
    async fn wait_all(&self, jobs: &mut [PendingJob]) -> Vec<JobFailure> {
        let submitted: Vec<(usize, RequestId)> = jobs
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, job)| {
                let request_id = job.operation.request_id()?.to_string();
                job.operation.set_state(JobState::Waiting);
                Some((idx, request_id))
            })
            .collect();

        let results = join_all(
            submitted
                .iter()
                .map(|(_, request_id)| self.api.wait_job(request_id)),
        )
        .await;

        let mut failures = Vec::new();
        for ((idx, request_id), result) in submitted.into_iter().zip(results) {
            let error = match result {
                Ok(job) if job.status == JobStatus::Running => Some(ApiError::Timeout(job.request_id)),
                Ok(job) => job.error(),
                Err(e) if e.is_not_found() => {
                    debug!("Job {} already resolved", request_id);
                    None
                }
                Err(e) => Some(e),
            };

            let job = &mut jobs[idx];
            match error {
                None => job.operation.set_state(JobState::Succeeded),
                Some(error) => {
                    job.operation.set_state(JobState::Failed);
                    let target = job.operation.target();
                    failures.push(JobFailure {
                        name: target.name().to_string(),
                        record_type: target.record_type(),
                        action: job.action,
                        request_id,
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Discard every pending change of the zone
    async fn rollback(&self, zone: &ZoneInfo) {
        warn!("Rolling back pending changes of zone {}", zone.name);

        let request_id = match self.api.cancel(&zone.id).await {
            Ok(request_id) => request_id,
            Err(e) => {
                error!("Failed to request rollback of zone {}: {}", zone.name, e);
                return;
            }
        };

        match self.api.wait_job(&request_id).await {
            Ok(job) => {
                if let Some(e) = job.error() {
                    error!("Rollback {} of zone {} failed: {}", request_id, zone.name, e);
                }
            }
            Err(e) => error!("Failed to watch rollback {} of zone {}: {}", request_id, zone.name, e),
        }
    }

    /// Activate every pending change of the zone
    async fn apply(&self, zone: &ZoneInfo) -> Result<(), DnsError> {
        let request_id = self
            .api
            .apply(&zone.id, &self.apply_description)
            .await
            .map_err(DnsError::Apply)?;

        match self.api.wait_job(&request_id).await {
            Ok(job) => {
                if let Some(e) = job.error() {
                    error!("Apply {} of zone {} failed: {}", request_id, zone.name, e);
                }
            }
            Err(e) => error!("Failed to watch apply {} of zone {}: {}", request_id, zone.name, e),
        }
        Ok(())
    }
}
