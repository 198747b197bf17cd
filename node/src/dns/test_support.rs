//! In-memory zone management API for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    canonical_name, ApiError, Job, JobStatus, RdataValue, RecordPage, RemoteRecord, RequestId,
    ZoneApi, ZoneInfo,
};

/// Build a remote record with a 300s TTL
pub(crate) fn remote(id: &str, name: &str, rrtype: &str, values: &[&str]) -> RemoteRecord {
    RemoteRecord {
        id: id.to_string(),
        name: name.to_string(),
        ttl: 300,
        rrtype: rrtype.to_string(),
        rdata: values
            .iter()
            .map(|v| RdataValue {
                value: v.to_string(),
            })
            .collect(),
        description: String::new(),
    }
}

/// One call received by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiCall {
    ListZones(String),
    ListRecords { zone_id: String, offset: usize },
    Create { zone_id: String, name: String, rrtype: String },
    Update { zone_id: String, record_id: String },
    Delete { zone_id: String, record_id: String },
    Apply { zone_id: String, description: String },
    Cancel(String),
    WaitJob(RequestId),
}

impl ApiCall {
    pub(crate) fn is_submit(&self) -> bool {
        matches!(
            self,
            ApiCall::Create { .. } | ApiCall::Update { .. } | ApiCall::Delete { .. }
        )
    }
}

#[derive(Default)]
struct FakeState {
    zones: Vec<ZoneInfo>,
    /// Records including pending changes
    records: HashMap<String, Vec<RemoteRecord>>,
    /// Records as of the last apply
    committed: HashMap<String, Vec<RemoteRecord>>,
    jobs: HashMap<RequestId, Job>,
    calls: Vec<ApiCall>,
    next_id: u64,
    failing_jobs: HashSet<String>,
    lost_jobs: HashSet<String>,
    failing_submits: HashSet<String>,
    fail_list_at: Option<usize>,
    fail_list_zones: bool,
    fail_apply_job: bool,
    fail_apply_submit: bool,
    fail_cancel_job: bool,
    fail_cancel_submit: bool,
}

impl FakeState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Register a job for a record change named `name`, returning whether
    /// the change should take effect
    fn job_for(&mut self, name: &str) -> (RequestId, bool) {
        let request_id = self.next("req");
        let name = canonical_name(name);

        if self.lost_jobs.contains(&name) {
            return (request_id, true);
        }

        let failed = self.failing_jobs.contains(&name);
        let job = if failed {
            Job {
                request_id: request_id.clone(),
                status: JobStatus::Failed,
                error_type: "ParameterError".to_string(),
                error_message: format!("rejected change for {}", name),
            }
        } else {
            Job {
                request_id: request_id.clone(),
                status: JobStatus::Successful,
                error_type: String::new(),
                error_message: String::new(),
            }
        };
        self.jobs.insert(request_id.clone(), job);
        (request_id, !failed)
    }

    fn find_name(&self, zone_id: &str, record_id: &str) -> Option<String> {
        self.records
            .get(zone_id)?
            .iter()
            .find(|r| r.id == record_id)
            .map(|r| r.name.clone())
    }
}

/// Scriptable in-memory `ZoneApi`
#[derive(Default)]
pub(crate) struct FakeZoneApi {
    state: Mutex<FakeState>,
}

impl FakeZoneApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_zone(&self, zone: ZoneInfo) {
        let mut state = self.state.lock().unwrap();
        state.records.entry(zone.id.clone()).or_default();
        state.committed.entry(zone.id.clone()).or_default();
        state.zones.push(zone);
    }

    /// Seed a committed record
    pub(crate) fn add_record(&self, zone_id: &str, record: RemoteRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .records
            .entry(zone_id.to_string())
            .or_default()
            .push(record.clone());
        state
            .committed
            .entry(zone_id.to_string())
            .or_default()
            .push(record);
    }

    pub(crate) fn remove_record(&self, zone_id: &str, record_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(records) = state.records.get_mut(zone_id) {
            records.retain(|r| r.id != record_id);
        }
        if let Some(records) = state.committed.get_mut(zone_id) {
            records.retain(|r| r.id != record_id);
        }
    }

    /// Jobs for changes to `name` finish as FAILED
    pub(crate) fn fail_jobs_for(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_jobs.insert(canonical_name(name));
    }

    /// Jobs for changes to `name` are unknown to `wait_job`
    pub(crate) fn lose_jobs_for(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.lost_jobs.insert(canonical_name(name));
    }

    /// Submitting a change to `name` fails
    pub(crate) fn fail_submit_for(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_submits.insert(canonical_name(name));
    }

    /// Listing records at `offset` fails
    pub(crate) fn fail_list_records_at(&self, offset: usize) {
        let mut state = self.state.lock().unwrap();
        state.fail_list_at = Some(offset);
    }

    pub(crate) fn fail_list_zones(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_list_zones = true;
    }

    pub(crate) fn fail_apply_job(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_apply_job = true;
    }

    pub(crate) fn fail_apply_submit(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_apply_submit = true;
    }

    pub(crate) fn fail_cancel_job(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_cancel_job = true;
    }

    pub(crate) fn fail_cancel_submit(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_cancel_submit = true;
    }

    pub(crate) fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count_calls(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn list_zone_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::ListZones(_)))
    }

    pub(crate) fn list_record_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::ListRecords { .. }))
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.count_calls(ApiCall::is_submit)
    }

    pub(crate) fn apply_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::Apply { .. }))
    }

    pub(crate) fn cancel_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, ApiCall::Cancel(_)))
    }

    /// Committed records of a zone
    pub(crate) fn committed(&self, zone_id: &str) -> Vec<RemoteRecord> {
        let state = self.state.lock().unwrap();
        state.committed.get(zone_id).cloned().unwrap_or_default()
    }

    /// Committed record by name and type
    pub(crate) fn committed_record(&self, zone_id: &str, name: &str, rrtype: &str) -> Option<RemoteRecord> {
        let name = canonical_name(name);
        self.committed(zone_id)
            .into_iter()
            .find(|r| canonical_name(&r.name) == name && r.rrtype == rrtype)
    }
}

#[async_trait]
impl ZoneApi for FakeZoneApi {
    async fn list_zones(&self, name: &str) -> Result<Vec<ZoneInfo>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::ListZones(name.to_string()));
        if state.fail_list_zones {
            return Err(ApiError::Http("zone listing unavailable".to_string()));
        }

        let wanted = canonical_name(name);
        Ok(state
            .zones
            .iter()
            .filter(|z| name.is_empty() || canonical_name(&z.name) == wanted)
            .cloned()
            .collect())
    }

    async fn list_records(
        &self,
        zone_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::ListRecords {
            zone_id: zone_id.to_string(),
            offset,
        });
        if state.fail_list_at == Some(offset) {
            return Err(ApiError::Status {
                status: 500,
                message: "listing failed".to_string(),
            });
        }

        let records = state
            .records
            .get(zone_id)
            .ok_or_else(|| ApiError::NotFound(zone_id.to_string()))?;
        Ok(RecordPage {
            records: records.iter().skip(offset).take(limit).cloned().collect(),
            total: Some(records.len()),
        })
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Create {
            zone_id: zone_id.to_string(),
            name: record.name.clone(),
            rrtype: record.rrtype.clone(),
        });
        if state.failing_submits.contains(&canonical_name(&record.name)) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("cannot create {}", record.name),
            });
        }

        let (request_id, effective) = state.job_for(&record.name);
        if effective {
            let mut created = record.clone();
            created.id = state.next("rec");
            state
                .records
                .entry(zone_id.to_string())
                .or_default()
                .push(created);
        }
        Ok(request_id)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Update {
            zone_id: zone_id.to_string(),
            record_id: record.id.clone(),
        });
        if state.failing_submits.contains(&canonical_name(&record.name)) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("cannot update {}", record.name),
            });
        }

        let (request_id, effective) = state.job_for(&record.name);
        if effective {
            if let Some(existing) = state
                .records
                .get_mut(zone_id)
                .and_then(|records| records.iter_mut().find(|r| r.id == record.id))
            {
                existing.ttl = record.ttl;
                existing.rdata = record.rdata.clone();
            }
        }
        Ok(request_id)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<RequestId, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Delete {
            zone_id: zone_id.to_string(),
            record_id: record_id.to_string(),
        });

        let name = state
            .find_name(zone_id, record_id)
            .ok_or_else(|| ApiError::NotFound(record_id.to_string()))?;
        if state.failing_submits.contains(&canonical_name(&name)) {
            return Err(ApiError::Status {
                status: 400,
                message: format!("cannot delete {}", name),
            });
        }

        let (request_id, effective) = state.job_for(&name);
        if effective {
            if let Some(records) = state.records.get_mut(zone_id) {
                records.retain(|r| r.id != record_id);
            }
        }
        Ok(request_id)
    }

    async fn apply(&self, zone_id: &str, description: &str) -> Result<RequestId, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Apply {
            zone_id: zone_id.to_string(),
            description: description.to_string(),
        });
        if state.fail_apply_submit {
            return Err(ApiError::Http("apply refused".to_string()));
        }

        let request_id = state.next("req");
        let status = if state.fail_apply_job {
            JobStatus::Failed
        } else {
            let records = state.records.get(zone_id).cloned().unwrap_or_default();
            state.committed.insert(zone_id.to_string(), records);
            JobStatus::Successful
        };
        state.jobs.insert(
            request_id.clone(),
            Job {
                request_id: request_id.clone(),
                status,
                error_type: String::new(),
                error_message: String::new(),
            },
        );
        Ok(request_id)
    }

    async fn cancel(&self, zone_id: &str) -> Result<RequestId, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::Cancel(zone_id.to_string()));
        if state.fail_cancel_submit {
            return Err(ApiError::Http("cancel refused".to_string()));
        }

        let request_id = state.next("req");
        let job = if state.fail_cancel_job {
            Job {
                request_id: request_id.clone(),
                status: JobStatus::Failed,
                error_type: "SystemError".to_string(),
                error_message: "cancel failed".to_string(),
            }
        } else {
            let committed = state.committed.get(zone_id).cloned().unwrap_or_default();
            state.records.insert(zone_id.to_string(), committed);
            Job {
                request_id: request_id.clone(),
                status: JobStatus::Successful,
                error_type: String::new(),
                error_message: String::new(),
            }
        };
        state.jobs.insert(request_id.clone(), job);
        Ok(request_id)
    }

    async fn wait_job(&self, request_id: &str) -> Result<Job, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall::WaitJob(request_id.to_string()));
        state
            .jobs
            .get(request_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(request_id.to_string()))
    }
}
