//! Zone Management API Interface
//!
//! The asynchronous, job-based management API that hosts the authoritative
//! zones. Every mutating call returns a request identifier; the outcome of
//! the work is observed by waiting on that job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque identifier of an asynchronous API request
pub type RequestId = String;

/// Zone metadata as listed by the zone directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    /// Zone identifier used in API paths
    pub id: String,
    /// Zone name (e.g., "example.test")
    pub name: String,
}

/// One rdata value of a remote record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdataValue {
    pub value: String,
}

/// A record set as stored by the zone management API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Record identifier, empty until the record has been created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Owner name
    pub name: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Record type mnemonic
    pub rrtype: String,
    /// Values of the set
    #[serde(default)]
    pub rdata: Vec<RdataValue>,
    /// Free-form description
    #[serde(default)]
    pub description: String,
}

/// One page of a record listing
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<RemoteRecord>,
    /// Total number of records in the zone, when the API reports it
    pub total: Option<usize>,
}

/// Job status reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Running,
    Successful,
    Failed,
}

/// Terminal (or in-progress) state of an asynchronous request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub request_id: RequestId,
    pub status: JobStatus,
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_message: String,
}

impl Job {
    /// Error carried by a failed job
    pub fn error(&self) -> Option<ApiError> {
        match self.status {
            JobStatus::Failed => Some(ApiError::JobFailed {
                request_id: self.request_id.clone(),
                error_type: self.error_type.clone(),
                message: self.error_message.clone(),
            }),
            JobStatus::Running | JobStatus::Successful => None,
        }
    }
}

/// Zone management API errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode API response: {0}")]
    Decode(String),

    #[error("Timed out waiting for job {0}")]
    Timeout(RequestId),

    #[error("Job {request_id} failed: {error_type}: {message}")]
    JobFailed {
        request_id: RequestId,
        error_type: String,
        message: String,
    },
}

impl ApiError {
    /// Whether the API reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Operations consumed from the zone management API
#[async_trait]
pub trait ZoneApi: Send + Sync {
    /// List every zone whose name matches `name`
    async fn list_zones(&self, name: &str) -> Result<Vec<ZoneInfo>, ApiError>;

    /// List one page of the records of a zone
    async fn list_records(
        &self,
        zone_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, ApiError>;

    /// Create a record set
    async fn create_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError>;

    /// Replace the values and TTL of an existing record set
    async fn update_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError>;

    /// Delete an existing record set
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<RequestId, ApiError>;

    /// Activate every pending record change of the zone
    async fn apply(&self, zone_id: &str, description: &str) -> Result<RequestId, ApiError>;

    /// Discard every pending record change of the zone
    async fn cancel(&self, zone_id: &str) -> Result<RequestId, ApiError>;

    /// Wait until the job reaches a terminal state
    async fn wait_job(&self, request_id: &str) -> Result<Job, ApiError>;
}
