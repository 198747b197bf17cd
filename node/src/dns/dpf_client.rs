//! DNS Platform REST Client
//!
//! `ZoneApi` over the DNS Platform (DPF) HTTP API. Record changes are staged
//! by the platform and become visible once the zone is applied; every
//! mutating call returns a request id that is polled through `/jobs`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::{
    ApiConfig, ApiError, Job, JobConfig, JobStatus, RdataValue, RecordPage, RemoteRecord,
    RequestId, ZoneApi, ZoneInfo,
};

/// List endpoints wrap their items in `results`
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    count: Option<usize>,
}

/// Response of an asynchronous request
#[derive(Debug, Deserialize)]
struct AsyncResponse {
    request_id: RequestId,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_type: String,
    #[serde(default)]
    error_message: String,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    ttl: u32,
    rdata: &'a [RdataValue],
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct ApplyRequest<'a> {
    description: &'a str,
}

/// HTTP client for the zone management API
pub struct DpfClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl DpfClient {
    pub fn new(api: &ApiConfig, jobs: &JobConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(api.request_timeout())
            .build()
            .map_err(|e| ApiError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: api.endpoint.trim_end_matches('/').to_string(),
            token: api.token.clone(),
            poll_interval: jobs.poll_interval(),
            wait_timeout: jobs.wait_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(error_message(&body)));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_async(&self, request: RequestBuilder) -> Result<RequestId, ApiError> {
        let response: AsyncResponse = self.send(request).await?;
        Ok(response.request_id)
    }
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) if !err.error_type.is_empty() => {
            format!("{}: {}", err.error_type, err.error_message)
        }
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

#[async_trait]
impl ZoneApi for DpfClient {
    async fn list_zones(&self, name: &str) -> Result<Vec<ZoneInfo>, ApiError> {
        let request = self
            .http
            .get(self.url("/zones"))
            .query(&[("name", name.trim_end_matches('.'))]);
        let response: ListResponse<ZoneInfo> = self.send(request).await?;
        Ok(response.results)
    }

    async fn list_records(
        &self,
        zone_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, ApiError> {
        let request = self
            .http
            .get(self.url(&format!("/zones/{}/records", zone_id)))
            .query(&[("offset", offset), ("limit", limit)]);
        let response: ListResponse<RemoteRecord> = self.send(request).await?;
        Ok(RecordPage {
            records: response.results,
            total: response.count,
        })
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError> {
        let request = self
            .http
            .post(self.url(&format!("/zones/{}/records", zone_id)))
            .json(record);
        self.send_async(request).await
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record: &RemoteRecord,
    ) -> Result<RequestId, ApiError> {
        let body = RecordUpdate {
            ttl: record.ttl,
            rdata: &record.rdata,
            description: &record.description,
        };
        let request = self
            .http
            .patch(self.url(&format!("/zones/{}/records/{}", zone_id, record.id)))
            .json(&body);
        self.send_async(request).await
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<RequestId, ApiError> {
        let request = self
            .http
            .delete(self.url(&format!("/zones/{}/records/{}", zone_id, record_id)));
        self.send_async(request).await
    }

    async fn apply(&self, zone_id: &str, description: &str) -> Result<RequestId, ApiError> {
        let request = self
            .http
            .patch(self.url(&format!("/zones/{}/changes", zone_id)))
            .json(&ApplyRequest { description });
        self.send_async(request).await
    }

    async fn cancel(&self, zone_id: &str) -> Result<RequestId, ApiError> {
        let request = self
            .http
            .delete(self.url(&format!("/zones/{}/changes", zone_id)));
        self.send_async(request).await
    }

    async fn wait_job(&self, request_id: &str) -> Result<Job, ApiError> {
        let deadline = Instant::now() + self.wait_timeout;
        let url = self.url(&format!("/jobs/{}", request_id));

        loop {
            let job: Job = self.send(self.http.get(&url)).await?;
            if job.status != JobStatus::Running {
                debug!("Job {} finished: {:?}", request_id, job.status);
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(ApiError::Timeout(request_id.to_string()));
            }
            sleep(self.poll_interval).await;
        }
    }
}
