//! HTTP client for the remote classification service.
//!
//! An [`AnalysisClient`] allows one analysis in flight at a time. The busy
//! flag is raised as soon as [`AnalysisClient::analyze`] is called and is
//! lowered when the returned [`PendingAnalysis`] finishes or is dropped, so
//! no exit path can leave the client stuck in `Busy`.

use crate::config::ClientConfig;
use crate::error::{AnalysisError, Rejection};
use crate::response;
use crate::upload::{AcceptedUpload, UploadCandidate, UploadValidator};
use crate::AnalysisResult;
use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Multipart field the service reads the image from.
pub const FILE_FIELD: &str = "file";

/// Reachability of the service as reported by its health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Answered, but not with `"healthy"`.
    Unhealthy(String),
    Unreachable(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

#[derive(Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: String,
}

#[derive(Serialize)]
struct EncodedImageRequest<'a> {
    image: &'a str,
}

pub struct AnalysisClient {
    http: reqwest::Client,
    endpoint: Url,
    health: Url,
    validator: UploadValidator,
    timeout_secs: u64,
    busy: Arc<AtomicBool>,
}

impl AnalysisClient {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = cfg.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("cannot build HTTP client")?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint_url()?,
            health: cfg.health_url()?,
            validator: UploadValidator::new(cfg.max_upload_bytes),
            timeout_secs: cfg.request_timeout_secs,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Validator using this client's upload ceiling.
    pub fn validator(&self) -> UploadValidator {
        self.validator
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts a multipart upload of `upload`.
    ///
    /// The client is busy from this call until the returned value is awaited
    /// to completion or dropped. Calling this while busy yields a pending
    /// analysis that fails with [`AnalysisError::Busy`] without touching the
    /// network.
    pub fn analyze(&self, upload: &AcceptedUpload) -> PendingAnalysis {
        let payload = Payload::Upload((**upload).clone());
        self.arm(Ok(payload))
    }

    /// Posts a base64 image (plain or as a `data:` URI) as JSON instead of a
    /// multipart upload.
    pub fn analyze_encoded(&self, image: impl Into<String>) -> PendingAnalysis {
        let image = image.into();
        if image.trim().is_empty() {
            return self.arm(Err(Rejection::Empty.into()));
        }
        self.arm(Ok(Payload::Encoded(image)))
    }

    fn arm(&self, payload: Result<Payload, AnalysisError>) -> PendingAnalysis {
        let armed = payload.and_then(|payload| match BusyGuard::acquire(&self.busy) {
            Some(guard) => Ok((guard, payload)),
            None => {
                tracing::debug!("analysis requested while busy, rejecting");
                Err(AnalysisError::Busy)
            }
        });
        PendingAnalysis {
            exchange: Exchange {
                http: self.http.clone(),
                endpoint: self.endpoint.clone(),
                timeout_secs: self.timeout_secs,
            },
            armed,
        }
    }

    /// Queries the health endpoint. Independent of the busy flag.
    pub async fn check_health(&self) -> HealthStatus {
        let response = match self.http.get(self.health.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("health check failed: {e}");
                return HealthStatus::Unreachable(e.to_string());
            }
        };
        let status = response.status();
        if !status.is_success() {
            return HealthStatus::Unhealthy(format!("HTTP {}", status.as_u16()));
        }
        let status = match response.json::<HealthBody>().await {
            Ok(body) if body.status == "healthy" => HealthStatus::Healthy,
            Ok(body) => HealthStatus::Unhealthy(body.status),
            Err(e) => HealthStatus::Unhealthy(format!("unreadable health answer: {e}")),
        };
        tracing::info!(url = %self.health, ?status, "health check");
        status
    }
}

/// Holds the busy flag raised; lowers it on drop.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Payload {
    Upload(UploadCandidate),
    Encoded(String),
}

struct Exchange {
    http: reqwest::Client,
    endpoint: Url,
    timeout_secs: u64,
}

impl Exchange {
    async fn send(&self, payload: Payload) -> Result<AnalysisResult, AnalysisError> {
        let request = self.build_request(payload).await?;
        let response = request.send().await.map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "analysis request rejected");
            return Err(AnalysisError::Transport {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.network_error(e))?;
        response::interpret(&body)
    }

    async fn build_request(&self, payload: Payload) -> Result<RequestBuilder, AnalysisError> {
        let request = self.http.post(self.endpoint.clone());
        match payload {
            Payload::Upload(candidate) => {
                let bytes = candidate
                    .read_bytes()
                    .await
                    .map_err(|e| AnalysisError::Unreadable(e.to_string()))?;
                tracing::debug!(
                    file = %candidate.file_name,
                    size = bytes.len(),
                    url = %self.endpoint,
                    "uploading image for analysis"
                );
                let part = Part::bytes(bytes)
                    .file_name(candidate.file_name.clone())
                    .mime_str(&candidate.media_type)
                    .map_err(|_| Rejection::NotAnImage {
                        media_type: candidate.media_type.clone(),
                    })?;
                Ok(request.multipart(Form::new().part(FILE_FIELD, part)))
            }
            Payload::Encoded(image) => {
                tracing::debug!(chars = image.len(), url = %self.endpoint, "posting encoded image");
                Ok(request.json(&EncodedImageRequest { image: &image }))
            }
        }
    }

    fn network_error(&self, e: reqwest::Error) -> AnalysisError {
        if e.is_timeout() {
            tracing::warn!("analysis timed out after {}s", self.timeout_secs);
            AnalysisError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            tracing::warn!("analysis service unreachable: {e}");
            AnalysisError::Connectivity(e.to_string())
        }
    }
}

/// An analysis that has claimed the client's busy flag. Await it to run the
/// exchange.
#[must_use = "the client stays busy until this is awaited or dropped"]
pub struct PendingAnalysis {
    exchange: Exchange,
    armed: Result<(BusyGuard, Payload), AnalysisError>,
}

impl PendingAnalysis {
    pub async fn run(self) -> Result<AnalysisResult, AnalysisError> {
        let (_guard, payload) = self.armed?;
        let outcome = self.exchange.send(payload).await;
        match &outcome {
            Ok(result) => tracing::info!(
                diagnosis = %result.diagnosis,
                confidence = result.confidence,
                "analysis finished"
            ),
            Err(e) => tracing::warn!("analysis failed: {e}"),
        }
        outcome
    }
}

impl IntoFuture for PendingAnalysis {
    type Output = Result<AnalysisResult, AnalysisError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
