// SPDX-License-Identifier: MIT

//! `ApiWorker` — calls an injectable [`ApiClient`]. The shipped
//! implementation wraps `reqwest`'s blocking client under
//! `spawn_blocking`, matching the synchronous-adapter style the pack's
//! webhook-notification crate uses for outbound HTTP calls.

use crate::worker::{StepContext, StepOutcome, Worker};
use async_trait::async_trait;
use oj_core::ErrorInfo;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiRequest {
    pub job_id: String,
    pub step_id: String,
    pub agent: String,
    pub goal: String,
    pub prompt: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub report: String,
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiCallError {
    pub message: String,
    pub retriable: bool,
}

/// Abstracts the outbound HTTP call so tests can substitute a stub without
/// a live server. Implementations must be safe to invoke from a blocking
/// thread pool (`reqwest::blocking` is the shipped choice).
pub trait ApiClient: Send + Sync {
    fn call(&self, endpoint: &str, request: &ApiRequest) -> Result<ApiResponse, ApiCallError>;
}

pub struct ReqwestApiClient {
    client: reqwest::blocking::Client,
}

impl ReqwestApiClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ApiClient for ReqwestApiClient {
    fn call(&self, endpoint: &str, request: &ApiRequest) -> Result<ApiResponse, ApiCallError> {
        let response = self.client.post(endpoint).json(request).send().map_err(|e| ApiCallError {
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect(),
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ApiCallError {
                message: format!("endpoint returned status {status}: {body}"),
                retriable: status.is_server_error(),
            });
        }
        response.json::<ApiResponse>().map_err(|e| ApiCallError { message: e.to_string(), retriable: false })
    }
}

#[derive(Clone)]
pub struct ApiWorker {
    endpoints: BTreeMap<String, String>,
    client: Arc<dyn ApiClient>,
}

impl ApiWorker {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self { endpoints: BTreeMap::new(), client }
    }

    pub fn with_endpoint(mut self, agent: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(agent.into(), url.into());
        self
    }
}

#[async_trait]
impl Worker for ApiWorker {
    async fn run(&self, ctx: &StepContext) -> StepOutcome {
        let Some(endpoint) = self.endpoints.get(&ctx.step.agent).cloned() else {
            return StepOutcome::failed(ErrorInfo::new(
                "worker_not_found",
                format!("no endpoint registered for agent {:?}", ctx.step.agent),
            ));
        };

        let request = ApiRequest {
            job_id: ctx.job.job_id.to_string(),
            step_id: ctx.step.step_id.to_string(),
            agent: ctx.step.agent.clone(),
            goal: ctx.job.goal.clone(),
            prompt: ctx.step.prompt.clone(),
        };
        let client = self.client.clone();

        let call = tokio::task::spawn_blocking(move || client.call(&endpoint, &request));
        let outcome = tokio::select! {
            result = call => result,
            _ = ctx.cancel.cancelled() => {
                return StepOutcome::failed(ErrorInfo::new("timeout", "api worker cancelled before response"));
            }
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(call_err)) => {
                let code = if call_err.retriable { "transient_io" } else { "subprocess_exit_nonzero" };
                return StepOutcome::failed(ErrorInfo::new(code, call_err.message));
            }
            Err(join_err) => {
                return StepOutcome::failed(ErrorInfo::new(
                    "worker_contract_violation",
                    format!("api call task panicked: {join_err}"),
                ));
            }
        };

        let logs = ctx.redactor.redact(&response.logs);
        if let Err(e) = write_artifacts(ctx, &response.report, &response.patch, &logs) {
            return StepOutcome::failed(ErrorInfo::new(
                "worker_contract_violation",
                format!("failed to write step artifacts: {e}"),
            ));
        }

        if response.success {
            StepOutcome::ok()
        } else {
            StepOutcome::failed(ErrorInfo::new(
                "subprocess_exit_nonzero",
                response.error.unwrap_or_else(|| "remote agent reported failure".to_string()),
            ))
        }
    }
}

fn write_artifacts(ctx: &StepContext, report: &str, patch: &str, logs: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(&ctx.step_dir)?;
    std::fs::write(ctx.step_dir.join("report.md"), report)?;
    std::fs::write(ctx.step_dir.join("patch.diff"), patch)?;
    std::fs::write(ctx.step_dir.join("logs.txt"), logs)?;
    Ok(())
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
