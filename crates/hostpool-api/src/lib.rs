//! Typed Rust client for the host pool console backend.
//!
//! Covers pool snapshots (GPU types, aggregates), migration and runpod
//! launch preview/execute, target aggregate lookup, host workloads, launch
//! images and the backend command log.

mod types;

pub use types::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("console api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("console api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("console api {endpoint} rejected request: {message}")]
    Rejected {
        endpoint: &'static str,
        message: String,
    },
}

impl Error {
    /// Best human-readable message: the `error` field of a JSON error body
    /// when the backend sent one, the whole error otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::Api { body, .. } => serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                .unwrap_or_else(|| self.to_string()),
            Self::Rejected { message, .. } => message.clone(),
            Self::Request(_) => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the console backend REST API.
#[derive(Clone)]
pub struct ConsoleClient {
    base_url: String,
    http: reqwest::Client,
}

impl ConsoleClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    /// Turn a 2xx body that still carries an `error` field into [`Error::Rejected`].
    fn reject(endpoint: &'static str, error: Option<String>) -> Result<()> {
        match error {
            Some(message) => Err(Error::Rejected { endpoint, message }),
            None => Ok(()),
        }
    }

    // ── Pools ────────────────────────────────────────────────────────

    pub async fn gpu_types(&self) -> Result<Vec<String>> {
        let resp = self.http.get(self.url("/gpu-types")).send().await?;

        let body: GpuTypesResponse = Self::check(resp, "gpu types").await?.json().await?;
        Ok(body.gpu_types)
    }

    pub async fn aggregates(&self, gpu_type: &str) -> Result<AggregatesResponse> {
        let resp = self
            .http
            .get(self.url(&format!("/aggregates/{gpu_type}")))
            .send()
            .await?;

        Self::check(resp, "aggregates")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Ask the backend which aggregate a host would land in for a pool type.
    pub async fn target_aggregate(&self, req: &TargetAggregateRequest) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/get-target-aggregate"))
            .json(req)
            .send()
            .await?;

        let body: TargetAggregateResponse =
            Self::check(resp, "get target aggregate").await?.json().await?;
        Self::reject("get target aggregate", body.error)?;
        body.target_aggregate.ok_or_else(|| Error::Rejected {
            endpoint: "get target aggregate",
            message: format!("no target aggregate for {}", req.hostname),
        })
    }

    // ── Migrations ───────────────────────────────────────────────────

    pub async fn preview_migration(&self, req: &MigrationRequest) -> Result<Vec<String>> {
        let resp = self
            .http
            .post(self.url("/preview-migration"))
            .json(req)
            .send()
            .await?;

        let body: MigrationPreviewResponse =
            Self::check(resp, "preview migration").await?.json().await?;
        Self::reject("preview migration", body.error)?;
        Ok(body.commands)
    }

    pub async fn execute_migration(&self, req: &MigrationRequest) -> Result<ExecuteMigrationResponse> {
        let resp = self
            .http
            .post(self.url("/execute-migration"))
            .json(req)
            .send()
            .await?;

        Self::check(resp, "execute migration")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Runpod launches ──────────────────────────────────────────────

    pub async fn preview_launch(&self, req: &LaunchRequest) -> Result<LaunchPreviewResponse> {
        let resp = self
            .http
            .post(self.url("/preview-runpod-launch"))
            .json(req)
            .send()
            .await?;

        let body: LaunchPreviewResponse =
            Self::check(resp, "preview runpod launch").await?.json().await?;
        Self::reject("preview runpod launch", body.error.clone())?;
        Ok(body)
    }

    pub async fn execute_launch(&self, req: &LaunchRequest) -> Result<ExecuteLaunchResponse> {
        let resp = self
            .http
            .post(self.url("/execute-runpod-launch"))
            .json(req)
            .send()
            .await?;

        Self::check(resp, "execute runpod launch")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn images(&self) -> Result<Vec<Image>> {
        let resp = self.http.get(self.url("/hyperstack/images")).send().await?;

        let body: ImagesResponse = Self::check(resp, "list images").await?.json().await?;
        Self::reject("list images", body.error)?;
        Ok(body.images)
    }

    // ── Read-only views ──────────────────────────────────────────────

    pub async fn host_vms(&self, hostname: &str) -> Result<Vec<HostVm>> {
        let resp = self
            .http
            .get(self.url(&format!("/host-vms/{hostname}")))
            .send()
            .await?;

        let body: HostVmsResponse = Self::check(resp, "host vms").await?.json().await?;
        Ok(body.vms)
    }

    pub async fn command_log(&self) -> Result<Vec<CommandLogEntry>> {
        let resp = self.http.get(self.url("/command-log")).send().await?;

        let body: CommandLogResponse = Self::check(resp, "command log").await?.json().await?;
        Ok(body.commands)
    }

    pub async fn clear_command_log(&self) -> Result<()> {
        let resp = self.http.post(self.url("/clear-log")).send().await?;

        Self::check(resp, "clear command log").await?;
        Ok(())
    }
}
