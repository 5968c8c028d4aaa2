//! HTTP client for the nettune server
//!
//! Thin typed wrapper over the `{success, data, error}` envelope. Every
//! request carries the bearer token via default headers.

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use nettune_core::{
    ApiResponse, ApplyRequest, ApplyResult, ClientConfig, Profile, ProfileMeta, RollbackRequest,
    RollbackResult, ServerInfo, Snapshot, SystemState, SystemStatus, UploadResponse,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Typed client over the server API.
#[derive(Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", config.api_key)
                .parse()
                .map_err(|_| anyhow!("invalid bearer token"))?,
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: config.server.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Unwrap the response envelope into the typed payload.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let envelope: ApiResponse = response
            .json()
            .await
            .context("failed to parse server response")?;
        if !envelope.success {
            let err = envelope
                .error
                .ok_or_else(|| anyhow!("server reported failure without an error payload"))?;
            return Err(err.into());
        }
        let data = envelope
            .data
            .ok_or_else(|| anyhow!("server response missing data"))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(format!("{}{path}", self.base_url)).send().await?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn probe_echo(&self) -> Result<()> {
        let _: serde_json::Value = self.get_json("/probe/echo").await?;
        Ok(())
    }

    /// Download `bytes` and discard them, returning what arrived and how
    /// long it took.
    pub async fn probe_download(&self, bytes: u64) -> Result<(u64, Duration)> {
        let start = Instant::now();
        let response = self
            .http
            .get(format!("{}/probe/download?bytes={bytes}", self.base_url))
            .send()
            .await?;

        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            received += chunk?.len() as u64;
        }
        Ok((received, start.elapsed()))
    }

    pub async fn probe_upload(&self, data: Vec<u8>) -> Result<UploadResponse> {
        let response = self
            .http
            .post(format!("{}/probe/upload", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn probe_info(&self) -> Result<ServerInfo> {
        self.get_json("/probe/info").await
    }

    pub async fn list_profiles(&self) -> Result<Vec<ProfileMeta>> {
        #[derive(Deserialize)]
        struct Listing {
            profiles: Vec<ProfileMeta>,
        }
        let listing: Listing = self.get_json("/profiles").await?;
        Ok(listing.profiles)
    }

    pub async fn get_profile(&self, id: &str) -> Result<Profile> {
        self.get_json(&format!("/profiles/{id}")).await
    }

    pub async fn create_profile(&self, profile: &Profile) -> Result<ProfileMeta> {
        self.post_json("/profiles", profile).await
    }

    /// POST /sys/snapshot, returning the new id and captured state.
    pub async fn create_snapshot(&self) -> Result<(String, SystemState)> {
        #[derive(Deserialize)]
        struct Created {
            snapshot_id: String,
            current_state: SystemState,
        }
        let created: Created = self
            .post_json("/sys/snapshot", &serde_json::json!({}))
            .await?;
        Ok((created.snapshot_id, created.current_state))
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Snapshot> {
        self.get_json(&format!("/sys/snapshot/{id}")).await
    }

    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.get_json("/sys/snapshots").await
    }

    pub async fn apply(&self, request: &ApplyRequest) -> Result<ApplyResult> {
        self.post_json("/sys/apply", request).await
    }

    pub async fn rollback(&self, request: &RollbackRequest) -> Result<RollbackResult> {
        self.post_json("/sys/rollback", request).await
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        self.get_json("/sys/status").await
    }
}
