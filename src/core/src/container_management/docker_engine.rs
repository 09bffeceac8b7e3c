use async_trait::async_trait;
use futures::TryStreamExt;
use log::{debug, info, warn};
use reqwest::header::{CONNECTION, UPGRADE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::io::StreamReader;

use super::runtime::ContainerRuntime;
use super::types::{
    validate_container_id, ByteCursor, ContainerState, ExecHandle, ExecOptions, LogOptions,
    RemoteChannel,
};
use crate::configuration::types::RuntimeConfig;
use crate::error_handling::types::RuntimeError;

/// [`ContainerRuntime`] backed by the Docker Engine HTTP API.
///
/// Design notes:
/// - Only plain `http(s)://` endpoints are supported (e.g. a daemon started with
///   `-H tcp://127.0.0.1:2375` or a socket proxy in front of `/var/run/docker.sock`).
/// - Log and stats responses are never buffered: their bodies are exposed as
///   [`ByteCursor`]s that yield bytes as the daemon produces them.
/// - Exec attach uses the Engine's connection upgrade; the upgraded connection is
///   split into the read and write halves of a [`RemoteChannel`].
pub struct DockerEngine {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct InspectResponse {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Running")]
    running: bool,
}

#[derive(Deserialize)]
struct ExecCreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct EngineMessage {
    message: String,
}

impl DockerEngine {
    /// Creates an engine client for `config.endpoint`.
    ///
    /// No request is sent; an unreachable daemon surfaces on the first session.
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        let mut base_url = config.endpoint.trim().trim_end_matches('/').to_string();
        if let Some(version) = &config.api_version {
            base_url.push('/');
            base_url.push_str(version);
        }

        info!("DockerEngine initialized with endpoint: {}", base_url);
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turns a non-success response into a [`RuntimeError`]; 404 means `NotFound(subject)`.
    async fn expect_success(response: Response, subject: &str) -> Result<Response, RuntimeError> {
        let status = response.status();
        if status.is_success() || status == StatusCode::SWITCHING_PROTOCOLS {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RuntimeError::NotFound(subject.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<EngineMessage>(&body)
            .map(|m| m.message)
            .unwrap_or(body);
        Err(RuntimeError::UnexpectedStatus {
            status: status.as_u16(),
            message,
        })
    }

    fn body_cursor(response: Response) -> ByteCursor {
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Box::new(StreamReader::new(Box::pin(body)))
    }
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RuntimeError> {
        let id = validate_container_id(container_id)?;
        debug!("Inspecting container {}", id);

        let response = self
            .client
            .get(self.url(&format!("/containers/{}/json", id)))
            .send()
            .await?;
        let response = Self::expect_success(response, id).await?;
        let inspect: InspectResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::DecodeFailed(e.to_string()))?;

        Ok(ContainerState {
            id: inspect.id,
            running: inspect.state.running,
        })
    }

    async fn open_exec(
        &self,
        container_id: &str,
        options: &ExecOptions,
    ) -> Result<ExecHandle, RuntimeError> {
        let id = validate_container_id(container_id)?;
        debug!("Creating exec instance in container {}: {:?}", id, options.cmd);

        let response = self
            .client
            .post(self.url(&format!("/containers/{}/exec", id)))
            .json(options)
            .send()
            .await?;
        let response = Self::expect_success(response, id).await?;
        let created: ExecCreateResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::DecodeFailed(e.to_string()))?;

        Ok(ExecHandle {
            id: created.id,
            container_id: id.to_string(),
        })
    }

    async fn attach_exec(
        &self,
        exec: &ExecHandle,
        tty: bool,
    ) -> Result<RemoteChannel, RuntimeError> {
        let exec_id = validate_container_id(&exec.id)?;
        debug!(
            "Attaching to exec instance {} of container {}",
            exec_id, exec.container_id
        );

        let response = self
            .client
            .post(self.url(&format!("/exec/{}/start", exec_id)))
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "tcp")
            .json(&serde_json::json!({ "Detach": false, "Tty": tty }))
            .send()
            .await?;
        let response = Self::expect_success(response, exec_id).await?;

        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            warn!(
                "Exec {} start answered {} instead of switching protocols",
                exec_id,
                response.status()
            );
            return Err(RuntimeError::UpgradeFailed(format!(
                "expected 101 Switching Protocols, got {}",
                response.status()
            )));
        }

        let upgraded = response
            .upgrade()
            .await
            .map_err(|e| RuntimeError::UpgradeFailed(e.to_string()))?;
        let (output, input) = tokio::io::split(upgraded);
        Ok(RemoteChannel::new(Box::new(output), Box::new(input)))
    }

    async fn open_logs(
        &self,
        container_id: &str,
        options: &LogOptions,
    ) -> Result<ByteCursor, RuntimeError> {
        let id = validate_container_id(container_id)?;
        let path = format!(
            "/containers/{}/logs?stdout={}&stderr={}&follow={}&tail={}",
            id,
            u8::from(options.stdout),
            u8::from(options.stderr),
            u8::from(options.follow),
            options.tail
        );
        debug!("Opening log stream: {}", path);

        let response = self.client.get(self.url(&path)).send().await?;
        let response = Self::expect_success(response, id).await?;
        Ok(Self::body_cursor(response))
    }

    async fn open_stats(
        &self,
        container_id: &str,
        stream: bool,
    ) -> Result<ByteCursor, RuntimeError> {
        let id = validate_container_id(container_id)?;
        let path = format!("/containers/{}/stats?stream={}", id, u8::from(stream));
        debug!("Opening stats stream: {}", path);

        let response = self.client.get(self.url(&path)).send().await?;
        let response = Self::expect_success(response, id).await?;
        Ok(Self::body_cursor(response))
    }
}
