//! Container runtime collaborator.
//!
//! This module exposes the small surface the gateway needs from a container runtime:
//! inspecting a container and acquiring remote channels (interactive exec, log stream,
//! statistics stream). Everything else a runtime can do (start/stop/pull...) lives
//! outside the gateway.
//!
//! Re-exports:
//! - [`ContainerRuntime`]: the capability trait handed to the session layer.
//! - [`DockerEngine`]: implementation over the Docker Engine HTTP API.
//! - [`RemoteChannel`], [`ExecOptions`], [`LogOptions`], ...: request and handle types.
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use dockgate::configuration::RuntimeConfig;
//! use dockgate::container_management::{ContainerRuntime, DockerEngine};
//!
//! let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerEngine::new(&RuntimeConfig::default())?);
//! let state = runtime.inspect("my-container").await?;
//! println!("running: {}", state.running);
//! ```

pub mod docker_engine;
pub mod runtime;
pub mod types;

pub use docker_engine::DockerEngine;
pub use runtime::ContainerRuntime;
pub use types::{
    validate_container_id, ByteCursor, ByteSink, ContainerState, ExecHandle, ExecOptions,
    LogOptions, RemoteChannel,
};
