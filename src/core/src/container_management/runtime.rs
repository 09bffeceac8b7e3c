use async_trait::async_trait;

use super::types::{ByteCursor, ContainerState, ExecHandle, ExecOptions, LogOptions, RemoteChannel};
use crate::error_handling::types::RuntimeError;

/// Remote-channel acquisition entry point of a container runtime.
///
/// Implementations must be safe to call concurrently from any number of sessions;
/// nothing session-specific is stored between calls. The gateway receives one
/// instance at construction time (usually as `Arc<dyn ContainerRuntime>`).
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Looks up a container. Unknown containers yield [`RuntimeError::NotFound`].
    async fn inspect(&self, container_id: &str) -> Result<ContainerState, RuntimeError>;

    /// Creates an exec instance inside a container without starting it.
    async fn open_exec(
        &self,
        container_id: &str,
        options: &ExecOptions,
    ) -> Result<ExecHandle, RuntimeError>;

    /// Starts an exec instance and returns its attached input/output channel.
    async fn attach_exec(&self, exec: &ExecHandle, tty: bool)
        -> Result<RemoteChannel, RuntimeError>;

    /// Opens the multiplexed (framed) log stream of a container.
    async fn open_logs(
        &self,
        container_id: &str,
        options: &LogOptions,
    ) -> Result<ByteCursor, RuntimeError>;

    /// Opens the resource statistics stream of a container (one JSON document per line).
    async fn open_stats(&self, container_id: &str, stream: bool)
        -> Result<ByteCursor, RuntimeError>;
}
