use futures::{Sink, Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::duplex_pump::DuplexPump;
use super::session::{CloseReason, Session, SessionKind};
use super::transport::{ClientEndpoint, ClientMessage};
use super::SessionState;
use crate::configuration::types::SessionConfig;
use crate::container_management::runtime::ContainerRuntime;
use crate::container_management::types::{ExecOptions, LogOptions};
use crate::error_handling::types::SessionError;
use crate::stream_processing::frame_codec::FrameReader;
use crate::stream_processing::metrics::{MetricSample, MetricsAggregator};

/// Drives sessions from connection to teardown.
///
/// Each call to [`SessionManager::serve`] owns one session. Sessions share nothing
/// but the runtime client, so any number may run concurrently.
///
/// # Fields Overview
///
/// - `runtime`: the container runtime capability every session talks to
/// - `config`: per-session tunables (shell, log backlog, pump buffer size)
#[derive(Clone)]
pub struct SessionManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SessionConfig) -> Self {
        Self { runtime, config }
    }

    /// Serves one session of `kind` against `container_id` over a client connection
    /// split into its `inbound` message stream and outbound `sink`.
    ///
    /// Setup failures are reported to the client as a single text message. The
    /// client is always closed before this returns, and the returned session is
    /// in [`SessionState::Closed`].
    pub async fn serve<S, E, K>(
        &self,
        container_id: &str,
        kind: SessionKind,
        inbound: S,
        sink: K,
    ) -> Session
    where
        S: Stream<Item = Result<ClientMessage, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
        K: Sink<String> + Send + Unpin + 'static,
        K::Error: Display,
    {
        let mut session = Session::new(container_id, kind);
        info!(
            "[{}] Opening {} session for container {}",
            session.id, kind, container_id
        );

        let client = Arc::new(ClientEndpoint::new(sink));
        let outcome = match kind {
            SessionKind::Terminal => self.run_terminal(&mut session, inbound, &client).await,
            SessionKind::Logs => self.run_logs(&mut session, inbound, &client).await,
            SessionKind::Stats => self.run_stats(&mut session, inbound, &client).await,
        };

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                warn!("[{}] {} session setup failed: {}", session.id, kind, e);
                let message = e.user_message();
                if let Err(send_error) = client.send_text(message.to_string()).await {
                    debug!("[{}] Could not report failure: {}", session.id, send_error);
                }
                CloseReason::SetupFailed(message)
            }
        };

        client.close().await;
        session.close(reason);
        match serde_json::to_string(&session) {
            Ok(record) => info!("[{}] Session closed: {}", session.id, record),
            Err(e) => info!(
                "[{}] Session closed ({:?}); record unavailable: {}",
                session.id,
                session.close_reason(),
                e
            ),
        }
        session
    }

    async fn run_terminal<S, E, K>(
        &self,
        session: &mut Session,
        inbound: S,
        client: &Arc<ClientEndpoint<K>>,
    ) -> Result<CloseReason, SessionError>
    where
        S: Stream<Item = Result<ClientMessage, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
        K: Sink<String> + Send + Unpin + 'static,
        K::Error: Display,
    {
        let state = self
            .runtime
            .inspect(&session.container_id)
            .await
            .map_err(SessionError::ContainerNotFound)?;
        if !state.running {
            return Err(SessionError::ContainerNotRunning);
        }
        debug!("[{}] Container {} is running", session.id, state.id);
        session.advance(SessionState::PreconditionChecked);

        let options = ExecOptions::interactive(self.config.shell_command());
        let exec = self
            .runtime
            .open_exec(&session.container_id, &options)
            .await
            .map_err(SessionError::ExecCreateFailed)?;
        let channel = self
            .runtime
            .attach_exec(&exec, options.tty)
            .await
            .map_err(SessionError::ExecAttachFailed)?;
        session.advance(SessionState::ChannelAcquired);

        debug!("[{}] Attached to exec {}", session.id, exec.id);
        session.advance(SessionState::Streaming);
        let exit = DuplexPump::new(session.id, self.config.pump_buffer_size)
            .run(inbound, Arc::clone(client), channel)
            .await;
        Ok(CloseReason::from(exit))
    }

    async fn run_logs<S, E, K>(
        &self,
        session: &mut Session,
        mut inbound: S,
        client: &ClientEndpoint<K>,
    ) -> Result<CloseReason, SessionError>
    where
        S: Stream<Item = Result<ClientMessage, E>> + Unpin,
        E: Display,
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        session.advance(SessionState::PreconditionChecked);
        let options = LogOptions::follow_with_tail(self.config.log_tail.clone());
        let cursor = self
            .runtime
            .open_logs(&session.container_id, &options)
            .await
            .map_err(SessionError::LogsUnavailable)?;
        session.advance(SessionState::ChannelAcquired);
        session.advance(SessionState::Streaming);

        let mut frames = FrameReader::new(cursor);
        loop {
            tokio::select! {
                next = frames.next_frame() => match next {
                    Ok(Some(frame)) => {
                        if let Err(e) = client.send_text(frame.text()).await {
                            debug!("[{}] client send failed: {}", session.id, e);
                            return Ok(CloseReason::ClientGone);
                        }
                    }
                    Ok(None) => {
                        debug!("[{}] log stream ended", session.id);
                        return Ok(CloseReason::RemoteEnded);
                    }
                    Err(e) => {
                        warn!("[{}] Log stream framing error: {}", session.id, e);
                        return Ok(CloseReason::RemoteFailed(e.to_string()));
                    }
                },
                message = inbound.next() => {
                    if client_left(session, message) {
                        return Ok(CloseReason::ClientGone);
                    }
                }
            }
        }
    }

    async fn run_stats<S, E, K>(
        &self,
        session: &mut Session,
        mut inbound: S,
        client: &ClientEndpoint<K>,
    ) -> Result<CloseReason, SessionError>
    where
        S: Stream<Item = Result<ClientMessage, E>> + Unpin,
        E: Display,
        K: Sink<String> + Unpin,
        K::Error: Display,
    {
        session.advance(SessionState::PreconditionChecked);
        let cursor = self
            .runtime
            .open_stats(&session.container_id, true)
            .await
            .map_err(SessionError::StatsUnavailable)?;
        session.advance(SessionState::ChannelAcquired);
        session.advance(SessionState::Streaming);

        let mut samples = BufReader::new(cursor).lines();
        let mut aggregator = MetricsAggregator::new();
        loop {
            tokio::select! {
                line = samples.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let sample = match MetricSample::from_json(&line) {
                            Ok(sample) => sample,
                            Err(e) => {
                                debug!("[{}] stats stream ended on undecodable sample: {}", session.id, e);
                                return Ok(CloseReason::RemoteEnded);
                            }
                        };
                        let Some(summary) = aggregator.push(sample) else {
                            continue;
                        };
                        let payload = match serde_json::to_string(&summary) {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!("[{}] Could not encode metrics: {}", session.id, e);
                                continue;
                            }
                        };
                        if let Err(e) = client.send_text(payload).await {
                            debug!("[{}] client send failed: {}", session.id, e);
                            return Ok(CloseReason::ClientGone);
                        }
                    }
                    Ok(None) => {
                        debug!("[{}] stats stream ended", session.id);
                        return Ok(CloseReason::RemoteEnded);
                    }
                    Err(e) => {
                        warn!("[{}] Stats stream read failed: {}", session.id, e);
                        return Ok(CloseReason::RemoteFailed(e.to_string()));
                    }
                },
                message = inbound.next() => {
                    if client_left(session, message) {
                        return Ok(CloseReason::ClientGone);
                    }
                }
            }
        }
    }
}

/// Whether an inbound message on a read-only session means the client is gone.
/// Anything else the client sends is ignored.
fn client_left<E: Display>(session: &Session, message: Option<Result<ClientMessage, E>>) -> bool {
    match message {
        None | Some(Ok(ClientMessage::Close)) => {
            debug!("[{}] client disconnected", session.id);
            true
        }
        Some(Err(e)) => {
            debug!("[{}] client read failed: {}", session.id, e);
            true
        }
        Some(Ok(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_management::types::{
        ByteCursor, ContainerState, ExecHandle, RemoteChannel,
    };
    use crate::error_handling::types::RuntimeError;
    use async_trait::async_trait;
    use futures::channel::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    #[derive(Default)]
    struct FakeRuntime {
        running: Option<bool>,
        fail_exec: bool,
        fail_attach: bool,
        logs: Option<Vec<u8>>,
        stats: Option<Vec<u8>>,
        shell: Mutex<Option<DuplexStream>>,
        calls: Mutex<Vec<String>>,
        exec_options: Mutex<Option<ExecOptions>>,
    }

    impl FakeRuntime {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn failure() -> RuntimeError {
        RuntimeError::UnexpectedStatus {
            status: 500,
            message: "daemon unavailable".into(),
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn inspect(&self, container_id: &str) -> Result<ContainerState, RuntimeError> {
            self.record("inspect");
            match self.running {
                Some(running) => Ok(ContainerState {
                    id: container_id.to_string(),
                    running,
                }),
                None => Err(RuntimeError::NotFound(container_id.to_string())),
            }
        }

        async fn open_exec(
            &self,
            container_id: &str,
            options: &ExecOptions,
        ) -> Result<ExecHandle, RuntimeError> {
            self.record("open_exec");
            *self.exec_options.lock().unwrap() = Some(options.clone());
            if self.fail_exec {
                return Err(failure());
            }
            Ok(ExecHandle {
                id: "exec1".into(),
                container_id: container_id.to_string(),
            })
        }

        async fn attach_exec(
            &self,
            _exec: &ExecHandle,
            _tty: bool,
        ) -> Result<RemoteChannel, RuntimeError> {
            self.record("attach_exec");
            if self.fail_attach {
                return Err(failure());
            }
            let (gateway, shell) = tokio::io::duplex(1024);
            *self.shell.lock().unwrap() = Some(shell);
            let (output, input) = tokio::io::split(gateway);
            Ok(RemoteChannel::new(Box::new(output), Box::new(input)))
        }

        async fn open_logs(
            &self,
            _container_id: &str,
            options: &LogOptions,
        ) -> Result<ByteCursor, RuntimeError> {
            self.record(&format!("open_logs tail={}", options.tail));
            match &self.logs {
                Some(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
                None => Err(failure()),
            }
        }

        async fn open_stats(
            &self,
            _container_id: &str,
            stream: bool,
        ) -> Result<ByteCursor, RuntimeError> {
            self.record(&format!("open_stats stream={}", stream));
            match &self.stats {
                Some(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
                None => Err(failure()),
            }
        }
    }

    type Inbound = mpsc::UnboundedReceiver<Result<ClientMessage, std::io::Error>>;
    type Inlet = mpsc::UnboundedSender<Result<ClientMessage, std::io::Error>>;

    fn client() -> (
        Inlet,
        Inbound,
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded();
        let (out_tx, out_rx) = mpsc::unbounded();
        (in_tx, in_rx, out_tx, out_rx)
    }

    fn manager(runtime: &Arc<FakeRuntime>) -> SessionManager {
        SessionManager::new(runtime.clone(), SessionConfig::default())
    }

    async fn received(mut out_rx: mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(message) = out_rx.next().await {
            messages.push(message);
        }
        messages
    }

    fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn stats_line(cpu: u64, system: u64) -> String {
        format!(
            "{{\"cpu_stats\":{{\"cpu_usage\":{{\"total_usage\":{}}},\"system_cpu_usage\":{},\"online_cpus\":4}},\
             \"memory_stats\":{{\"usage\":524288000,\"limit\":838860800,\"stats\":{{\"cache\":104857600}}}}}}\n",
            cpu, system
        )
    }

    #[tokio::test]
    async fn stopped_container_is_reported_and_no_exec_is_created() {
        let runtime = Arc::new(FakeRuntime {
            running: Some(false),
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        let session = manager(&runtime)
            .serve("web", SessionKind::Terminal, in_rx, out_tx)
            .await;

        assert_eq!(
            received(out_rx).await,
            vec!["Error: Container is not running."]
        );
        assert_eq!(runtime.calls(), vec!["inspect"]);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.close_reason(),
            Some(&CloseReason::SetupFailed("Error: Container is not running."))
        );
    }

    #[tokio::test]
    async fn missing_container_is_reported() {
        let runtime = Arc::new(FakeRuntime::default());
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        manager(&runtime)
            .serve("ghost", SessionKind::Terminal, in_rx, out_tx)
            .await;

        assert_eq!(
            received(out_rx).await,
            vec!["Error: Could not find container."]
        );
    }

    #[tokio::test]
    async fn exec_failures_are_reported_per_step() {
        let runtime = Arc::new(FakeRuntime {
            running: Some(true),
            fail_exec: true,
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();
        manager(&runtime)
            .serve("web", SessionKind::Terminal, in_rx, out_tx)
            .await;
        assert_eq!(
            received(out_rx).await,
            vec!["Error: Failed to create terminal session."]
        );
        assert_eq!(runtime.calls(), vec!["inspect", "open_exec"]);

        let runtime = Arc::new(FakeRuntime {
            running: Some(true),
            fail_attach: true,
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();
        manager(&runtime)
            .serve("web", SessionKind::Terminal, in_rx, out_tx)
            .await;
        assert_eq!(
            received(out_rx).await,
            vec!["Error: Failed to attach to terminal."]
        );
    }

    #[tokio::test]
    async fn terminal_session_runs_shell_and_forwards() {
        let runtime = Arc::new(FakeRuntime {
            running: Some(true),
            ..Default::default()
        });
        let (in_tx, in_rx, out_tx, mut out_rx) = client();
        let sessions = manager(&runtime);
        let serving =
            tokio::spawn(async move { sessions.serve("web", SessionKind::Terminal, in_rx, out_tx).await });

        in_tx
            .unbounded_send(Ok(ClientMessage::Text("echo hi\n".into())))
            .unwrap();

        let mut shell = loop {
            if let Some(shell) = runtime.shell.lock().unwrap().take() {
                break shell;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let mut typed = [0u8; 8];
        shell.read_exact(&mut typed).await.unwrap();
        assert_eq!(&typed, b"echo hi\n");

        shell.write_all(b"hi\n").await.unwrap();
        assert_eq!(out_rx.next().await.as_deref(), Some("hi\n"));

        drop(shell);
        let session = timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.close_reason(), Some(&CloseReason::RemoteEnded));
        assert_eq!(out_rx.next().await, None);

        let options = runtime.exec_options.lock().unwrap().clone().unwrap();
        assert!(options.tty && options.attach_stdin);
        assert_eq!(options.cmd, SessionConfig::default().shell_command());
    }

    #[tokio::test]
    async fn logs_session_sends_one_message_per_frame() {
        let mut logs = frame(1, b"hello");
        logs.extend(frame(2, b""));
        logs.extend(frame(2, b"warning: disk\n"));
        let runtime = Arc::new(FakeRuntime {
            logs: Some(logs),
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        let session = manager(&runtime)
            .serve("web", SessionKind::Logs, in_rx, out_tx)
            .await;

        assert_eq!(
            received(out_rx).await,
            vec!["hello", "warning: disk\n"]
        );
        assert_eq!(runtime.calls(), vec!["open_logs tail=100"]);
        assert_eq!(session.close_reason(), Some(&CloseReason::RemoteEnded));
    }

    #[tokio::test]
    async fn truncated_log_stream_ends_session() {
        let mut logs = frame(1, b"complete");
        logs.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 9, b'c', b'u', b't']);
        let runtime = Arc::new(FakeRuntime {
            logs: Some(logs),
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        let session = manager(&runtime)
            .serve("web", SessionKind::Logs, in_rx, out_tx)
            .await;

        assert_eq!(
            received(out_rx).await,
            vec!["complete"]
        );
        assert!(matches!(
            session.close_reason(),
            Some(CloseReason::RemoteFailed(_))
        ));
    }

    #[tokio::test]
    async fn unavailable_streams_are_reported() {
        let runtime = Arc::new(FakeRuntime::default());

        let (_in_tx, in_rx, out_tx, out_rx) = client();
        manager(&runtime)
            .serve("web", SessionKind::Logs, in_rx, out_tx)
            .await;
        assert_eq!(
            received(out_rx).await,
            vec!["Error: Could not retrieve logs for container."]
        );

        let (_in_tx, in_rx, out_tx, out_rx) = client();
        manager(&runtime)
            .serve("web", SessionKind::Stats, in_rx, out_tx)
            .await;
        assert_eq!(
            received(out_rx).await,
            vec!["Error: Could not get container stats."]
        );
        assert!(!runtime.calls().iter().any(|c| c == "inspect"));
    }

    #[tokio::test]
    async fn stats_session_emits_from_second_sample() {
        let stats = [stats_line(100, 1000), stats_line(150, 1100), stats_line(200, 1200)].concat();
        let runtime = Arc::new(FakeRuntime {
            stats: Some(stats.into_bytes()),
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        manager(&runtime)
            .serve("web", SessionKind::Stats, in_rx, out_tx)
            .await;

        let messages = received(out_rx).await;
        assert_eq!(messages.len(), 2);
        for text in messages {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(
                value,
                serde_json::json!({"cpu_percent": 200.0, "memory_percent": 50.0, "memory_usage": 400.0})
            );
        }
        assert_eq!(runtime.calls(), vec!["open_stats stream=true"]);
    }

    #[tokio::test]
    async fn malformed_stats_sample_ends_session_quietly() {
        let stats = [
            stats_line(100, 1000),
            stats_line(150, 1100),
            "not json\n".to_string(),
            stats_line(200, 1200),
        ]
        .concat();
        let runtime = Arc::new(FakeRuntime {
            stats: Some(stats.into_bytes()),
            ..Default::default()
        });
        let (_in_tx, in_rx, out_tx, out_rx) = client();

        let session = manager(&runtime)
            .serve("web", SessionKind::Stats, in_rx, out_tx)
            .await;

        let messages = received(out_rx).await;
        assert_eq!(messages.len(), 1);
        assert!(!messages.iter().any(|m| m.starts_with("Error:")));
        let value: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"cpu_percent": 200.0, "memory_percent": 50.0, "memory_usage": 400.0})
        );
        assert_eq!(session.close_reason(), Some(&CloseReason::RemoteEnded));
    }

    /// Runtime whose log and stats streams stay open without ever producing a byte.
    #[derive(Default)]
    struct SilentRuntime {
        writers: Mutex<Vec<DuplexStream>>,
    }

    impl SilentRuntime {
        fn silent_cursor(&self) -> ByteCursor {
            let (cursor, writer) = tokio::io::duplex(64);
            self.writers.lock().unwrap().push(writer);
            Box::new(cursor)
        }
    }

    #[async_trait]
    impl ContainerRuntime for SilentRuntime {
        async fn inspect(&self, id: &str) -> Result<ContainerState, RuntimeError> {
            Err(RuntimeError::NotFound(id.to_string()))
        }
        async fn open_exec(&self, _: &str, _: &ExecOptions) -> Result<ExecHandle, RuntimeError> {
            Err(failure())
        }
        async fn attach_exec(&self, _: &ExecHandle, _: bool) -> Result<RemoteChannel, RuntimeError> {
            Err(failure())
        }
        async fn open_logs(&self, _: &str, _: &LogOptions) -> Result<ByteCursor, RuntimeError> {
            Ok(self.silent_cursor())
        }
        async fn open_stats(&self, _: &str, _: bool) -> Result<ByteCursor, RuntimeError> {
            Ok(self.silent_cursor())
        }
    }

    #[tokio::test]
    async fn client_leaving_ends_a_live_log_session() {
        let (in_tx, in_rx, out_tx, out_rx) = client();
        let sessions = SessionManager::new(Arc::new(SilentRuntime::default()), SessionConfig::default());
        let serving =
            tokio::spawn(async move { sessions.serve("web", SessionKind::Logs, in_rx, out_tx).await });

        in_tx
            .unbounded_send(Ok(ClientMessage::Text("ignored".into())))
            .unwrap();
        in_tx.unbounded_send(Ok(ClientMessage::Close)).unwrap();

        let session = timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.close_reason(), Some(&CloseReason::ClientGone));
        assert!(received(out_rx).await.is_empty());
    }

    #[tokio::test]
    async fn client_leaving_ends_a_live_stats_session() {
        let runtime = Arc::new(SilentRuntime::default());
        let (in_tx, in_rx, out_tx, out_rx) = client();
        let sessions = SessionManager::new(runtime.clone(), SessionConfig::default());
        let serving =
            tokio::spawn(async move { sessions.serve("web", SessionKind::Stats, in_rx, out_tx).await });

        in_tx
            .unbounded_send(Ok(ClientMessage::Binary(vec![7])))
            .unwrap();
        drop(in_tx);

        let session = timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.close_reason(), Some(&CloseReason::ClientGone));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(received(out_rx).await.is_empty());
        assert_eq!(runtime.writers.lock().unwrap().len(), 1);
    }
}
