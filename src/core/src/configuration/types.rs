use serde::Deserialize;

/// Connection settings for the container runtime's HTTP API.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base URL of the Engine API, e.g. `http://127.0.0.1:2375`.
    pub endpoint: String,
    /// Optional API version prefix such as `v1.43`.
    pub api_version: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://127.0.0.1:2375"),
            api_version: None,
            connect_timeout_secs: 5,
        }
    }
}

/// Per-session tunables.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of backlog lines replayed before following live logs (`"all"` or a count).
    pub log_tail: String,
    /// Shell started for terminal sessions when present in the container.
    pub preferred_shell: String,
    /// Shell used when `preferred_shell` is not executable.
    pub fallback_shell: String,
    /// Upper bound of bytes forwarded per remote read in terminal sessions.
    pub pump_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            log_tail: String::from("100"),
            preferred_shell: String::from("/bin/bash"),
            fallback_shell: String::from("/bin/sh"),
            pump_buffer_size: 4096,
        }
    }
}

impl SessionConfig {
    /// Interactive shell command: run the preferred shell, or fall back when it is absent.
    pub fn shell_command(&self) -> Vec<String> {
        vec![
            self.fallback_shell.clone(),
            String::from("-c"),
            format!(
                "if [ -x {p} ]; then exec {p}; else exec {f}; fi",
                p = self.preferred_shell,
                f = self.fallback_shell
            ),
        ]
    }
}
