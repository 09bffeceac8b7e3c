//! Common data types used across the stream_processing subsystem.

use bytes::Bytes;
use serde::Serialize;

/// Stream a demultiplexed frame was written to, taken from the frame header's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Tag `0`: the runtime did not attribute the bytes to a stream.
    Unset,
    /// Tag `1`: standard output.
    Stdout,
    /// Tag `2`: standard error.
    Stderr,
    /// Any other tag, preserved verbatim.
    Other(u8),
}

impl From<u8> for StreamType {
    fn from(tag: u8) -> Self {
        match tag {
            0 => StreamType::Unset,
            1 => StreamType::Stdout,
            2 => StreamType::Stderr,
            other => StreamType::Other(other),
        }
    }
}

impl From<StreamType> for u8 {
    fn from(stream: StreamType) -> Self {
        match stream {
            StreamType::Unset => 0,
            StreamType::Stdout => 1,
            StreamType::Stderr => 2,
            StreamType::Other(tag) => tag,
        }
    }
}

/// One decoded unit of the runtime's multiplexed output. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream_type: StreamType,
    pub payload: Bytes,
}

impl Frame {
    /// Payload as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Percentages derived from two consecutive statistics samples.
///
/// Serialized with the field names clients consume:
/// `{"cpu_percent": .., "memory_percent": .., "memory_usage": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Memory in use excluding cache, in MiB.
    #[serde(rename = "memory_usage")]
    pub memory_usage_mib: f64,
}
