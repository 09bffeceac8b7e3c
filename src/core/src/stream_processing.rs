//! Decoders for the runtime's streaming outputs.
//!
//! - `frame_codec`: demultiplexes framed stdout/stderr log output into [`Frame`]s.
//! - `metrics`: turns raw statistics samples into [`MetricsSummary`] percentages.
//! - `types`: values shared by both.

pub mod frame_codec;
pub mod metrics;
pub mod types;

pub use frame_codec::{FrameCodec, FrameReader};
pub use metrics::{MetricSample, MetricsAggregator};
pub use types::{Frame, MetricsSummary, StreamType};
