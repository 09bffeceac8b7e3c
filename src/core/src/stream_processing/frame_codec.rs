//! Demultiplexer for the runtime's stdout/stderr log framing.
//!
//! Wire format, repeated until the stream ends:
//!
//! ```text
//! [1 byte stream type][3 reserved bytes][4 bytes length, big-endian][length bytes payload]
//! ```
//!
//! Zero-length frames carry nothing and are skipped. The stream is not replayable, so
//! a truncated header or payload ends decoding for good.

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

use super::types::{Frame, StreamType};
use crate::error_handling::types::FramingError;

/// Length of the frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Stateless [`Decoder`] for framed log output.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FramingError> {
        loop {
            if src.len() < FRAME_HEADER_LEN {
                return Ok(None);
            }

            let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
            if length == 0 {
                src.advance(FRAME_HEADER_LEN);
                continue;
            }
            if src.len() < FRAME_HEADER_LEN + length {
                return Ok(None);
            }

            let stream_type = StreamType::from(src[0]);
            src.advance(FRAME_HEADER_LEN);
            let payload = src.split_to(length).freeze();
            return Ok(Some(Frame {
                stream_type,
                payload,
            }));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FramingError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match src.len() {
            0 => Ok(None),
            available if available < FRAME_HEADER_LEN => {
                Err(FramingError::TruncatedHeader { available })
            }
            buffered => Err(FramingError::TruncatedPayload {
                declared: u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize,
                available: buffered - FRAME_HEADER_LEN,
            }),
        }
    }
}

/// Forward-only frame sequence over a byte cursor.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(cursor: R) -> Self {
        Self {
            inner: FramedRead::new(cursor, FrameCodec),
        }
    }

    /// Next frame; `Ok(None)` when the stream ended exactly on a frame boundary.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        self.inner.next().await.transpose()
    }
}
