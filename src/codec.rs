use bytes::{Buf, BytesMut};
use std::env;
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Incremental RESP decoder. Bytes of a frame that is not complete yet stay in the buffer
/// untouched, so decoding can resume after any number of partial reads.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }

    fn max_frame_size_from_env() -> usize {
        env::var("MAX_FRAME_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Decodes every complete frame currently in `src` into `frames`, in order. Whatever follows
    /// the last complete frame is left in `src` for the next call.
    ///
    /// On error, `frames` still holds the frames that preceded the malformed one.
    pub fn decode_batch(
        &mut self,
        src: &mut BytesMut,
        frames: &mut Vec<Frame>,
    ) -> Result<(), frame::Error> {
        while let Some(frame) = self.decode(src)? {
            frames.push(frame);
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(FrameCodec::max_frame_size_from_env())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = frame::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Not enough data to parse a frame. Refuse to buffer without bound.
                if src.len() > self.max_frame_size {
                    return Err(frame::Error::TooLarge(self.max_frame_size));
                }
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        // The cursor only ever points inside `src`, so the position fits in usize.
        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = frame::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.serialize());
        Ok(())
    }
}
