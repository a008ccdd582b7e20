use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{self, Frame};

pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    stream: TcpStream,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer.
    buffer: BytesMut,
    codec: FrameCodec,
    // A decoding error found after some complete frames, reported on the next read.
    error: Option<frame::Error>,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            stream,
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::default(),
            error: None,
        }
    }

    /// Reads from the socket until at least one complete frame is buffered and returns every
    /// complete frame available. Returns `None` once the client closed the connection.
    pub async fn read_batch(&mut self) -> Result<Option<Vec<Frame>>, frame::Error> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        loop {
            let mut frames = Vec::new();
            match self.codec.decode_batch(&mut self.buffer, &mut frames) {
                Ok(()) => {}
                Err(error) if frames.is_empty() => return Err(error),
                Err(error) => self.error = Some(error),
            }

            if !frames.is_empty() {
                return Ok(Some(frames));
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if !self.buffer.is_empty() {
                    debug!(
                        pending = self.buffer.len(),
                        "connection closed in the middle of a frame"
                    );
                }
                return Ok(None);
            }
        }
    }

    /// Resolves once the client closed the connection. Anything the client sends in the meantime
    /// is kept for the next `read_batch`.
    ///
    /// Cancel safe, meant to race against a batch that may block.
    pub async fn closed(&mut self) -> io::Result<()> {
        loop {
            if self.buffer.len() > self.codec.max_frame_size() {
                // Stop reading; the client is far ahead of the blocked command.
                return std::future::pending().await;
            }

            self.stream.readable().await?;
            match self.stream.try_read_buf(&mut self.buffer) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.write_all(&frame.serialize()).await
    }
}
