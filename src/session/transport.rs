use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes requested from the stream per read.
const READ_CHUNK: usize = 2048;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a bounded wait for input produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Data(Bytes),
    Closed,
    Timeout,
}

/// A connected byte stream to the headset.
#[async_trait]
pub trait Transport: Send {
    /// Write all of `bytes`. A failed write is not retried.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `max_wait` for whatever bytes the peer has sent.
    async fn read_available(&mut self, max_wait: Duration) -> Result<ReadEvent, TransportError>;
}

/// Any tokio stream usable as a transport (RFCOMM sockets, pipes, test duplexes).
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// [`Transport`] over an async byte stream.
pub struct StreamTransport<S> {
    stream: S,
    buf: BytesMut,
}

impl<S: ByteStream> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

fn classify(e: std::io::Error) -> TransportError {
    if is_disconnect(&e) {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

#[async_trait]
impl<S: ByteStream> Transport for StreamTransport<S> {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await.map_err(classify)?;
        self.stream.flush().await.map_err(classify)?;
        Ok(())
    }

    async fn read_available(&mut self, max_wait: Duration) -> Result<ReadEvent, TransportError> {
        self.buf.reserve(READ_CHUNK);
        match tokio::time::timeout(max_wait, self.stream.read_buf(&mut self.buf)).await {
            Err(_elapsed) => Ok(ReadEvent::Timeout),
            Ok(Ok(0)) => Ok(ReadEvent::Closed),
            Ok(Ok(_)) => Ok(ReadEvent::Data(self.buf.split().freeze())),
            Ok(Err(e)) => match classify(e) {
                TransportError::Closed => Ok(ReadEvent::Closed),
                other => Err(other),
            },
        }
    }
}
