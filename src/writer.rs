//! Dedicated writer task for outgoing frames.
//!
//! Commands never touch the transport directly. They hand encoded frames to a
//! writer task over an mpsc channel and await a oneshot that fires once the
//! frame has been written and flushed.
//!
//! # Architecture
//!
//! ```text
//! set_led ──────┐
//! set_matrix ───┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► transport
//! grid fan-out ─┘                                     │
//!                                  oneshot "flushed" ◄┘
//! ```
//!
//! Frames are written strictly in submission order.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{L8Error, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// An encoded frame ready to be written to the transport.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Complete wire bytes.
    pub bytes: Bytes,
    flushed: oneshot::Sender<Result<()>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame and wait until it has been written and flushed.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (flushed, done) = oneshot::channel();
        self.tx
            .send(OutboundFrame { bytes, flushed })
            .await
            .map_err(|_| L8Error::ConnectionClosed)?;

        done.await.map_err(|_| L8Error::ConnectionClosed)?
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped, shutting the transport's
/// write side down, or after the first write error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        tracing::trace!("Writing frame {:02x?}", &frame.bytes[..]);

        match write_frame(&mut writer, &frame.bytes).await {
            Ok(()) => {
                let _ = frame.flushed.send(Ok(()));
            }
            Err(e) => {
                tracing::error!("Transport write failed: {}", e);
                let kind = e.kind();
                let _ = frame.flushed.send(Err(L8Error::Io(e)));
                return Err(L8Error::Io(std::io::Error::new(kind, "transport write failed")));
            }
        }
    }

    // Channel closed, shut the transport's write side down
    writer.shutdown().await.map_err(L8Error::Io)
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        handle.send(Bytes::from_static(b"one")).await.unwrap();
        handle.send(Bytes::from_static(b"two")).await.unwrap();
        drop(handle);
        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"onetwo");
    }

    #[tokio::test]
    async fn test_send_after_writer_stopped() {
        let (client, _server) = tokio::io::duplex(64);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());
        task.abort();
        let _ = task.await;

        assert!(handle.is_closed());
        let result = handle.send(Bytes::from_static(b"late")).await;
        assert!(matches!(result, Err(L8Error::ConnectionClosed)));
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct UnclosableWriter;

    impl AsyncWrite for UnclosableWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "close failed",
            )))
        }
    }

    #[tokio::test]
    async fn test_shutdown_error_ends_task_with_io_error() {
        let (handle, task) = spawn_writer_task(UnclosableWriter, WriterConfig::default());
        handle.send(Bytes::from_static(b"x")).await.unwrap();
        drop(handle);

        match task.await.unwrap() {
            Err(L8Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::Other),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_error_surfaces_to_sender() {
        let (handle, task) = spawn_writer_task(FailingWriter, WriterConfig::default());

        let result = handle.send(Bytes::from_static(b"x")).await;
        match result {
            Err(L8Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
        assert!(task.await.unwrap().is_err());
    }
}
