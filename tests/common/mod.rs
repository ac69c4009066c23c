//! Shared test fixtures: an in-memory transport and a scripted device.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use l8_smartlight::protocol::{encode_frame, slcp, FrameBuffer};
use l8_smartlight::transport::{BoxedStream, Connector};
use l8_smartlight::{DeviceSession, Frame, L8Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

/// Hands out the host end of a `tokio::io::duplex` pair, once.
pub struct MemoryConnector {
    stream: Mutex<Option<DuplexStream>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, path: &str, _baud_rate: u32) -> Result<BoxedStream> {
        let stream = self.stream.lock().unwrap().take();
        match stream {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(L8Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} already taken", path),
            ))),
        }
    }
}

/// The device end of the link.
pub struct SimulatedDevice {
    stream: DuplexStream,
    buffer: FrameBuffer,
    received: Vec<Frame>,
}

impl SimulatedDevice {
    /// Wait for the next frame sent by the host.
    pub async fn next_frame(&mut self) -> Frame {
        let mut chunk = [0u8; 512];
        loop {
            if !self.received.is_empty() {
                return self.received.remove(0);
            }
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "host closed the link");
            self.received.extend(self.buffer.push(&chunk[..n]).unwrap());
        }
    }

    /// Wait for the next frame, failing if none arrives within `wait`.
    pub async fn try_next_frame(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.next_frame()).await.ok()
    }

    /// Send a frame to the host.
    pub async fn reply(&mut self, command: u8, parameters: &[u8]) {
        let bytes = encode_frame(command, parameters).unwrap();
        self.send_raw(&bytes).await;
    }

    /// Acknowledge `command` with the generic OK.
    pub async fn ok(&mut self, command: u8) {
        self.reply(slcp::OK, &[command]).await;
    }

    /// Reject `command` with the generic ERR.
    pub async fn err(&mut self, command: u8) {
        self.reply(slcp::ERR, &[command]).await;
    }

    /// Write raw bytes to the host.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }
}

/// Create a connector and the matching device end.
pub fn memory_link() -> (MemoryConnector, SimulatedDevice) {
    let (host, device) = tokio::io::duplex(4096);
    (
        MemoryConnector {
            stream: Mutex::new(Some(host)),
        },
        SimulatedDevice {
            stream: device,
            buffer: FrameBuffer::new(),
            received: Vec::new(),
        },
    )
}

/// Build a session over an in-memory link and open it.
pub async fn connected_session() -> (DeviceSession, SimulatedDevice) {
    let (connector, device) = memory_link();
    let session = DeviceSession::builder().connector(connector).build().unwrap();
    session.open("mem://l8").await.unwrap();
    (session, device)
}

/// A duplex stream whose transport misbehaves on demand.
pub struct FaultyStream {
    inner: DuplexStream,
    /// Report a reset instead of end-of-stream.
    reset_on_eof: bool,
    /// Fail `poll_shutdown`.
    fail_shutdown: bool,
}

impl AsyncRead for FaultyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        match Pin::new(&mut self.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) if self.reset_on_eof && buf.filled().len() == before => {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "device reset",
                )))
            }
            other => other,
        }
    }
}

impl AsyncWrite for FaultyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.fail_shutdown {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "close failed",
            )));
        }
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Hands out a [`FaultyStream`] once.
pub struct FaultyConnector {
    stream: Mutex<Option<FaultyStream>>,
}

#[async_trait]
impl Connector for FaultyConnector {
    async fn open(&self, path: &str, _baud_rate: u32) -> Result<BoxedStream> {
        let stream = self.stream.lock().unwrap().take();
        match stream {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(L8Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} already taken", path),
            ))),
        }
    }
}

/// Like [`memory_link`], with transport faults switched on.
pub fn faulty_link(reset_on_eof: bool, fail_shutdown: bool) -> (FaultyConnector, SimulatedDevice) {
    let (connector, device) = memory_link();
    let inner = connector.stream.into_inner().unwrap().unwrap();
    (
        FaultyConnector {
            stream: Mutex::new(Some(FaultyStream {
                inner,
                reset_on_eof,
                fail_shutdown,
            })),
        },
        device,
    )
}
