//! Serial port transport.
//!
//! `serialport` is blocking, so each opened port is bridged into tokio through
//! an in-memory duplex pipe and two pump threads:
//!
//! ```text
//! session ◄──► duplex pipe ◄──► [pump in / pump out threads] ◄──► serial port
//! ```
//!
//! Dropping the session's end stops both pumps.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::runtime::Handle;

use super::{BoxedStream, Connector};
use crate::error::{L8Error, Result};

/// Default read timeout of the underlying port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes buffered between the pumps and the session.
const BRIDGE_CAPACITY: usize = 4096;

/// Opens serial ports with `serialport`.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    read_timeout: Duration,
}

impl SerialConnector {
    /// Create a connector with the default read timeout.
    pub fn new() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set how long a blocking read waits before re-checking for shutdown.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// List serial port names present on this machine.
    pub fn available_ports() -> Vec<String> {
        serialport::available_ports()
            .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
            .unwrap_or_default()
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, path: &str, baud_rate: u32) -> Result<BoxedStream> {
        let name = path.to_string();
        let timeout = self.read_timeout;

        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&name, baud_rate).timeout(timeout).open()
        })
        .await
        .map_err(|e| L8Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
        .map_err(|e| L8Error::Io(e.into()))?;

        let reader = port.try_clone().map_err(|e| L8Error::Io(e.into()))?;
        tracing::debug!("Opened serial port {} at {} baud", path, baud_rate);

        let (local, remote) = tokio::io::duplex(BRIDGE_CAPACITY);
        let (remote_rx, remote_tx) = tokio::io::split(remote);
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = Handle::current();

        {
            let stopped = stopped.clone();
            let handle = handle.clone();
            std::thread::spawn(move || pump_in(reader, remote_tx, handle, stopped));
        }
        std::thread::spawn(move || pump_out(port, remote_rx, handle, stopped));

        Ok(Box::new(local))
    }
}

/// Serial port → session.
fn pump_in(
    mut port: Box<dyn serialport::SerialPort>,
    mut tx: WriteHalf<DuplexStream>,
    handle: Handle,
    stopped: Arc<AtomicBool>,
) {
    let mut buf = [0u8; BRIDGE_CAPACITY];
    while !stopped.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if handle.block_on(tx.write_all(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                tracing::warn!("Serial read failed: {}", e);
                break;
            }
        }
    }
    stopped.store(true, Ordering::Release);
    let _ = handle.block_on(tx.shutdown());
}

/// Session → serial port.
fn pump_out(
    mut port: Box<dyn serialport::SerialPort>,
    mut rx: ReadHalf<DuplexStream>,
    handle: Handle,
    stopped: Arc<AtomicBool>,
) {
    let mut buf = [0u8; BRIDGE_CAPACITY];
    loop {
        let n = match handle.block_on(rx.read(&mut buf)) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if let Err(e) = port.write_all(&buf[..n]).and_then(|_| port.flush()) {
            tracing::warn!("Serial write failed: {}", e);
            break;
        }
    }
    stopped.store(true, Ordering::Release);
}
