//! Device session: one connection to one L8.
//!
//! The [`SessionBuilder`] configures the session and its transport. The
//! [`DeviceSession`] manages the lifecycle:
//! 1. `open` asks the [`Connector`] for a byte stream
//! 2. The stream is split; a writer task owns the write half
//! 3. A read loop feeds the read half through a [`FrameBuffer`] and offers
//!    every frame to the [`Correlator`] and to subscribers
//! 4. Commands encode a frame, register their expected response, hand the
//!    frame to the writer and await the correlated reply
//!
//! ```text
//! Disconnected ──open──► Connecting ──ok──► Connected ──close──► Disconnected
//!                            └──────err────────────────────────► Disconnected
//! ```
//!
//! # Example
//!
//! ```ignore
//! use l8_smartlight::{Color, DeviceSession, Orientation};
//! use l8_smartlight::transport::SerialConnector;
//!
//! #[tokio::main]
//! async fn main() -> l8_smartlight::Result<()> {
//!     let session = DeviceSession::builder()
//!         .connector(SerialConnector::new())
//!         .build()?;
//!
//!     session.open("/dev/ttyACM0").await?;
//!     session.set_orientation(Orientation::Auto).await?;
//!     session.set_led(3, 4, &Color::new(15, 0, 0)?).await?;
//!     println!("{:?}", session.get_acceleration().await?);
//!     session.close().await
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::codec::{
    decode_acceleration, encode_animation, encode_led, encode_matrix, encode_scrolling_text,
    encode_super_led, Acceleration, Color, Orientation, ScrollSpeed,
};
use crate::correlator::{Correlator, ErrorMatcher, Expectation};
use crate::error::{L8Error, Result};
use crate::poller::AccelerationStream;
use crate::protocol::{encode_frame, slcp, Frame, FrameBuffer, DEFAULT_RECEIVE_CAPACITY};
use crate::transport::Connector;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default size of a single transport read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default accelerometer polling interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Parameter of the OK frame that confirms an autorotate change.
pub const AUTOROTATE_ACK_PARAMETER: u8 = 0x6a;

/// Session configuration.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use l8_smartlight::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{ "baud_rate": 57600 }"#).unwrap();
/// assert_eq!(config.baud_rate, 57600);
/// assert_eq!(config.receive_buffer_capacity, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial baud rate passed to the connector.
    pub baud_rate: u32,
    /// Initial capacity of the receive buffer.
    pub receive_buffer_capacity: usize,
    /// Size of a single transport read.
    pub read_chunk_size: usize,
    /// Writer queue capacity.
    pub writer_channel_capacity: usize,
    /// Events buffered per subscriber before lagging.
    pub event_capacity: usize,
    /// Accelerometer polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            receive_buffer_capacity: DEFAULT_RECEIVE_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Polling interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notification delivered to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A frame was decoded. `correlated` is false for unsolicited frames.
    Frame { frame: Frame, correlated: bool },
    /// The byte stream is corrupt; the session must be closed and reopened.
    Desynchronized { reason: String },
    /// The connection ended.
    Disconnected,
}

/// Builder for configuring and creating a device session.
pub struct SessionBuilder {
    config: SessionConfig,
    connector: Option<Arc<dyn Connector>>,
}

impl SessionBuilder {
    /// Create a new session builder.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            connector: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport connector.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set the baud rate.
    ///
    /// Default: 115200
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Set the receive buffer capacity.
    ///
    /// Default: 4096
    pub fn receive_buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.receive_buffer_capacity = capacity;
        self
    }

    /// Set the transport read size.
    ///
    /// Default: 4096
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn writer_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_channel_capacity = capacity;
        self
    }

    /// Set the per-subscriber event capacity.
    ///
    /// Default: 64
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Set the accelerometer polling interval.
    ///
    /// Default: 100ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Build the session. It starts `Disconnected`.
    pub fn build(self) -> Result<DeviceSession> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector()?,
        };

        if self.config.read_chunk_size == 0 {
            return Err(L8Error::validation("read_chunk_size must be non-zero"));
        }
        if self.config.writer_channel_capacity == 0 || self.config.event_capacity == 0 {
            return Err(L8Error::validation("channel capacities must be non-zero"));
        }

        let (events, _) = broadcast::channel(self.config.event_capacity);
        Ok(DeviceSession {
            shared: Arc::new(Shared {
                config: self.config,
                connector,
                state: Mutex::new(State::Disconnected),
                events,
            }),
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serial")]
fn default_connector() -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(crate::transport::SerialConnector::new()))
}

#[cfg(not(feature = "serial"))]
fn default_connector() -> Result<Arc<dyn Connector>> {
    Err(L8Error::validation(
        "no connector configured (enable the `serial` feature or call .connector())",
    ))
}

struct Connection {
    writer: WriterHandle,
    correlator: Arc<Correlator>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
}

enum State {
    Disconnected,
    Connecting,
    Connected(Connection),
}

struct Shared {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<State>,
    events: broadcast::Sender<SessionEvent>,
}

/// Resets `Connecting` back to `Disconnected` if `open` does not finish.
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl ConnectingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.lock_state();
            if matches!(*state, State::Connecting) {
                *state = State::Disconnected;
            }
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A session with one L8 device.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct DeviceSession {
    shared: Arc<Shared>,
}

impl DeviceSession {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        match *self.shared.lock_state() {
            State::Disconnected => ConnectionState::Disconnected,
            State::Connecting => ConnectionState::Connecting,
            State::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Subscribe to decoded frames and connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Open the device at `path` with the configured baud rate.
    ///
    /// Receive state starts empty on every open.
    pub async fn open(&self, path: &str) -> Result<()> {
        {
            let mut state = self.shared.lock_state();
            if !matches!(*state, State::Disconnected) {
                return Err(L8Error::AlreadyConnected);
            }
            *state = State::Connecting;
        }
        let mut guard = ConnectingGuard {
            shared: &self.shared,
            armed: true,
        };

        let config = &self.shared.config;
        tracing::debug!("Opening {} at {} baud", path, config.baud_rate);
        let stream = match self.shared.connector.open(path, config.baud_rate).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", path, e);
                return Err(e);
            }
        };

        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(
            write_half,
            WriterConfig {
                channel_capacity: config.writer_channel_capacity,
            },
        );

        let correlator = Arc::new(Correlator::new());
        let reader_task = tokio::spawn(read_loop(
            reader,
            FrameBuffer::with_capacity(config.receive_buffer_capacity),
            config.read_chunk_size,
            correlator.clone(),
            self.shared.events.clone(),
        ));

        *self.shared.lock_state() = State::Connected(Connection {
            writer,
            correlator,
            reader_task,
            writer_task,
        });
        guard.disarm();

        tracing::debug!("Connected to {}", path);
        Ok(())
    }

    /// Close the connection.
    ///
    /// Requests still awaiting a response fail with `ConnectionClosed`.
    /// Frames already queued are written before the transport shuts down.
    /// The session is `Disconnected` afterwards even when the transport
    /// reports an error, which is returned unchanged.
    pub async fn close(&self) -> Result<()> {
        let connection = {
            let mut state = self.shared.lock_state();
            match std::mem::replace(&mut *state, State::Disconnected) {
                State::Connected(connection) => connection,
                other => {
                    *state = other;
                    return Err(L8Error::NotConnected);
                }
            }
        };

        connection.reader_task.abort();
        connection.correlator.close();
        drop(connection.writer);
        let closed = match connection.writer_task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Writer task did not finish: {}", e);
                Ok(())
            }
        };

        let _ = self.shared.events.send(SessionEvent::Disconnected);
        match &closed {
            Ok(()) => tracing::debug!("Disconnected"),
            Err(e) => tracing::warn!("Disconnected with transport error: {}", e),
        }
        closed
    }

    fn connection(&self) -> Result<(WriterHandle, Arc<Correlator>)> {
        match &*self.shared.lock_state() {
            State::Connected(connection) => {
                Ok((connection.writer.clone(), connection.correlator.clone()))
            }
            _ => Err(L8Error::NotConnected),
        }
    }

    /// Send a command frame.
    ///
    /// Without an expectation the call completes once the frame is flushed.
    /// Otherwise it completes with the first frame matching `expectation`, or
    /// fails with `Device` on a frame matching `errors`. There is no timeout.
    pub async fn send(
        &self,
        command: u8,
        parameters: &[u8],
        expectation: Option<Expectation>,
        errors: ErrorMatcher,
    ) -> Result<Option<Frame>> {
        let bytes = encode_frame(command, parameters)?;
        let (writer, correlator) = self.connection()?;

        let pending = match expectation {
            Some(expectation) => Some(correlator.register(command, expectation, errors)?),
            None => {
                correlator.check_open()?;
                None
            }
        };

        tracing::debug!(
            "Sending {} ({} parameter bytes)",
            slcp::name(command),
            parameters.len()
        );
        if let Err(e) = writer.send(bytes).await {
            if let Some(pending) = &pending {
                correlator.cancel(pending.id());
            }
            return Err(e);
        }
        drop(writer);

        match pending {
            Some(pending) => pending.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Send and wait for the generic OK.
    async fn acknowledged(&self, command: u8, parameters: &[u8]) -> Result<()> {
        self.send(
            command,
            parameters,
            Some(Expectation::Acknowledge),
            ErrorMatcher::Generic,
        )
        .await
        .map(|_| ())
    }

    /// Send without waiting for any reply.
    async fn fire(&self, command: u8, parameters: &[u8]) -> Result<()> {
        self.send(command, parameters, None, ErrorMatcher::Never)
            .await
            .map(|_| ())
    }

    /// Send and wait for a specific response command.
    async fn query(&self, command: u8, parameters: &[u8], response: u8) -> Result<Frame> {
        let expectation = Expectation::Response {
            command: response,
            parameters: None,
        };
        self.send(command, parameters, Some(expectation), ErrorMatcher::Generic)
            .await?
            .ok_or(L8Error::ConnectionClosed)
    }

    /// Check the device is alive.
    pub async fn ping(&self) -> Result<()> {
        self.query(slcp::PING, &[], slcp::PONG).await.map(|_| ())
    }

    /// Set one pixel. `x` and `y` are in `0..8`.
    pub async fn set_led(&self, x: usize, y: usize, color: &Color) -> Result<()> {
        let params = encode_led(x, y, color)?;
        self.acknowledged(slcp::L8_LED_SET, &params).await
    }

    /// Turn one pixel off.
    pub async fn clear_led(&self, x: usize, y: usize) -> Result<()> {
        self.set_led(x, y, &Color::BLACK).await
    }

    /// Set all 64 pixels, row-major from the top-left.
    pub async fn set_matrix(&self, colors: &[Color]) -> Result<()> {
        let params = encode_matrix(colors)?;
        self.acknowledged(slcp::L8_MATRIX_SET, &params).await
    }

    /// Turn the whole matrix off.
    pub async fn clear_matrix(&self) -> Result<()> {
        // The firmware rejects L8_MATRIX_OFF without its single zero parameter.
        self.acknowledged(slcp::L8_MATRIX_OFF, &[0x00]).await
    }

    /// Set the status LED.
    pub async fn set_super_led(&self, color: &Color) -> Result<()> {
        let params = encode_super_led(color)?;
        self.acknowledged(slcp::L8_SUPERLED_SET, &params).await
    }

    /// Turn the status LED off.
    pub async fn clear_super_led(&self) -> Result<()> {
        self.set_super_led(&Color::BLACK).await
    }

    /// Start scrolling `text`. The firmware sends no acknowledgement.
    pub async fn set_scrolling_text(
        &self,
        text: &str,
        color: &Color,
        speed: ScrollSpeed,
        looped: bool,
    ) -> Result<()> {
        let params = encode_scrolling_text(text, color, speed, looped)?;
        self.fire(slcp::L8_SET_TEXT, &params).await
    }

    /// Stop the running on-device application (text, animation, ...).
    pub async fn stop_application(&self) -> Result<()> {
        self.acknowledged(slcp::L8_APP_STOP, &[]).await
    }

    /// Stop scrolling text.
    pub async fn clear_scrolling_text(&self) -> Result<()> {
        self.stop_application().await
    }

    /// Set the display orientation.
    ///
    /// Autorotate is switched first and always confirmed. A manual
    /// orientation then follows as a second, unacknowledged command.
    pub async fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        let autorotate = orientation.code().is_none();
        let expectation = Expectation::Response {
            command: slcp::OK,
            parameters: Some(Bytes::from_static(&[AUTOROTATE_ACK_PARAMETER])),
        };
        self.send(
            slcp::L8_SET_AUTOROTATE,
            &[autorotate as u8],
            Some(expectation),
            ErrorMatcher::Generic,
        )
        .await?;

        if let Some(code) = orientation.code() {
            self.fire(slcp::L8_SET_ORIENTATION, &[code]).await?;
        }
        Ok(())
    }

    /// Read the accelerometer once.
    pub async fn get_acceleration(&self) -> Result<Acceleration> {
        let frame = self
            .query(slcp::L8_ACC_QUERY, &[], slcp::L8_ACC_RESPONSE)
            .await?;
        decode_acceleration(frame.parameters())
    }

    /// Poll the accelerometer at the configured interval.
    pub fn acceleration_stream(&self) -> AccelerationStream {
        self.acceleration_stream_every(self.shared.config.poll_interval())
    }

    /// Poll the accelerometer at `interval`.
    pub fn acceleration_stream_every(&self, interval: Duration) -> AccelerationStream {
        AccelerationStream::new(self.clone(), interval)
    }

    /// Store a 64-pixel frame in device memory and return its id.
    pub async fn store_animation_frame(&self, colors: &[Color]) -> Result<u8> {
        let params = encode_matrix(colors)?;
        self.store_frame_params(&params).await
    }

    async fn store_frame_params(&self, params: &[u8]) -> Result<u8> {
        let frame = self
            .query(slcp::L8_STORE_FRAME, params, slcp::L8_STORE_FRAME_RESPONSE)
            .await?;
        first_parameter(&frame)
    }

    /// Store an animation made of stored frames and return its id.
    ///
    /// Durations are rounded to the device's 100ms timer.
    pub async fn store_animation(&self, frame_ids: &[u8], durations_ms: &[u64]) -> Result<u8> {
        let params = encode_animation(frame_ids, durations_ms)?;
        let frame = self
            .query(slcp::L8_STORE_ANIM, &params, slcp::L8_STORE_ANIM_RESPONSE)
            .await?;
        first_parameter(&frame)
    }

    /// Store every matrix, then an animation over them; returns its id.
    ///
    /// Frames are stored one at a time, in order, since each step refers to
    /// the id the device assigned to the previous store.
    pub async fn prepare_animation<M>(&self, matrices: &[M], durations_ms: &[u64]) -> Result<u8>
    where
        M: AsRef<[Color]>,
    {
        if matrices.len() != durations_ms.len() {
            return Err(L8Error::validation(format!(
                "{} frames but {} durations",
                matrices.len(),
                durations_ms.len()
            )));
        }
        let encoded = matrices
            .iter()
            .map(|m| encode_matrix(m.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        // Validate the step table before anything is written to the device.
        let placeholder_ids = vec![0u8; matrices.len()];
        encode_animation(&placeholder_ids, durations_ms)?;

        let mut frame_ids = Vec::with_capacity(encoded.len());
        for params in &encoded {
            frame_ids.push(self.store_frame_params(params).await?);
        }
        self.store_animation(&frame_ids, durations_ms).await
    }

    /// Play a stored animation.
    pub async fn play_animation(&self, animation_id: u8, looped: bool) -> Result<()> {
        self.acknowledged(slcp::L8_PLAY_ANIM, &[animation_id, looped as u8])
            .await
    }

    /// Erase all stored frames, animations and L8Ys.
    pub async fn clear_user_memory(&self) -> Result<()> {
        self.acknowledged(slcp::L8_DELETE_USER_MEMORY, &[]).await
    }
}

fn first_parameter(frame: &Frame) -> Result<u8> {
    frame.parameters().first().copied().ok_or_else(|| {
        L8Error::Protocol(format!("{} without an id", slcp::name(frame.command())))
    })
}

/// Read loop - decodes frames and hands them to the correlator and subscribers.
async fn read_loop<R>(
    mut reader: R,
    mut frame_buffer: FrameBuffer,
    chunk_size: usize,
    correlator: Arc<Correlator>,
    events: broadcast::Sender<SessionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Transport closed by device");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Transport read failed: {}", e);
                correlator.fail(&e);
                let _ = events.send(SessionEvent::Disconnected);
                return;
            }
        };
        tracing::trace!("Received {:02x?}", &buf[..n]);

        let frames = match frame_buffer.push(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!("Stream desynchronized: {}", reason);
                correlator.desynchronize(reason.clone());
                let _ = events.send(SessionEvent::Desynchronized { reason });
                return;
            }
        };

        for frame in frames {
            let correlated = correlator.dispatch(&frame);
            if !correlated {
                tracing::debug!(
                    "Unsolicited {} frame ({:#04x})",
                    slcp::name(frame.command()),
                    frame.command()
                );
            }
            let _ = events.send(SessionEvent::Frame { frame, correlated });
        }
    }

    correlator.close();
    let _ = events.send(SessionEvent::Disconnected);
}
