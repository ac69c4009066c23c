//! Continuous accelerometer polling.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::time::Instant;

use crate::codec::Acceleration;
use crate::error::{L8Error, Result};
use crate::session::DeviceSession;

struct PollState {
    session: DeviceSession,
    interval: Duration,
    last_poll: Option<Instant>,
    finished: bool,
}

/// A lazy stream of accelerometer readings.
///
/// Nothing is sent until the stream is polled, and polling stops as soon as
/// the consumer stops asking or drops the stream. Polls are never closer
/// together than the interval: a reading requested during the cooldown is
/// fetched as soon as the cooldown ends. Only one query is in flight per
/// stream.
///
/// The stream ends after yielding a fatal error or `NotConnected`. Device
/// errors are yielded and polling continues.
pub struct AccelerationStream {
    inner: Pin<Box<dyn Stream<Item = Result<Acceleration>> + Send>>,
    interval: Duration,
}

impl AccelerationStream {
    pub(crate) fn new(session: DeviceSession, interval: Duration) -> Self {
        let state = PollState {
            session,
            interval,
            last_poll: None,
            finished: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            if let Some(last) = state.last_poll {
                tokio::time::sleep_until(last + state.interval).await;
            }
            state.last_poll = Some(Instant::now());

            let reading = state.session.get_acceleration().await;
            if let Err(e) = &reading {
                if e.is_fatal() || matches!(e, L8Error::NotConnected) {
                    tracing::debug!("Acceleration polling stopped: {}", e);
                    state.finished = true;
                }
            }
            Some((reading, state))
        });

        Self {
            inner: Box::pin(inner),
            interval,
        }
    }

    /// The minimum spacing between polls.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Stream for AccelerationStream {
    type Item = Result<Acceleration>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for AccelerationStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelerationStream")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
