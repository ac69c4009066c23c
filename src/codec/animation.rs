//! Stored-animation step tables.

use crate::error::{L8Error, Result};
use crate::protocol::MAX_PARAMETERS_LEN;

/// Device animation timer resolution.
pub const TIMER_RESOLUTION_MS: u64 = 100;

/// Round a duration to device timer ticks.
pub fn duration_ticks(duration_ms: u64) -> Result<u8> {
    let ticks = (duration_ms + TIMER_RESOLUTION_MS / 2) / TIMER_RESOLUTION_MS;
    u8::try_from(ticks).map_err(|_| {
        L8Error::validation(format!("duration {}ms exceeds the device timer range", duration_ms))
    })
}

/// Parameters for `L8_STORE_ANIM`: one `frame id, ticks` pair per step.
pub fn encode_animation(frame_ids: &[u8], durations_ms: &[u64]) -> Result<Vec<u8>> {
    if frame_ids.len() != durations_ms.len() {
        return Err(L8Error::validation(format!(
            "{} frames but {} durations",
            frame_ids.len(),
            durations_ms.len()
        )));
    }
    if frame_ids.is_empty() {
        return Err(L8Error::validation("animation has no frames"));
    }

    let mut params = Vec::with_capacity(frame_ids.len() * 2);
    for (&frame_id, &duration) in frame_ids.iter().zip(durations_ms) {
        params.push(frame_id);
        params.push(duration_ticks(duration)?);
    }

    if params.len() > MAX_PARAMETERS_LEN {
        return Err(L8Error::validation(format!(
            "{} animation steps do not fit in one frame",
            frame_ids.len()
        )));
    }
    Ok(params)
}
