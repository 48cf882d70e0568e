use serde::Serialize;

use crate::dto::clock::{ClockEventDto, ClockStateView};

/// SSE event name of the initial (or lag-recovery) snapshot.
pub const SNAPSHOT_EVENT: &str = "snapshot";
/// SSE event name of a state-changed notification.
pub const CLOCK_EVENT: &str = "clock";

#[derive(Clone, Debug)]
/// Payload ready to be written on an SSE stream.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// `snapshot` event.
    pub fn snapshot(view: &ClockStateView) -> serde_json::Result<Self> {
        Self::json(SNAPSHOT_EVENT.to_string(), view)
    }

    /// `clock` event.
    pub fn clock(event: &ClockEventDto) -> serde_json::Result<Self> {
        Self::json(CLOCK_EVENT.to_string(), event)
    }
}
