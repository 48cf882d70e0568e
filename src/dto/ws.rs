use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::clock::{ClockEventDto, ClockStateView};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from clock viewers over WebSocket.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerInboundMessage {
    /// Ask for a fresh authoritative snapshot.
    Resync,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
/// Messages pushed to clock viewers over WebSocket.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerOutboundMessage {
    /// Current authoritative state, sent on join and on request.
    Snapshot(ClockStateView),
    /// State-changed notification.
    Clock(ClockEventDto),
    /// Request could not be honoured.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_messages_are_tagged() {
        let resync: ViewerInboundMessage = serde_json::from_str(r#"{"type":"resync"}"#).unwrap();
        assert!(matches!(resync, ViewerInboundMessage::Resync));
        let other: ViewerInboundMessage = serde_json::from_str(r#"{"type":"buzz"}"#).unwrap();
        assert!(matches!(other, ViewerInboundMessage::Unknown));
    }
}
