use serde::{Deserialize, Serialize};

use crate::service::event::BotEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveKind {
    StatusLive,
    CamLive,
}

impl LiveKind {
    /// The event that triggers a re-render.
    pub fn event(&self) -> BotEvent {
        match self {
            LiveKind::StatusLive => BotEvent::SpaceLiveUpdate,
            LiveKind::CamLive => BotEvent::CamLiveUpdate,
        }
    }
}

/// Serializable description of a live handler, rebuilt into a runner after restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveHandlerSpec {
    pub kind: LiveKind,
    pub chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i32>,
    #[serde(default)]
    pub params: Vec<String>,
}
