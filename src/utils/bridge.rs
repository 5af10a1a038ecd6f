use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Broadcast signal asking the lead form to open. Any trigger (nav CTA, hero
/// button) publishes one; the form controller subscribes via SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenFormSignal {
    pub source: Option<String>,
}

pub type FormEvents = broadcast::Sender<OpenFormSignal>;

pub fn form_events_channel() -> FormEvents {
    broadcast::channel(16).0
}
