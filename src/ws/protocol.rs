//! JSON message types for the client WebSocket protocol (§6).

use crate::types::PersonId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Ping,
    SetInteractionId {
        interaction_id: String,
    },
    ChangeName {
        new_name: String,
        #[serde(default)]
        person_name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Connected {
        message: String,
    },
    Pong,
    Notification {
        title: String,
        message: String,
    },
    SwitchInteractionPerson {
        person_id: Option<PersonId>,
        person_name: String,
        blurb: String,
        recap: Option<String>,
    },
    ChangeNameResponse {
        success: bool,
    },
    Error {
        message: String,
    },
}
