use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::types::{EntityPatch, ManagedEntity};

pub mod messages;

use messages::{Envelope, ForceLogout, PcInfo, PcRef, PcStatusUpdate};

// Frame kinds on the admin channel
pub const KIND_INITIAL_STATUS: &str = "initial_pc_status";
pub const KIND_PC_CONNECTED: &str = "pc_connected";
pub const KIND_PC_DISCONNECTED: &str = "pc_disconnected";
pub const KIND_PC_STATUS_UPDATE: &str = "pc_status_update";
pub const KIND_FORCE_LOGOUT: &str = "force_logout";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {kind} command: {source}")]
    Encode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Complete fleet, sent right after the admin connects
    FullSnapshot(Vec<ManagedEntity>),
    EntityJoined(ManagedEntity),
    EntityLeft { id: String },
    EntityUpdated { id: String, patch: EntityPatch },
    /// Kept whole so newer server kinds show up in diagnostics
    Unknown { kind: String, payload: serde_json::Value },
}

impl InboundMessage {
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::FullSnapshot(_) => KIND_INITIAL_STATUS,
            InboundMessage::EntityJoined(_) => KIND_PC_CONNECTED,
            InboundMessage::EntityLeft { .. } => KIND_PC_DISCONNECTED,
            InboundMessage::EntityUpdated { .. } => KIND_PC_STATUS_UPDATE,
            InboundMessage::Unknown { kind, .. } => kind,
        }
    }
}

/// An operator command bound for the server
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    ForceLogout { pc_id: String },
    Raw { kind: String, payload: serde_json::Value },
}

impl OperatorCommand {
    pub fn force_logout(pc_id: impl Into<String>) -> Self {
        OperatorCommand::ForceLogout { pc_id: pc_id.into() }
    }

    pub fn kind(&self) -> &str {
        match self {
            OperatorCommand::ForceLogout { .. } => KIND_FORCE_LOGOUT,
            OperatorCommand::Raw { kind, .. } => kind,
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Decode one text frame into a typed message
pub fn decode_frame(text: &str) -> Result<InboundMessage, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    let Envelope { kind, data } = envelope;

    let message = match kind.as_str() {
        KIND_INITIAL_STATUS => {
            let pcs: Vec<PcInfo> = payload(&kind, data)?;
            InboundMessage::FullSnapshot(pcs.into_iter().map(ManagedEntity::from).collect())
        }
        KIND_PC_CONNECTED => {
            let pc: PcInfo = payload(&kind, data)?;
            InboundMessage::EntityJoined(pc.into())
        }
        KIND_PC_DISCONNECTED => {
            let pc: PcRef = payload(&kind, data)?;
            InboundMessage::EntityLeft { id: pc.pc_id }
        }
        KIND_PC_STATUS_UPDATE => {
            let update: PcStatusUpdate = payload(&kind, data)?;
            let (id, patch) = update.into_parts();
            InboundMessage::EntityUpdated { id, patch }
        }
        _ => InboundMessage::Unknown {
            kind: kind.clone(),
            payload: data,
        },
    };

    debug!(kind = message.kind(), "decoded admin frame");
    Ok(message)
}

/// Encode a command as a `{type, data}` text frame
pub fn encode_command(command: &OperatorCommand) -> Result<String, ProtocolError> {
    let data = match command {
        OperatorCommand::ForceLogout { pc_id } => serde_json::to_value(ForceLogout {
            pc_id: pc_id.clone(),
        }),
        OperatorCommand::Raw { payload, .. } => Ok(payload.clone()),
    }
    .map_err(|source| ProtocolError::Encode {
        kind: command.kind().to_string(),
        source,
    })?;

    let envelope = Envelope {
        kind: command.kind().to_string(),
        data,
    };
    serde_json::to_string(&envelope).map_err(|source| ProtocolError::Encode {
        kind: command.kind().to_string(),
        source,
    })
}
