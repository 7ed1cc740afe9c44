use crate::domain::{Conversation, ConversationId, Message, MessageId, Participant, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const CHAT_PROTOCOL_VERSION: u8 = 1;

/// Operations pushed over the realtime channel. None of them is acknowledged to the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportOp {
    DeleteMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        mine_only: bool,
    },
    ForwardMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    EditMessage {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    SendMessage {
        conversation_id: ConversationId,
        temp_id: MessageId,
        content: String,
    },
    MarkRead {
        conversation_id: ConversationId,
    },
}

impl TransportOp {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::DeleteMessage { .. } => "deleteMessage",
            Self::ForwardMessage { .. } => "forwardMessage",
            Self::EditMessage { .. } => "editMessage",
            Self::SendMessage { .. } => "sendMessage",
            Self::MarkRead { .. } => "markRead",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    MessageCreated {
        conversation_id: ConversationId,
        message: Message,
    },
    MessageAcknowledged {
        conversation_id: ConversationId,
        temp_id: MessageId,
        message_id: MessageId,
        created_at: Option<OffsetDateTime>,
    },
    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    ServerError { code: String, message: String },
}

#[derive(Debug, Error)]
pub enum DecodeEventError {
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0}")]
    Version(u8),

    #[error("unknown event type: {0}")]
    UnknownType(String),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

#[derive(Debug, Serialize)]
struct EnvelopeOut<'a, P> {
    v: u8,
    #[serde(rename = "type")]
    type_: &'a str,
    ts: String,
    payload: P,
}

#[derive(Debug, Deserialize)]
struct EnvelopeIn {
    v: u8,
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletePayload<'a> {
    conversation_id: &'a str,
    message_id: &'a str,
    mine_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForwardPayload<'a> {
    conversation_id: &'a str,
    message_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditPayload<'a> {
    conversation_id: &'a str,
    message_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendPayload<'a> {
    conversation_id: &'a str,
    temp_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadPayload<'a> {
    conversation_id: &'a str,
}

/// Message shape shared by REST listings and realtime pushes.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: String,
}

impl MessageDto {
    pub fn into_message(self) -> Result<Message, DecodeEventError> {
        let created_at = parse_timestamp(&self.created_at)?;
        let mut message = Message {
            id: MessageId::new(self.id),
            sender_id: UserId::new(self.sender_id),
            content: self.content,
            deleted: self.is_deleted,
            edited: self.is_edited,
            created_at,
        };
        if message.deleted {
            message.mark_deleted();
        }
        Ok(message)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: String,
    #[serde(default)]
    pub participant_name: String,
    #[serde(default)]
    pub participant_avatar: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        Self {
            id: ConversationId::new(dto.id),
            participant: Participant {
                name: dto.participant_name,
                avatar_url: dto.participant_avatar.filter(|url| !url.trim().is_empty()),
            },
            unread: dto.unread_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckPayload {
    conversation_id: String,
    temp_id: String,
    id: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditedPayload {
    conversation_id: String,
    message_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    conversation_id: String,
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub fn encode_op(op: &TransportOp) -> Result<String, serde_json::Error> {
    let type_ = op.type_name();
    match op {
        TransportOp::DeleteMessage {
            conversation_id,
            message_id,
            mine_only,
        } => encode_envelope(
            type_,
            DeletePayload {
                conversation_id: conversation_id.as_str(),
                message_id: message_id.as_str(),
                mine_only: *mine_only,
            },
        ),
        TransportOp::ForwardMessage {
            conversation_id,
            message_id,
        } => encode_envelope(
            type_,
            ForwardPayload {
                conversation_id: conversation_id.as_str(),
                message_id: message_id.as_str(),
            },
        ),
        TransportOp::EditMessage {
            conversation_id,
            message_id,
            content,
        } => encode_envelope(
            type_,
            EditPayload {
                conversation_id: conversation_id.as_str(),
                message_id: message_id.as_str(),
                content: content.as_str(),
            },
        ),
        TransportOp::SendMessage {
            conversation_id,
            temp_id,
            content,
        } => encode_envelope(
            type_,
            SendPayload {
                conversation_id: conversation_id.as_str(),
                temp_id: temp_id.as_str(),
                content: content.as_str(),
            },
        ),
        TransportOp::MarkRead { conversation_id } => encode_envelope(
            type_,
            MarkReadPayload {
                conversation_id: conversation_id.as_str(),
            },
        ),
    }
}

fn encode_envelope<P: Serialize>(type_: &str, payload: P) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EnvelopeOut {
        v: CHAT_PROTOCOL_VERSION,
        type_,
        ts: now_iso(),
        payload,
    })
}

pub fn decode_event(text: &str) -> Result<TransportEvent, DecodeEventError> {
    let env: EnvelopeIn = serde_json::from_str(text)?;
    if env.v != CHAT_PROTOCOL_VERSION {
        return Err(DecodeEventError::Version(env.v));
    }

    match env.type_.as_str() {
        "message" => {
            let dto: MessageDto = serde_json::from_value(env.payload)?;
            let conversation_id =
                ConversationId::new(dto.conversation_id.clone().unwrap_or_default());
            Ok(TransportEvent::MessageCreated {
                conversation_id,
                message: dto.into_message()?,
            })
        }
        "messageAck" => {
            let payload: AckPayload = serde_json::from_value(env.payload)?;
            let created_at = payload
                .created_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?;
            Ok(TransportEvent::MessageAcknowledged {
                conversation_id: ConversationId::new(payload.conversation_id),
                temp_id: MessageId::new(payload.temp_id),
                message_id: MessageId::new(payload.id),
                created_at,
            })
        }
        "messageEdited" => {
            let payload: EditedPayload = serde_json::from_value(env.payload)?;
            Ok(TransportEvent::MessageEdited {
                conversation_id: ConversationId::new(payload.conversation_id),
                message_id: MessageId::new(payload.message_id),
                content: payload.content,
            })
        }
        "messageDeleted" => {
            let payload: DeletedPayload = serde_json::from_value(env.payload)?;
            Ok(TransportEvent::MessageDeleted {
                conversation_id: ConversationId::new(payload.conversation_id),
                message_id: MessageId::new(payload.message_id),
            })
        }
        "error" => {
            let payload: ErrorPayload = serde_json::from_value(env.payload)?;
            Ok(TransportEvent::ServerError {
                code: payload.code,
                message: payload.message,
            })
        }
        other => Err(DecodeEventError::UnknownType(other.to_string())),
    }
}

pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, DecodeEventError> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map_err(|_| DecodeEventError::Timestamp(value.to_string()))
}

pub fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
