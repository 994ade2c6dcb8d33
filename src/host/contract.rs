//! Versioned message schema for the host <-> embedded editor boundary.
//!
//! Every frame on the wire is a flat JSON object:
//!
//! ```text
//! { "v": 1, "type": "LOAD_PROJECT", "correlation_id": "…", "payload": … }
//! ```
//!
//! Outbound frames are built from [`HostMessage`]; inbound frames are decoded
//! into [`EmbeddedMessage`] by [`decode_inbound`], which rejects anything the
//! closed schema does not describe before a handler ever sees it.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Contract version for wire frames and diagnostic events.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message type discriminators used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "LOAD_PROJECT")]
    LoadProject,
    #[serde(rename = "LOAD_PROJECT_ACK")]
    LoadProjectAck,
    #[serde(rename = "EXPORT_PROJECT_REQUEST")]
    ExportProjectRequest,
    #[serde(rename = "EXPORT_PROJECT_RESPONSE")]
    ExportProjectResponse,
    #[serde(rename = "GET_THUMBNAIL")]
    GetThumbnail,
    #[serde(rename = "THUMBNAIL_RESPONSE")]
    ThumbnailResponse,
    #[serde(rename = "USER_INFO_UPDATE")]
    UserInfoUpdate,
    #[serde(rename = "USER_INFO_UPDATE_ACK")]
    UserInfoUpdateAck,
    #[serde(rename = "REQUEST_PROJECT_TITLE")]
    RequestProjectTitle,
    #[serde(rename = "SET_PROJECT_TITLE")]
    SetProjectTitle,
    #[serde(rename = "PROJECT_TITLE_RESPONSE")]
    ProjectTitleResponse,
    #[serde(rename = "TITLE_UPDATE")]
    TitleUpdate,
    #[serde(rename = "TRANSPORT_READY")]
    TransportReady,
    #[serde(rename = "RUNTIME_READY")]
    RuntimeReady,
    #[serde(rename = "SAVE_REQUESTED")]
    SaveRequested,
    #[serde(rename = "LOGOUT_REQUESTED")]
    LogoutRequested,
}

impl MessageType {
    /// Render the discriminator to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadProject => "LOAD_PROJECT",
            Self::LoadProjectAck => "LOAD_PROJECT_ACK",
            Self::ExportProjectRequest => "EXPORT_PROJECT_REQUEST",
            Self::ExportProjectResponse => "EXPORT_PROJECT_RESPONSE",
            Self::GetThumbnail => "GET_THUMBNAIL",
            Self::ThumbnailResponse => "THUMBNAIL_RESPONSE",
            Self::UserInfoUpdate => "USER_INFO_UPDATE",
            Self::UserInfoUpdateAck => "USER_INFO_UPDATE_ACK",
            Self::RequestProjectTitle => "REQUEST_PROJECT_TITLE",
            Self::SetProjectTitle => "SET_PROJECT_TITLE",
            Self::ProjectTitleResponse => "PROJECT_TITLE_RESPONSE",
            Self::TitleUpdate => "TITLE_UPDATE",
            Self::TransportReady => "TRANSPORT_READY",
            Self::RuntimeReady => "RUNTIME_READY",
            Self::SaveRequested => "SAVE_REQUESTED",
            Self::LogoutRequested => "LOGOUT_REQUESTED",
        }
    }

    /// Parse a discriminator from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LOAD_PROJECT" => Some(Self::LoadProject),
            "LOAD_PROJECT_ACK" => Some(Self::LoadProjectAck),
            "EXPORT_PROJECT_REQUEST" => Some(Self::ExportProjectRequest),
            "EXPORT_PROJECT_RESPONSE" => Some(Self::ExportProjectResponse),
            "GET_THUMBNAIL" => Some(Self::GetThumbnail),
            "THUMBNAIL_RESPONSE" => Some(Self::ThumbnailResponse),
            "USER_INFO_UPDATE" => Some(Self::UserInfoUpdate),
            "USER_INFO_UPDATE_ACK" => Some(Self::UserInfoUpdateAck),
            "REQUEST_PROJECT_TITLE" => Some(Self::RequestProjectTitle),
            "SET_PROJECT_TITLE" => Some(Self::SetProjectTitle),
            "PROJECT_TITLE_RESPONSE" => Some(Self::ProjectTitleResponse),
            "TITLE_UPDATE" => Some(Self::TitleUpdate),
            "TRANSPORT_READY" => Some(Self::TransportReady),
            "RUNTIME_READY" => Some(Self::RuntimeReady),
            "SAVE_REQUESTED" => Some(Self::SaveRequested),
            "LOGOUT_REQUESTED" => Some(Self::LogoutRequested),
            _ => None,
        }
    }

    /// Whether frames of this type travel from the embedded editor to the host.
    #[must_use]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::LoadProjectAck
                | Self::ExportProjectResponse
                | Self::ThumbnailResponse
                | Self::UserInfoUpdateAck
                | Self::ProjectTitleResponse
                | Self::TitleUpdate
                | Self::TransportReady
                | Self::RuntimeReady
                | Self::SaveRequested
                | Self::LogoutRequested
        )
    }

    /// The request kind this type answers, if it is an RPC reply.
    #[must_use]
    pub fn reply_kind(self) -> Option<RequestKind> {
        match self {
            Self::ProjectTitleResponse => Some(RequestKind::Title),
            Self::ExportProjectResponse => Some(RequestKind::Export),
            Self::ThumbnailResponse => Some(RequestKind::Thumbnail),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/response pairs simulated on top of the one-way channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Title,
    Export,
    Thumbnail,
}

impl RequestKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Export => "export",
            Self::Thumbnail => "thumbnail",
        }
    }

    /// The outbound message that starts a request of this kind.
    #[must_use]
    pub fn request_message(self) -> HostMessage {
        match self {
            Self::Title => HostMessage::RequestProjectTitle,
            Self::Export => HostMessage::ExportProjectRequest,
            Self::Thumbnail => HostMessage::GetThumbnail,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat JSON frame exchanged across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub v: u32,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

/// Authentication snapshot pushed to the editor.
///
/// There is no "unknown" state here: a session that has not been resolved
/// yet cannot be turned into a snapshot at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            display_name: None,
            avatar_ref: None,
        }
    }
}

/// Messages the host sends into the embedded editor.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    LoadProject(serde_json::Value),
    ExportProjectRequest,
    GetThumbnail,
    UserInfoUpdate(SessionSnapshot),
    RequestProjectTitle,
    SetProjectTitle(String),
}

impl HostMessage {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::LoadProject(_) => MessageType::LoadProject,
            Self::ExportProjectRequest => MessageType::ExportProjectRequest,
            Self::GetThumbnail => MessageType::GetThumbnail,
            Self::UserInfoUpdate(_) => MessageType::UserInfoUpdate,
            Self::RequestProjectTitle => MessageType::RequestProjectTitle,
            Self::SetProjectTitle(_) => MessageType::SetProjectTitle,
        }
    }

    /// Build the wire frame for this message.
    #[must_use]
    pub fn to_frame(&self, correlation_id: Option<&str>) -> WireFrame {
        let payload = match self {
            Self::LoadProject(document) => document.clone(),
            Self::UserInfoUpdate(snapshot) => serde_json::json!({
                "authenticated": snapshot.authenticated,
                "displayName": snapshot.display_name,
                "avatarRef": snapshot.avatar_ref,
            }),
            Self::SetProjectTitle(title) => serde_json::Value::String(title.clone()),
            Self::ExportProjectRequest | Self::GetThumbnail | Self::RequestProjectTitle => {
                serde_json::Value::Null
            }
        };
        WireFrame {
            v: PROTOCOL_VERSION,
            message_type: self.message_type().as_str().to_owned(),
            correlation_id: correlation_id.map(str::to_owned),
            payload,
        }
    }
}

/// Advisory outcome of a project transfer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadAck {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Messages the embedded editor sends to the host, after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedMessage {
    LoadProjectAck(LoadAck),
    ExportProjectResponse(serde_json::Value),
    ThumbnailResponse(Option<Vec<u8>>),
    UserInfoUpdateAck(serde_json::Value),
    ProjectTitleResponse(String),
    TitleUpdate(String),
    TransportReady { timestamp: Option<i64> },
    RuntimeReady { timestamp: Option<i64> },
    SaveRequested,
    LogoutRequested,
}

impl EmbeddedMessage {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::LoadProjectAck(_) => MessageType::LoadProjectAck,
            Self::ExportProjectResponse(_) => MessageType::ExportProjectResponse,
            Self::ThumbnailResponse(_) => MessageType::ThumbnailResponse,
            Self::UserInfoUpdateAck(_) => MessageType::UserInfoUpdateAck,
            Self::ProjectTitleResponse(_) => MessageType::ProjectTitleResponse,
            Self::TitleUpdate(_) => MessageType::TitleUpdate,
            Self::TransportReady { .. } => MessageType::TransportReady,
            Self::RuntimeReady { .. } => MessageType::RuntimeReady,
            Self::SaveRequested => MessageType::SaveRequested,
            Self::LogoutRequested => MessageType::LogoutRequested,
        }
    }
}

/// A validated inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub correlation_id: Option<String>,
    pub message: EmbeddedMessage,
}

/// Decode and validate a raw inbound frame.
pub fn decode_inbound(raw: &serde_json::Value) -> Result<InboundMessage, ContractError> {
    let frame: WireFrame = serde_json::from_value(raw.clone()).map_err(|e| {
        ContractError::new(
            ContractErrorKind::InvalidEnvelope,
            format!("frame is not a valid envelope: {e}"),
        )
    })?;

    if frame.v != PROTOCOL_VERSION {
        return Err(ContractError::new(
            ContractErrorKind::UnsupportedVersion,
            format!(
                "unsupported contract version {}; expected {}",
                frame.v, PROTOCOL_VERSION
            ),
        ));
    }

    let Some(message_type) = MessageType::parse(&frame.message_type) else {
        return Err(ContractError::new(
            ContractErrorKind::UnknownType,
            format!("unknown message type {:?}", frame.message_type),
        ));
    };
    if !message_type.is_inbound() {
        return Err(ContractError::new(
            ContractErrorKind::InvalidEnvelope,
            format!("{message_type} is not sent by the embedded editor"),
        ));
    }

    let correlation_id = frame
        .correlation_id
        .filter(|id| !id.trim().is_empty());
    let message = decode_payload(message_type, frame.payload).map_err(|detail| {
        ContractError::malformed(message_type, correlation_id.clone(), detail)
    })?;

    Ok(InboundMessage {
        correlation_id,
        message,
    })
}

fn decode_payload(
    message_type: MessageType,
    payload: serde_json::Value,
) -> Result<EmbeddedMessage, String> {
    use serde_json::Value;

    match message_type {
        MessageType::LoadProjectAck => serde_json::from_value::<LoadAck>(payload)
            .map(EmbeddedMessage::LoadProjectAck)
            .map_err(|e| format!("invalid ack: {e}")),
        MessageType::ExportProjectResponse => match payload {
            Value::Null => Err("export response carried no document".to_owned()),
            document => Ok(EmbeddedMessage::ExportProjectResponse(document)),
        },
        MessageType::ThumbnailResponse => match payload {
            Value::Null => Ok(EmbeddedMessage::ThumbnailResponse(None)),
            Value::String(encoded) => decode_image(&encoded)
                .map(|bytes| EmbeddedMessage::ThumbnailResponse(Some(bytes))),
            other => Err(format!("thumbnail must be a string or null, got {other}")),
        },
        MessageType::UserInfoUpdateAck => Ok(EmbeddedMessage::UserInfoUpdateAck(payload)),
        MessageType::ProjectTitleResponse => match payload {
            Value::String(title) => Ok(EmbeddedMessage::ProjectTitleResponse(title)),
            other => Err(format!("title must be a string, got {other}")),
        },
        MessageType::TitleUpdate => match payload {
            Value::String(title) => Ok(EmbeddedMessage::TitleUpdate(title)),
            other => Err(format!("title must be a string, got {other}")),
        },
        MessageType::TransportReady => {
            parse_timestamp(&payload).map(|timestamp| EmbeddedMessage::TransportReady { timestamp })
        }
        MessageType::RuntimeReady => {
            parse_timestamp(&payload).map(|timestamp| EmbeddedMessage::RuntimeReady { timestamp })
        }
        MessageType::SaveRequested => Ok(EmbeddedMessage::SaveRequested),
        MessageType::LogoutRequested => Ok(EmbeddedMessage::LogoutRequested),
        outbound => Err(format!("{outbound} has no inbound payload")),
    }
}

fn parse_timestamp(payload: &serde_json::Value) -> Result<Option<i64>, String> {
    match payload {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| format!("timestamp out of range: {n}")),
        other => Err(format!("timestamp must be a number, got {other}")),
    }
}

/// Decode a base64 image, accepting an optional `data:` URL prefix.
fn decode_image(encoded: &str) -> Result<Vec<u8>, String> {
    let body = match encoded.split_once(";base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|e| format!("thumbnail is not valid base64: {e}"))
}

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A versioned diagnostic event emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub level: EventLevel,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        level: EventLevel,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            level,
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
    UnknownType,
    MalformedPayload,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
    /// Set for [`ContractErrorKind::MalformedPayload`].
    pub message_type: Option<MessageType>,
    pub correlation_id: Option<String>,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            message_type: None,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn malformed(
        message_type: MessageType,
        correlation_id: Option<String>,
        message: String,
    ) -> Self {
        Self {
            kind: ContractErrorKind::MalformedPayload,
            message,
            message_type: Some(message_type),
            correlation_id,
        }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message_type {
            Some(t) => write!(f, "{:?} ({t}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ContractError {}
