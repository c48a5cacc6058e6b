//! Discord interaction wire types
//!
//! Inbound interactions are parsed once the signature has been checked;
//! outbound responses are built with the constructors on [`InteractionResponse`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Message flag: only the invoking user sees the message
pub const EPHEMERAL: u64 = 1 << 6;

/// Discord caps component custom ids at 100 characters
pub const MAX_CUSTOM_ID_LEN: usize = 100;

/// Discord caps button labels at 80 characters
pub const MAX_BUTTON_LABEL_LEN: usize = 80;

pub const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;
pub const PERMISSION_MANAGE_GUILD: u64 = 1 << 5;

// ============================================================================
// INBOUND
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Present for guild invocations
    #[serde(default)]
    pub member: Option<Member>,
    /// Present for DM invocations
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: User,
    /// Resolved permission bitfield, serialized as a decimal string
    #[serde(default)]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentData {
    pub custom_id: String,
}

/// What the interaction asks for, decoded from `type` + `data`
#[derive(Debug, Clone)]
pub enum InteractionKind {
    Ping,
    Command(CommandData),
    Component(ComponentData),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown interaction type {0}")]
    UnknownType(u8),
    #[error("interaction data missing")]
    MissingData,
    #[error("malformed interaction data: {0}")]
    Data(#[from] serde_json::Error),
    #[error("interaction has no invoking user")]
    MissingUser,
}

impl Interaction {
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn kind(&self) -> Result<InteractionKind, ProtocolError> {
        match self.kind {
            1 => Ok(InteractionKind::Ping),
            2 => Ok(InteractionKind::Command(self.typed_data()?)),
            3 => Ok(InteractionKind::Component(self.typed_data()?)),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }

    fn typed_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self.data.clone().ok_or(ProtocolError::MissingData)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Invoking user: `member.user` in guilds, `user` in DMs
    pub fn invoker(&self) -> Result<&User, ProtocolError> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())
            .ok_or(ProtocolError::MissingUser)
    }

    /// Whether the invoking member holds any of `bits`. DMs have no permissions.
    pub fn member_has_any(&self, bits: u64) -> bool {
        self.member
            .as_ref()
            .and_then(|m| m.permissions.as_deref())
            .and_then(|p| p.parse::<u64>().ok())
            .is_some_and(|granted| granted & bits != 0)
    }
}

impl CommandData {
    /// Non-empty string option by name
    pub fn string_option(&self, name: &str) -> Option<String> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| match &o.value {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// COMPONENT IDENTIFIERS
// ============================================================================

const CUSTOM_ID_DELIMITER: char = ':';
const CLAIM_TAG: &str = "claim";

/// Action carried in a button's custom id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentAction {
    Claim { event_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentIdError {
    #[error("malformed component id: {0:?}")]
    Malformed(String),
    #[error("unknown component action: {0}")]
    UnknownAction(String),
}

impl ComponentAction {
    pub fn parse(custom_id: &str) -> Result<Self, ComponentIdError> {
        let (tag, param) = custom_id
            .split_once(CUSTOM_ID_DELIMITER)
            .ok_or_else(|| ComponentIdError::Malformed(custom_id.to_string()))?;

        if tag.is_empty() || param.is_empty() {
            return Err(ComponentIdError::Malformed(custom_id.to_string()));
        }

        match tag {
            CLAIM_TAG => Ok(Self::Claim {
                event_type: param.to_string(),
            }),
            other => Err(ComponentIdError::UnknownAction(other.to_string())),
        }
    }

    /// Longest event id whose claim custom id still fits, in characters
    pub fn max_claim_event_len() -> usize {
        MAX_CUSTOM_ID_LEN - CLAIM_TAG.chars().count() - 1
    }

    pub fn custom_id(&self) -> String {
        match self {
            Self::Claim { event_type } => {
                format!("{}{}{}", CLAIM_TAG, CUSTOM_ID_DELIMITER, event_type)
            }
        }
    }
}

// ============================================================================
// OUTBOUND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Pong = 1,
    ChannelMessage = 4,
    DeferredChannelMessage = 5,
}

impl Serialize for ResponseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: ResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    /// Always 1 (action row)
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<Button>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Button {
    /// Always 2 (button)
    #[serde(rename = "type")]
    pub kind: u8,
    /// 1 = primary
    pub style: u8,
    pub label: String,
    pub custom_id: String,
}

impl ActionRow {
    pub fn single_button(label: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            kind: 1,
            components: vec![Button {
                kind: 2,
                style: 1,
                label: label.into(),
                custom_id: custom_id.into(),
            }],
        }
    }
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: ResponseType::Pong,
            data: None,
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: ResponseType::ChannelMessage,
            data: Some(MessageData {
                content: Some(content.into()),
                ..Default::default()
            }),
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            kind: ResponseType::ChannelMessage,
            data: Some(MessageData {
                content: Some(content.into()),
                flags: Some(EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    pub fn with_components(mut self, components: Vec<ActionRow>) -> Self {
        self.data.get_or_insert_with(MessageData::default).components = components;
        self
    }

    /// "Thinking..." placeholder visible only to the clicking user
    pub fn deferred_ephemeral() -> Self {
        Self {
            kind: ResponseType::DeferredChannelMessage,
            data: Some(MessageData {
                flags: Some(EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.content.as_deref())
    }

    pub fn is_ephemeral(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.flags)
            .is_some_and(|f| f & EPHEMERAL != 0)
    }
}
