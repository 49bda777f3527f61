//! Data model for conversations, messages, and attachments
//!
//! These types are the single vocabulary shared by the conversation
//! store, the gateway, and the client pipeline. Conversations own their
//! messages; attachments are owned by their message and are immutable
//! once created.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Number of characters of the first user message used for an
/// auto-derived conversation title.
pub const TITLE_DERIVE_LEN: usize = 40;

/// Title given to a conversation before any message arrives.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn
    User,
    /// Model response
    Assistant,
    /// System instruction
    System,
}

impl Role {
    /// Parse a role from its wire representation
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::store::Role;
    ///
    /// assert_eq!(Role::parse("user"), Some(Role::User));
    /// assert_eq!(Role::parse("tool"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Wire representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Message lifecycle status
///
/// Transitions: `Pending -> Streaming -> Done` or `Streaming -> Error`.
/// `Done` and `Error` are terminal; a terminal message accepts no
/// further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created but not yet streaming
    Pending,
    /// Receiving incremental content
    Streaming,
    /// Completed normally (including after cancellation)
    Done,
    /// Failed; content holds whatever arrived before the failure
    Error,
}

impl MessageStatus {
    /// Whether this status permits no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Attachment media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Still image
    Image,
    /// Video clip
    Video,
}

impl AttachmentKind {
    /// Parse an attachment kind from its wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Media attached to a single message
///
/// Immutable once created. The locator is a self-contained data URL in
/// the reference flow, but any dereferenceable URL is legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Media kind
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Content locator (data URL or external URL)
    pub url: String,
    /// Declared MIME type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Byte size of the original file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Original filename
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Statistics from the most recent upstream call of a conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallStats {
    /// Wall-clock latency of the call in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// HTTP status returned by the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Provider key used for the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl CallStats {
    /// Merge another stats record into this one
    ///
    /// Fields present in `other` win; absent fields keep their current
    /// value.
    pub fn merge(&mut self, other: &CallStats) {
        if other.latency_ms.is_some() {
            self.latency_ms = other.latency_ms;
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.provider.is_some() {
            self.provider = other.provider.clone();
        }
    }
}

/// A single message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (ULID)
    pub id: String,
    /// Owning conversation; never reassigned
    pub conversation_id: String,
    /// Sender role
    pub role: Role,
    /// Textual content; mutable while streaming, frozen once terminal
    pub content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Creation timestamp (RFC-3339)
    pub created_at: String,
    /// Ordered attachments, owned by this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Create a completed user message
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Done,
            created_at: now_rfc3339(),
            attachments: Vec::new(),
        }
    }

    /// Create an assistant message already in `Streaming` state
    ///
    /// Assistant messages are created directly in `Streaming` in the
    /// reference flow; `Pending` exists for callers that stage messages
    /// before dispatch.
    pub fn assistant_streaming(conversation_id: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming,
            created_at: now_rfc3339(),
            attachments: Vec::new(),
        }
    }

    /// Create a completed system message
    pub fn system(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            conversation_id: conversation_id.into(),
            role: Role::System,
            content: content.into(),
            status: MessageStatus::Done,
            created_at: now_rfc3339(),
            attachments: Vec::new(),
        }
    }

    /// Attach media to this message (builder style)
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Field-replacement patch for a message
///
/// `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    /// Replace the content
    pub content: Option<String>,
    /// Replace the status
    pub status: Option<MessageStatus>,
}

/// Update descriptor for [`ConversationStore::update_message`]
///
/// A tagged choice between field replacement and an arbitrary
/// transform, so every caller shares one contract instead of an ad hoc
/// union of closures and partial objects.
///
/// [`ConversationStore::update_message`]: crate::store::ConversationStore::update_message
pub enum MessageUpdate {
    /// Replace the listed fields
    Patch(MessagePatch),
    /// Apply an arbitrary transform to the message
    Transform(Box<dyn FnOnce(&mut Message) + Send>),
}

impl MessageUpdate {
    /// Convenience constructor for a status-only patch
    pub fn status(status: MessageStatus) -> Self {
        Self::Patch(MessagePatch {
            status: Some(status),
            ..Default::default()
        })
    }

    /// Convenience constructor for a content-only patch
    pub fn content(content: impl Into<String>) -> Self {
        Self::Patch(MessagePatch {
            content: Some(content.into()),
            ..Default::default()
        })
    }
}

/// A named, ordered thread of messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier (ULID)
    pub id: String,
    /// Display title
    pub title: String,
    /// Whether the title was set by an explicit rename.
    /// An explicit rename permanently suppresses auto-derivation from
    /// the first user message.
    #[serde(default)]
    pub title_explicit: bool,
    /// Per-conversation system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Creation timestamp (RFC-3339)
    pub created_at: String,
    /// Last update timestamp (RFC-3339)
    pub updated_at: String,
    /// Statistics from the most recent upstream call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CallStats>,
    /// Ordered, append-only message list
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with the default title
    pub fn new() -> Self {
        let now = now_rfc3339();
        Self {
            id: new_id(),
            title: DEFAULT_TITLE.to_string(),
            title_explicit: false,
            system_prompt: None,
            created_at: now.clone(),
            updated_at: now,
            stats: None,
            messages: Vec::new(),
        }
    }

    /// Whether this conversation has no messages yet
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a new ULID identifier
///
/// ULIDs are preferred over UUIDs as they are sortable by timestamp
/// and more human-readable.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Current UTC time as an RFC-3339 formatted string
///
/// Used consistently for all conversation and message timestamps.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Derive a conversation title from message content
///
/// Takes the first [`TITLE_DERIVE_LEN`] characters of the trimmed
/// content; falls back to [`DEFAULT_TITLE`] for whitespace-only input.
pub fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    trimmed.chars().take(TITLE_DERIVE_LEN).collect()
}
