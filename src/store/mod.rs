//! Conversation store: the single source of truth for conversation state
//!
//! The store owns every conversation and its ordered message list. All
//! mutation flows through the operations defined here; each operation
//! is atomic with respect to the caller's event loop and persists the
//! full state afterwards on a best-effort basis (a storage write
//! failure never fails the operation).
//!
//! Two ordering invariants coexist and are deliberately separate:
//! the conversation list is ordered by recency of activity (selection
//! promotes to the front), while the current selection is independent
//! state that merely defaults to the first entry.

pub mod model;
pub mod persistence;

pub use model::{
    derive_title, new_id, now_rfc3339, Attachment, AttachmentKind, CallStats, Conversation,
    Message, MessagePatch, MessageStatus, MessageUpdate, Role, DEFAULT_TITLE, TITLE_DERIVE_LEN,
};
pub use persistence::StateStore;

use crate::error::Result;
use std::path::Path;

/// Durable, ordered collection of conversations and their messages
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    current: Option<String>,
    state: Option<StateStore>,
}

impl ConversationStore {
    /// Open the store backed by a sled database
    ///
    /// Cold-start behavior: persisted state is loaded; when no
    /// conversations exist, exactly one empty conversation is
    /// synthesized and persisted immediately, so callers never observe
    /// an empty store. A stale persisted current id falls back to the
    /// first conversation.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the database directory
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Storage` only if the database cannot be
    /// opened at all; read errors on individual slots degrade to a
    /// fresh state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let state = StateStore::open(path)?;

        let conversations = match state.load_conversations() {
            Ok(Some(conversations)) => conversations,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to load persisted conversations: {}", e);
                Vec::new()
            }
        };
        let current = match state.load_current() {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!("Failed to load persisted current id: {}", e);
                None
            }
        };

        let mut store = Self {
            conversations,
            current,
            state: Some(state),
        };
        store.ensure_non_empty();
        store.reconcile_current();
        store.persist();
        Ok(store)
    }

    /// Create an in-memory store with no persistence
    ///
    /// Used by tests and embedded callers; the cold-start invariant
    /// (one synthesized empty conversation) still holds.
    pub fn in_memory() -> Self {
        let mut store = Self {
            conversations: Vec::new(),
            current: None,
            state: None,
        };
        store.ensure_non_empty();
        store.reconcile_current();
        store
    }

    /// Synthesize one empty conversation when the store is empty
    fn ensure_non_empty(&mut self) {
        if self.conversations.is_empty() {
            let conversation = Conversation::new();
            self.current = Some(conversation.id.clone());
            self.conversations.push(conversation);
        }
    }

    /// Drop a stale current id, falling back to the first conversation
    fn reconcile_current(&mut self) {
        let valid = self
            .current
            .as_ref()
            .map(|id| self.conversations.iter().any(|c| &c.id == id))
            .unwrap_or(false);
        if !valid {
            self.current = self.conversations.first().map(|c| c.id.clone());
        }
    }

    /// Persist the full state; failures are logged and swallowed
    fn persist(&self) {
        let Some(state) = &self.state else {
            return;
        };
        if let Err(e) = state.save_conversations(&self.conversations) {
            tracing::warn!("Failed to persist conversations: {}", e);
        }
        if let Err(e) = state.save_current(self.current.as_deref()) {
            tracing::warn!("Failed to persist current id: {}", e);
        }
    }

    /// Create a new conversation and make it current
    ///
    /// If an existing conversation has zero messages, it is reused and
    /// promoted to current instead of creating a duplicate empty
    /// thread. A supplied title is applied as an explicit rename.
    ///
    /// # Arguments
    ///
    /// * `title` - Optional explicit title for the conversation
    ///
    /// # Returns
    ///
    /// The id of the (new or reused) current conversation.
    pub fn add_conversation(&mut self, title: Option<&str>) -> String {
        let reusable = self.conversations.iter().position(|c| c.is_empty());

        let id = match reusable {
            Some(pos) => {
                let mut conversation = self.conversations.remove(pos);
                if let Some(title) = title {
                    conversation.title = title.to_string();
                    conversation.title_explicit = true;
                    conversation.updated_at = now_rfc3339();
                }
                let id = conversation.id.clone();
                self.conversations.insert(0, conversation);
                id
            }
            None => {
                let mut conversation = Conversation::new();
                if let Some(title) = title {
                    conversation.title = title.to_string();
                    conversation.title_explicit = true;
                }
                let id = conversation.id.clone();
                self.conversations.insert(0, conversation);
                id
            }
        };

        self.current = Some(id.clone());
        self.persist();
        id
    }

    /// Rename a conversation
    ///
    /// An explicit rename permanently suppresses title auto-derivation
    /// from the first user message. No-op if the id is unknown.
    pub fn rename_conversation(&mut self, id: &str, title: impl Into<String>) {
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return;
        };
        conversation.title = title.into();
        conversation.title_explicit = true;
        conversation.updated_at = now_rfc3339();
        self.persist();
    }

    /// Delete a conversation and its entire message list atomically
    ///
    /// If the deleted conversation was current, the first remaining
    /// conversation becomes current (or none).
    pub fn delete_conversation(&mut self, id: &str) {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return;
        }
        if self.current.as_deref() == Some(id) {
            self.current = self.conversations.first().map(|c| c.id.clone());
        }
        self.persist();
    }

    /// Append a message to its owning conversation
    ///
    /// When this is the conversation's first message, its role is
    /// `user`, and the conversation has not been explicitly renamed,
    /// the title is auto-derived from the message content. Bumps
    /// `updated_at`. No-op if the owning conversation is unknown.
    pub fn add_message(&mut self, message: Message) {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        else {
            tracing::warn!(
                conversation_id = %message.conversation_id,
                "Dropping message for unknown conversation"
            );
            return;
        };

        if conversation.is_empty() && message.role == Role::User && !conversation.title_explicit {
            conversation.title = derive_title(&message.content);
        }
        conversation.updated_at = now_rfc3339();
        conversation.messages.push(message);
        self.persist();
    }

    /// Append streamed content to a message still in `Streaming` state
    ///
    /// The fast path used by the stream reconciler for each increment.
    /// No-op for unknown ids or terminal messages.
    pub fn append_delta(&mut self, conversation_id: &str, message_id: &str, delta: &str) {
        let Some(message) = self.find_message_mut(conversation_id, message_id) else {
            return;
        };
        if message.status.is_terminal() {
            return;
        }
        message.content.push_str(delta);
        self.persist();
    }

    /// Apply an update descriptor to exactly one message
    ///
    /// No-op if the conversation or message is unknown, or if the
    /// message has already reached a terminal status.
    pub fn update_message(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        update: MessageUpdate,
    ) {
        let Some(message) = self.find_message_mut(conversation_id, message_id) else {
            return;
        };
        if message.status.is_terminal() {
            return;
        }
        match update {
            MessageUpdate::Patch(patch) => {
                if let Some(content) = patch.content {
                    message.content = content;
                }
                if let Some(status) = patch.status {
                    message.status = status;
                }
            }
            MessageUpdate::Transform(transform) => transform(message),
        }
        self.persist();
    }

    /// Merge call statistics into a conversation's last-call record
    pub fn update_stats(&mut self, conversation_id: &str, stats: &CallStats) {
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == conversation_id)
        else {
            return;
        };
        conversation
            .stats
            .get_or_insert_with(CallStats::default)
            .merge(stats);
        conversation.updated_at = now_rfc3339();
        self.persist();
    }

    /// Make a conversation current and promote it to the front
    ///
    /// Promotion keeps the list in most-recently-active order; it is a
    /// side effect of selection, not of content updates. No-op if the
    /// id is unknown.
    pub fn set_current(&mut self, id: &str) {
        let Some(pos) = self.conversations.iter().position(|c| c.id == id) else {
            return;
        };
        let conversation = self.conversations.remove(pos);
        self.conversations.insert(0, conversation);
        self.current = Some(id.to_string());
        self.persist();
    }

    /// Set the per-conversation system prompt
    pub fn update_system_prompt(&mut self, id: &str, prompt: impl Into<String>) {
        let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) else {
            return;
        };
        let prompt = prompt.into();
        conversation.system_prompt = if prompt.is_empty() { None } else { Some(prompt) };
        conversation.updated_at = now_rfc3339();
        self.persist();
    }

    /// Ordered conversation list (most recently active first)
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Id of the current conversation
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The current conversation
    pub fn current(&self) -> Option<&Conversation> {
        let id = self.current.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Look up a conversation by id
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Look up a message by conversation and message id
    pub fn message(&self, conversation_id: &str, message_id: &str) -> Option<&Message> {
        self.conversation(conversation_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
    }

    fn find_message_mut(&mut self, conversation_id: &str, message_id: &str) -> Option<&mut Message> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)?
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
    }
}
