//! Chat send orchestration
//!
//! Drives the full send pipeline against the gateway: append the user
//! message, create the streaming assistant placeholder, post the
//! payload, and reconcile the relayed stream into the store. Exactly
//! one send is in flight at a time; starting a new send cancels the
//! prior one. The live cancellation token sits behind a shared slot so
//! a [`CancelHandle`] can abort the network read from another task
//! while the send is still being awaited. The last assembled payload
//! is retained verbatim so a retry replays it against a fresh
//! assistant message.

use crate::error::{ChatRelayError, Result};
use crate::store::model::{Attachment, CallStats, Message, MessageStatus, MessageUpdate};
use crate::store::ConversationStore;
use crate::stream::{reconcile, StreamOutcome};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One user-initiated send
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Target conversation
    pub conversation_id: String,
    /// User message text
    pub content: String,
    /// Provider key for the gateway
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// Uploaded attachments to carry on the user message
    pub attachments: Vec<Attachment>,
}

/// Detached cancel control for the in-flight send
///
/// Cheap to clone and safe to trigger from any task. Cancelling with
/// nothing in flight, or more than once, is a no-op.
#[derive(Clone)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// Abort the in-flight send, if any
    pub fn cancel(&self) {
        lock_token(&self.token).cancel();
    }
}

/// Client side of the chat pipeline
pub struct ChatClient {
    http: reqwest::Client,
    /// Gateway chat endpoint URL
    endpoint: String,
    /// Last successfully assembled payload, kept verbatim for retry
    last_payload: Option<Value>,
    /// Conversation the retained payload belongs to
    last_conversation: Option<String>,
    /// Token bound to the in-flight send; replaced on every send
    cancel: Arc<Mutex<CancellationToken>>,
}

/// Lock the token slot, recovering from a poisoned lock
///
/// The slot only ever holds a token; a panic mid-swap cannot leave it
/// in a broken state, so the poisoned value is safe to reuse.
fn lock_token(slot: &Mutex<CancellationToken>) -> MutexGuard<'_, CancellationToken> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChatClient {
    /// Create a client targeting the given gateway chat endpoint
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            last_payload: None,
            last_conversation: None,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// A handle that can cancel the in-flight send from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: Arc::clone(&self.cancel),
        }
    }

    /// Send a user message and stream the reply into the store
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown conversation, a gateway error
    /// response, or a mid-stream failure (including a terminal error
    /// event relayed by the gateway). The assistant message is marked
    /// `Error` on any failure path.
    pub async fn send(
        &mut self,
        store: &mut ConversationStore,
        request: SendRequest,
    ) -> Result<StreamOutcome> {
        if store.conversation(&request.conversation_id).is_none() {
            return Err(ChatRelayError::InvalidRequest(format!(
                "unknown conversation: {}",
                request.conversation_id
            ))
            .into());
        }

        let user = Message::user(&request.conversation_id, &request.content)
            .with_attachments(request.attachments.clone());
        store.add_message(user);

        let payload = assemble_payload(store, &request)?;
        self.last_payload = Some(payload.clone());
        self.last_conversation = Some(request.conversation_id.clone());

        let assistant = Message::assistant_streaming(&request.conversation_id);
        let assistant_id = assistant.id.clone();
        store.add_message(assistant);

        self.execute(store, &request.conversation_id, &assistant_id, payload)
            .await
    }

    /// Replay the retained payload as a fresh attempt
    ///
    /// A new assistant message is appended; the failed one is left in
    /// place so the history shows both attempts.
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::InvalidRequest` when no payload has
    /// been assembled yet, otherwise the same failures as
    /// [`ChatClient::send`].
    pub async fn retry(&mut self, store: &mut ConversationStore) -> Result<StreamOutcome> {
        let (payload, conversation_id) = match (&self.last_payload, &self.last_conversation) {
            (Some(payload), Some(id)) => (payload.clone(), id.clone()),
            _ => {
                return Err(
                    ChatRelayError::InvalidRequest("nothing to retry".to_string()).into(),
                )
            }
        };

        let assistant = Message::assistant_streaming(&conversation_id);
        let assistant_id = assistant.id.clone();
        store.add_message(assistant);

        self.execute(store, &conversation_id, &assistant_id, payload)
            .await
    }

    /// Cancel the in-flight send, if any
    ///
    /// Idempotent: cancelling twice, or with nothing in flight, is a
    /// no-op. See [`ChatClient::cancel_handle`] for cancelling while
    /// `send` is being awaited.
    pub fn cancel(&self) {
        lock_token(&self.cancel).cancel();
    }

    /// Post one payload and reconcile the response stream
    async fn execute(
        &mut self,
        store: &mut ConversationStore,
        conversation_id: &str,
        assistant_id: &str,
        payload: Value,
    ) -> Result<StreamOutcome> {
        let token = CancellationToken::new();
        {
            // Abort any in-flight send, then install the fresh token.
            let mut slot = lock_token(&self.cancel);
            slot.cancel();
            *slot = token.clone();
        }
        let provider = payload
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let started = Instant::now();

        let result = self
            .run_stream(store, conversation_id, assistant_id, payload, &token)
            .await;

        let mut stats = CallStats {
            latency_ms: Some(started.elapsed().as_millis() as u64),
            provider: Some(provider),
            status: None,
        };

        match result {
            Ok((status, outcome)) => {
                stats.status = Some(status);
                store.update_stats(conversation_id, &stats);
                store.update_message(
                    conversation_id,
                    assistant_id,
                    MessageUpdate::status(MessageStatus::Done),
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Some(ChatRelayError::Upstream { status, .. }) =
                    e.downcast_ref::<ChatRelayError>()
                {
                    stats.status = Some(*status);
                }
                store.update_stats(conversation_id, &stats);
                store.update_message(
                    conversation_id,
                    assistant_id,
                    MessageUpdate::status(MessageStatus::Error),
                );
                Err(e)
            }
        }
    }

    /// The network half of [`ChatClient::execute`]
    async fn run_stream(
        &self,
        store: &mut ConversationStore,
        conversation_id: &str,
        assistant_id: &str,
        payload: Value,
        token: &CancellationToken,
    ) -> Result<(u16, StreamOutcome)> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                ChatRelayError::UpstreamUnreachable(format!("gateway unreachable: {}", e))
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = error_message(response.text().await.unwrap_or_default());
            return Err(ChatRelayError::Upstream { status, message }.into());
        }

        // A terminal error event relayed mid-stream is not content; it
        // ends the attempt as a failure without touching the message
        // body.
        let mut stream_error: Option<String> = None;
        let outcome = reconcile(response.bytes_stream(), token, |delta| {
            if stream_error.is_some() {
                return;
            }
            if let Some(message) = error_increment(delta) {
                stream_error = Some(message);
                return;
            }
            store.append_delta(conversation_id, assistant_id, delta);
        })
        .await?;

        if let Some(message) = stream_error {
            return Err(ChatRelayError::Stream(message).into());
        }
        Ok((status, outcome))
    }
}

/// Assemble the gateway payload for one send
///
/// The conversation's full history at this point (user message already
/// appended, assistant placeholder not yet created) becomes the message
/// list; failed assistant attempts are excluded.
fn assemble_payload(store: &ConversationStore, request: &SendRequest) -> Result<Value> {
    let conversation = store
        .conversation(&request.conversation_id)
        .ok_or_else(|| {
            ChatRelayError::InvalidRequest(format!(
                "unknown conversation: {}",
                request.conversation_id
            ))
        })?;

    let messages: Vec<Value> = conversation
        .messages
        .iter()
        .filter(|m| m.status == MessageStatus::Done)
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut payload = json!({
        "provider": request.provider,
        "model": request.model,
        "messages": messages,
        "options": { "stream": true },
    });
    if let Some(prompt) = &conversation.system_prompt {
        payload["systemPrompt"] = json!(prompt);
    }
    if !request.attachments.is_empty() {
        payload["attachments"] = serde_json::to_value(&request.attachments)
            .map_err(ChatRelayError::Serialization)?;
    }
    Ok(payload)
}

/// Detect a relayed terminal error event
///
/// The gateway injects `{"error":{"message":...}}` when its upstream
/// read fails mid-stream. Ordinary delta text never parses to that
/// shape, so only a full error envelope is treated as a failure.
fn error_increment(delta: &str) -> Option<String> {
    let value: Value = serde_json::from_str(delta.trim()).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(String::from)
}

/// Pull the message out of a gateway error envelope
///
/// Falls back to the raw body when it is not the expected shape.
fn error_message(body: String) -> String {
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(String::from)
        })
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::AttachmentKind;

    fn request(conversation_id: &str) -> SendRequest {
        SendRequest {
            conversation_id: conversation_id.to_string(),
            content: "hello".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_assemble_payload_basic() {
        let mut store = ConversationStore::in_memory();
        let id = store.current_id().unwrap().to_string();
        store.add_message(Message::user(&id, "hello"));

        let payload = assemble_payload(&store, &request(&id)).unwrap();
        assert_eq!(payload["provider"], "openai");
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["options"]["stream"], json!(true));
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "hello");
        assert!(payload.get("systemPrompt").is_none());
        assert!(payload.get("attachments").is_none());
    }

    #[test]
    fn test_assemble_payload_includes_system_prompt() {
        let mut store = ConversationStore::in_memory();
        let id = store.current_id().unwrap().to_string();
        store.update_system_prompt(&id, "be terse");
        store.add_message(Message::user(&id, "hello"));

        let payload = assemble_payload(&store, &request(&id)).unwrap();
        assert_eq!(payload["systemPrompt"], "be terse");
    }

    #[test]
    fn test_assemble_payload_excludes_failed_attempts() {
        let mut store = ConversationStore::in_memory();
        let id = store.current_id().unwrap().to_string();
        store.add_message(Message::user(&id, "hello"));

        let failed = Message::assistant_streaming(&id);
        let failed_id = failed.id.clone();
        store.add_message(failed);
        store.update_message(&id, &failed_id, MessageUpdate::status(MessageStatus::Error));

        let payload = assemble_payload(&store, &request(&id)).unwrap();
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_assemble_payload_carries_attachments() {
        let mut store = ConversationStore::in_memory();
        let id = store.current_id().unwrap().to_string();
        store.add_message(Message::user(&id, "look at this"));

        let mut req = request(&id);
        req.attachments = vec![Attachment {
            kind: AttachmentKind::Image,
            url: "data:image/png;base64,AAAA".to_string(),
            mime: Some("image/png".to_string()),
            size: Some(4),
            name: Some("pixel.png".to_string()),
        }];
        let payload = assemble_payload(&store, &req).unwrap();
        let attachments = payload["attachments"].as_array().unwrap();
        assert_eq!(attachments[0]["type"], "image");
    }

    #[test]
    fn test_assemble_payload_unknown_conversation() {
        let store = ConversationStore::in_memory();
        assert!(assemble_payload(&store, &request("missing")).is_err());
    }

    #[tokio::test]
    async fn test_retry_without_prior_send_rejected() {
        let mut store = ConversationStore::in_memory();
        let mut client = ChatClient::new(reqwest::Client::new(), "http://localhost:0/api/chat");
        let err = client.retry(&mut store).await.unwrap_err();
        assert!(err.to_string().contains("nothing to retry"));
    }

    #[test]
    fn test_cancel_without_in_flight_is_noop() {
        let client = ChatClient::new(reqwest::Client::new(), "http://localhost:0/api/chat");
        client.cancel();
        client.cancel();
    }

    #[test]
    fn test_cancel_handle_shares_the_live_token() {
        let client = ChatClient::new(reqwest::Client::new(), "http://localhost:0/api/chat");
        let handle = client.cancel_handle();
        handle.cancel();
        assert!(lock_token(&client.cancel).is_cancelled());

        // Idempotent from either side.
        handle.clone().cancel();
        client.cancel();
    }

    #[test]
    fn test_error_increment_detects_envelope() {
        let delta = r#"{"error":{"message":"upstream read failed: connection reset"}}"#;
        assert_eq!(
            error_increment(delta).as_deref(),
            Some("upstream read failed: connection reset")
        );
    }

    #[test]
    fn test_error_increment_ignores_ordinary_text() {
        assert!(error_increment("The answer is 42.").is_none());
        assert!(error_increment(r#"{"choices":[{"delta":"hi"}]}"#).is_none());
        assert!(error_increment(r#"{"error":"flat string"}"#).is_none());
    }

    #[test]
    fn test_error_message_unwraps_envelope() {
        let body = r#"{"error":{"message":"bad model"}}"#.to_string();
        assert_eq!(error_message(body), "bad model");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("plain text".to_string()), "plain text");
    }
}
