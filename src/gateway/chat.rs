//! Chat forwarding handler
//!
//! Validates the inbound request field by field (each failure is its
//! own 400), assembles the outbound payload, forwards it to the
//! resolved provider, and relays the streamed response incrementally.
//! The relay never buffers the full upstream body: each chunk is
//! written downstream as soon as it is read.

use crate::error::ChatRelayError;
use crate::gateway::{ApiError, AppState};
use crate::providers::ProviderOverride;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

/// Channel depth between the upstream reader and the downstream body
const RELAY_BUFFER: usize = 16;

/// Message roles accepted in the inbound history
const VALID_ROLES: &[&str] = &["user", "assistant", "system"];

/// Attachment kinds accepted in the inbound request
const VALID_ATTACHMENT_TYPES: &[&str] = &["image", "video"];

/// A validated chat request
#[derive(Debug)]
struct ChatRequest {
    provider: String,
    model: String,
    messages: Vec<Value>,
    attachments: Option<Vec<Value>>,
    system_prompt: Option<String>,
    stream: bool,
    overrides: ProviderOverride,
}

/// POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> std::result::Result<Response, ApiError> {
    let request = parse_request(body)?;

    let provider = state
        .registry
        .resolve(&request.provider, request.overrides.has_secret())?
        .with_override(&request.overrides);

    if !provider.allows_model(&request.model) {
        return Err(ApiError::bad_request(format!(
            "model '{}' is not allowed for provider '{}'",
            request.model, request.provider
        )));
    }

    if let Some(attachments) = &request.attachments {
        if let Some(message) = capability_error(&provider, attachments) {
            return Err(ApiError::bad_request(message));
        }
    }

    let payload = assemble_payload(&request);
    tracing::info!(
        provider = %request.provider,
        model = %request.model,
        messages = request.messages.len(),
        "Forwarding chat request"
    );

    let mut outbound = state.http.post(provider.endpoint()).json(&payload);
    for (name, value) in provider.headers() {
        outbound = outbound.header(name, value);
    }

    let response = tokio::time::timeout(state.first_byte_timeout, outbound.send())
        .await
        .map_err(|_| {
            ChatRelayError::UpstreamUnreachable(format!(
                "no response from '{}' within {:?}",
                request.provider, state.first_byte_timeout
            ))
        })?
        .map_err(|e| {
            ChatRelayError::UpstreamUnreachable(format!(
                "provider '{}': {}",
                request.provider, e
            ))
        })?;

    let status = response.status();
    if !status.is_success() {
        let message = if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            // Upstream auth bodies can embed the forwarded secret.
            "upstream authentication failed".to_string()
        } else {
            response.text().await.unwrap_or_default()
        };
        return Err(ChatRelayError::Upstream {
            status: status.as_u16(),
            message,
        }
        .into());
    }

    // reqwest and axum track different `http` major versions, so the
    // content type crosses the boundary as raw bytes.
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("text/event-stream"));

    Ok(relay_response(response, content_type)?)
}

/// Build the streamed relay response
///
/// A spawned task pulls chunks from the upstream body and pushes them
/// into a bounded channel backing the downstream body. Every exit path
/// (upstream end, upstream read error, downstream gone) drops the
/// upstream stream and releases the connection. A mid-stream read
/// error injects one synthetic terminal error event before closing.
fn relay_response(
    response: reqwest::Response,
    content_type: HeaderValue,
) -> std::result::Result<Response, ApiError> {
    let (tx, rx) = tokio::sync::mpsc::channel::<
        std::result::Result<Bytes, std::convert::Infallible>,
    >(RELAY_BUFFER);

    tokio::spawn(async move {
        let mut upstream = response.bytes_stream();
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(Ok(bytes)).await.is_err() {
                        tracing::debug!("Downstream closed, releasing upstream");
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Upstream read failed mid-stream: {}", e);
                    let event = format!(
                        "data: {}\n\n",
                        json!({ "error": { "message": format!("upstream read failed: {}", e) } })
                    );
                    let _ = tx.send(Ok(Bytes::from(event))).await;
                    break;
                }
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to build relay response: {}", e),
            )
        })
}

/// Validate the raw request body field by field
fn parse_request(body: Value) -> std::result::Result<ChatRequest, ApiError> {
    let obj = body
        .as_object()
        .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))?;

    let messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("messages must be a non-empty array"))?;
    for message in messages {
        let role = message.get("role").and_then(Value::as_str).ok_or_else(|| {
            ApiError::bad_request("every message must have a string role")
        })?;
        if !VALID_ROLES.contains(&role) {
            return Err(ApiError::bad_request(format!(
                "message role '{}' must be one of user, assistant, system",
                role
            )));
        }
        if !message.get("content").map(Value::is_string).unwrap_or(false) {
            return Err(ApiError::bad_request(
                "every message must have string content",
            ));
        }
    }

    let model = obj
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("model must be a string"))?
        .to_string();
    let provider = obj
        .get("provider")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("provider must be a string"))?
        .to_string();

    let attachments = match obj.get("attachments") {
        None | Some(Value::Null) => None,
        Some(Value::Array(entries)) => {
            for entry in entries {
                let kind = entry.get("type").and_then(Value::as_str).ok_or_else(|| {
                    ApiError::bad_request("every attachment must declare a type")
                })?;
                if !VALID_ATTACHMENT_TYPES.contains(&kind) {
                    return Err(ApiError::bad_request(format!(
                        "attachment type '{}' must be image or video",
                        kind
                    )));
                }
                if let Some(size) = entry.get("size") {
                    if !size.is_null() && !size.is_u64() {
                        return Err(ApiError::bad_request(
                            "attachment size must be a non-negative integer",
                        ));
                    }
                }
                if let Some(mime) = entry.get("mime") {
                    if !mime.is_null() && !mime.is_string() {
                        return Err(ApiError::bad_request("attachment mime must be a string"));
                    }
                }
            }
            Some(entries.clone())
        }
        Some(_) => return Err(ApiError::bad_request("attachments must be an array")),
    };

    let system_prompt = obj
        .get("systemPrompt")
        .and_then(Value::as_str)
        .map(String::from);

    let stream = obj
        .get("options")
        .and_then(|o| o.get("stream"))
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let overrides = match obj.get("providerConfig") {
        None | Some(Value::Null) => ProviderOverride::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ApiError::bad_request(format!("providerConfig is invalid: {}", e)))?,
    };

    Ok(ChatRequest {
        provider,
        model,
        messages: messages.clone(),
        attachments,
        system_prompt,
        stream,
        overrides,
    })
}

/// Check attachment kinds against the provider's declared capabilities
fn capability_error(
    provider: &crate::providers::ResolvedProvider,
    attachments: &[Value],
) -> Option<String> {
    for attachment in attachments {
        match attachment.get("type").and_then(Value::as_str) {
            Some("image") if !provider.vision => {
                return Some(format!(
                    "provider '{}' does not accept image attachments",
                    provider.key
                ));
            }
            Some("video") if !provider.video => {
                return Some(format!(
                    "provider '{}' does not accept video attachments",
                    provider.key
                ));
            }
            _ => {}
        }
    }
    None
}

/// Assemble the outbound provider payload
///
/// The out-of-band system prompt (trimmed, skipped when empty) is
/// prepended ahead of the full history, including any system-role
/// messages already present there.
fn assemble_payload(request: &ChatRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(prompt) = &request.system_prompt {
        let trimmed = prompt.trim();
        if !trimmed.is_empty() {
            messages.push(json!({ "role": "system", "content": trimmed }));
        }
    }
    messages.extend(request.messages.iter().cloned());

    let mut payload = json!({
        "model": request.model,
        "messages": messages,
        "stream": request.stream,
    });
    if let Some(attachments) = &request.attachments {
        payload["attachments"] = Value::Array(attachments.clone());
    }
    payload
}
