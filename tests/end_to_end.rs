//! Whole-pipeline test: client -> gateway -> upstream
//!
//! The gateway runs on a real socket; the client authenticates with
//! Basic credentials and streams the relayed reply into its store.

use base64::Engine;
use chatrelay::auth::AuthState;
use chatrelay::config::AuthConfig;
use chatrelay::gateway::{self, AppState};
use chatrelay::providers::{ProviderRegistry, ResolvedProvider};
use chatrelay::store::model::{MessageStatus, Role};
use chatrelay::{ChatClient, ConversationStore, SendRequest, StreamOutcome};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_gateway(upstream_url: &str) -> String {
    let provider = ResolvedProvider {
        key: "mock".to_string(),
        base_url: upstream_url.to_string(),
        path: "/v1/chat/completions".to_string(),
        secret: Some("sk-upstream".to_string()),
        models: Vec::new(),
        vision: true,
        video: false,
    };
    let mut auth = AuthConfig::default();
    auth.session_secret = Some("e2e-secret".to_string());
    auth.credentials = Some("alice:secret".to_string());

    let state = AppState {
        registry: Arc::new(ProviderRegistry::from_resolved(vec![provider])),
        http: reqwest::Client::new(),
        first_byte_timeout: Duration::from_secs(5),
        upload_max_bytes: 5_242_880,
    };
    let router = gateway::router(state, Arc::new(AuthState::from_config(&auth).unwrap()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("gateway serve failed: {e}");
        }
    });
    format!("http://{addr}")
}

fn authed_client() -> reqwest::Client {
    let credentials = base64::engine::general_purpose::STANDARD.encode("alice:secret");
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        format!("Basic {credentials}").parse().expect("header"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .expect("client")
}

#[tokio::test]
async fn test_full_pipeline_streams_into_store() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: The answer\n\ndata:  is 42.\n\ndata: [DONE]\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&upstream)
        .await;

    let gateway_url = spawn_gateway(&upstream.uri()).await;
    let mut client = ChatClient::new(authed_client(), format!("{gateway_url}/api/chat"));
    let mut store = ConversationStore::in_memory();
    let id = store.current_id().unwrap().to_string();

    let outcome = client
        .send(
            &mut store,
            SendRequest {
                conversation_id: id.clone(),
                content: "what is the answer?".to_string(),
                provider: "mock".to_string(),
                model: "gpt-4o".to_string(),
                attachments: Vec::new(),
            },
        )
        .await
        .expect("send");

    assert_eq!(outcome, StreamOutcome::Completed);
    let conversation = store.conversation(&id).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[1].role, Role::Assistant);
    assert_eq!(conversation.messages[1].content, "The answer is 42.");
    assert_eq!(conversation.messages[1].status, MessageStatus::Done);
    assert_eq!(conversation.stats.as_ref().unwrap().status, Some(200));
}

#[tokio::test]
async fn test_full_pipeline_surfaces_masked_upstream_auth_failure() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("secret detail"))
        .mount(&upstream)
        .await;

    let gateway_url = spawn_gateway(&upstream.uri()).await;
    let mut client = ChatClient::new(authed_client(), format!("{gateway_url}/api/chat"));
    let mut store = ConversationStore::in_memory();
    let id = store.current_id().unwrap().to_string();

    let err = client
        .send(
            &mut store,
            SendRequest {
                conversation_id: id.clone(),
                content: "hello".to_string(),
                provider: "mock".to_string(),
                model: "gpt-4o".to_string(),
                attachments: Vec::new(),
            },
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("upstream authentication failed"));
    assert!(!err.to_string().contains("secret detail"));
    let conversation = store.conversation(&id).unwrap();
    assert_eq!(conversation.messages[1].status, MessageStatus::Error);
    assert_eq!(conversation.stats.as_ref().unwrap().status, Some(403));
}
