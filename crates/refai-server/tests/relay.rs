use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use refai_core::{ChatMessage, ChatRequest, ChatSession, GatewayClient, MessageUpdate, RelayClient, RelayError, RELAY_PATH};
use refai_server::{router, RelayState};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const TRAVELING: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Trav\"}}]}\n\
                         \n\
                         data: {\"choices\":[{\"delta\":{\"content\":\"eling\"}}]}\n\
                         \n\
                         data: [DONE]\n\
                         \n";

/// Stands in for the chat-completions gateway
struct FakeGateway {
    status: StatusCode,
    body: String,
    seen: Mutex<Option<Value>>,
}

async fn completions(State(gateway): State<Arc<FakeGateway>>, Json(request): Json<Value>) -> Response {
    *gateway.seen.lock().unwrap() = Some(request);
    let mut response = (gateway.status, gateway.body.clone()).into_response();
    if gateway.status.is_success() {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    }
    response
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Start a fake gateway and a relay pointing at it. Returns the relay URL.
async fn start(status: StatusCode, body: &str, api_key: Option<&str>) -> (String, Arc<FakeGateway>) {
    let fake = Arc::new(FakeGateway {
        status,
        body: body.to_string(),
        seen: Mutex::new(None),
    });
    let upstream = serve(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(fake.clone()),
    )
    .await;

    let gateway = GatewayClient::new(api_key).with_url(&format!("{}/v1/chat/completions", upstream));
    let relay = serve(router(RelayState { gateway })).await;
    (relay, fake)
}

fn question(text: &str) -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user(text)],
    }
}

async fn post_relay(relay: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{}", relay, RELAY_PATH))
        .json(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_stream_passes_through_unchanged() {
    let (relay, _) = start(StatusCode::OK, TRAVELING, Some("test-key")).await;

    let response = post_relay(&relay, &json!({"messages": [{"role": "user", "content": "What is traveling?"}]})).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), TRAVELING);
}

#[tokio::test]
async fn test_system_prompt_prepended() {
    let (relay, fake) = start(StatusCode::OK, TRAVELING, Some("test-key")).await;
    post_relay(&relay, &serde_json::to_value(question("What is traveling?")).unwrap()).await;

    let seen = fake.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen["stream"], true);
    assert_eq!(seen["model"], "google/gemini-2.5-flash");

    let messages = seen["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[0]["content"].as_str().unwrap().contains("Article 25"));
    assert_eq!(messages[1], json!({"role": "user", "content": "What is traveling?"}));
}

#[tokio::test]
async fn test_upstream_status_mapping() {
    let cases = [
        (StatusCode::TOO_MANY_REQUESTS, 429, "Rate limit exceeded. Please try again in a moment."),
        (StatusCode::PAYMENT_REQUIRED, 402, "AI credits exhausted. Please contact support."),
        (StatusCode::SERVICE_UNAVAILABLE, 500, "AI service error"),
    ];

    for (upstream, expected, message) in cases {
        let (relay, _) = start(upstream, "upstream said no", Some("test-key")).await;
        let response = post_relay(&relay, &serde_json::to_value(question("Q")).unwrap()).await;
        assert_eq!(response.status(), expected);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], message);
    }
}

#[tokio::test]
async fn test_missing_credential_is_500() {
    let (relay, fake) = start(StatusCode::OK, TRAVELING, None).await;
    let response = post_relay(&relay, &serde_json::to_value(question("Q")).unwrap()).await;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "AI_GATEWAY_API_KEY is not configured");
    // Nothing was forwarded
    assert!(fake.seen.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_bad_body_is_500() {
    let (relay, _) = start(StatusCode::OK, TRAVELING, Some("test-key")).await;
    let response = post_relay(&relay, &json!({"messages": "not a list"})).await;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_preflight_and_health() {
    let (relay, _) = start(StatusCode::OK, TRAVELING, Some("test-key")).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("{}{}", relay, RELAY_PATH))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "authorization, x-client-info, apikey, content-type"
    );

    let health = client.get(format!("{}/health", relay)).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_full_turn_through_relay() {
    let (relay, _) = start(StatusCode::OK, TRAVELING, Some("test-key")).await;
    let client = RelayClient::new(&relay, "pk_test");

    let mut session = ChatSession::new();
    let request = session.submit("What is traveling?", Vec::new()).unwrap();

    let mut updates = Vec::new();
    let content = client.stream_turn(&request, |u| updates.push(u)).await.unwrap();
    for update in updates.iter().cloned() {
        session.apply(update);
    }
    session.finish_turn();

    assert_eq!(content, "Traveling");
    assert_eq!(
        updates,
        vec![
            MessageUpdate::Started("Trav".to_string()),
            MessageUpdate::Replaced("Traveling".to_string()),
        ]
    );
    assert_eq!(session.messages().len(), 3);
    assert_eq!(session.messages()[2].content, "Traveling");
    assert!(!session.is_loading());
}

#[tokio::test]
async fn test_rate_limited_turn_rolls_back() {
    let (relay, _) = start(StatusCode::TOO_MANY_REQUESTS, "slow down", Some("test-key")).await;
    let client = RelayClient::new(&relay, "pk_test");

    let mut session = ChatSession::new();
    let request = session.submit("What is traveling?", Vec::new()).unwrap();
    let err = client.stream_turn(&request, |_| {}).await.unwrap_err();
    assert!(matches!(err, RelayError::RateLimited));

    session.fail_turn(&err);
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.notifications()[0].title, "Rate Limit Exceeded");
    assert!(!session.is_loading());
}
