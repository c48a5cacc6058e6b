//! End-to-end tests for the interaction endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use ed25519_dalek::{Signer, SigningKey};
use loyalteez_discord::{create_router, serve, AppState, Config, MemoryStore};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMESTAMP: &str = "1700000000";

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[9u8; 32])
}

fn test_config(ledger: &MockServer, discord: &MockServer) -> Config {
    let mut config = Config::default();
    config.discord.public_key = hex::encode(signing_key().verifying_key().to_bytes());
    config.discord.application_id = "app1".to_string();
    config.discord.api_base = discord.uri();
    config.loyalteez.brand_id = "0xbrand".to_string();
    config.loyalteez.api_base = ledger.uri();
    config
}

fn gateway(config: &Config) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::new(config, Arc::new(MemoryStore::new())).unwrap());
    let router = create_router(state.clone());
    (state, router)
}

fn sign(raw: &str, key: &SigningKey) -> String {
    let mut message = TIMESTAMP.as_bytes().to_vec();
    message.extend_from_slice(raw.as_bytes());
    hex::encode(key.sign(&message).to_bytes())
}

fn signed(body: &Value, key: &SigningKey) -> Request<Body> {
    let raw = body.to_string();
    let signature = sign(&raw, key);

    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .header("x-signature-ed25519", signature)
        .header("x-signature-timestamp", TIMESTAMP)
        .body(Body::from(raw))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes)
}

fn command(name: &str, user_id: &str, guild_id: &str) -> Value {
    json!({
        "id": "i1",
        "type": 2,
        "token": "tok",
        "guild_id": guild_id,
        "member": { "user": { "id": user_id, "username": "ana" }, "permissions": "0" },
        "data": { "name": name }
    })
}

fn click(custom_id: &str) -> Value {
    json!({
        "id": "i2",
        "type": 3,
        "token": "tok",
        "guild_id": "g1",
        "member": { "user": { "id": "42", "username": "ana" }, "permissions": "0" },
        "data": { "custom_id": custom_id, "component_type": 2 }
    })
}

async fn ledger_never_called() -> MockServer {
    let ledger = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&ledger)
        .await;
    ledger
}

#[tokio::test]
async fn handshake_returns_bare_pong() {
    let ledger = ledger_never_called().await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    let (status, body) = send(&router, signed(&json!({ "id": "p", "type": 1 }), &signing_key())).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({ "type": 1 }));
}

#[tokio::test]
async fn bad_signature_is_unauthorized_without_side_effects() {
    let ledger = ledger_never_called().await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    let impostor = SigningKey::from_bytes(&[1u8; 32]);
    let (status, _) = send(&router, signed(&command("join", "42", "g1"), &impostor)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(command("join", "42", "g1").to_string()))
        .unwrap();
    let (status, _) = send(&router, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn join_end_to_end() {
    let ledger = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/manual-event"))
        .and(body_partial_json(json!({
            "brandId": "0xbrand",
            "eventType": "discord_join",
            "userEmail": "discord_42@loyalteez.app",
            "domain": "discord"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rewardAmount": 10 })))
        .expect(1)
        .mount(&ledger)
        .await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    let (status, body) = send(&router, signed(&command("join", "42", "g1"), &signing_key())).await;

    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["type"], 4);
    assert!(value["data"]["content"].as_str().unwrap().contains("10 LTZ"));
}

#[tokio::test]
async fn user_identity_is_stable_across_guilds_and_commands() {
    let ledger = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rewardAmount": 1 })))
        .expect(2)
        .mount(&ledger)
        .await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    send(&router, signed(&command("join", "42", "g1"), &signing_key())).await;
    send(&router, signed(&command("daily", "42", "g2"), &signing_key())).await;

    let requests = ledger.received_requests().await.unwrap();
    let identities: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["userEmail"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(identities.len(), 2);
    assert_eq!(identities[0], identities[1]);
}

#[tokio::test]
async fn protocol_failures_are_bad_requests() {
    let ledger = ledger_never_called().await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    let (status, _) = send(&router, signed(&json!({ "id": "m", "type": 5 }), &signing_key())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, signed(&json!("not an interaction"), &signing_key())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A command with no invoking user
    let anonymous = json!({ "id": "a", "type": 2, "data": { "name": "join" } });
    let (status, _) = send(&router, signed(&anonymous, &signing_key())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_post_gets_liveness_string() {
    let ledger = ledger_never_called().await;
    let discord = MockServer::start().await;
    let (_, router) = gateway(&test_config(&ledger, &discord));

    for (verb, uri) in [("GET", "/"), ("PUT", "/"), ("GET", "/favicon.ico"), ("DELETE", "/a/b")] {
        let request = Request::builder()
            .method(verb)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK, "{} {}", verb, uri);
        assert_eq!(&body[..], b"Loyalteez Discord Bot is running");
    }

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&router, health).await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["healthy"], true);
}

#[tokio::test]
async fn drop_click_defers_then_claims_then_edits() {
    let ledger = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/manual-event"))
        .and(body_partial_json(json!({
            "eventType": "promo1",
            "userEmail": "discord_42@loyalteez.app",
            "metadata": { "source": "drop_button", "server_id": "g1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rewardAmount": 4 })))
        .expect(1)
        .mount(&ledger)
        .await;

    let discord = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/webhooks/app1/tok/messages/@original"))
        .and(body_partial_json(json!({
            "content": "✅ Reward claimed! You earned **4 LTZ** for `promo1`."
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&discord)
        .await;

    let (state, router) = gateway(&test_config(&ledger, &discord));

    let response = router
        .clone()
        .oneshot(signed(&click("claim:promo1"), &signing_key()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The ledger is untouched until the acknowledgement goes out
    assert!(ledger.received_requests().await.unwrap().is_empty());

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, json!({ "type": 5, "data": { "flags": 64 } }));

    state.tasks.close();
    state.tasks.wait().await;

    assert_eq!(ledger.received_requests().await.unwrap().len(), 1);
    assert_eq!(discord.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn shutdown_drains_pending_completions() {
    let ledger = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/manual-event"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "rewardAmount": 4 }))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&ledger)
        .await;

    let discord = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/webhooks/app1/tok/messages/@original"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&discord)
        .await;

    let (state, _) = gateway(&test_config(&ledger, &discord));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state.clone(), async move {
        let _ = stop_rx.await;
    }));

    let raw = click("claim:promo1").to_string();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/", addr))
        .header("content-type", "application/json")
        .header("x-signature-ed25519", sign(&raw, &signing_key()))
        .header("x-signature-timestamp", TIMESTAMP)
        .body(raw)
        .send()
        .await
        .unwrap();
    let value: Value = response.json().await.unwrap();
    assert_eq!(value["type"], 5);
    drop(client);

    // The ledger is still answering when shutdown starts
    assert!(!state.tasks.is_empty());
    stop_tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(state.tasks.is_empty());
    assert_eq!(discord.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_component_is_ephemeral_notice() {
    let ledger = ledger_never_called().await;
    let discord = MockServer::start().await;
    let (state, router) = gateway(&test_config(&ledger, &discord));

    for custom_id in ["vote:1", "claim", "claim:"] {
        let (status, body) = send(&router, signed(&click(custom_id), &signing_key())).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["type"], 4);
        assert_eq!(value["data"]["content"], "Unknown interaction");
        assert_eq!(value["data"]["flags"], 64);
    }
    assert!(state.tasks.is_empty());
}

#[tokio::test]
async fn missing_brand_or_key_fails_closed() {
    let ledger = MockServer::start().await;
    let discord = MockServer::start().await;

    let mut no_brand = test_config(&ledger, &discord);
    no_brand.loyalteez.brand_id = String::new();
    assert!(AppState::from_config(&no_brand).is_err());

    let mut no_key = test_config(&ledger, &discord);
    no_key.discord.public_key = String::new();
    assert!(AppState::from_config(&no_key).is_err());

    assert!(AppState::from_config(&test_config(&ledger, &discord)).is_ok());
}
