#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request, Router};
use http_body_util::BodyExt;
use serde_json::Value;
use taskhub_auth::JwtManager;
use taskhub_config::{HttpConfig, RealtimeConfig};
use taskhub_gateway::{create_router, GatewayState};
use taskhub_realtime::{HubSettings, Identity, MemoryStore, RealtimeHub, Role, UserProfile};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub hub: Arc<RealtimeHub>,
    pub store: MemoryStore,
    pub jwt: JwtManager,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_realtime(RealtimeConfig {
            poll_wait_seconds: 1,
            ..RealtimeConfig::default()
        })
        .await
    }

    pub async fn with_realtime(realtime: RealtimeConfig) -> Self {
        let store = MemoryStore::new();
        store
            .add_user(UserProfile::new("admin-1", "Ada", Role::Admin))
            .await;
        store
            .add_user(UserProfile::new("user-1", "Ben", Role::User))
            .await;
        store
            .add_user(UserProfile::new("user-2", "Cleo", Role::User))
            .await;

        let jwt = JwtManager::new("gateway-test-secret-gateway-test");
        let hub = Arc::new(RealtimeHub::new(
            Arc::new(jwt.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            HubSettings::default(),
        ));
        let state = GatewayState::new(Arc::clone(&hub), &realtime);
        let router = create_router(state, &HttpConfig::default());

        Self {
            router,
            hub,
            store,
            jwt,
        }
    }

    pub fn token(&self, user: &str, role: Role) -> String {
        self.jwt
            .issue(&Identity::new(user, role))
            .expect("token should be issued")
    }

    pub async fn send(&self, request: Request<Body>) -> (u16, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status().as_u16();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (u16, Value) {
        self.send(request("GET", uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (u16, Value) {
        self.send(request("POST", uri, token, Some(body))).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (u16, Value) {
        self.send(request("DELETE", uri, token, None)).await
    }
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    }
}
