#![allow(dead_code)]

use pantry_admin::api::ApiClient;
use pantry_admin::config::ClientConfig;
use pantry_admin::models::Session;
use pantry_admin::session::{Clock, MemoryTokenStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";

pub fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/api/v1", server.uri()), API_KEY)
        .with_timeout(Duration::from_secs(5))
}

pub fn store_with(access_token: Option<&str>, refresh_token: Option<&str>) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_session(Session {
        access_token: access_token.map(str::to_string),
        access_token_expiry: None,
        refresh_token: refresh_token.map(str::to_string),
    }))
}

pub fn client(server: &MockServer, store: Arc<MemoryTokenStore>) -> ApiClient {
    ApiClient::new(config_for(server), store).unwrap()
}

pub fn client_with_clock(
    server: &MockServer,
    store: Arc<MemoryTokenStore>,
    clock: Arc<dyn Clock>,
) -> ApiClient {
    ApiClient::builder(config_for(server), store)
        .clock(clock)
        .build()
        .unwrap()
}

pub fn envelope(data: Value) -> Value {
    json!({"success": true, "data": data, "message": "OK"})
}

/// Mount a refresh endpoint that accepts `refresh_token` and issues `new_token`.
pub async fn mount_refresh(server: &MockServer, refresh_token: &str, new_token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh-token"))
        .and(body_json(json!({"refreshToken": refresh_token})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "accessToken": new_token,
            "expiresIn": 3600
        }))))
        .expect(times)
        .mount(server)
        .await;
}

/// Bearer header of every request the server saw for `request_path`.
pub async fn authorization_headers(server: &MockServer, request_path: &str) -> Vec<Option<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == request_path)
        .map(|request| {
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}
