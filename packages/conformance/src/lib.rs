//! Shared helpers for the partnerlink conformance test suite.
//!
//! Provides [`spawn_partner`], which binds a `TcpListener` on an ephemeral
//! port and serves an in-process mock of a partner service. The mock
//! verifies the signature of every request exactly as the real counter-party
//! does: it decodes the parameters, drops `sign`, re-signs the rest with the
//! secret registered for the `app_key` and compares.
//!
//! # Routes
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `GET /router/rest` | Parameters in the query string |
//! | `POST /router/rest` | Parameters in a form body |
//! | `GET /slow/{ms}` | Like `GET /router/rest`, after sleeping `ms` milliseconds |
//! | `GET /garbage` | Answers `200` with a non-JSON body |
//!
//! Verified requests are answered with a success envelope echoing the
//! method, the parsed `content` and the token. The logical method `fail`
//! yields a failure envelope with code `500`; a bad signature yields code
//! `401`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::routing::get;
use axum::{Form, Json, Router};
use partnerlink::signing::{APP_KEY, CONTENT, METHOD, SIGN, TOKEN};
use partnerlink::CanonicalParams;
use partnerlink_client::ServiceConfig;
use serde_json::{json, Value};

/// App key the mock knows by default.
pub const APP_KEY_VALUE: &str = "conformance-app";

/// Secret registered for [`APP_KEY_VALUE`].
pub const APP_SECRET: &str = "f4dea3417a2f52ae29a635be00537395";

pub const REST_PATH: &str = "/router/rest";

/// One request as the mock received it.
#[derive(Debug, Clone)]
pub struct ReceivedCall {
    pub http_method: String,
    pub content_type: Option<String>,
    /// Decoded parameters, `sign` included.
    pub params: HashMap<String, String>,
    pub signature_ok: bool,
}

/// State shared between the mock and the test that spawned it.
#[derive(Debug)]
pub struct PartnerState {
    secrets: HashMap<String, String>,
    received: Mutex<Vec<ReceivedCall>>,
}

impl PartnerState {
    fn new() -> Self {
        let mut secrets = HashMap::new();
        secrets.insert(APP_KEY_VALUE.to_string(), APP_SECRET.to_string());
        Self {
            secrets,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, oldest first.
    pub fn received(&self) -> Vec<ReceivedCall> {
        self.received.lock().expect("received lock").clone()
    }

    fn verify(&self, params: &HashMap<String, String>) -> bool {
        let (Some(app_key), Some(sign)) = (params.get(APP_KEY), params.get(SIGN)) else {
            return false;
        };
        let Some(secret) = self.secrets.get(app_key) else {
            return false;
        };
        let unsigned: CanonicalParams = params
            .iter()
            .filter(|(k, _)| k.as_str() != SIGN)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        unsigned.sign(secret) == *sign
    }
}

/// Start an ephemeral mock partner service and return `(base_url, state)`.
///
/// The service runs in a background `tokio` task bound to an OS-assigned
/// port on `127.0.0.1`. The base URL has no trailing slash, e.g.
/// `http://127.0.0.1:51234`.
///
/// # Panics
///
/// Panics if the TCP listener cannot be bound.
pub async fn spawn_partner() -> (String, Arc<PartnerState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{addr}");

    let state = Arc::new(PartnerState::new());
    let router = Router::new()
        .route(REST_PATH, get(rest_query).post(rest_form))
        .route("/slow/{ms}", get(slow_query))
        .route("/garbage", get(|| async { "<html>bad gateway</html>" }))
        .with_state(Arc::clone(&state));

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance partner error");
    });

    (base_url, state)
}

/// A service config pointing at the mock with the registered credentials.
pub fn service_config(name: &str, base_url: &str) -> ServiceConfig {
    ServiceConfig::new(name, APP_KEY_VALUE, APP_SECRET, base_url)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn rest_query(
    State(state): State<Arc<PartnerState>>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    Json(answer(&state, &method, &headers, params))
}

async fn rest_form(
    State(state): State<Arc<PartnerState>>,
    method: Method,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Json<Value> {
    Json(answer(&state, &method, &headers, params))
}

async fn slow_query(
    State(state): State<Arc<PartnerState>>,
    Path(ms): Path<u64>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(answer(&state, &method, &headers, params))
}

fn answer(
    state: &PartnerState,
    method: &Method,
    headers: &HeaderMap,
    params: HashMap<String, String>,
) -> Value {
    let signature_ok = state.verify(&params);
    let logical = params.get(METHOD).cloned().unwrap_or_default();
    let content = params
        .get(CONTENT)
        .map(|c| serde_json::from_str::<Value>(c).unwrap_or_else(|_| Value::String(c.clone())))
        .unwrap_or(Value::Null);
    let token = params.get(TOKEN).cloned();

    state
        .received
        .lock()
        .expect("received lock")
        .push(ReceivedCall {
            http_method: method.to_string(),
            content_type: headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            params,
            signature_ok,
        });

    if !signature_ok {
        return envelope("401", "invalid signature", Value::Null);
    }
    if logical == "fail" {
        return envelope("500", "requested failure", Value::Null);
    }
    envelope(
        "200",
        "success",
        json!({
            "method": logical,
            "http_method": method.to_string(),
            "content": content,
            "token": token,
        }),
    )
}

fn envelope(code: &str, msg: &str, response: Value) -> Value {
    json!({
        "result_response": { "code": code, "msg": msg },
        "response": response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        let state = PartnerState::new();
        let set: CanonicalParams = [(APP_KEY, APP_KEY_VALUE), (METHOD, "detail"), ("version", "1.0")]
            .into_iter()
            .collect();
        let mut params: HashMap<String, String> = set
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.insert(SIGN.to_string(), set.sign(APP_SECRET));
        assert!(state.verify(&params));

        params.insert(METHOD.to_string(), "other".to_string());
        assert!(!state.verify(&params));
    }

    #[test]
    fn unknown_app_key_fails_verification() {
        let state = PartnerState::new();
        let mut params = HashMap::new();
        params.insert(APP_KEY.to_string(), "stranger".to_string());
        params.insert(SIGN.to_string(), "0".repeat(32));
        assert!(!state.verify(&params));
    }
}
