//! Webhook ingress endpoint — POST /webhooks/:source.
//!
//! Accepts JSON payloads from the platforms that can push events into a
//! running session out of band (Alexa/Google skill lifecycle, smart-home
//! discovery, account linking). Each source validates its own signature
//! only when a secret is configured for it (§6).

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// The named event types §6 lists as accepted; anything else is ignored
/// rather than rejected, so a platform can add event types without this
/// endpoint returning errors for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum WebhookEvent {
    SkillEnabled,
    SkillDisabled,
    AccountLinked,
    AccountUnlinked,
    SmartHomeDiscovery,
    SmartHomeControl,
    ConversationStarted,
    ConversationEnded,
    ErrorOccurred,
}

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source_cfg = state.config.webhooks.sources.iter().find(|s| s.platform == source);

    if let Some(cfg) = source_cfg {
        if let Some(secret) = &cfg.secret {
            verify_signature(&headers, &body, secret).map_err(|reason| {
                warn!(source = %source, reason = %reason, "webhook signature verification failed");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "authentication failed", "reason": reason})),
                )
            })?;
        }
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(source = %source, error = %e, "invalid JSON in webhook body");
        (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON body"})))
    })?;

    let event_type = payload.get("event_type").and_then(Value::as_str).unwrap_or("");
    match serde_json::from_value::<WebhookEvent>(Value::String(event_type.to_string())) {
        Ok(event) => {
            info!(source = %source, ?event, "webhook accepted");
            Ok(Json(json!({"status": "received"})))
        }
        Err(_) => {
            info!(source = %source, event_type, "unrecognized webhook event type ignored");
            Ok(Json(json!({"status": "ignored"})))
        }
    }
}

/// GitHub-style HMAC-SHA256: `sha256=<hex>` carried in X-Signature-256.
fn verify_signature(headers: &HeaderMap, body: &Bytes, secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get("x-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Signature-256 header".to_string())?;

    let expected = hex::decode(sig_hex).map_err(|_| "X-Signature-256 is not valid hex".to_string())?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "signature mismatch".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_type_parses_as_err() {
        let parsed = serde_json::from_value::<WebhookEvent>(Value::String("totally_unknown".into()));
        assert!(parsed.is_err());
    }

    #[test]
    fn known_event_type_round_trips() {
        let parsed = serde_json::from_value::<WebhookEvent>(Value::String("smart_home_discovery".into())).unwrap();
        assert_eq!(parsed, WebhookEvent::SmartHomeDiscovery);
    }

    #[test]
    fn valid_hmac_signature_verifies() {
        let secret = "s3cr3t";
        let body = Bytes::from_static(b"{\"event_type\":\"skill_enabled\"}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(&body);
        let sig = hex::encode(mac.finalize().into_bytes());
        let mut headers = HeaderMap::new();
        headers.insert("x-signature-256", format!("sha256={sig}").parse().unwrap());
        assert!(verify_signature(&headers, &body, secret).is_ok());
    }
}
