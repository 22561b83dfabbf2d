use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use crate::api::vapi_dtos::{parse_rfc3339_epoch, WebhookPayload};
use crate::models::records::NewCallRecord;
use crate::repositories::call_history::epoch_now;
use crate::AppState;

/// Shared-secret check for everything vapi calls into: the webhook and the
/// tool server routes. The secret is set on the `server` block of every
/// registered tool/assistant and echoed back in the x-vapi-secret header.
pub async fn validate_vapi_secret(
    headers: HeaderMap,
    request: Request<Body>,
    next: middleware::Next,
) -> Result<Response, StatusCode> {
    let secret_key = match std::env::var("VAPI_SERVER_URL_SECRET") {
        Ok(key) => key,
        Err(e) => {
            error!("Failed to get VAPI_SERVER_URL_SECRET: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match headers.get("x-vapi-secret") {
        Some(header_value) => match header_value.to_str() {
            Ok(value) if value == secret_key => Ok(next.run(request).await),
            Ok(_) => {
                warn!("Invalid x-vapi-secret provided");
                Err(StatusCode::UNAUTHORIZED)
            }
            Err(e) => {
                warn!("Unreadable x-vapi-secret header: {}", e);
                Err(StatusCode::UNAUTHORIZED)
            }
        },
        None => {
            warn!("No x-vapi-secret header found");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// End-of-call reports become call outcome records; every other message type
/// is acknowledged and dropped. Always 200, vapi retries on anything else.
pub async fn vapi_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let event = match serde_json::from_value::<WebhookPayload>(payload) {
        Ok(event) => event,
        Err(e) => {
            error!("Unparseable webhook payload: {}", e);
            return Json(json!({"success": false, "error": "Invalid payload format"}));
        }
    };

    let message_type = event.message.message_type.clone();
    if message_type != "end-of-call-report" {
        info!("Ignoring webhook message type: {}", message_type);
        return Json(json!({"success": true, "message": format!("Received {}", message_type)}));
    }

    let call_id = match event.call_id() {
        Some(id) => id,
        None => {
            warn!("End-of-call report without a call id");
            return Json(json!({"success": false, "error": "Report missing call id"}));
        }
    };
    let message = &event.message;
    info!(
        "End of call report for {} (reason: {}, duration: {:.1}s, cost: {:.4})",
        call_id,
        message.ended_reason.as_deref().unwrap_or("unknown"),
        message.duration_seconds.unwrap_or(0.0),
        message.cost.unwrap_or(0.0),
    );

    let started_at = message
        .started_at
        .as_deref()
        .and_then(parse_rfc3339_epoch)
        .unwrap_or_else(epoch_now);
    let ended_at = message.ended_at.as_deref().and_then(parse_rfc3339_epoch);
    let recording_url = message
        .recording_url
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| message.stereo_recording_url.clone());

    let record = NewCallRecord {
        call_id: call_id.clone(),
        phone_number: event.phone_number().unwrap_or_else(|| "Unknown".to_string()),
        status: event.call_status().unwrap_or_else(|| "ended".to_string()),
        duration_secs: message.duration_seconds.unwrap_or(0.0) as i32,
        started_at,
        ended_at,
        summary: message.summary.clone(),
        recording_url,
        assistant_id: message.call.as_ref().and_then(|c| c.assistant_id.clone()),
        created_at: epoch_now(),
    };

    if let Err(e) = state.call_history.upsert_report(record) {
        error!("Could not save call record for {}: {}", call_id, e);
        return Json(json!({"success": false, "error": e.to_string()}));
    }

    // Outbound sessions are keyed by the call id; close the session when the
    // call it tracked is over. Inbound assistants stay active.
    match state.calling_sessions.stop(&call_id) {
        Ok(true) => info!("Closed session for call {}", call_id),
        Ok(false) => {}
        Err(e) => warn!("Could not close session for call {}: {}", call_id, e),
    }

    Json(json!({"success": true, "message": "Call report recorded"}))
}
