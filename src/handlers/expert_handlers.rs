use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use crate::api::vapi_client::VapiClient;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateExpertRequest {
    phone_number: String,
    expert_field: String,
}

/// Register a human expert: create the transferCall tool on vapi first, then
/// store the expert with the returned tool id. Numbers missing a leading '+'
/// get one, vapi rejects non-E.164 destinations.
pub async fn create_expert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateExpertRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let field = request.expert_field.trim();
    let number = request.phone_number.trim();
    if field.is_empty() || number.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "phone_number and expert_field are required"})),
        ));
    }

    let number = if number.starts_with('+') {
        number.to_string()
    } else {
        format!("+{}", number)
    };

    let client = VapiClient::from_env();
    let payload = client.build_transfer_call_tool_payload(&number, field);
    let tool = client.create_tool(&payload).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Failed to register transfer tool: {}", e)})),
        )
    })?;
    let tool_id = tool["id"].as_str().unwrap_or_default().to_string();
    info!("Created transfer tool {} for {} expert", tool_id, field);

    let expert = state
        .experts
        .create(&number, field, &tool_id)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Database error: {}", e)})),
            )
        })?;

    Ok(Json(json!({"success": true, "expert": expert})))
}

pub async fn get_experts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let experts = state.experts.active().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    Ok(Json(json!(experts)))
}

pub async fn delete_expert(
    State(state): State<Arc<AppState>>,
    Path(expert_id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let removed = state.experts.delete(expert_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    match removed {
        Some(expert) => {
            info!("Removed {} expert ({})", expert.expert_field, expert.phone_number);
            Ok(Json(json!({
                "success": true,
                "message": format!("Removed {} expert", expert.expert_field)
            })))
        }
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Expert not found"})),
        )),
    }
}
