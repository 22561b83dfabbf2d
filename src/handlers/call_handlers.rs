use axum::{
    extract::{Query, State},
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
pub struct StartOutboundRequest {
    phone_number: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct StartInboundRequest {
    #[serde(default)]
    file_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct StopCallingRequest {
    session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    status: Option<String>,
}

/// Gather every tool id the assistant should carry for the next call:
/// base tools, dataset tools and active expert transfers, each filtered
/// through the tool_settings enablement map.
fn collect_enabled_tools(
    state: &AppState,
    client: &VapiClient,
) -> Result<(Vec<String>, Vec<String>), (StatusCode, Json<Value>)> {
    let db_error = |e: diesel::result::Error| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Database error: {}", e)})),
        )
    };

    let config = state.agent_config.get().map_err(db_error)?;

    let enabled_base: Vec<String> = client
        .base_tool_ids()
        .into_iter()
        .filter(|id| config.is_tool_enabled(id))
        .collect();

    let mut dynamic: Vec<String> = Vec::new();
    for dataset in state.datasets.all().map_err(db_error)? {
        for tool_id in dataset.tool_ids {
            if config.is_tool_enabled(&tool_id) {
                dynamic.push(tool_id);
            }
        }
    }
    for expert in state.experts.active().map_err(db_error)? {
        if config.is_tool_enabled(&expert.vapi_tool_id) {
            dynamic.push(expert.vapi_tool_id);
        }
    }

    Ok((enabled_base, dynamic))
}

pub async fn start_outbound_calling(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartOutboundRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let phone_number = match request.phone_number.as_deref() {
        Some(number) if !number.is_empty() => number.to_string(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": "phone_number is required"})),
            ))
        }
    };

    let client = VapiClient::from_env();
    let (base_tools, dynamic_tools) = collect_enabled_tools(&state, &client)?;
    let config = state.agent_config.get().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Database error: {}", e)})),
        )
    })?;
    info!(
        "Starting outbound call as '{}' with {} base and {} dynamic tool(s)",
        config.name,
        base_tools.len(),
        dynamic_tools.len()
    );

    let call = client
        .start_outbound_call(
            &phone_number,
            &config.name,
            &config.description,
            &base_tools,
            &dynamic_tools,
        )
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        })?;

    let call_id = call["id"].as_str().unwrap_or_default().to_string();
    state.calling_sessions.start(&call_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Call started but session tracking failed: {}", e)})),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "session_id": call_id,
        "call_id": call_id
    })))
}

pub async fn start_inbound_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartInboundRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let client = VapiClient::from_env();
    let (base_tools, dynamic_tools) = collect_enabled_tools(&state, &client)?;
    let config = state.agent_config.get().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Database error: {}", e)})),
        )
    })?;
    info!(
        "Starting inbound agent as '{}' with {} file(s)",
        config.name,
        request.file_ids.len()
    );

    let assistant_id = client
        .start_inbound_agent(
            &config.name,
            &config.description,
            &base_tools,
            &dynamic_tools,
            &request.file_ids,
        )
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        })?;

    state.calling_sessions.start(&assistant_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Agent started but session tracking failed: {}", e)})),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "session_id": assistant_id,
        "assistant_id": assistant_id,
        "message": "Inbound agent activated successfully"
    })))
}

pub async fn stop_calling(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StopCallingRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(session_id) = request.session_id.as_deref() {
        state.calling_sessions.stop(session_id).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        })?;
        info!("Stopped calling session {}", session_id);
    }
    Ok(Json(json!({
        "success": true,
        "message": "Calling agent stopped successfully"
    })))
}

pub async fn get_session_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let active = state.calling_sessions.find_active().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    match active {
        Some(session) => Ok(Json(json!({
            "is_active": true,
            "session_id": session.session_id,
            "started_at": session.started_at
        }))),
        None => Ok(Json(json!({
            "is_active": false,
            "message": "No active calling session"
        }))),
    }
}

pub async fn get_call_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let records = state
        .call_history
        .list(query.status.as_deref())
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to retrieve call history", "detail": e.to_string()})),
            )
        })?;
    info!("Fetched {} call history record(s)", records.len());
    Ok(Json(json!(records)))
}
