use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;
use crate::api::vapi_client::VapiClient;
use crate::AppState;

fn db_error(e: diesel::result::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Database error: {}", e)})),
    )
}

pub async fn get_agent_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let config = state.agent_config.get().map_err(db_error)?;
    Ok(Json(json!({
        "name": config.name,
        "description": config.description,
        "tool_settings": config.tool_settings,
        "updated_at": config.updated_at
    })))
}

#[derive(Deserialize)]
pub struct UpdateConfigRequest {
    name: Option<String>,
    description: Option<String>,
    tool_settings: Option<Map<String, Value>>,
}

pub async fn update_agent_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if request.name.is_none() && request.description.is_none() && request.tool_settings.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No fields to update"})),
        ));
    }

    let config = state
        .agent_config
        .update(
            request.name.as_deref(),
            request.description.as_deref(),
            request.tool_settings.as_ref(),
        )
        .map_err(db_error)?;
    info!("Agent configuration updated (name: '{}')", config.name);

    Ok(Json(json!({
        "success": true,
        "name": config.name,
        "description": config.description,
        "tool_settings": config.tool_settings
    })))
}

fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() > 100 {
        let cut: String = summary.chars().take(100).collect();
        format!("{}...", cut)
    } else {
        summary.to_string()
    }
}

/// Merged view of every tool an assistant could carry: the base tools plus
/// each dataset and expert tool, with its enablement flag resolved.
pub async fn get_available_tools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let config = state.agent_config.get().map_err(db_error)?;
    let client = VapiClient::from_env();

    let mut tools: Vec<Value> = Vec::new();
    for tool_id in client.base_tool_ids() {
        let label = if tool_id == client.query_tool_id() {
            ("Knowledge Query", "Answers questions from the uploaded knowledge documents")
        } else {
            ("End Call", "Lets the assistant hang up when the conversation is over")
        };
        tools.push(json!({
            "id": tool_id,
            "name": label.0,
            "description": label.1,
            "category": "base",
            "enabled": config.is_tool_enabled(&tool_id)
        }));
    }

    for dataset in state.datasets.all().map_err(db_error)? {
        for tool_id in &dataset.tool_ids {
            tools.push(json!({
                "id": tool_id,
                "name": dataset.name,
                "description": truncate_summary(&dataset.summary),
                "category": "dataset",
                "enabled": config.is_tool_enabled(tool_id)
            }));
        }
    }

    for expert in state.experts.active().map_err(db_error)? {
        tools.push(json!({
            "id": expert.vapi_tool_id,
            "name": format!("Transfer to {} expert", expert.expert_field),
            "description": format!("Hands the call to {}", expert.phone_number),
            "category": "expert",
            "enabled": config.is_tool_enabled(&expert.vapi_tool_id)
        }));
    }

    Ok(Json(json!({"tools": tools})))
}

#[derive(Deserialize)]
pub struct UpdateToolStatusRequest {
    tool_id: String,
    enabled: bool,
}

pub async fn update_tool_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateToolStatusRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if request.tool_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "tool_id is required"})),
        ));
    }

    state
        .agent_config
        .set_tool_enabled(&request.tool_id, request.enabled)
        .map_err(db_error)?;
    info!(
        "Tool {} {}",
        request.tool_id,
        if request.enabled { "enabled" } else { "disabled" }
    );

    Ok(Json(json!({
        "success": true,
        "tool_id": request.tool_id,
        "enabled": request.enabled
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_summaries_are_truncated() {
        let long = "x".repeat(150);
        let out = truncate_summary(&long);
        assert_eq!(out.chars().count(), 103);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn short_summaries_pass_through() {
        assert_eq!(truncate_summary("crop yields"), "crop yields");
    }
}
