use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use crate::api::vapi_dtos::ToolCallPayload;
use crate::tool_calls::router;
use crate::AppState;

/// Server route for the dataset search tools. Vapi holds the caller on the
/// line while this runs; any outcome the assistant should speak goes back as
/// an HTTP 200 tool result.
pub async fn execute_db_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ToolCallPayload>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let call = match payload.first_tool_call() {
        Some(call) => call,
        None => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No tool call provided"})),
            ))
        }
    };

    let args = call.arguments();
    let search_query = args
        .get("search_query")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let cleaned = router::strip_tool_prefixes(&call.function.name);
    info!(
        "Tool call {} | function: {} | target: {}",
        call.id, call.function.name, cleaned
    );

    let datasets = state.datasets.all().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Database error: {}", e)})),
        )
    })?;

    let dataset = match router::resolve_dataset(
        &datasets,
        call.tool_id.as_deref(),
        &call.function.name,
        None,
    ) {
        Some(dataset) => dataset,
        None => {
            warn!("Dataset match failed for: {}", cleaned);
            return Ok(Json(router::tool_result_response(
                &call.id,
                json!({"error": format!("Database '{}' not found in the system.", cleaned)}),
            )));
        }
    };

    let result = router::search_rows(&dataset.rows, &search_query);
    info!(
        "Query '{}' against '{}' found {} result(s)",
        search_query,
        dataset.name,
        result["results"].as_array().map(Vec::len).unwrap_or(0)
    );
    Ok(Json(router::tool_result_response(&call.id, result)))
}
