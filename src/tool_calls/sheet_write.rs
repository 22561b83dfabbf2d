use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use crate::api::{sheets, vapi_dtos::ToolCallPayload};
use crate::tool_calls::router;
use crate::AppState;

/// Server route for the data-entry tools registered on sheet-backed datasets.
/// Appends to the remote sheet first, then mirrors the record into the local
/// snapshot so the search tool sees it on the next call.
pub async fn execute_sheet_write(
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
    info!(
        "Sheet write {} | function: {} | toolId: {:?}",
        call.id, call.function.name, call.tool_id
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
        Some("googlesheets"),
    ) {
        Some(dataset) => dataset,
        None => {
            warn!("No dataset found for function: {}", call.function.name);
            return Ok(Json(router::tool_result_response(
                &call.id,
                json!("Error: DB not found."),
            )));
        }
    };

    let spreadsheet_id = match dataset.connection.get("spreadsheet_id").and_then(Value::as_str) {
        Some(id) => id,
        None => {
            error!("Dataset '{}' has no spreadsheet_id", dataset.name);
            return Ok(Json(router::tool_result_response(
                &call.id,
                json!("Error: Spreadsheet ID not found."),
            )));
        }
    };

    // One cell per stored column, missing arguments become empty strings.
    let args = call.arguments();
    let mut record = serde_json::Map::new();
    let mut row_values = Vec::with_capacity(dataset.columns.len());
    for col in &dataset.columns {
        let value = args
            .get(col)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        record.insert(col.clone(), json!(value));
        row_values.push(value);
    }

    if let Err(e) = sheets::append_row(spreadsheet_id, &row_values).await {
        error!("Sheet sync failed for '{}': {}", dataset.name, e);
        return Ok(Json(router::tool_result_response(
            &call.id,
            json!(format!("Sync Error: {}", e)),
        )));
    }

    if let Err(e) = state.datasets.append_row(dataset.id, &Value::Object(record)) {
        // The sheet write went through; the snapshot catches up on reconnect.
        error!("Snapshot append failed for '{}': {}", dataset.name, e);
    }

    info!("Appended row to sheet and snapshot for '{}'", dataset.name);
    Ok(Json(router::tool_result_response(
        &call.id,
        json!("I have successfully recorded your entry and updated the system."),
    )))
}
