use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use crate::api::{gemini, sheets, vapi_client::{sanitize_function_name, VapiClient}};
use crate::repositories::datasets::NewDataset;
use crate::utils::ingest;
use crate::AppState;

fn db_error(e: diesel::result::Error) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("Database error: {}", e)})),
    )
}

fn sample_text(rows: &[Value], limit: usize) -> String {
    rows.iter()
        .take(limit)
        .map(|row| row.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Connect an uploaded CSV/Excel file as a searchable dataset: parse the
/// rows, have gemini name and summarize it, register the search tool with
/// vapi, and store the snapshot.
pub async fn connect_database(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut source_type = String::from("csv");
    let mut can_read = false;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Invalid multipart body: {}", e)})),
        )
    })? {
        match field.name() {
            Some("source_type") => {
                source_type = field.text().await.unwrap_or_default();
            }
            Some("can_read") => {
                can_read = field.text().await.unwrap_or_default() == "true";
            }
            Some("file") => {
                let name = field.file_name().unwrap_or("dataset").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": format!("Unreadable file: {}", e)})),
                    )
                })?;
                file = Some((name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or((
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "No file provided"})),
    ))?;

    let (columns, rows) = if source_type == "csv" {
        ingest::parse_csv(&bytes)
    } else {
        ingest::parse_excel(&bytes)
    }
    .map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    info!("Loaded {} with {} row(s), {} column(s)", file_name, rows.len(), columns.len());

    let prompt = format!(
        "Analyze this dataset (Filename: {}). Columns: {:?}. Sample Data: {}",
        file_name,
        columns,
        sample_text(&rows, 3)
    );
    let analysis = gemini::analyze_dataset_or_fallback(&prompt, &file_name, &columns).await;
    info!("Tool name: {} | Summary: {}", analysis.tool_name, analysis.summary);

    let client = VapiClient::from_env();
    let mut tool_ids = Vec::new();
    if can_read {
        let payload = client.build_dataset_search_tool_payload(
            &analysis.tool_name,
            &analysis.summary,
            &columns,
            "read",
        );
        let tool = client.create_tool(&payload).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        })?;
        if let Some(id) = tool["id"].as_str() {
            info!("Created READ tool with ID: {}", id);
            tool_ids.push(id.to_string());
        }
    }

    state
        .datasets
        .create(NewDataset {
            name: analysis.tool_name.clone(),
            source_type,
            summary: analysis.summary.clone(),
            columns,
            tool_ids: tool_ids.clone(),
            rows,
            connection: json!({}),
        })
        .map_err(db_error)?;

    Ok(Json(json!({
        "success": true,
        "tool_name": analysis.tool_name,
        "summary": analysis.summary,
        "tools_created": tool_ids
    })))
}

#[derive(Deserialize)]
pub struct ConnectSheetRequest {
    sheet_url: String,
    #[serde(default = "default_sheet_name")]
    name: String,
    #[serde(default)]
    can_read: bool,
    #[serde(default)]
    can_write: bool,
}

fn default_sheet_name() -> String {
    "Google_Sheet_DB".to_string()
}

/// Link a Google Sheet: snapshot it through the CSV export, then register a
/// search tool and/or a data-entry (append) tool against it.
pub async fn connect_google_sheets(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectSheetRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let spreadsheet_id = sheets::extract_spreadsheet_id(&request.sheet_url).ok_or((
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Invalid Google Sheet URL format."})),
    ))?;

    let (columns, rows) = sheets::fetch_sheet_rows(&spreadsheet_id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    let sample = sample_text(&rows, 5);

    let client = VapiClient::from_env();
    let mut tool_ids = Vec::new();
    let mut read_desc = String::new();
    let mut write_desc = String::new();

    if request.can_read {
        let prompt = format!(
            "Identify the KNOWLEDGE BASE purpose of this sheet: {}\nColumns: {:?}\nSample: {}\n\
             Create a description explaining what information can be RETRIEVED from here.",
            request.name, columns, sample
        );
        let analysis = gemini::analyze_dataset_or_fallback(&prompt, &request.name, &columns).await;
        read_desc = analysis.summary;

        let tool_name = format!("search_{}", request.name.to_lowercase().replace(' ', "_"));
        let payload = client.build_dataset_search_tool_payload(
            &tool_name,
            &format!("SEARCH TOOL: {}", read_desc),
            &columns,
            "read",
        );
        let tool = client.create_tool(&payload).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        })?;
        if let Some(id) = tool["id"].as_str() {
            tool_ids.push(id.to_string());
        }
    }

    if request.can_write {
        let prompt = format!(
            "This is a DATA ENTRY tool for the sheet: {}\nColumns: {:?}\nSample: {}\n\
             Explain to the Voice AI exactly what it needs to ask the user to fill these \
             columns. Include instructions on being brief and capturing specific details.",
            request.name, columns, sample
        );
        let analysis = gemini::analyze_dataset_or_fallback(&prompt, &request.name, &columns).await;
        write_desc = format!("APPEND TOOL: {}", analysis.summary);

        let func_name =
            sanitize_function_name(&format!("log_{}", request.name.to_lowercase().replace(' ', "_")));
        let payload = client.build_sheet_write_tool_payload(&func_name, &write_desc, &columns);
        let tool = client.create_tool(&payload).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
        })?;
        if let Some(id) = tool["id"].as_str() {
            tool_ids.push(id.to_string());
        }
    }

    let summary = format!(
        "Read: {} | Write: {}",
        if request.can_read { read_desc.as_str() } else { "N/A" },
        if request.can_write { write_desc.as_str() } else { "N/A" },
    );
    let snapshot = if request.can_read { rows } else { Vec::new() };

    state
        .datasets
        .create(NewDataset {
            name: request.name.clone(),
            source_type: "googlesheets".to_string(),
            summary,
            columns,
            tool_ids: tool_ids.clone(),
            rows: snapshot,
            connection: json!({"spreadsheet_id": spreadsheet_id}),
        })
        .map_err(db_error)?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully linked {}", request.name),
        "tools": tool_ids
    })))
}

pub async fn get_connected_datasets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let datasets = state.datasets.all().map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to retrieve databases"})),
        )
    })?;

    let payload: Vec<Value> = datasets
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "name": d.name,
                "source_type": d.source_type,
                "data": d.rows
            })
        })
        .collect();
    info!("Fetched {} connected dataset(s)", payload.len());
    Ok(Json(json!(payload)))
}

#[derive(Deserialize)]
pub struct DeleteDatasetQuery {
    name: String,
}

pub async fn delete_dataset(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteDatasetQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let removed = state.datasets.delete_by_name(&query.name).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Failed to delete database: {}", e)})),
        )
    })?;

    if removed == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Database not found"})),
        ));
    }
    info!("Purged {} record(s) named '{}'", removed, query.name);
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Database {} deleted ({} record(s) removed). It will not be included in future calls.",
            query.name, removed
        )
    })))
}
