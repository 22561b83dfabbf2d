use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use crate::api::vapi_client::VapiClient;
use crate::AppState;

/// Upload a knowledge document: push the file to vapi, store the returned
/// file id, then re-sync the knowledge query tool with the full id list.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": format!("Invalid multipart body: {}", e)})),
        )
    })? {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or("document").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"success": false, "error": format!("Unreadable file: {}", e)})),
                )
            })?;
            file = Some((name, content_type, bytes.to_vec()));
        }
    }

    let (file_name, content_type, bytes) = file.ok_or((
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": "No file provided"})),
    ))?;

    let client = VapiClient::from_env();
    let uploaded = client
        .upload_file(&file_name, &content_type, bytes)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": format!("Vapi upload failed: {}", e)})),
            )
        })?;
    let file_id = uploaded["id"].as_str().unwrap_or_default().to_string();

    state.documents.create(&file_id, &file_name).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "error": format!("Database error: {}", e)})),
        )
    })?;

    let all_ids = state.documents.all_file_ids().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"success": false, "error": format!("Database error: {}", e)})),
        )
    })?;
    info!("Syncing query tool with {} document(s)", all_ids.len());

    client.update_query_tool(&all_ids).await.map_err(|e| {
        error!("Query tool sync failed after upload: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": "DB saved but query tool sync failed"
            })),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "file_id": file_id,
        "name": file_name
    })))
}

pub async fn get_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let docs = state.documents.list().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    let payload: Vec<Value> = docs
        .iter()
        .map(|doc| {
            let extension = doc
                .file_name
                .rsplit('.')
                .next()
                .unwrap_or("")
                .to_uppercase();
            json!({
                "id": doc.vapi_file_id,
                "name": doc.file_name,
                "type": extension
            })
        })
        .collect();
    Ok(Json(json!(payload)))
}

/// Delete locally, then re-sync the query tool with whatever remains.
/// An empty remainder is valid and clears the knowledge base.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let deleted = state.documents.delete_by_file_id(&file_id).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Document not found in local DB"})),
        ));
    }
    info!("Deleted document {} locally", file_id);

    let remaining = state.documents.all_file_ids().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    info!("Syncing query tool ({} document(s) remain)", remaining.len());

    let client = VapiClient::from_env();
    client.update_query_tool(&remaining).await.map_err(|e| {
        error!("Query tool sync failed after delete: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": format!("DB deleted, but query tool sync failed: {}", e)
            })),
        )
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Document removed from DB and query tool synced successfully"
    })))
}
