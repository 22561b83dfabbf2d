use diesel::prelude::*;
use serde::Serialize;
use crate::schema::{
    agent_configurations, call_history, calling_sessions, connected_datasets, human_experts,
    knowledge_documents,
};

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = call_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CallRecord {
    pub id: i32,
    pub call_id: String, // id assigned by vapi
    pub phone_number: String,
    pub status: String, // queued/ringing/in-progress/forwarding/ended/busy/no-answer/failed/canceled
    pub duration_secs: i32,
    pub started_at: i32, // epoch seconds utc
    pub ended_at: Option<i32>,
    pub summary: Option<String>, // end-of-call summary from vapi
    pub recording_url: Option<String>,
    pub assistant_id: Option<String>,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = call_history)]
pub struct NewCallRecord {
    pub call_id: String,
    pub phone_number: String,
    pub status: String,
    pub duration_secs: i32,
    pub started_at: i32,
    pub ended_at: Option<i32>,
    pub summary: Option<String>,
    pub recording_url: Option<String>,
    pub assistant_id: Option<String>,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = calling_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CallingSession {
    pub id: i32,
    pub session_id: String, // vapi call id (outbound) or assistant id (inbound)
    pub is_active: bool,
    pub started_at: i32,
    pub ended_at: Option<i32>,
}

#[derive(Insertable)]
#[diesel(table_name = calling_sessions)]
pub struct NewCallingSession {
    pub session_id: String,
    pub is_active: bool,
    pub started_at: i32,
    pub ended_at: Option<i32>,
}

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = knowledge_documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KnowledgeDocument {
    pub id: i32,
    pub vapi_file_id: String,
    pub file_name: String,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = knowledge_documents)]
pub struct NewKnowledgeDocument {
    pub vapi_file_id: String,
    pub file_name: String,
    pub created_at: i32,
}

// JSON-shaped columns are stored as serialized text. The repository layer
// owns the (de)serialization and hands out the parsed Dataset type instead.
#[derive(Queryable, Selectable)]
#[diesel(table_name = connected_datasets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DatasetRow {
    pub id: i32,
    pub name: String,
    pub source_type: String, // 'csv', 'excel' or 'googlesheets'
    pub summary: String,     // llm-generated description the assistant reads
    pub columns_json: String,
    pub tool_ids_json: String,
    pub rows_json: String,
    pub connection_json: String, // e.g. {"spreadsheet_id": "..."}
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = connected_datasets)]
pub struct NewDatasetRow {
    pub name: String,
    pub source_type: String,
    pub summary: String,
    pub columns_json: String,
    pub tool_ids_json: String,
    pub rows_json: String,
    pub connection_json: String,
    pub created_at: i32,
}

#[derive(Queryable, Selectable, Serialize)]
#[diesel(table_name = human_experts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HumanExpert {
    pub id: i32,
    pub phone_number: String,
    pub expert_field: String,
    pub vapi_tool_id: String, // transferCall tool registered for this expert
    pub is_active: bool,
    pub created_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = human_experts)]
pub struct NewHumanExpert {
    pub phone_number: String,
    pub expert_field: String,
    pub vapi_tool_id: String,
    pub is_active: bool,
    pub created_at: i32,
}

// Singleton row, id is always 1.
#[derive(Queryable, Selectable)]
#[diesel(table_name = agent_configurations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AgentConfigRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub tool_settings_json: String, // {"<tool_id>": {"enabled": bool}}
    pub updated_at: i32,
}

#[derive(Insertable)]
#[diesel(table_name = agent_configurations)]
pub struct NewAgentConfigRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub tool_settings_json: String,
    pub updated_at: i32,
}
