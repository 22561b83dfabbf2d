use dotenvy::dotenv;
use axum::{
    routing::{get, post, put, delete},
    Router,
    middleware
};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{TraceLayer, DefaultMakeSpan, DefaultOnResponse};
use tracing::Level;
use std::sync::Arc;
use sentry;

mod handlers {
    pub mod call_handlers;
    pub mod dataset_handlers;
    pub mod document_handlers;
    pub mod expert_handlers;
    pub mod config_handlers;
}
mod api {
    pub mod vapi_client;
    pub mod vapi_dtos;
    pub mod vapi_webhook;
    pub mod gemini;
    pub mod sheets;
}
mod tool_calls {
    pub mod router;
    pub mod db_query;
    pub mod sheet_write;
}
mod models {
    pub mod records;
}
mod repositories {
    pub mod call_history;
    pub mod calling_sessions;
    pub mod documents;
    pub mod datasets;
    pub mod experts;
    pub mod agent_config;
}
mod utils {
    pub mod ingest;
}
mod schema;

use repositories::call_history::CallHistoryRepository;
use repositories::calling_sessions::CallingSessionRepository;
use repositories::documents::DocumentRepository;
use repositories::datasets::DatasetRepository;
use repositories::experts::ExpertRepository;
use repositories::agent_config::AgentConfigRepository;

use handlers::call_handlers;
use handlers::dataset_handlers;
use handlers::document_handlers;
use handlers::expert_handlers;
use handlers::config_handlers;
use api::vapi_webhook;
use tool_calls::{db_query, sheet_write};

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

async fn health_check() -> &'static str {
    "OK"
}

pub struct AppState {
    call_history: Arc<CallHistoryRepository>,
    calling_sessions: Arc<CallingSessionRepository>,
    documents: Arc<DocumentRepository>,
    datasets: Arc<DatasetRepository>,
    experts: Arc<ExpertRepository>,
    agent_config: Arc<AgentConfigRepository>,
}

pub fn validate_env() {
    let _ = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");
    let _ = std::env::var("VAPI_API_KEY")
        .expect("VAPI_API_KEY must be set");
    let _ = std::env::var("VAPI_PHONE_NUMBER_ID")
        .expect("VAPI_PHONE_NUMBER_ID must be set");
    let _ = std::env::var("VAPI_SERVER_URL_SECRET")
        .expect("VAPI_SERVER_URL_SECRET must be set");
    let _ = std::env::var("VAPI_QUERY_TOOL_ID")
        .expect("VAPI_QUERY_TOOL_ID must be set");
    let _ = std::env::var("VAPI_END_CALL_TOOL_ID")
        .expect("VAPI_END_CALL_TOOL_ID must be set");
    let _ = std::env::var("SERVER_URL") // public base url vapi calls back into
        .expect("SERVER_URL must be set");
    let _ = std::env::var("GEMINI_API_KEY")
        .expect("GEMINI_API_KEY must be set");
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    validate_env();

    let _guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((dsn, sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        }))
    });

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();
    // Set up database connection pool
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create pool");

    let conn = &mut pool.get().expect("Failed to get DB connection");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    let state = Arc::new(AppState {
        call_history: Arc::new(CallHistoryRepository::new(pool.clone())),
        calling_sessions: Arc::new(CallingSessionRepository::new(pool.clone())),
        documents: Arc::new(DocumentRepository::new(pool.clone())),
        datasets: Arc::new(DatasetRepository::new(pool.clone())),
        experts: Arc::new(ExpertRepository::new(pool.clone())),
        agent_config: Arc::new(AgentConfigRepository::new(pool)),
    });

    // Everything vapi calls into carries the shared secret header.
    let vapi_routes = Router::new()
        .route("/api/vapi/db-query", post(db_query::execute_db_query))
        .route("/api/vapi/sheet-write", post(sheet_write::execute_sheet_write))
        .route("/api/vapi/webhook", post(vapi_webhook::vapi_webhook))
        .route_layer(middleware::from_fn(vapi_webhook::validate_vapi_secret));

    // Create router with CORS
    let app = Router::new()
        .route("/api/health", get(health_check))

        .route("/api/calls/outbound", post(call_handlers::start_outbound_calling))
        .route("/api/calls/inbound", post(call_handlers::start_inbound_agent))
        .route("/api/calls/stop", post(call_handlers::stop_calling))
        .route("/api/calls/session", get(call_handlers::get_session_status))
        .route("/api/calls/history", get(call_handlers::get_call_history))

        .route("/api/documents", post(document_handlers::upload_document))
        .route("/api/documents", get(document_handlers::get_documents))
        .route("/api/documents/{file_id}", delete(document_handlers::delete_document))

        .route("/api/datasets/connect", post(dataset_handlers::connect_database))
        .route("/api/datasets/google-sheets", post(dataset_handlers::connect_google_sheets))
        .route("/api/datasets", get(dataset_handlers::get_connected_datasets))
        .route("/api/datasets", delete(dataset_handlers::delete_dataset))

        .route("/api/experts", post(expert_handlers::create_expert))
        .route("/api/experts", get(expert_handlers::get_experts))
        .route("/api/experts/{expert_id}", delete(expert_handlers::delete_expert))

        .route("/api/agent/config", get(config_handlers::get_agent_config))
        .route("/api/agent/config", put(config_handlers::update_agent_config))
        .route("/api/agent/tools", get(config_handlers::get_available_tools))
        .route("/api/agent/tools/status", put(config_handlers::update_tool_status))

        .merge(vapi_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                    axum::http::Method::DELETE,
                ])
                .allow_origin(Any) // Be cautious with `Any` in production; restrict to your frontend origin
                .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
                .expose_headers([axum::http::header::CONTENT_TYPE])
        )
        .with_state(state);

    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    axum::serve(listener, app.into_make_service()).await.unwrap();
}
