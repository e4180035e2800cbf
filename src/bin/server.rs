use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use crm_bridge::curl::{self, ParsedCurlField, ParsedCurlRequest};
use crm_bridge::engine::SyncEngine;
use crm_bridge::mapping::{self, SyncContext};
use crm_bridge::placeholders;
use crm_bridge::storage::{encryption, Integration, IntegrationInput, SqliteStorage, Storage};
use crm_bridge::Error;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

struct AppState {
    storage: Arc<dyn Storage>,
    engine: SyncEngine,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

#[derive(Deserialize)]
struct ParseCurlBody {
    curl: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseCurlResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<ParsedCurlRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<ParsedCurlField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoicePdfBody {
    invoice_number: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    external_ref: Option<String>,
    raw: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoicePdfResponse {
    pdf_url: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("CRM_BRIDGE_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:crm_bridge.db".to_string());
    let storage = SqliteStorage::new(&database_url)
        .await
        .expect("failed to open database");
    storage.init().await.expect("failed to initialize database");

    let state = Arc::new(AppState {
        storage: Arc::new(storage),
        engine: SyncEngine::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/integrations", get(list_integrations).post(create_integration))
        .route(
            "/api/integrations/{id}",
            get(get_integration).put(update_integration).delete(delete_integration),
        )
        .route("/api/integrations/{id}/test", post(test_integration))
        .route("/api/integrations/{id}/sync-invoice", post(sync_invoice))
        .route("/api/integrations/{id}/invoice-pdf", post(invoice_pdf))
        .route("/api/parse-curl", post(parse_curl))
        .route("/api/placeholders", get(list_placeholders))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn list_integrations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.storage.list_integrations().await {
        Ok(integrations) => {
            let views: Vec<_> = integrations.iter().map(Integration::view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn create_integration(
    State(state): State<Arc<AppState>>,
    Json(input): Json<IntegrationInput>,
) -> impl IntoResponse {
    if let Err(e) = validate_input(&input) {
        return bad_request(e);
    }
    if input.password.is_none() {
        return bad_request("a password is required to create an integration".to_string());
    }
    match state.storage.create_integration(&input).await {
        Ok(integration) => (StatusCode::CREATED, Json(integration.view())).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn get_integration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.storage.get_integration(id).await {
        Ok(Some(integration)) => (StatusCode::OK, Json(integration.view())).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

async fn update_integration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<IntegrationInput>,
) -> impl IntoResponse {
    if let Err(e) = validate_input(&input) {
        return bad_request(e);
    }
    match state.storage.update_integration(id, &input).await {
        Ok(Some(integration)) => (StatusCode::OK, Json(integration.view())).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

async fn delete_integration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.storage.delete_integration(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(e) => internal_error(e),
    }
}

async fn test_integration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (integration, password) = match load_credentialed(&state, id).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };
    let result = state.engine.test_connection(&integration, &password).await;
    (StatusCode::OK, Json(result)).into_response()
}

async fn sync_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(context): Json<SyncContext>,
) -> impl IntoResponse {
    let (integration, password) = match load_credentialed(&state, id).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };
    if !integration.is_active {
        return bad_request("integration is inactive".to_string());
    }
    match state.engine.sync_invoice(&integration, &password, &context).await {
        Ok(result) => (
            StatusCode::OK,
            Json(SyncResponse {
                external_ref: result.external_ref,
                raw: result.raw,
            }),
        )
            .into_response(),
        Err(e) => engine_error(e),
    }
}

async fn invoice_pdf(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<InvoicePdfBody>,
) -> impl IntoResponse {
    let (integration, password) = match load_credentialed(&state, id).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };
    // "Not yet synced" and "no endpoint configured" must stay distinguishable.
    if integration.list_invoices_url.is_none() {
        return bad_request("integration has no invoice list endpoint configured".to_string());
    }
    match state
        .engine
        .find_invoice_pdf(&integration, &password, &body.invoice_number)
        .await
    {
        Ok(result) => {
            (StatusCode::OK, Json(InvoicePdfResponse { pdf_url: result.pdf_url })).into_response()
        }
        Err(e) => engine_error(e),
    }
}

async fn parse_curl(Json(body): Json<ParseCurlBody>) -> impl IntoResponse {
    let result = match curl::parse(&body.curl) {
        Ok(request) => {
            let fields = curl::suggest_fields(&request);
            ParseCurlResult {
                success: true,
                request: Some(request),
                fields: Some(fields),
                error: None,
            }
        }
        Err(e) => ParseCurlResult {
            success: false,
            request: None,
            fields: None,
            error: Some(e.to_string()),
        },
    };
    (StatusCode::OK, Json(result))
}

async fn list_placeholders() -> impl IntoResponse {
    Json(placeholders::list())
}

/// Configuration-time validation: a mapping that does not compile is
/// rejected here with a message the operator can act on.
fn validate_input(input: &IntegrationInput) -> Result<(), String> {
    mapping::compile(&input.field_mapping).map_err(|e| e.to_string())?;
    Ok(())
}

async fn load_credentialed(
    state: &AppState,
    id: Uuid,
) -> Result<(Integration, String), axum::response::Response> {
    let integration = match state.storage.get_integration(id).await {
        Ok(Some(integration)) => integration,
        Ok(None) => return Err(not_found()),
        Err(e) => return Err(internal_error(e)),
    };
    if integration.password.is_empty() {
        return Err(bad_request("integration has no stored credential".to_string()));
    }
    let password = match encryption::decrypt(&integration.password) {
        Ok(password) => password,
        Err(e) => return Err(internal_error(e)),
    };
    Ok((integration, password))
}

fn engine_error(error: Error) -> axum::response::Response {
    let status = match &error {
        Error::Parse(_) | Error::Mapping(_) => StatusCode::BAD_REQUEST,
        Error::Lookup(_) => StatusCode::NOT_FOUND,
        Error::Auth { .. } | Error::Sync { .. } => StatusCode::BAD_GATEWAY,
        Error::Network(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, Json(ApiError { error: error.to_string() })).into_response()
}

fn bad_request(message: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message })).into_response()
}

fn not_found() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError { error: "integration not found".to_string() }),
    )
        .into_response()
}

fn internal_error(error: anyhow::Error) -> axum::response::Response {
    tracing::error!("internal error: {:#}", error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "internal error".to_string() }),
    )
        .into_response()
}
