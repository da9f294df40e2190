use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use shared::protocol::{API_PREFIX, DIGEST_PATH, SERVICE_PATH};
use shared::types::{ServicePayload, ServiceRecord};
use shared::validation;
use crate::api::error::{ApiError, ApiResult};
use crate::registry::RegistryHandle;

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub digest_rx: watch::Receiver<String>,
}

pub fn router(state: AppState) -> Router {
    let collection = format!("{}{}", API_PREFIX, SERVICE_PATH);

    Router::new()
        .route(&collection, get(list_services).post(create_service))
        .route(&format!("{}{}", API_PREFIX, DIGEST_PATH), get(get_digest))
        .route(
            &format!("{}/:name", collection),
            get(get_service).put(update_service).delete(delete_service),
        )
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The dashboard is served from a dev server on localhost, any port
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().map(is_local_origin).unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

fn is_local_origin(origin: &str) -> bool {
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);

    match rest.split_once(':') {
        Some((host, port)) => {
            host == "localhost"
                && (1..=5).contains(&port.len())
                && port.bytes().all(|b| b.is_ascii_digit())
        }
        None => rest == "localhost",
    }
}

fn parse_payload(payload: Result<Json<ServicePayload>, JsonRejection>) -> ApiResult<ServicePayload> {
    payload
        .map(|Json(payload)| payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid payload. Must be json: {}", e.body_text())))
}

fn require_name(name: &str) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("name path param is mandatory".to_string()));
    }
    Ok(())
}

async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<ServiceRecord>>> {
    Ok(Json(state.registry.find_all().await?))
}

async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServiceRecord>> {
    require_name(&name)?;
    state
        .registry
        .find_by_name(name.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Registry(crate::error::RegistryError::NotFound(name)))
}

async fn create_service(
    State(state): State<AppState>,
    payload: Result<Json<ServicePayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ServiceRecord>)> {
    let payload = parse_payload(payload)?;
    tracing::debug!("Create requested: {:?}", payload);

    let service = validation::validate(&payload)?;
    let record = state.registry.create_one(service).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<ServicePayload>, JsonRejection>,
) -> ApiResult<Json<ServiceRecord>> {
    require_name(&name)?;
    let payload = parse_payload(payload)?;
    tracing::debug!("Update of {} requested: {:?}", name, payload);

    let service = validation::validate(&payload)?;
    Ok(Json(state.registry.update(name, service).await?))
}

async fn delete_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    require_name(&name)?;
    state.registry.delete_by_name(name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_digest(State(state): State<AppState>) -> String {
    state.digest_rx.borrow().clone()
}
