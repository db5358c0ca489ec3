// HTTP binding layer: POST /v1/detect and POST /v1/models.
//
// This layer is intentionally thin (see the core's out-of-scope list): it
// validates and binds the request, resolves the admin/non-admin base_url
// policy, calls into `coordinator`/`model_lister`, and wraps the result in
// the response envelope. All detection logic lives in `coordinator` and
// `classifier` and is exercised directly by their own unit tests; these
// handlers are covered by `tests/integration_test.rs`.

use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::coordinator::{self, DEFAULT_SCAN_MODELS, MAX_MODELS_PER_SCAN};
use crate::error::DetectorError;
use crate::model_lister;
use crate::result::ScanResult;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

/// Whether the current request has been granted admin privilege. Carried
/// as a request extension set by [`admin_gate`], mirroring the teacher's
/// gate-then-forward auth middleware shape. There is no user/role backend
/// behind this, just a single shared `ADMIN_KEY` credential, or none at all if
/// unconfigured (in which case no caller is ever admin).
#[derive(Clone, Copy, Debug, Default)]
pub struct AdminFlag(pub bool);

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub verify_ratelimit: bool,
}

fn default_rounds() -> u32 {
    coordinator::DEFAULT_ROUNDS
}

#[derive(Debug, Deserialize)]
pub struct ListModelsRequest {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<String>,
}

/// `base_url` must parse with scheme `http`/`https` and a non-empty host.
pub fn validate_base_url(base_url: &str) -> Result<Url, String> {
    let url = Url::parse(base_url).map_err(|e| format!("invalid base_url: {e}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err("base_url must use http or https".to_string());
    }
    if url.host_str().unwrap_or_default().is_empty() {
        return Err("base_url must have a non-empty host".to_string());
    }
    Ok(url)
}

/// Resolve the admin/non-admin base_url policy: non-admin callers always
/// have their `base_url` overridden to the configured public default.
fn resolve_base_url(config: &Config, requested: &str, admin: bool) -> String {
    if admin {
        requested.to_string()
    } else {
        config.default_base_url.clone()
    }
}

async fn handle_detect(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminFlag>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<ScanResult>, DetectorError> {
    if req.api_key.trim().is_empty() {
        return Err(DetectorError::ValidationError("api_key is required".to_string()));
    }

    let base_url = resolve_base_url(&state.config, &req.base_url, admin.0);
    validate_base_url(&base_url).map_err(DetectorError::ValidationError)?;

    let rounds = coordinator::clamp_rounds(req.rounds);
    let requested_models = default_models_if_empty(req.models);
    let models: Vec<String> = coordinator::clamp_models(&requested_models).to_vec();
    let skip_ssrf = admin.0;

    let result = if models.len() == 1 && req.verify_ratelimit {
        let detect = coordinator::detect_single(
            &base_url,
            &req.api_key,
            &models[0],
            rounds,
            skip_ssrf,
            true,
        )
        .await?;
        ScanResult::from_results(base_url, vec![detect])
    } else {
        coordinator::scan_multiple(&base_url, &req.api_key, &models, rounds, skip_ssrf).await?
    };

    Ok(Json(result))
}

async fn handle_list_models(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminFlag>,
    Json(req): Json<ListModelsRequest>,
) -> Result<Json<ListModelsResponse>, DetectorError> {
    if req.api_key.trim().is_empty() {
        return Err(DetectorError::ValidationError("api_key is required".to_string()));
    }

    let base_url = resolve_base_url(&state.config, &req.base_url, admin.0);
    validate_base_url(&base_url).map_err(DetectorError::ValidationError)?;

    let models = model_lister::list_claude_models(&base_url, &req.api_key, admin.0).await?;
    Ok(Json(ListModelsResponse { models }))
}

async fn handle_health() -> &'static str {
    "ok"
}

/// Sets the [`AdminFlag`] extension from an `x-admin-key` header, matching
/// it against `Config::admin_key`. No header, no configured key, or a
/// mismatch all forward the request as non-admin rather than rejecting it
/// outright: the SSRF/base_url policy downstream is what actually matters,
/// not gatekeeping the endpoint itself.
async fn admin_gate(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let is_admin = match (&state.config.admin_key, request.headers().get("x-admin-key")) {
        (Some(expected), Some(provided)) => provided.to_str().ok() == Some(expected.as_str()),
        _ => false,
    };
    request.extensions_mut().insert(AdminFlag(is_admin));
    next.run(request).await
}

pub fn cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/detect", post(handle_detect))
        .route("/v1/models", post(handle_list_models))
        .route("/healthz", get(handle_health))
        .layer(axum::middleware::from_fn_with_state(state.clone(), admin_gate))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Explicit fallback so an empty `models` list in a request still resolves
/// to something: callers may pass `DEFAULT_SCAN_MODELS` themselves, but the
/// binding layer also exposes it for convenience.
pub fn default_models_if_empty(models: Vec<String>) -> Vec<String> {
    if models.is_empty() {
        DEFAULT_SCAN_MODELS.iter().map(|s| s.to_string()).collect()
    } else {
        models
    }
}
