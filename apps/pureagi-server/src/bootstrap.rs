use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use pureagi_core::{Config, ConfigError, DispatchAgent};

use crate::{access_log, api, AppState};

pub(crate) mod paths {
    pub const CHAT: &str = "/api/chat";
    pub const HEALTHZ: &str = "/healthz";
    pub const OPENAPI: &str = "/spec/openapi.json";
    pub const UI_INDEX: &str = "/";
    pub const UI_SEND: &str = "/ui/send";
    pub const UI_HISTORY: &str = "/ui/history";
    pub const UI_CLEAR: &str = "/ui/clear";
}

pub(crate) struct BootstrapOutput {
    pub router: Router,
    pub state: AppState,
}

/// Create the long-lived agent and the routed application around it.
pub(crate) fn build(config: Config) -> anyhow::Result<BootstrapOutput> {
    let agent = DispatchAgent::from_config(&config).context("failed to start dispatch agent")?;
    let state = AppState::new(config, agent);
    Ok(BootstrapOutput {
        router: build_router(state.clone()),
        state,
    })
}

pub(crate) fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(paths::CHAT, post(api::chat::chat_endpoint))
        .route(paths::HEALTHZ, get(api::meta::healthz))
        .route(paths::OPENAPI, get(api::meta::openapi_spec));
    if state.ui_enabled() {
        router = router
            .route(paths::UI_INDEX, get(api::ui::ui_index))
            .route(paths::UI_SEND, post(api::ui::ui_send))
            .route(paths::UI_HISTORY, get(api::ui::ui_history))
            .route(paths::UI_CLEAR, post(api::ui::ui_clear));
    }
    let body_limit = state.max_upload_bytes();
    router
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub(crate) struct HttpConfig {
    pub addr: SocketAddr,
    pub concurrency_limit: usize,
}

pub(crate) fn http_config(cfg: &Config) -> Result<HttpConfig, ConfigError> {
    Ok(HttpConfig {
        addr: cfg.addr()?,
        concurrency_limit: cfg.http_max_conc,
    })
}

/// CORS is wide open: any origin, method and header, credentials allowed.
pub(crate) fn attach_http_layers(router: Router, http_cfg: &HttpConfig) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(http_cfg.concurrency_limit))
        .layer(CorsLayer::very_permissive())
}

pub(crate) fn attach_global_layers(router: Router) -> Router {
    router.layer(axum::middleware::from_fn(access_log::access_log_mw))
}

/// `PUREAGI_OPENAPI_OUT` / `PUREAGI_CONFIG_SCHEMA_OUT` write the generated
/// documents and return `true` so the process can exit without serving.
pub(crate) fn ensure_schema_export() -> Result<bool, std::io::Error> {
    let mut exported = false;
    if let Ok(path) = std::env::var("PUREAGI_OPENAPI_OUT") {
        std::fs::write(&path, crate::openapi::spec_json_pretty())?;
        exported = true;
    }
    if let Ok(path) = std::env::var("PUREAGI_CONFIG_SCHEMA_OUT") {
        pureagi_core::write_schema_file(&path)?;
        exported = true;
    }
    Ok(exported)
}
