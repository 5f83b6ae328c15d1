//! HTTP surface.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /features/{pl}/{iso3}/{admin}?f=..&simplify=..&lco=..` | `308` to the resolved URL |
//! | `GET /tiles/{pl}/{iso3}/{admin}` | `307` to the pre-rendered tile JSON |
//! | `GET /health` | `200` with a JSON status body |
//!
//! Failures answer with the status from [`GatewayError::status_code`] and
//! a short reason phrase; details go to the log, not the client.

use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dataset::DatasetRef;
use crate::error::{GatewayError, GatewayResult};
use crate::format::DEFAULT_FORMAT;
use crate::gateway::{FeatureRequest, Gateway};
use crate::options::ConversionOptions;

#[derive(Clone)]
struct AppState {
    gateway: Gateway,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine: &'static str,
    cache_backend: &'static str,
    in_flight: usize,
}

/// Build the application router.
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route(
            "/features/:processing_level/:iso3/:admin_level",
            get(features),
        )
        .route("/tiles/:processing_level/:iso3/:admin_level", get(tiles))
        .route("/health", get(health))
        .with_state(AppState { gateway })
}

/// Serve `gateway` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    gateway: Gateway,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn features(
    State(state): State<AppState>,
    Path((processing_level, iso3, admin_level)): Path<(String, String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = match parse_request(&processing_level, &iso3, &admin_level, &params) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match state.gateway.resolve(&request).await {
        Ok(resolution) => Redirect::permanent(&resolution.url).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn tiles(
    State(state): State<AppState>,
    Path((processing_level, iso3, admin_level)): Path<(String, String, String)>,
) -> Response {
    let dataset = match parse_dataset(&processing_level, &iso3, &admin_level) {
        Ok(dataset) => dataset,
        Err(e) => return error_response(&e),
    };

    match state.gateway.tiles_url(&dataset) {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        engine: state.gateway.engine_name(),
        cache_backend: state.gateway.cache_backend(),
        in_flight: state.gateway.coalescer_stats().in_flight,
    })
}

fn parse_dataset(processing_level: &str, iso3: &str, admin_level: &str) -> GatewayResult<DatasetRef> {
    let processing_level = parse_level("processing level", processing_level)?;
    let admin_level = parse_level("admin level", admin_level)?;
    DatasetRef::new(processing_level, iso3, admin_level)
}

fn parse_request(
    processing_level: &str,
    iso3: &str,
    admin_level: &str,
    params: &[(String, String)],
) -> GatewayResult<FeatureRequest> {
    let processing_level = parse_level("processing level", processing_level)?;
    let admin_level = parse_level("admin level", admin_level)?;

    let mut format = DEFAULT_FORMAT;
    let mut options = ConversionOptions::new();
    for (name, value) in params {
        match name.as_str() {
            "f" => format = value.as_str(),
            "simplify" => options = options.with_simplify(value.as_str())?,
            "lco" => options = options.with_layer_creation_option(value.as_str())?,
            _ => {}
        }
    }

    Ok(FeatureRequest::new(processing_level, iso3, admin_level, format)?.with_options(options))
}

fn parse_level(what: &str, raw: &str) -> GatewayResult<u32> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("{} '{}' is not a number", what, raw)))
}

fn error_response(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %error, "Request failed");
    } else {
        info!(status = status.as_u16(), error = %error, "Request rejected");
    }
    (status, error.public_message()).into_response()
}
