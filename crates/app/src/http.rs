//! HTTP surface: `/api/v1/logs` JSON routes, multipart upload, and static
//! files under `/files`.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cabinet_api::{parse_id, ApiError, CabinetApi, InProcApi, UploadRequest};
use cabinet_core::{Manifest, Session};
use cabinet_ingest::LogService;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    api: Arc<dyn CabinetApi>,
}

/// `ApiError` rendered as a JSON body with a matching status code.
pub struct HttpError(pub ApiError);

impl From<ApiError> for HttpError {
    fn from(e: ApiError) -> Self { HttpError(e) }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(self.0)).into_response()
    }
}

pub fn router(api: Arc<dyn CabinetApi>, files: &Path, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/logs", get(list_logs).post(upload_log))
        .route("/api/v1/logs/:id", get(get_log))
        .nest_service("/files", ServeDir::new(files))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { api })
}

async fn list_logs(State(st): State<AppState>) -> Result<Json<Vec<Session>>, HttpError> {
    Ok(Json(st.api.list().await?))
}

async fn get_log(State(st): State<AppState>, UrlPath(raw): UrlPath<String>) -> Result<Json<Session>, HttpError> {
    let id = parse_id(&raw)?;
    Ok(Json(st.api.get(id).await?))
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    date: Option<String>,
}

async fn upload_log(
    State(st): State<AppState>,
    Query(q): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<Manifest>, HttpError> {
    let mut req = UploadRequest { date: q.date, ..Default::default() };
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Validation(e.body_text()))? {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| ApiError::Validation(e.body_text()))?.to_vec();
        match name.as_str() {
            "log" => req.log = Some(bytes),
            "stats" => req.stats = Some(bytes),
            "stats_map" => req.stats_map = Some(bytes),
            other => debug!(part = %other, "ignoring unknown upload part"),
        }
    }
    Ok(Json(st.api.upload(req).await?))
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, initiating shutdown"),
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating shutdown");
            }
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Serve HTTP until a shutdown signal, then drain the service.
pub async fn serve(service: Arc<LogService>, bind: SocketAddr, max_upload_bytes: usize) -> Result<()> {
    let api: Arc<dyn CabinetApi> = Arc::new(InProcApi::new(Arc::clone(&service)));
    let app = router(api, service.root(), max_upload_bytes);
    let listener = TcpListener::bind(bind).await.with_context(|| format!("binding {}", bind))?;
    info!(addr = %bind, root = %service.root().display(), "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("http server")?;
    info!(sessions = service.registry().len(), "http stopped; draining jobs");
    service.shutdown().await;
    Ok(())
}
