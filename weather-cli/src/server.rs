//! HTTP front end. Routes only extract path, query and body; all decisions
//! are made by the core handlers.

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use weather_report_core::{HandlerResponse, PrecipitationHandler, ReportHandler, ResponseBody};

#[derive(Debug, Default, Deserialize)]
struct DaysQuery {
    days: Option<String>,
}

impl DaysQuery {
    /// A value that is not an integer is treated as absent.
    fn days(&self) -> Option<i64> {
        self.days.as_deref().and_then(|d| d.trim().parse().ok())
    }
}

pub fn report_router(handler: ReportHandler) -> Router {
    Router::new()
        .route("/weather-report/:zip", get(weather_report))
        .with_state(Arc::new(handler))
}

pub fn precipitation_router(handler: PrecipitationHandler) -> Router {
    Router::new()
        .route("/observation/:zip", get(query_observations))
        .route("/observation/", post(ingest_observation))
        .route("/observation", post(ingest_observation))
        .with_state(Arc::new(handler))
}

async fn weather_report(
    State(handler): State<Arc<ReportHandler>>,
    Path(zip): Path<String>,
    Query(query): Query<DaysQuery>,
) -> Response {
    into_response(handler.weather_report(&zip, query.days()).await)
}

async fn query_observations(
    State(handler): State<Arc<PrecipitationHandler>>,
    Path(zip): Path<String>,
    Query(query): Query<DaysQuery>,
) -> Response {
    into_response(handler.query(&zip, query.days()).await)
}

async fn ingest_observation(State(handler): State<Arc<PrecipitationHandler>>, body: String) -> Response {
    into_response(handler.ingest(&body).await)
}

fn into_response(response: HandlerResponse) -> Response {
    match response.body {
        ResponseBody::Empty => response.status.into_response(),
        ResponseBody::Text(text) => (response.status, text).into_response(),
        ResponseBody::Json(json) => (response.status, Json(json)).into_response(),
    }
}

pub async fn serve(router: Router, listen: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;

    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
