//! HTTP trigger server

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use attention_payout::PayoutCycle;

use crate::Result;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub cycle: Arc<PayoutCycle>,
    pub cron_secret: Arc<str>,
}

impl AppState {
    pub fn new(cycle: Arc<PayoutCycle>, cron_secret: &str) -> Self {
        Self {
            cycle,
            cron_secret: Arc::from(cron_secret),
        }
    }
}

/// Routes of the trigger server
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/cron/payouts", get(trigger_payouts).post(trigger_payouts))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Trigger server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn trigger_payouts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.cron_secret) {
        warn!("Rejected payout trigger with missing or wrong bearer token");
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response();
    }

    // The cycle runs on its own task so a dropped request cannot cancel it
    // mid-disbursement
    let cycle = state.cycle.clone();
    let run = tokio::spawn(async move { cycle.try_run().await });

    match run.await {
        Err(e) => {
            error!("Payout cycle task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "payout cycle task failed" })),
            )
                .into_response()
        }
        Ok(Some(summary)) => {
            let status = if summary.error.is_some() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            (status, Json(summary)).into_response()
        }
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "payout cycle already running" })),
        )
            .into_response(),
    }
}

fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    constant_time_eq(token.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
