//! HTTP API for the journey engine.
//!
//! A small REST surface over [`JourneyEngine`] built with
//! [`axum`](https://crates.io/crates/axum).  Request bodies are
//! [`MonthContext`] values; responses are the engine's result types as
//! JSON.  Computation runs on the blocking pool so the async workers
//! stay free while a rollup fans out over rayon.

use crate::config::EngineConfig;
use crate::engine::{BatchControl, JourneyEngine};
use crate::error::{Error, ErrorKind};
use crate::models::{MonthContext, TimeBankLedgerEntry, YearMonth};
use crate::rollup::EmployeeMonthReport;
use crate::store::load_dataset_from_dir;
use crate::time_bank::{AccrualLot, InMemoryLedgerStore};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Application state shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JourneyEngine>,
}

/// Engine errors rendered as `{"error": ..., "kind": ...}`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::DataIntegrity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Persistence | ErrorKind::Config | ErrorKind::Io => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string(), "kind": kind }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the API router around an engine.
pub fn build_router(engine: Arc<JourneyEngine>) -> Router {
    Router::new()
        .route("/api/employees/:id/journey", post(journey_handler))
        .route("/api/employees/:id/time-bank", get(time_bank_handler))
        .route("/api/companies/:id/rollup", post(rollup_handler))
        .route("/api/companies/:id/critical", post(critical_handler))
        .with_state(AppState { engine })
}

/// Runs a blocking engine call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(Error::Persistence(format!("worker task failed: {e}"))))?
        .map_err(ApiError)
}

/// Handler for POST /api/employees/:id/journey
async fn journey_handler(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Json(ctx): Json<MonthContext>,
) -> ApiResult<EmployeeMonthReport> {
    let engine = state.engine.clone();
    let report = blocking(move || engine.compute_employee_month(&employee_id, &ctx)).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct TimeBankQuery {
    as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeBankView {
    pub employee_id: String,
    pub as_of: NaiveDate,
    pub entries: Vec<TimeBankLedgerEntry>,
    pub balance_minutes: u32,
    pub expiring_soon: Vec<AccrualLot>,
}

/// Handler for GET /api/employees/:id/time-bank
async fn time_bank_handler(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Query(query): Query<TimeBankQuery>,
) -> ApiResult<TimeBankView> {
    let as_of = query
        .as_of
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    let engine = state.engine.clone();
    let view = blocking(move || {
        let bank = engine.time_bank();
        let entries: Vec<_> = bank
            .entries(&employee_id)?
            .into_iter()
            .filter(|e| e.month <= YearMonth::of(as_of))
            .collect();
        let balance_minutes = entries.last().map_or(0, |e| e.balance_minutes);
        let expiring_soon = bank.expiring_soon(&employee_id, as_of)?;
        Ok(TimeBankView {
            employee_id,
            as_of,
            entries,
            balance_minutes,
            expiring_soon,
        })
    })
    .await?;
    Ok(Json(view))
}

async fn run_rollup(
    state: &AppState,
    company_id: String,
    ctx: MonthContext,
) -> Result<crate::rollup::CompanyRollup, ApiError> {
    let timeout = Duration::from_secs(state.engine.config().rollup.batch_timeout_secs);
    let control = BatchControl::with_timeout(timeout);
    let engine = state.engine.clone();
    let worker_control = control.clone();
    let task = blocking(move || engine.run_company_rollup(&company_id, &ctx, &worker_control));
    // employees already running get a grace period past the deadline
    match tokio::time::timeout(timeout * 2, task).await {
        Ok(result) => result,
        Err(_) => {
            control.cancel();
            warn!("rollup exceeded its deadline, cancelling remaining employees");
            Err(ApiError(Error::Cancelled("rollup timed out".into())))
        }
    }
}

/// Handler for POST /api/companies/:id/rollup
async fn rollup_handler(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(ctx): Json<MonthContext>,
) -> ApiResult<crate::rollup::CompanyRollup> {
    Ok(Json(run_rollup(&state, company_id, ctx).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CriticalView {
    pub company_id: String,
    pub period: YearMonth,
    pub employees: Vec<EmployeeMonthReport>,
}

/// Handler for POST /api/companies/:id/critical
async fn critical_handler(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(ctx): Json<MonthContext>,
) -> ApiResult<CriticalView> {
    let rollup = run_rollup(&state, company_id, ctx).await?;
    Ok(Json(CriticalView {
        employees: rollup.critical_reports().into_iter().cloned().collect(),
        company_id: rollup.company_id,
        period: rollup.period,
    }))
}

/// Build an engine over the in-memory stores loaded from `data_dir`.
pub fn load_engine(data_dir: &std::path::Path, config: EngineConfig) -> anyhow::Result<Arc<JourneyEngine>> {
    let dataset = load_dataset_from_dir(data_dir)?;
    let engine = JourneyEngine::new(
        config,
        Arc::new(dataset.punches),
        Arc::new(dataset.contracts),
        Arc::new(dataset.calendar),
        Arc::new(InMemoryLedgerStore::new()),
    )?;
    Ok(Arc::new(engine))
}

/// Launch the API server.  Blocks until the server terminates.
pub async fn serve(addr: &str, data_dir: std::path::PathBuf, config: EngineConfig) -> anyhow::Result<()> {
    let engine = load_engine(&data_dir, config)?;
    let router = build_router(engine);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
