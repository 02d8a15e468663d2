use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::time::Instant;

use super::dto::*;
use crate::error::{AppError, AppResult};
use crate::orchestrator::TriggerOutcome;
use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let start = Instant::now();
    println!("[REQUEST] GET /health");
    tracing::info!("Processing health check request");

    let orchestrator = &state.orchestrator;
    let sessions = orchestrator
        .lanes()
        .iter()
        .map(|lane| SessionStatus {
            source: lane.id(),
            liveness: lane.sessions().liveness(),
            wallets: lane.wallets().len(),
            launches: lane.sessions().launch_count(),
        })
        .collect();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scrape_interval_minutes: state.config.scheduler.interval_minutes,
        orchestrator: OrchestratorStatus {
            running: orchestrator.is_running(),
            runs_completed: orchestrator.runs_completed(),
            last_run: orchestrator.last_report().await.map(|r| r.summary()),
            sessions,
        },
        cache: state.cache.status(&state.roster).await,
    };

    let duration = start.elapsed().as_millis();
    println!(
        "[RESPONSE] GET /health -> 200 OK ({}ms) cached={}/{}",
        duration, response.cache.cached_count, response.cache.configured.total
    );
    tracing::info!(
        duration_ms = %duration,
        cached = response.cache.cached_count,
        configured = response.cache.configured.total,
        "Health check completed"
    );

    Ok(Json(response))
}

/// `GET /portfolio?address=...`
pub async fn get_portfolio_by_query(
    State(state): State<AppState>,
    Query(query): Query<PortfolioQuery>,
) -> AppResult<Json<PortfolioResponse>> {
    let Some(address) = query.address.filter(|a| !a.trim().is_empty()) else {
        println!("[RESPONSE] GET /portfolio -> 400 Bad Request (missing address)");
        return Err(AppError::MissingParam {
            param: "address".to_string(),
            configured: state.roster.addresses(),
        });
    };
    lookup_portfolio(&state, &address, "/portfolio").await
}

/// `GET /api/v1/portfolio/{wallet}`
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> AppResult<Json<PortfolioResponse>> {
    lookup_portfolio(&state, &wallet, "/api/v1/portfolio").await
}

async fn lookup_portfolio(
    state: &AppState,
    address: &str,
    route: &str,
) -> AppResult<Json<PortfolioResponse>> {
    let start = Instant::now();
    println!("[REQUEST] GET {} wallet={}", route, address);
    tracing::info!(wallet = %address, "Processing portfolio request");

    let Some(wallet) = state.roster.find(address) else {
        println!("[RESPONSE] GET {} -> 404 Not Found (not configured)", route);
        return Err(AppError::NotConfigured {
            wallet: address.to_string(),
            configured: state.roster.addresses(),
        });
    };

    let Some(entry) = state.cache.entry(wallet).await else {
        println!("[RESPONSE] GET {} -> 503 Service Unavailable (not cached yet)", route);
        return Err(AppError::NotYetCached {
            wallet: wallet.to_string(),
            configured: state.roster.addresses(),
        });
    };

    let response = PortfolioResponse::new(
        &entry,
        state.cache.last_update().await,
        state.config.scheduler.interval_minutes,
        Utc::now(),
    );

    let duration = start.elapsed().as_millis();
    println!(
        "[RESPONSE] GET {} -> 200 OK ({}ms) projects={} age={}s",
        route, duration, response.snapshot.projects_count, response.age_seconds
    );
    tracing::info!(
        wallet = %wallet.short(),
        duration_ms = %duration,
        projects = response.snapshot.projects_count,
        age_seconds = response.age_seconds,
        stale = response.stale,
        "Portfolio served from cache"
    );

    Ok(Json(response))
}

/// `POST /refresh[?wait=true]`
pub async fn refresh(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> AppResult<(StatusCode, Json<RefreshResponse>)> {
    let start = Instant::now();
    println!("[REQUEST] POST /refresh wait={}", query.wait);
    tracing::info!(wait = query.wait, "Processing refresh request");

    let already_running = || {
        println!("[RESPONSE] POST /refresh -> 202 Accepted (already running)");
        (
            StatusCode::ACCEPTED,
            Json(RefreshResponse {
                status: RefreshStatus::AlreadyRunning,
                message: "A refresh is already in progress".to_string(),
                report: None,
            }),
        )
    };

    if !query.wait {
        return Ok(match state.orchestrator.trigger() {
            TriggerOutcome::AlreadyRunning => already_running(),
            TriggerOutcome::Started => {
                println!("[RESPONSE] POST /refresh -> 202 Accepted (started)");
                (
                    StatusCode::ACCEPTED,
                    Json(RefreshResponse {
                        status: RefreshStatus::Started,
                        message: "Refresh triggered".to_string(),
                        report: None,
                    }),
                )
            }
        });
    }

    let report = match state.orchestrator.try_run_once().await {
        Ok(Some(report)) => report,
        Ok(None) => return Ok(already_running()),
        Err(e) => {
            println!("[RESPONSE] POST /refresh -> 500 Internal Server Error (run task failed)");
            return Err(AppError::Internal(format!("refresh run failed: {}", e)));
        }
    };

    let duration = start.elapsed().as_millis();
    println!(
        "[RESPONSE] POST /refresh -> 200 OK ({}ms) succeeded={}/{}",
        duration, report.succeeded, report.attempted
    );
    tracing::info!(
        duration_ms = %duration,
        succeeded = report.succeeded,
        attempted = report.attempted,
        "Synchronous refresh completed"
    );

    Ok((
        StatusCode::OK,
        Json(RefreshResponse {
            status: RefreshStatus::Completed,
            message: format!("{} of {} wallets refreshed", report.succeeded, report.attempted),
            report: Some(report),
        }),
    ))
}
