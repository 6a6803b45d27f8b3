// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl session routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Crawl, CrawlUpdate, DrinkType, ElapsedStats, UserStats};
use crate::services::location::PositionFix;
use crate::services::session::{FinalizeRequest, SessionSnapshot, SubmittedCrawl};
use crate::services::{Clock, DrinkPeriod};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Crawl routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crawl", get(get_session).delete(cancel_crawl))
        .route("/api/crawl/start", post(start_crawl))
        .route("/api/crawl/location", post(post_location))
        .route("/api/crawl/updates", post(post_update))
        .route("/api/crawl/tap-out", post(tap_out))
        .route("/api/crawl/stats", get(get_elapsed_stats))
        .route("/api/crawl/finalize", post(finalize_crawl))
        .route("/api/crawls", get(get_crawls))
        .route("/api/stats", get(get_stats))
}

// ─── Lifecycle ───────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartResponse {
    pub crawl_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub start_time: i64,
}

/// Start a crawl for the calling user.
async fn start_crawl(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<StartResponse>)> {
    let session = state.sessions.session(&user.user_id);
    let crawl = session.engine.start_session().await?;

    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            crawl_id: crawl.id,
            start_time: crawl.start_time,
        }),
    ))
}

/// Stop tracking; the crawl is kept for review.
async fn tap_out(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode> {
    let session = state
        .sessions
        .get(&user.user_id)
        .ok_or(AppError::NoActiveSession)?;
    session.engine.tap_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Discard the crawl in progress. Succeeds even if there is none.
async fn cancel_crawl(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> StatusCode {
    if let Some(session) = state.sessions.get(&user.user_id) {
        session.engine.cancel_session().await;
    }
    StatusCode::NO_CONTENT
}

/// Current phase and crawl for the review screen.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<SessionSnapshot> {
    let session = state.sessions.session(&user.user_id);
    Json(session.engine.snapshot().await)
}

async fn get_elapsed_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ElapsedStats>> {
    let session = state
        .sessions
        .get(&user.user_id)
        .ok_or(AppError::NoActiveSession)?;
    Ok(Json(session.engine.elapsed_stats().await?))
}

// ─── Location & Photos ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch millis of the fix; server time when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Serialize)]
pub struct LocationResponse {
    /// False when the fix was throttled or no crawl is tracking
    pub delivered: bool,
}

/// Accept a GPS fix from the device.
///
/// The fix is always remembered for photo tagging; it only reaches the route
/// if it passes the watch throttle of an active crawl.
async fn post_location(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<LocationRequest>,
) -> Result<(StatusCode, Json<LocationResponse>)> {
    if !(-90.0..=90.0).contains(&req.latitude) || !(-180.0..=180.0).contains(&req.longitude) {
        return Err(AppError::BadRequest(format!(
            "Coordinates out of range: {}, {}",
            req.latitude, req.longitude
        )));
    }

    let timestamp = req
        .timestamp
        .unwrap_or_else(|| state.sessions.clock().now_millis());
    let session = state.sessions.session(&user.user_id);
    let delivered = session
        .location
        .push(PositionFix::new(req.latitude, req.longitude, timestamp));

    Ok((StatusCode::ACCEPTED, Json(LocationResponse { delivered })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub photo_uri: String,
    #[serde(default)]
    pub drink_type: Option<DrinkType>,
}

/// Record a photo, optionally logging a drink.
async fn post_update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateRequest>,
) -> Result<(StatusCode, Json<CrawlUpdate>)> {
    let session = state
        .sessions
        .get(&user.user_id)
        .ok_or(AppError::NoActiveSession)?;
    let update = session
        .engine
        .record_update(req.photo_uri, req.drink_type)
        .await?;
    Ok((StatusCode::CREATED, Json(update)))
}

// ─── Finalize ────────────────────────────────────────────────

/// Finalize, upload, and add the crawl to the user's history.
///
/// On upload failure the crawl stays held so the client can retry.
async fn finalize_crawl(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<FinalizeRequest>,
) -> Result<(StatusCode, Json<SubmittedCrawl>)> {
    let session = state
        .sessions
        .get(&user.user_id)
        .ok_or(AppError::NoActiveSession)?;
    let submitted = session
        .engine
        .finalize_and_submit(&req, &state.gateway)
        .await?;

    let now = state.sessions.clock().now_millis();
    if !state.history.record(submitted.crawl.clone(), now) {
        tracing::debug!(
            user_id = %user.user_id,
            crawl_id = %submitted.crawl.id,
            "Crawl already in history"
        );
    }

    if submitted.receipt.is_partial_failure() {
        tracing::warn!(
            user_id = %user.user_id,
            crawl_id = %submitted.crawl.id,
            photos_failed = submitted.receipt.photos_failed,
            "Crawl submitted with missing photos"
        );
    }

    Ok((StatusCode::CREATED, Json(submitted)))
}

// ─── History & Stats ─────────────────────────────────────────

/// The user's submitted crawls, newest first.
async fn get_crawls(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<Vec<Crawl>> {
    Json(state.history.crawls(&user.user_id))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub period: DrinkPeriod,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub period: DrinkPeriod,
    pub drinks_count: u32,
    pub stats: UserStats,
}

/// Drinks in the requested period plus lifetime aggregates.
async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StatsQuery>,
) -> Json<StatsResponse> {
    let now = state.sessions.clock().now_millis();
    Json(StatsResponse {
        period: query.period,
        drinks_count: state
            .history
            .drinks_count(&user.user_id, query.period, now),
        stats: state.history.stats(&user.user_id),
    })
}
