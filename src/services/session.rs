// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl session engine.
//!
//! Owns a single user's in-progress crawl and drives it through
//! `Idle -> Active -> Stopped -> (Finalized | Discarded)`:
//! 1. `start_session` asks the location source for permission, subscribes to
//!    fixes and arms the inactivity deadline
//! 2. Each fix is appended to the route; bar detection runs afterwards and
//!    merges its result with set-union semantics
//! 3. `record_update` tags a photo with the current position and re-arms the
//!    deadline
//! 4. `tap_out` or the deadline ticker stops tracking but keeps the data
//! 5. `finalize` stops the crawl, marks it as finalizing and snapshots it
//!    into an immutable [`Crawl`]; captures that land after that are refused
//!
//! Every event is applied under one lock without awaiting in between, so
//! handlers never observe a half-updated crawl. Slow lookups (current
//! position, bar catalog, city) run outside the lock and re-check which crawl
//! is current before applying their result.

use crate::config::SessionConfig;
use crate::models::{
    ActiveCrawl, Crawl, CrawlUpdate, DrinkType, ElapsedStats, RoutePoint, UpdateLocation,
};
use crate::services::clock::Clock;
use crate::services::distance::miles_walked;
use crate::services::gateway::{SubmitReceipt, UploadError, UploadGateway};
use crate::services::geocode::CityResolver;
use crate::services::location::{LocationError, LocationSource, PositionFix, PositionStream};
use crate::services::proximity::BarCatalog;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use validator::Validate;

const DEFAULT_TITLE: &str = "Bar Crawl";
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Collaborators injected into every engine.
#[derive(Clone)]
pub struct SessionDeps {
    pub location: Arc<dyn LocationSource>,
    pub catalog: Arc<dyn BarCatalog>,
    pub cities: Arc<dyn CityResolver>,
    pub clock: Arc<dyn Clock>,
}

/// Why an active crawl stopped tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TappedOut,
    InactivityTimeout,
}

/// Lifecycle notifications published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { crawl_id: String },
    Stopped { crawl_id: String, reason: StopReason },
    Cancelled { crawl_id: String },
    Finalized { crawl_id: String },
}

impl SessionEvent {
    /// The "auto stopped, prompt for review" notification.
    pub fn is_auto_stop(&self) -> bool {
        matches!(
            self,
            SessionEvent::Stopped {
                reason: StopReason::InactivityTimeout,
                ..
            }
        )
    }
}

/// Coarse lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Active,
    Stopped,
}

/// Read-only view of the engine for the review screen.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// True after an automatic stop, until the crawl is finalized or cancelled
    pub pending_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
    /// A finalize is in progress for the held crawl
    pub finalizing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawl: Option<ActiveCrawl>,
}

/// Input for finalizing a crawl.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct FinalizeRequest {
    /// Blank titles are replaced by a generated one
    #[serde(default)]
    pub title: String,
    #[validate(length(max = 200, message = "Caption must be 200 characters or less"))]
    #[serde(default)]
    pub caption: Option<String>,
    /// Updates to keep; empty or missing keeps all
    #[serde(default)]
    pub selected_update_ids: Option<HashSet<String>>,
}

impl FinalizeRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_selection<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_update_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }
}

/// A crawl that was finalized and accepted by the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedCrawl {
    pub crawl: Crawl,
    pub receipt: SubmitReceipt,
}

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Location permission not granted")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("No active crawl session")]
    NoActiveSession,

    #[error("A crawl session is already active")]
    SessionAlreadyActive,

    #[error("The crawl is being finalized")]
    Finalizing,

    #[error("Invalid input: {0}")]
    Validation(String),
}

impl From<LocationError> for SessionError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => SessionError::PermissionDenied,
            LocationError::Unavailable(msg) | LocationError::Stream(msg) => {
                SessionError::LocationUnavailable(msg)
            }
        }
    }
}

/// Errors from finalize-and-upload.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Background work tied to an active crawl. Dropping it releases the
/// location subscription and clears the inactivity ticker.
struct Tracking {
    location_task: JoinHandle<()>,
    ticker_task: JoinHandle<()>,
}

impl Drop for Tracking {
    fn drop(&mut self) {
        self.location_task.abort();
        self.ticker_task.abort();
    }
}

enum SessionState {
    Idle,
    Active {
        crawl: ActiveCrawl,
        /// Epoch millis at which the crawl auto-stops
        deadline: i64,
        tracking: Tracking,
    },
    Stopped {
        crawl: ActiveCrawl,
        reason: StopReason,
        /// Set while the snapshot is being finalized or uploaded
        finalizing: bool,
    },
}

impl SessionState {
    /// The crawl with `crawl_id` if it is still held and open for changes,
    /// plus whether it is active.
    fn crawl_mut(&mut self, crawl_id: &str) -> Option<(&mut ActiveCrawl, bool)> {
        match self {
            SessionState::Active { crawl, .. } if crawl.id == crawl_id => Some((crawl, true)),
            SessionState::Stopped {
                crawl,
                finalizing: false,
                ..
            } if crawl.id == crawl_id => Some((crawl, false)),
            _ => None,
        }
    }

    fn crawl(&self) -> Option<&ActiveCrawl> {
        match self {
            SessionState::Idle => None,
            SessionState::Active { crawl, .. } | SessionState::Stopped { crawl, .. } => Some(crawl),
        }
    }

    fn active_id(&self) -> Option<&str> {
        match self {
            SessionState::Active { crawl, .. } => Some(&crawl.id),
            _ => None,
        }
    }
}

struct EngineInner {
    user_id: String,
    config: SessionConfig,
    deps: SessionDeps,
    state: Mutex<SessionState>,
    /// Serializes starts so only one location subscription is set up at a time
    start_lock: Mutex<()>,
    /// Serializes finalize calls so a crawl is submitted at most once
    finalize_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Session engine for one user. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(user_id: impl Into<String>, config: SessionConfig, deps: SessionDeps) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                user_id: user_id.into(),
                config,
                deps,
                state: Mutex::new(SessionState::Idle),
                start_lock: Mutex::new(()),
                finalize_lock: Mutex::new(()),
                events,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    /// Subscribe to lifecycle events (including automatic stops).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn now(&self) -> i64 {
        self.inner.deps.clock.now_millis()
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Start a new crawl.
    ///
    /// Fails without changing state if a crawl is already held (active or
    /// awaiting review) or if location tracking cannot be started.
    pub async fn start_session(&self) -> Result<ActiveCrawl, SessionError> {
        let _guard = self.inner.start_lock.lock().await;
        let idle = matches!(*self.inner.state.lock().await, SessionState::Idle);
        if !idle {
            tracing::debug!(user_id = %self.inner.user_id, "Start rejected, crawl already held");
            return Err(SessionError::SessionAlreadyActive);
        }

        // State lock is not held across the location calls
        let location = &self.inner.deps.location;
        if let Err(e) = location.request_permission().await {
            tracing::info!(user_id = %self.inner.user_id, error = %e, "Crawl start aborted");
            return Err(e.into());
        }
        let stream = match location.watch_position(self.inner.config.watch).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::info!(user_id = %self.inner.user_id, error = %e, "Crawl start aborted");
                return Err(e.into());
            }
        };

        let mut state = self.inner.state.lock().await;
        if !matches!(*state, SessionState::Idle) {
            // Dropping the stream releases the new subscription
            tracing::debug!(user_id = %self.inner.user_id, "Start rejected, crawl already held");
            return Err(SessionError::SessionAlreadyActive);
        }

        let now = self.now();
        let crawl = ActiveCrawl::new(uuid::Uuid::new_v4().to_string(), now);
        let weak = Arc::downgrade(&self.inner);
        let tracking = Tracking {
            location_task: tokio::spawn(pump_locations(weak.clone(), crawl.id.clone(), stream)),
            ticker_task: tokio::spawn(run_deadline_ticker(
                weak,
                crawl.id.clone(),
                self.inner.config.tick_interval,
            )),
        };

        *state = SessionState::Active {
            crawl: crawl.clone(),
            deadline: now + self.inner.config.inactivity_timeout_ms,
            tracking,
        };
        drop(state);

        tracing::info!(
            user_id = %self.inner.user_id,
            crawl_id = %crawl.id,
            "Crawl started"
        );
        self.emit(SessionEvent::Started {
            crawl_id: crawl.id.clone(),
        });
        Ok(crawl)
    }

    /// Stop tracking and keep the crawl for review.
    ///
    /// A crawl that is already stopped is left as is.
    pub async fn tap_out(&self) -> Result<(), SessionError> {
        let mut state = self.inner.state.lock().await;
        if matches!(*state, SessionState::Idle) {
            tracing::debug!(user_id = %self.inner.user_id, "Tap out with no crawl");
            return Err(SessionError::NoActiveSession);
        }

        let event = self.stop_locked(&mut *state, StopReason::TappedOut);
        drop(state);
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    /// Discard the current crawl, whatever its phase.
    ///
    /// Returns `false` if there was nothing to discard.
    pub async fn cancel_session(&self) -> bool {
        let previous = {
            let mut state = self.inner.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Idle)
        };

        let Some(crawl) = previous.crawl() else {
            return false;
        };
        let crawl_id = crawl.id.clone();
        // Dropping the old state releases any live subscription and ticker
        drop(previous);

        tracing::info!(
            user_id = %self.inner.user_id,
            crawl_id = %crawl_id,
            "Crawl cancelled"
        );
        self.emit(SessionEvent::Cancelled { crawl_id });
        true
    }

    /// Tear the engine down, discarding any crawl in progress.
    pub async fn dispose(&self) {
        self.cancel_session().await;
    }

    /// Move an active crawl to stopped; anything else is left untouched.
    /// Caller holds the state lock.
    fn stop_locked(&self, state: &mut SessionState, reason: StopReason) -> Option<SessionEvent> {
        let previous = std::mem::replace(state, SessionState::Idle);
        match previous {
            SessionState::Active {
                crawl, tracking, ..
            } => {
                drop(tracking);
                let crawl_id = crawl.id.clone();
                tracing::info!(
                    user_id = %self.inner.user_id,
                    crawl_id = %crawl_id,
                    reason = ?reason,
                    route_points = crawl.route.len(),
                    updates = crawl.updates.len(),
                    "Crawl stopped"
                );
                *state = SessionState::Stopped {
                    crawl,
                    reason,
                    finalizing: false,
                };
                Some(SessionEvent::Stopped { crawl_id, reason })
            }
            other => {
                *state = other;
                None
            }
        }
    }

    // ─── Inactivity Deadline ─────────────────────────────────────

    /// Compare the clock against the inactivity deadline.
    ///
    /// Stops the crawl and publishes an auto-stop event when the deadline has
    /// passed. Returns `true` only for the call that performed the stop.
    pub async fn tick(&self) -> bool {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let expired = matches!(&*state, SessionState::Active { deadline, .. } if now >= *deadline);
        if !expired {
            return false;
        }

        let event = self.stop_locked(&mut *state, StopReason::InactivityTimeout);
        drop(state);
        match event {
            Some(event) => {
                self.emit(event);
                true
            }
            None => false,
        }
    }

    async fn is_active_crawl(&self, crawl_id: &str) -> bool {
        self.inner.state.lock().await.active_id() == Some(crawl_id)
    }

    // ─── Location Events ─────────────────────────────────────────

    /// Apply a position fix to the active crawl and check for nearby bars.
    ///
    /// Normally driven by the location subscription.
    pub async fn record_fix(&self, fix: PositionFix) -> Result<(), SessionError> {
        let crawl_id = self
            .inner
            .state
            .lock()
            .await
            .active_id()
            .map(str::to_string)
            .ok_or(SessionError::NoActiveSession)?;

        if self.append_fix(&crawl_id, fix).await {
            self.detect_bars(&crawl_id, fix).await;
        }
        Ok(())
    }

    /// Append a fix to the route if `crawl_id` is still active.
    ///
    /// Does not move the inactivity deadline.
    async fn append_fix(&self, crawl_id: &str, fix: PositionFix) -> bool {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        match state.crawl_mut(crawl_id) {
            Some((crawl, true)) => {
                crawl.push_route_point(
                    RoutePoint::new(fix.latitude, fix.longitude, fix.timestamp),
                    now,
                );
                true
            }
            _ => false,
        }
    }

    /// Look up bars near `fix` and merge them into the crawl.
    ///
    /// Runs outside the state lock. The merge is applied as long as the crawl
    /// is still held, even if it stopped meanwhile.
    async fn detect_bars(&self, crawl_id: &str, fix: PositionFix) {
        let nearby = self
            .inner
            .deps
            .catalog
            .lookup_nearby(fix.latitude, fix.longitude)
            .await;
        if nearby.is_empty() {
            return;
        }

        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let Some((crawl, _)) = state.crawl_mut(crawl_id) else {
            return;
        };
        let added = crawl.merge_bars(&nearby, now);
        if !added.is_empty() {
            tracing::info!(
                user_id = %self.inner.user_id,
                crawl_id = %crawl_id,
                bars = ?added,
                "Bars visited"
            );
        }
    }

    // ─── Photo Updates ───────────────────────────────────────────

    /// Record a photo, optionally tagged with a drink.
    ///
    /// The photo is tagged with the current position when it can be resolved
    /// in time. If the crawl stops while the position is being resolved, the
    /// photo is still kept (without a location). Once a finalize has begun the
    /// photo is refused with [`SessionError::Finalizing`].
    pub async fn record_update(
        &self,
        photo_uri: impl Into<String>,
        drink_type: Option<DrinkType>,
    ) -> Result<CrawlUpdate, SessionError> {
        let photo_uri = photo_uri.into();
        if photo_uri.trim().is_empty() {
            return Err(SessionError::Validation(
                "photo_uri must not be empty".to_string(),
            ));
        }

        let crawl_id = match self.inner.state.lock().await.active_id() {
            Some(id) => id.to_string(),
            None => {
                tracing::debug!(user_id = %self.inner.user_id, "Update with no active crawl");
                return Err(SessionError::NoActiveSession);
            }
        };
        let captured_at = self.now();

        let position = self.resolve_position().await;

        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let timeout_ms = self.inner.config.inactivity_timeout_ms;
        let still_active = match &mut *state {
            SessionState::Active {
                crawl, deadline, ..
            } if crawl.id == crawl_id => {
                *deadline = now + timeout_ms;
                true
            }
            SessionState::Stopped {
                crawl, finalizing, ..
            } if crawl.id == crawl_id => {
                if *finalizing {
                    tracing::warn!(
                        user_id = %self.inner.user_id,
                        crawl_id = %crawl_id,
                        "Photo arrived after finalize began"
                    );
                    return Err(SessionError::Finalizing);
                }
                false
            }
            _ => {
                tracing::warn!(
                    user_id = %self.inner.user_id,
                    crawl_id = %crawl_id,
                    "Crawl discarded while capturing photo"
                );
                return Err(SessionError::NoActiveSession);
            }
        };

        let update = CrawlUpdate {
            id: uuid::Uuid::new_v4().to_string(),
            photo_uri,
            drink_type,
            timestamp: captured_at,
            location: position.filter(|_| still_active).map(|fix| UpdateLocation {
                latitude: fix.latitude,
                longitude: fix.longitude,
            }),
        };

        if let Some((crawl, _)) = state.crawl_mut(&crawl_id) {
            crawl.push_update(update.clone(), now);
        }
        drop(state);

        tracing::info!(
            user_id = %self.inner.user_id,
            crawl_id = %crawl_id,
            update_id = %update.id,
            drink = ?drink_type,
            located = update.location.is_some(),
            "Photo recorded"
        );
        Ok(update)
    }

    /// Best-effort one-shot position, bounded by the configured timeout.
    async fn resolve_position(&self) -> Option<PositionFix> {
        let lookup = self.inner.deps.location.current_position();
        match tokio::time::timeout(self.inner.config.position_timeout, lookup).await {
            Ok(Ok(fix)) => Some(fix),
            Ok(Err(e)) => {
                tracing::warn!(user_id = %self.inner.user_id, error = %e, "Position unavailable");
                None
            }
            Err(_) => {
                tracing::warn!(user_id = %self.inner.user_id, "Position lookup timed out");
                None
            }
        }
    }

    // ─── Read-only Views ─────────────────────────────────────────

    /// Live counters for the crawl in progress (active or stopped).
    pub async fn elapsed_stats(&self) -> Result<ElapsedStats, SessionError> {
        let state = self.inner.state.lock().await;
        let crawl = state.crawl().ok_or(SessionError::NoActiveSession)?;
        Ok(ElapsedStats {
            drinks_count: crawl.drinks.len() as u32,
            bars_hit_count: crawl.bars_hit.len() as u32,
            miles_walked: miles_walked(&crawl.route),
        })
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock().await;
        match &*state {
            SessionState::Idle => SessionSnapshot {
                phase: SessionPhase::Idle,
                stop_reason: None,
                pending_review: false,
                deadline: None,
                finalizing: false,
                crawl: None,
            },
            SessionState::Active {
                crawl, deadline, ..
            } => SessionSnapshot {
                phase: SessionPhase::Active,
                stop_reason: None,
                pending_review: false,
                deadline: Some(*deadline),
                finalizing: false,
                crawl: Some(crawl.clone()),
            },
            SessionState::Stopped {
                crawl,
                reason,
                finalizing,
            } => SessionSnapshot {
                phase: SessionPhase::Stopped,
                stop_reason: Some(*reason),
                pending_review: *reason == StopReason::InactivityTimeout,
                deadline: None,
                finalizing: *finalizing,
                crawl: Some(crawl.clone()),
            },
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        match &*self.inner.state.lock().await {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Active { .. } => SessionPhase::Active,
            SessionState::Stopped { .. } => SessionPhase::Stopped,
        }
    }

    // ─── Finalization ────────────────────────────────────────────

    /// Build the [`Crawl`] that finalizing would produce, without changing state.
    pub async fn prepare(&self, request: &FinalizeRequest) -> Result<Crawl, SessionError> {
        validate_request(request)?;
        let snapshot = self
            .inner
            .state
            .lock()
            .await
            .crawl()
            .cloned()
            .ok_or(SessionError::NoActiveSession)?;
        Ok(self.build_crawl(request, snapshot).await)
    }

    /// Finalize the crawl and return to idle.
    ///
    /// An active crawl is stopped as part of finalizing.
    pub async fn finalize(&self, request: &FinalizeRequest) -> Result<Crawl, SessionError> {
        let _guard = self.inner.finalize_lock.lock().await;
        validate_request(request)?;
        let snapshot = self.begin_finalize().await?;
        let crawl = self.build_crawl(request, snapshot).await;
        if !self.release(&crawl.id).await {
            return Err(SessionError::NoActiveSession);
        }
        Ok(crawl)
    }

    /// Finalize and hand the crawl to the upload gateway.
    ///
    /// The session is only discarded once the gateway confirms the upload; on
    /// an upload error the crawl stays held (stopped) so the caller can retry.
    pub async fn finalize_and_submit(
        &self,
        request: &FinalizeRequest,
        gateway: &UploadGateway,
    ) -> Result<SubmittedCrawl, FinalizeError> {
        let _guard = self.inner.finalize_lock.lock().await;
        validate_request(request)?;
        let snapshot = self.begin_finalize().await?;
        let crawl = self.build_crawl(request, snapshot).await;

        let receipt = match gateway.submit(&crawl, &self.inner.user_id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    user_id = %self.inner.user_id,
                    crawl_id = %crawl.id,
                    error = %e,
                    "Upload failed, crawl kept for retry"
                );
                self.abort_finalize(&crawl.id).await;
                return Err(e.into());
            }
        };

        if !self.release(&crawl.id).await {
            tracing::warn!(
                user_id = %self.inner.user_id,
                crawl_id = %crawl.id,
                "Crawl was discarded during upload"
            );
        }

        Ok(SubmittedCrawl {
            crawl: Crawl {
                city: receipt.city.clone(),
                ..crawl
            },
            receipt,
        })
    }

    /// Stop an active crawl, mark the held crawl as finalizing and return a
    /// copy of it, all in one lock step.
    ///
    /// From here on the held crawl no longer changes: fixes stop with the
    /// subscription, and photos or bar matches that resolve late are refused.
    async fn begin_finalize(&self) -> Result<ActiveCrawl, SessionError> {
        let mut state = self.inner.state.lock().await;
        let event = self.stop_locked(&mut *state, StopReason::TappedOut);
        let SessionState::Stopped {
            crawl, finalizing, ..
        } = &mut *state
        else {
            return Err(SessionError::NoActiveSession);
        };
        *finalizing = true;
        let snapshot = crawl.clone();
        drop(state);

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(snapshot)
    }

    /// Reopen a stopped crawl after a failed upload.
    async fn abort_finalize(&self, crawl_id: &str) {
        let mut state = self.inner.state.lock().await;
        if let SessionState::Stopped {
            crawl, finalizing, ..
        } = &mut *state
        {
            if crawl.id == crawl_id {
                *finalizing = false;
            }
        }
    }

    async fn build_crawl(&self, request: &FinalizeRequest, snapshot: ActiveCrawl) -> Crawl {
        let title = match request.title.trim() {
            "" => self.default_title(&snapshot).await,
            title => title.to_string(),
        };
        let caption = request
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let now = self.now();
        let updates = snapshot.selected_updates(request.selected_update_ids.as_ref());
        Crawl {
            user_id: self.inner.user_id.clone(),
            title,
            caption,
            city: None,
            start_time: snapshot.start_time,
            end_time: now,
            miles_walked: miles_walked(&snapshot.route),
            drinks_count: snapshot.drinks.len() as u32,
            updates,
            route: snapshot.route,
            drinks: snapshot.drinks,
            bars_hit: snapshot.bars_hit,
            id: snapshot.id,
            created_at: now,
        }
    }

    /// Discard the held crawl if it is still `crawl_id`. Returns whether it was.
    async fn release(&self, crawl_id: &str) -> bool {
        let previous = {
            let mut state = self.inner.state.lock().await;
            if state.crawl().map(|c| c.id.as_str()) != Some(crawl_id) {
                return false;
            }
            std::mem::replace(&mut *state, SessionState::Idle)
        };
        drop(previous);

        tracing::info!(
            user_id = %self.inner.user_id,
            crawl_id = %crawl_id,
            "Crawl finalized"
        );
        self.emit(SessionEvent::Finalized {
            crawl_id: crawl_id.to_string(),
        });
        true
    }

    /// "<City> Bar Crawl" from the last known position, else "Bar Crawl".
    async fn default_title(&self, crawl: &ActiveCrawl) -> String {
        let position = match crawl.last_point() {
            Some(p) => Some((p.latitude, p.longitude)),
            None => self
                .resolve_position()
                .await
                .map(|fix| (fix.latitude, fix.longitude)),
        };

        let city = match position {
            Some((lat, lon)) => self.inner.deps.cities.resolve_city(lat, lon).await,
            None => None,
        };

        match city {
            Some(city) => format!("{} {}", city, DEFAULT_TITLE),
            None => DEFAULT_TITLE.to_string(),
        }
    }
}

fn validate_request(request: &FinalizeRequest) -> Result<(), SessionError> {
    request
        .validate()
        .map_err(|e| SessionError::Validation(e.to_string()))
}

/// Feed fixes from the subscription into the engine until the crawl stops.
///
/// Route appends happen in arrival order; bar detection for each fix runs
/// as its own task so a slow catalog never holds up later fixes.
async fn pump_locations(engine: Weak<EngineInner>, crawl_id: String, mut stream: PositionStream) {
    while let Some(item) = stream.next().await {
        let Some(inner) = engine.upgrade() else {
            return;
        };
        let engine = SessionEngine { inner };

        match item {
            Ok(fix) => {
                if !engine.append_fix(&crawl_id, fix).await {
                    return;
                }
                let crawl_id = crawl_id.clone();
                tokio::spawn(async move { engine.detect_bars(&crawl_id, fix).await });
            }
            Err(e) => {
                // The crawl stays active; it just stops receiving fixes
                tracing::warn!(
                    user_id = %engine.inner.user_id,
                    crawl_id = %crawl_id,
                    error = %e,
                    "Location stream error"
                );
            }
        }
    }
    tracing::debug!(crawl_id = %crawl_id, "Location stream ended");
}

/// Periodically check the inactivity deadline while `crawl_id` is active.
async fn run_deadline_ticker(
    engine: Weak<EngineInner>,
    crawl_id: String,
    period: std::time::Duration,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(inner) = engine.upgrade() else {
            return;
        };
        let engine = SessionEngine { inner };
        engine.tick().await;
        if !engine.is_active_crawl(&crawl_id).await {
            return;
        }
    }
}
