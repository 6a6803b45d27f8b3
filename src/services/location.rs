// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geolocation source interface and an in-process push implementation.
//!
//! The session engine never owns the positioning hardware. It asks a
//! [`LocationSource`] for permission, a stream of fixes and one-shot
//! positions. Dropping the stream releases the subscription.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Throttling requested from the source when subscribing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Minimum time between delivered fixes
    pub min_interval_ms: i64,
    /// Minimum displacement between delivered fixes
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 5_000,
            min_distance_meters: 10.0,
        }
    }
}

/// Stream of fixes; dropping it ends the subscription.
pub type PositionStream = BoxStream<'static, Result<PositionFix, LocationError>>;

/// Positioning subsystem consumed by the session engine.
pub trait LocationSource: Send + Sync {
    /// Ask for (or confirm) foreground location permission.
    fn request_permission(&self) -> BoxFuture<'_, Result<(), LocationError>>;

    /// Subscribe to position updates.
    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> BoxFuture<'_, Result<PositionStream, LocationError>>;

    /// One-shot current position.
    fn current_position(&self) -> BoxFuture<'_, Result<PositionFix, LocationError>>;
}

/// Errors from the positioning subsystem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission not granted")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location stream failed: {0}")]
    Stream(String),
}

type FixSender = mpsc::UnboundedSender<Result<PositionFix, LocationError>>;

struct Subscriber {
    tx: FixSender,
    options: WatchOptions,
    last_delivered: Option<PositionFix>,
}

impl Subscriber {
    /// Whether `fix` passes the interval and displacement throttles.
    fn wants(&self, fix: &PositionFix) -> bool {
        let Some(last) = self.last_delivered else {
            return true;
        };
        let elapsed = fix.timestamp - last.timestamp;
        let moved_meters = Haversine.distance(last.point(), fix.point());
        elapsed >= self.options.min_interval_ms && moved_meters >= self.options.min_distance_meters
    }
}

struct PushState {
    permission_granted: bool,
    available: bool,
    last_fix: Option<PositionFix>,
    subscriber: Option<Subscriber>,
}

/// Location source fed from outside the process (e.g. a phone posting its
/// GPS fixes over HTTP).
///
/// Holds at most one subscriber; a new watch replaces the previous one.
pub struct PushLocationSource {
    state: Mutex<PushState>,
}

impl Default for PushLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PushLocationSource {
    /// Permission granted, subsystem available, no fixes yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PushState {
                permission_granted: true,
                available: true,
                last_fix: None,
                subscriber: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_permission(&self, granted: bool) {
        self.lock().permission_granted = granted;
    }

    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Record a new fix. Returns `true` if it was delivered to a subscriber.
    pub fn push(&self, fix: PositionFix) -> bool {
        let mut state = self.lock();
        state.last_fix = Some(fix);

        let Some(subscriber) = state.subscriber.as_mut() else {
            return false;
        };
        if !subscriber.wants(&fix) {
            return false;
        }
        if subscriber.tx.send(Ok(fix)).is_err() {
            tracing::debug!("Location subscriber gone, dropping subscription");
            state.subscriber = None;
            return false;
        }
        subscriber.last_delivered = Some(fix);
        true
    }

    /// Deliver an error to the current subscriber (e.g. permission revoked).
    pub fn fail(&self, error: LocationError) {
        let mut state = self.lock();
        if let Some(subscriber) = state.subscriber.as_ref() {
            if subscriber.tx.send(Err(error)).is_err() {
                state.subscriber = None;
            }
        }
    }

    /// Whether a live subscription is currently attached.
    pub fn is_watching(&self) -> bool {
        self.lock()
            .subscriber
            .as_ref()
            .is_some_and(|s| !s.tx.is_closed())
    }

    pub fn last_fix(&self) -> Option<PositionFix> {
        self.lock().last_fix
    }
}

impl LocationSource for PushLocationSource {
    fn request_permission(&self) -> BoxFuture<'_, Result<(), LocationError>> {
        let granted = self.lock().permission_granted;
        async move {
            if granted {
                Ok(())
            } else {
                Err(LocationError::PermissionDenied)
            }
        }
        .boxed()
    }

    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> BoxFuture<'_, Result<PositionStream, LocationError>> {
        let result = {
            let mut state = self.lock();
            if !state.permission_granted {
                Err(LocationError::PermissionDenied)
            } else if !state.available {
                Err(LocationError::Unavailable(
                    "positioning subsystem is not running".to_string(),
                ))
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                state.subscriber = Some(Subscriber {
                    tx,
                    options,
                    last_delivered: None,
                });
                Ok(UnboundedReceiverStream::new(rx).boxed())
            }
        };
        async move { result }.boxed()
    }

    fn current_position(&self) -> BoxFuture<'_, Result<PositionFix, LocationError>> {
        let result = {
            let state = self.lock();
            if !state.permission_granted {
                Err(LocationError::PermissionDenied)
            } else {
                state
                    .last_fix
                    .ok_or_else(|| LocationError::Unavailable("no fix received yet".to_string()))
            }
        };
        async move { result }.boxed()
    }
}
