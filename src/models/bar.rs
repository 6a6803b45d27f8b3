// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Bar (point of interest) model.

use geo::Point;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A bar the proximity detector can match against a walker's position.
///
/// Catalog entries always have `visited == false`; the session keeps its own
/// copy that is marked visited on first detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Bar {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub visited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub visit_timestamp: Option<i64>,
}

impl Bar {
    /// Create an unvisited catalog entry.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            visited: false,
            visit_timestamp: None,
        }
    }

    /// Session-local copy marked as visited at `timestamp`.
    pub fn visited_at(&self, timestamp: i64) -> Self {
        Self {
            visited: true,
            visit_timestamp: Some(timestamp),
            ..self.clone()
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}
