// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Crawl session models: the live aggregate and the finalized record.

use crate::models::{Bar, Drink, DrinkType, RoutePoint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Coordinates attached to a photo update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpdateLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A photo captured during a crawl, optionally tagged with a drink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CrawlUpdate {
    pub id: String,
    /// Reference to the photo blob (local file URI on the device)
    pub photo_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drink_type: Option<DrinkType>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp: i64,
    /// Absent when the position could not be resolved in time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<UpdateLocation>,
}

/// The live, mutable in-progress crawl.
///
/// Only the session engine mutates this. Route, updates and drinks are
/// append-only; `bars_hit` only grows and never holds two bars with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActiveCrawl {
    pub id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub start_time: i64,
    pub route: Vec<RoutePoint>,
    pub updates: Vec<CrawlUpdate>,
    pub drinks: Vec<Drink>,
    pub bars_hit: Vec<Bar>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub last_activity_time: i64,
}

impl ActiveCrawl {
    /// Start an empty crawl.
    pub fn new(id: String, start_time: i64) -> Self {
        Self {
            id,
            start_time,
            route: Vec::new(),
            updates: Vec::new(),
            drinks: Vec::new(),
            bars_hit: Vec::new(),
            last_activity_time: start_time,
        }
    }

    /// Bump the activity time, never moving it backwards.
    pub fn touch(&mut self, now: i64) {
        self.last_activity_time = self.last_activity_time.max(now);
    }

    /// Append a GPS fix to the route.
    pub fn push_route_point(&mut self, point: RoutePoint, now: i64) {
        self.route.push(point);
        self.touch(now);
    }

    /// Append a photo update, logging a drink when it carries a drink type.
    pub fn push_update(&mut self, update: CrawlUpdate, now: i64) {
        if let Some(drink_type) = update.drink_type {
            self.drinks.push(Drink {
                drink_type,
                timestamp: update.timestamp,
            });
        }
        self.updates.push(update);
        self.touch(now);
    }

    /// Merge newly detected bars using set-union semantics.
    ///
    /// Bars already present keep their original visit timestamp. Returns the
    /// ids that were added.
    pub fn merge_bars(&mut self, detected: &[Bar], visited_at: i64) -> Vec<String> {
        let mut added = Vec::new();
        for bar in detected {
            if self.has_visited(&bar.id) {
                continue;
            }
            self.bars_hit.push(bar.visited_at(visited_at));
            added.push(bar.id.clone());
        }
        added
    }

    pub fn has_visited(&self, bar_id: &str) -> bool {
        self.bars_hit.iter().any(|b| b.id == bar_id)
    }

    /// Updates to include in a finalized crawl.
    ///
    /// An empty or missing selection means "all updates". Original order is kept.
    pub fn selected_updates(&self, selection: Option<&HashSet<String>>) -> Vec<CrawlUpdate> {
        match selection {
            Some(ids) if !ids.is_empty() => self
                .updates
                .iter()
                .filter(|u| ids.contains(&u.id))
                .cloned()
                .collect(),
            _ => self.updates.clone(),
        }
    }

    /// Most recent route point, if any.
    pub fn last_point(&self) -> Option<&RoutePoint> {
        self.route.last()
    }
}

/// Read-only projection of a crawl in progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ElapsedStats {
    pub drinks_count: u32,
    pub bars_hit_count: u32,
    pub miles_walked: f64,
}

/// A finalized, immutable crawl ready for upload and sharing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Crawl {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub start_time: i64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub end_time: i64,
    pub route: Vec<RoutePoint>,
    pub updates: Vec<CrawlUpdate>,
    pub drinks: Vec<Drink>,
    pub bars_hit: Vec<Bar>,
    pub miles_walked: f64,
    pub drinks_count: u32,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub created_at: i64,
}
