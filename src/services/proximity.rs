// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bar catalog loading and proximity detection.
//!
//! Proximity uses a planar approximation in degree space (one degree taken
//! as 69 miles). It only gates a "nearby" flag, so it is deliberately coarse.

use crate::models::Bar;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use geo::Point;
use geojson::GeoJson;
use std::fs;
use std::path::Path;

/// Rough miles per degree used by the planar approximation.
pub const MILES_PER_DEGREE: f64 = 69.0;

/// Default "nearby" radius (~264 feet).
pub const DEFAULT_THRESHOLD_MILES: f64 = 0.05;

/// Planar distance between two points, in approximate miles.
pub fn planar_miles(a: Point<f64>, b: Point<f64>) -> f64 {
    (a.x() - b.x()).hypot(a.y() - b.y()) * MILES_PER_DEGREE
}

/// Catalog entries strictly closer than `threshold_miles` to `position`.
pub fn nearby_bars(position: Point<f64>, catalog: &[Bar], threshold_miles: f64) -> Vec<Bar> {
    catalog
        .iter()
        .filter(|bar| planar_miles(position, bar.point()) < threshold_miles)
        .cloned()
        .collect()
}

/// Source of bars near a position.
pub trait BarCatalog: Send + Sync {
    fn lookup_nearby(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Vec<Bar>>;
}

/// In-memory catalog of bars.
#[derive(Debug, Clone)]
pub struct StaticBarCatalog {
    bars: Vec<Bar>,
    threshold_miles: f64,
}

impl Default for StaticBarCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticBarCatalog {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            threshold_miles: DEFAULT_THRESHOLD_MILES,
        }
    }

    /// Built-in catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        Self::new(vec![
            Bar::new("bar1", "The Local Pub", 40.7128, -74.0060),
            Bar::new("bar2", "Cocktail Lounge", 40.7138, -74.0070),
            Bar::new("bar3", "Beer Garden", 40.7148, -74.0080),
        ])
    }

    pub fn with_threshold(mut self, threshold_miles: f64) -> Self {
        self.threshold_miles = threshold_miles;
        self
    }

    /// Load bars from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load bars from a GeoJSON string.
    ///
    /// Expects a FeatureCollection of Point features with `id` and `name`
    /// properties. Features without an id or with other geometry are skipped.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| CatalogError::ParseError(e.to_string()))?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(CatalogError::NotAFeatureCollection);
        };

        let mut bars = Vec::new();
        for feature in collection.features {
            let Some(id) = feature
                .property("id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
            else {
                continue;
            };

            let name = feature
                .property("name")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string();

            let Some(geom) = feature.geometry else {
                continue;
            };
            match geom.value {
                geojson::Value::Point(position) if position.len() >= 2 => {
                    bars.push(Bar::new(id, name, position[1], position[0]));
                }
                _ => {
                    tracing::debug!(bar_id = %id, "Skipping bar with non-point geometry");
                }
            }
        }

        tracing::info!(count = bars.len(), "Loaded bar catalog");
        Ok(Self::new(bars))
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn threshold_miles(&self) -> f64 {
        self.threshold_miles
    }

    /// Bars within the threshold of a position.
    pub fn nearby(&self, latitude: f64, longitude: f64) -> Vec<Bar> {
        nearby_bars(
            Point::new(longitude, latitude),
            &self.bars,
            self.threshold_miles,
        )
    }
}

impl BarCatalog for StaticBarCatalog {
    fn lookup_nearby(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Vec<Bar>> {
        let found = self.nearby(latitude, longitude);
        async move { found }.boxed()
    }
}

/// Errors from catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Bar catalog must be a GeoJSON FeatureCollection")]
    NotAFeatureCollection,
}
