// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reverse geocoding (coordinates to city name).

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashMap;

/// Resolves a position to a human-readable city name.
///
/// `None` means the city could not be determined; callers treat that as a
/// degraded result, never as a failure.
pub trait CityResolver: Send + Sync {
    fn resolve_city(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Option<String>>;
}

/// Resolver that never knows the city.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCityResolver;

impl CityResolver for NoCityResolver {
    fn resolve_city(&self, _latitude: f64, _longitude: f64) -> BoxFuture<'_, Option<String>> {
        async { None }.boxed()
    }
}

/// Resolver backed by a fixed set of city bounding boxes.
#[derive(Debug, Default, Clone)]
pub struct BoundingBoxCityResolver {
    cities: Vec<CityBounds>,
}

#[derive(Debug, Clone)]
struct CityBounds {
    name: String,
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl BoundingBoxCityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a city covering the given latitude/longitude ranges.
    pub fn with_city(
        mut self,
        name: impl Into<String>,
        (min_lat, max_lat): (f64, f64),
        (min_lon, max_lon): (f64, f64),
    ) -> Self {
        self.cities.push(CityBounds {
            name: name.into(),
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        });
        self
    }

    /// Built-in table with the cities the default bar catalog covers.
    pub fn builtin() -> Self {
        Self::new().with_city("New York", (40.49, 40.92), (-74.27, -73.68))
    }

    fn lookup(&self, latitude: f64, longitude: f64) -> Option<String> {
        self.cities
            .iter()
            .find(|c| {
                (c.min_lat..=c.max_lat).contains(&latitude)
                    && (c.min_lon..=c.max_lon).contains(&longitude)
            })
            .map(|c| c.name.clone())
    }
}

impl CityResolver for BoundingBoxCityResolver {
    fn resolve_city(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Option<String>> {
        let city = self.lookup(latitude, longitude);
        async move { city }.boxed()
    }
}

/// Resolver answering from an exact-coordinate table (tests).
#[derive(Debug, Default)]
pub struct StaticCityResolver {
    by_coordinate: HashMap<(i64, i64), String>,
}

impl StaticCityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, latitude: f64, longitude: f64, city: impl Into<String>) {
        self.by_coordinate
            .insert(coordinate_key(latitude, longitude), city.into());
    }
}

impl CityResolver for StaticCityResolver {
    fn resolve_city(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Option<String>> {
        let city = self
            .by_coordinate
            .get(&coordinate_key(latitude, longitude))
            .cloned();
        async move { city }.boxed()
    }
}

/// Coordinates rounded to ~1 m so float noise does not miss a lookup.
fn coordinate_key(latitude: f64, longitude: f64) -> (i64, i64) {
    (
        (latitude * 100_000.0).round() as i64,
        (longitude * 100_000.0).round() as i64,
    )
}
