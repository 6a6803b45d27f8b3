// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walked-distance calculation over a crawl route.

use crate::models::route::route_line;
use crate::models::RoutePoint;
use geo::{Coord, Distance, HaversineMeasure, Point};

/// Earth's radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

const HAVERSINE_MILES: HaversineMeasure = HaversineMeasure::new(EARTH_RADIUS_MILES);

/// Great-circle distance between two points, in miles.
pub fn haversine_miles(a: Point<f64>, b: Point<f64>) -> f64 {
    HAVERSINE_MILES.distance(a, b)
}

/// Total miles walked along `route`, rounded to two decimals.
///
/// Consecutive points are summed in order, so the result depends on route
/// order. Fewer than two points is zero.
pub fn miles_walked(route: &[RoutePoint]) -> f64 {
    if route.len() < 2 {
        return 0.0;
    }

    let total: f64 = route_line(route)
        .lines()
        .map(|segment| haversine_miles(coord_point(segment.start), coord_point(segment.end)))
        .sum();

    round_hundredths(total)
}

fn coord_point(c: Coord<f64>) -> Point<f64> {
    Point::from(c)
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
