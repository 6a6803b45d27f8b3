// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod bar;
pub mod crawl;
pub mod drink;
pub mod route;
pub mod stats;

pub use bar::Bar;
pub use crawl::{ActiveCrawl, Crawl, CrawlUpdate, ElapsedStats, UpdateLocation};
pub use drink::{Drink, DrinkTally, DrinkType};
pub use route::RoutePoint;
pub use stats::UserStats;
