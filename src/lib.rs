// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Crawl-Tracker: live bar crawl sessions
//!
//! This crate provides the backend API that tracks a user's bar crawl in
//! progress (route, photos, drinks, bars visited), stops it on tap-out or
//! inactivity, and hands the finalized crawl to the upload gateway.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{CrawlHistory, SessionRegistry, UploadGateway};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub gateway: UploadGateway,
    pub history: CrawlHistory,
}
