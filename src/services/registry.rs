// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One crawl session engine per user.

use crate::config::SessionConfig;
use crate::services::clock::Clock;
use crate::services::geocode::CityResolver;
use crate::services::location::PushLocationSource;
use crate::services::proximity::BarCatalog;
use crate::services::session::{SessionDeps, SessionEngine};
use dashmap::DashMap;
use std::sync::Arc;

/// A user's engine together with the location source feeding it.
#[derive(Clone)]
pub struct UserSession {
    pub engine: SessionEngine,
    pub location: Arc<PushLocationSource>,
}

/// Lazily creates and keeps one engine per user id.
///
/// Catalog, city resolver and clock are shared; each user gets their own
/// push location source so fixes never cross between users.
pub struct SessionRegistry {
    config: SessionConfig,
    catalog: Arc<dyn BarCatalog>,
    cities: Arc<dyn CityResolver>,
    clock: Arc<dyn Clock>,
    sessions: DashMap<String, UserSession>,
}

impl SessionRegistry {
    pub fn new(
        config: SessionConfig,
        catalog: Arc<dyn BarCatalog>,
        cities: Arc<dyn CityResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            catalog,
            cities,
            clock,
            sessions: DashMap::new(),
        }
    }

    /// The user's session, created on first use.
    pub fn session(&self, user_id: &str) -> UserSession {
        if let Some(existing) = self.sessions.get(user_id) {
            return existing.clone();
        }

        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "Creating session engine");
                let location = Arc::new(PushLocationSource::new());
                let deps = SessionDeps {
                    location: location.clone(),
                    catalog: self.catalog.clone(),
                    cities: self.cities.clone(),
                    clock: self.clock.clone(),
                };
                UserSession {
                    engine: SessionEngine::new(user_id, self.config.clone(), deps),
                    location,
                }
            })
            .clone()
    }

    /// The user's session if one was ever created.
    pub fn get(&self, user_id: &str) -> Option<UserSession> {
        self.sessions.get(user_id).map(|s| s.clone())
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Cancel every held crawl and drop all engines.
    pub async fn shutdown(&self) {
        let sessions: Vec<UserSession> = self.sessions.iter().map(|s| s.clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.engine.dispose().await;
        }
    }
}
