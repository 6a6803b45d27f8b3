// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user history of submitted crawls.

use crate::models::{Crawl, UserStats};
use crate::time_utils::{format_millis_rfc3339, MILLIS_PER_DAY};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Look-back window for drink totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrinkPeriod {
    Day,
    Week,
    Month,
    Year,
    #[default]
    Lifetime,
}

impl DrinkPeriod {
    /// Earliest crawl start time (epoch millis) included in the period.
    pub fn window_start(&self, now: i64) -> i64 {
        match self {
            DrinkPeriod::Day => now - MILLIS_PER_DAY,
            DrinkPeriod::Week => now - 7 * MILLIS_PER_DAY,
            DrinkPeriod::Month => now - 30 * MILLIS_PER_DAY,
            DrinkPeriod::Year => now - 365 * MILLIS_PER_DAY,
            DrinkPeriod::Lifetime => 0,
        }
    }
}

#[derive(Default)]
struct UserHistory {
    /// Newest first
    crawls: Vec<Crawl>,
    stats: UserStats,
}

/// Submitted crawls per user, kept in memory.
#[derive(Default)]
pub struct CrawlHistory {
    users: DashMap<String, UserHistory>,
}

impl CrawlHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a submitted crawl to its owner's history.
    ///
    /// Returns `false` if the crawl was already recorded.
    pub fn record(&self, crawl: Crawl, now: i64) -> bool {
        let mut entry = self.users.entry(crawl.user_id.clone()).or_default();
        if !entry
            .stats
            .update_from_crawl(&crawl, &format_millis_rfc3339(now))
        {
            tracing::debug!(crawl_id = %crawl.id, "Crawl already in history");
            return false;
        }
        entry.crawls.insert(0, crawl);
        true
    }

    /// A user's crawls, newest first.
    pub fn crawls(&self, user_id: &str) -> Vec<Crawl> {
        self.users
            .get(user_id)
            .map(|h| h.crawls.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self, user_id: &str) -> UserStats {
        self.users
            .get(user_id)
            .map(|h| h.stats.clone())
            .unwrap_or_default()
    }

    /// Drinks across crawls that started within `period` of `now`.
    pub fn drinks_count(&self, user_id: &str, period: DrinkPeriod, now: i64) -> u32 {
        let since = period.window_start(now);
        self.users
            .get(user_id)
            .map(|h| {
                h.crawls
                    .iter()
                    .filter(|c| c.start_time >= since)
                    .map(|c| c.drinks_count)
                    .sum()
            })
            .unwrap_or(0)
    }
}
