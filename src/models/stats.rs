//! Per-user crawl aggregates for the profile screen.
//!
//! Updated once per submitted crawl, so profile reads do not have to walk
//! the whole crawl history.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{Crawl, DrinkTally};
use crate::time_utils::format_millis_rfc3339;

/// Pre-computed statistics for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    // ─── Crawl Totals ────────────────────────────────────────────
    /// Total crawls submitted
    #[serde(default)]
    pub total_crawls: u32,
    /// Total miles walked across all crawls
    #[serde(default)]
    pub total_miles: f64,
    /// Total drinks across all crawls
    #[serde(default)]
    pub total_drinks: u32,

    // ─── Drinks ──────────────────────────────────────────────────
    #[serde(default)]
    pub drinks_by_type: DrinkTally,

    // ─── Bars ────────────────────────────────────────────────────
    /// Visit count per catalog bar id
    #[serde(default)]
    pub bar_visits: HashMap<String, u32>,

    // ─── Time Series ─────────────────────────────────────────────
    /// Crawl count per month ("YYYY-MM" format)
    #[serde(default)]
    pub crawls_by_month: HashMap<String, u32>,

    // ─── Idempotency ─────────────────────────────────────────────
    #[serde(default)]
    pub processed_crawl_ids: HashSet<String>,

    /// Last update timestamp (ISO 8601)
    #[serde(default)]
    pub updated_at: String,
}

impl UserStats {
    /// Fold a submitted crawl into the aggregates.
    ///
    /// Returns `false` (and changes nothing) if the crawl was already counted.
    pub fn update_from_crawl(&mut self, crawl: &Crawl, now: &str) -> bool {
        if !self.processed_crawl_ids.insert(crawl.id.clone()) {
            return false;
        }
        self.updated_at = now.to_string();

        self.total_crawls += 1;
        self.total_miles += crawl.miles_walked;
        self.total_drinks += crawl.drinks_count;

        for drink in &crawl.drinks {
            self.drinks_by_type.add(drink.drink_type);
        }

        for bar in &crawl.bars_hit {
            *self.bar_visits.entry(bar.id.clone()).or_insert(0) += 1;
        }

        if let Some(month_key) = extract_month_key(&format_millis_rfc3339(crawl.start_time)) {
            *self.crawls_by_month.entry(month_key).or_insert(0) += 1;
        }

        true
    }
}

/// Extract "YYYY-MM" from an ISO 8601 date string.
fn extract_month_key(date: &str) -> Option<String> {
    date.get(..7).map(str::to_string)
}
