// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upload/persistence gateway for finalized crawls.
//!
//! Handles:
//! - Best-effort city resolution from the last route point
//! - Persisting the crawl record (with per-type drink tallies)
//! - Uploading each selected photo and recording a picture row
//!
//! A failed crawl insert fails the submission. A failed photo is skipped and
//! counted so the rest of the crawl still goes through.

use crate::models::{Bar, Crawl, CrawlUpdate, DrinkTally, DrinkType, RoutePoint};
use crate::services::geocode::CityResolver;
use crate::time_utils::format_millis_rfc3339;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage bucket prefix for crawl photos.
pub const PHOTO_BUCKET: &str = "crawl-photos";

/// Crawl row as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub user_id: String,
    /// Id the session engine assigned to the crawl
    pub client_crawl_id: String,
    pub title: String,
    pub caption: Option<String>,
    pub city: Option<String>,
    /// RFC3339
    pub start_time: String,
    /// RFC3339
    pub end_time: String,
    pub status: String,
    pub total_drinks: u32,
    #[serde(flatten)]
    pub drinks: DrinkTally,
    pub total_bars: u32,
    pub total_miles: f64,
    pub bars_hit: Vec<Bar>,
    pub route_coordinates: Vec<RoutePoint>,
}

impl CrawlRecord {
    fn from_crawl(crawl: &Crawl, user_id: &str, city: Option<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            client_crawl_id: crawl.id.clone(),
            title: crawl.title.clone(),
            caption: crawl.caption.clone(),
            city,
            start_time: format_millis_rfc3339(crawl.start_time),
            end_time: format_millis_rfc3339(crawl.end_time),
            status: "completed".to_string(),
            total_drinks: crawl.drinks_count,
            drinks: DrinkTally::from_drinks(&crawl.drinks),
            total_bars: crawl.bars_hit.len() as u32,
            total_miles: crawl.miles_walked,
            bars_hit: crawl.bars_hit.clone(),
            route_coordinates: crawl.route.clone(),
        }
    }
}

/// Picture row as persisted, one per uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureRecord {
    pub crawl_id: String,
    pub user_id: String,
    pub image_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub drink_type: Option<DrinkType>,
    pub included_in_post: bool,
    pub carousel_order: u32,
    /// RFC3339
    pub taken_at: String,
}

/// Crawl and picture persistence.
pub trait CrawlStore: Send + Sync {
    /// Insert a crawl and return its stored id.
    fn insert_crawl(&self, record: CrawlRecord) -> BoxFuture<'_, Result<String, UploadError>>;

    fn insert_picture(&self, picture: PictureRecord) -> BoxFuture<'_, Result<(), UploadError>>;
}

/// Blob storage for photos.
pub trait PhotoStore: Send + Sync {
    /// Copy the blob at `photo_uri` to `object_path`; returns its public URL.
    fn upload(
        &self,
        object_path: String,
        photo_uri: String,
    ) -> BoxFuture<'_, Result<String, UploadError>>;
}

/// Outcome of a successful submission.
///
/// Photo failures do not fail the submission; they are reported here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmitReceipt {
    /// Stored crawl id
    pub crawl_id: String,
    pub city: Option<String>,
    pub photos_uploaded: u32,
    pub photos_failed: u32,
    /// Update ids whose photo could not be stored
    pub failed_update_ids: Vec<String>,
}

impl SubmitReceipt {
    /// Returns true if every photo was stored.
    pub fn is_complete_success(&self) -> bool {
        self.photos_failed == 0
    }

    /// Returns true if some photos were stored and some failed.
    pub fn is_partial_failure(&self) -> bool {
        self.photos_uploaded > 0 && self.photos_failed > 0
    }
}

/// Persists finalized crawls and their photos.
#[derive(Clone)]
pub struct UploadGateway {
    crawls: Arc<dyn CrawlStore>,
    photos: Arc<dyn PhotoStore>,
    cities: Arc<dyn CityResolver>,
}

impl UploadGateway {
    pub fn new(
        crawls: Arc<dyn CrawlStore>,
        photos: Arc<dyn PhotoStore>,
        cities: Arc<dyn CityResolver>,
    ) -> Self {
        Self {
            crawls,
            photos,
            cities,
        }
    }

    /// Persist `crawl` on behalf of `user_id`.
    pub async fn submit(&self, crawl: &Crawl, user_id: &str) -> Result<SubmitReceipt, UploadError> {
        tracing::info!(
            user_id,
            crawl_id = %crawl.id,
            updates = crawl.updates.len(),
            "Submitting crawl"
        );

        let city = self.resolve_city(crawl).await;
        let record = CrawlRecord::from_crawl(crawl, user_id, city.clone());
        let stored_id = self.crawls.insert_crawl(record).await?;

        let mut receipt = SubmitReceipt {
            crawl_id: stored_id,
            city,
            ..SubmitReceipt::default()
        };

        for (order, update) in crawl.updates.iter().enumerate() {
            match self
                .upload_picture(&receipt.crawl_id, user_id, update, order as u32)
                .await
            {
                Ok(()) => receipt.photos_uploaded += 1,
                Err(e) => {
                    tracing::warn!(
                        crawl_id = %receipt.crawl_id,
                        update_id = %update.id,
                        error = %e,
                        "Photo upload failed, continuing"
                    );
                    receipt.photos_failed += 1;
                    receipt.failed_update_ids.push(update.id.clone());
                }
            }
        }

        tracing::info!(
            crawl_id = %receipt.crawl_id,
            photos_uploaded = receipt.photos_uploaded,
            photos_failed = receipt.photos_failed,
            "Crawl submitted"
        );
        Ok(receipt)
    }

    async fn resolve_city(&self, crawl: &Crawl) -> Option<String> {
        let last = crawl.route.last()?;
        let city = self.cities.resolve_city(last.latitude, last.longitude).await;
        if city.is_none() {
            tracing::warn!(crawl_id = %crawl.id, "Could not determine city for crawl");
        }
        city
    }

    async fn upload_picture(
        &self,
        crawl_id: &str,
        user_id: &str,
        update: &CrawlUpdate,
        carousel_order: u32,
    ) -> Result<(), UploadError> {
        let object_path = format!("{}/{}/{}.jpg", PHOTO_BUCKET, crawl_id, update.id);
        let image_url = self
            .photos
            .upload(object_path, update.photo_uri.clone())
            .await?;

        self.crawls
            .insert_picture(PictureRecord {
                crawl_id: crawl_id.to_string(),
                user_id: user_id.to_string(),
                image_url,
                latitude: update.location.map(|l| l.latitude),
                longitude: update.location.map(|l| l.longitude),
                drink_type: update.drink_type,
                included_in_post: true,
                carousel_order,
                taken_at: format_millis_rfc3339(update.timestamp),
            })
            .await
    }
}

/// Errors from the persistence gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to store crawl: {0}")]
    Store(String),

    #[error("Failed to store photo: {0}")]
    Photo(String),
}
