// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory crawl and photo stores.

use crate::services::gateway::{CrawlRecord, CrawlStore, PhotoStore, PictureRecord, UploadError};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Crawl store held in process memory.
#[derive(Default)]
pub struct MemoryCrawlStore {
    crawls: DashMap<String, CrawlRecord>,
    pictures: Mutex<Vec<PictureRecord>>,
    /// Reject crawl inserts (simulates an unreachable database)
    offline: AtomicBool,
}

impl MemoryCrawlStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn crawl(&self, stored_id: &str) -> Option<CrawlRecord> {
        self.crawls.get(stored_id).map(|r| r.value().clone())
    }

    pub fn crawl_count(&self) -> usize {
        self.crawls.len()
    }

    /// Pictures stored for a crawl, in carousel order.
    pub fn pictures_for(&self, stored_id: &str) -> Vec<PictureRecord> {
        let mut pictures: Vec<PictureRecord> = self
            .pictures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.crawl_id == stored_id)
            .cloned()
            .collect();
        pictures.sort_by_key(|p| p.carousel_order);
        pictures
    }
}

impl CrawlStore for MemoryCrawlStore {
    fn insert_crawl(&self, record: CrawlRecord) -> BoxFuture<'_, Result<String, UploadError>> {
        let result = if self.offline.load(Ordering::SeqCst) {
            Err(UploadError::Store("database offline".to_string()))
        } else {
            let id = uuid::Uuid::new_v4().to_string();
            self.crawls.insert(id.clone(), record);
            Ok(id)
        };
        async move { result }.boxed()
    }

    fn insert_picture(&self, picture: PictureRecord) -> BoxFuture<'_, Result<(), UploadError>> {
        self.pictures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(picture);
        async { Ok(()) }.boxed()
    }
}

/// Photo store held in process memory.
#[derive(Default)]
pub struct MemoryPhotoStore {
    base_url: String,
    objects: DashMap<String, String>,
    /// Photo URIs that should fail to upload
    failing_uris: Mutex<HashSet<String>>,
}

impl MemoryPhotoStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Make uploads of these photo URIs fail.
    pub fn set_failing_uris(&self, uris: impl IntoIterator<Item = String>) {
        let mut guard = self
            .failing_uris
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        guard.extend(uris);
    }

    /// Source URI stored at `object_path`.
    pub fn object(&self, object_path: &str) -> Option<String> {
        self.objects.get(object_path).map(|o| o.value().clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl PhotoStore for MemoryPhotoStore {
    fn upload(
        &self,
        object_path: String,
        photo_uri: String,
    ) -> BoxFuture<'_, Result<String, UploadError>> {
        let failing = self
            .failing_uris
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&photo_uri);

        let result = if failing {
            Err(UploadError::Photo(format!("could not read {}", photo_uri)))
        } else {
            let url = format!("{}/{}", self.base_url.trim_end_matches('/'), object_path);
            self.objects.insert(object_path, photo_uri);
            Ok(url)
        };
        async move { result }.boxed()
    }
}
