// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use crawl_tracker::config::{Config, SessionConfig};
use crawl_tracker::middleware::auth::create_jwt;
use crawl_tracker::routes::create_router;
use crawl_tracker::services::gateway::{CrawlRecord, CrawlStore, PictureRecord};
use crawl_tracker::services::geocode::CityResolver;
use crawl_tracker::services::location::PositionStream;
use crawl_tracker::services::{
    BoundingBoxCityResolver, CrawlHistory, LocationError, LocationSource, ManualClock,
    MemoryCrawlStore, MemoryPhotoStore, PositionFix, PushLocationSource, SessionDeps,
    SessionEngine, SessionRegistry, StaticBarCatalog, UploadError, UploadGateway, WatchOptions,
};
use crawl_tracker::AppState;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// 2023-11-14T22:13:20Z
#[allow(dead_code)]
pub const T0: i64 = 1_700_000_000_000;

/// Two hours in millis.
#[allow(dead_code)]
pub const TIMEOUT_MS: i64 = 2 * 60 * 60 * 1000;

/// Session config for tests: every fix is delivered and the background
/// ticker effectively never fires, so tests drive `tick()` themselves.
#[allow(dead_code)]
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        inactivity_timeout_ms: TIMEOUT_MS,
        tick_interval: Duration::from_secs(3600),
        watch: WatchOptions {
            min_interval_ms: 0,
            min_distance_meters: 0.0,
        },
        position_timeout: Duration::from_millis(200),
        proximity_threshold_miles: 0.05,
    }
}

/// An engine wired to in-process fakes.
#[allow(dead_code)]
pub struct TestEngine {
    pub engine: SessionEngine,
    pub location: Arc<PushLocationSource>,
    pub clock: Arc<ManualClock>,
}

#[allow(dead_code)]
pub fn test_engine() -> TestEngine {
    test_engine_with_config(test_session_config())
}

#[allow(dead_code)]
pub fn test_engine_with_config(config: SessionConfig) -> TestEngine {
    let location = Arc::new(PushLocationSource::new());
    build_test_engine(config, location.clone(), location)
}

/// Engine whose location collaborator is `source`; `push` is the source the
/// test feeds fixes into (often the same object).
#[allow(dead_code)]
pub fn test_engine_with_source(
    source: Arc<dyn LocationSource>,
    push: Arc<PushLocationSource>,
) -> TestEngine {
    build_test_engine(test_session_config(), source, push)
}

fn build_test_engine(
    config: SessionConfig,
    source: Arc<dyn LocationSource>,
    push: Arc<PushLocationSource>,
) -> TestEngine {
    let clock = Arc::new(ManualClock::new(T0));
    let deps = SessionDeps {
        location: source,
        catalog: Arc::new(StaticBarCatalog::builtin()),
        cities: Arc::new(BoundingBoxCityResolver::builtin()),
        clock: clock.clone(),
    };
    TestEngine {
        engine: SessionEngine::new("user-1", config, deps),
        location: push,
        clock,
    }
}

/// Location source whose one-shot lookup (and optionally the permission
/// prompt) blocks until the test opens the gate.
#[allow(dead_code)]
pub struct GatedLocationSource {
    pub inner: Arc<PushLocationSource>,
    pub gate: Semaphore,
    pub waiting: AtomicUsize,
    gate_permission: bool,
}

#[allow(dead_code)]
impl GatedLocationSource {
    pub fn new(inner: Arc<PushLocationSource>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
            gate_permission: false,
        }
    }

    /// Gate the permission prompt instead of position lookups.
    pub fn gating_permission(inner: Arc<PushLocationSource>) -> Self {
        Self {
            gate_permission: true,
            ..Self::new(inner)
        }
    }

    async fn pass_gate(&self) -> Result<(), LocationError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| LocationError::Unavailable("gate closed".to_string()))?;
        Ok(())
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

impl LocationSource for GatedLocationSource {
    fn request_permission(&self) -> BoxFuture<'_, Result<(), LocationError>> {
        async move {
            if self.gate_permission {
                self.pass_gate().await?;
            }
            self.inner.request_permission().await
        }
        .boxed()
    }

    fn watch_position(
        &self,
        options: WatchOptions,
    ) -> BoxFuture<'_, Result<PositionStream, LocationError>> {
        self.inner.watch_position(options)
    }

    fn current_position(&self) -> BoxFuture<'_, Result<PositionFix, LocationError>> {
        async move {
            if !self.gate_permission {
                self.pass_gate().await?;
            }
            self.inner.current_position().await
        }
        .boxed()
    }
}

/// Poll `check` until it returns true or two seconds pass.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Gateway plus handles on its in-memory stores.
#[allow(dead_code)]
pub struct TestGateway {
    pub gateway: UploadGateway,
    pub crawls: Arc<MemoryCrawlStore>,
    pub photos: Arc<MemoryPhotoStore>,
}

#[allow(dead_code)]
pub fn test_gateway_with_cities(cities: Arc<dyn CityResolver>) -> TestGateway {
    let crawls = Arc::new(MemoryCrawlStore::new());
    let photos = Arc::new(MemoryPhotoStore::new("https://storage.test"));
    TestGateway {
        gateway: UploadGateway::new(crawls.clone(), photos.clone(), cities),
        crawls,
        photos,
    }
}

#[allow(dead_code)]
pub fn test_gateway() -> TestGateway {
    test_gateway_with_cities(Arc::new(BoundingBoxCityResolver::builtin()))
}

/// Crawl store that takes `delay` to accept each crawl row.
#[allow(dead_code)]
pub struct SlowCrawlStore {
    inner: Arc<MemoryCrawlStore>,
    delay: Duration,
}

impl CrawlStore for SlowCrawlStore {
    fn insert_crawl(&self, record: CrawlRecord) -> BoxFuture<'_, Result<String, UploadError>> {
        async move {
            tokio::time::sleep(self.delay).await;
            self.inner.insert_crawl(record).await
        }
        .boxed()
    }

    fn insert_picture(&self, picture: PictureRecord) -> BoxFuture<'_, Result<(), UploadError>> {
        self.inner.insert_picture(picture)
    }
}

/// Gateway whose crawl inserts are slowed down by `delay`.
#[allow(dead_code)]
pub fn test_slow_gateway(delay: Duration) -> TestGateway {
    let crawls = Arc::new(MemoryCrawlStore::new());
    let photos = Arc::new(MemoryPhotoStore::new("https://storage.test"));
    let store = Arc::new(SlowCrawlStore {
        inner: crawls.clone(),
        delay,
    });
    TestGateway {
        gateway: UploadGateway::new(
            store,
            photos.clone(),
            Arc::new(BoundingBoxCityResolver::builtin()),
        ),
        crawls,
        photos,
    }
}

/// Router, shared state and handles on the fakes behind it.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub crawls: Arc<MemoryCrawlStore>,
    pub photos: Arc<MemoryPhotoStore>,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config {
        session: test_session_config(),
        ..Config::test_default()
    };
    let clock = Arc::new(ManualClock::new(T0));
    let cities = Arc::new(BoundingBoxCityResolver::builtin());
    let TestGateway {
        gateway,
        crawls,
        photos,
    } = test_gateway_with_cities(cities.clone());

    let sessions = SessionRegistry::new(
        config.session.clone(),
        Arc::new(StaticBarCatalog::builtin()),
        cities,
        clock.clone(),
    );

    let state = Arc::new(AppState {
        config,
        sessions,
        gateway,
        history: CrawlHistory::new(),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        clock,
        crawls,
        photos,
    }
}

/// Create a valid JWT for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str) -> String {
    let config = Config::test_default();
    create_jwt(user_id, &config.jwt_signing_key).expect("Failed to create test JWT")
}
