// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod clock;
pub mod distance;
pub mod gateway;
pub mod geocode;
pub mod history;
pub mod location;
pub mod memory;
pub mod proximity;
pub mod registry;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gateway::{SubmitReceipt, UploadError, UploadGateway};
pub use geocode::{BoundingBoxCityResolver, CityResolver};
pub use history::{CrawlHistory, DrinkPeriod};
pub use location::{LocationError, LocationSource, PositionFix, PushLocationSource, WatchOptions};
pub use memory::{MemoryCrawlStore, MemoryPhotoStore};
pub use proximity::{BarCatalog, StaticBarCatalog};
pub use registry::{SessionRegistry, UserSession};
pub use session::{
    FinalizeError, FinalizeRequest, SessionDeps, SessionEngine, SessionError, SessionEvent,
    SessionPhase, StopReason,
};
