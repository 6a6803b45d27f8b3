// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Crawl session engine lifecycle tests.
//!
//! These drive a real engine against a push location source, the built-in
//! bar catalog and a manual clock. Fixes fed through the location source go
//! through the background pump, so those tests poll with `wait_until`.

use crawl_tracker::config::SessionConfig;
use crawl_tracker::models::DrinkType;
use crawl_tracker::services::{
    FinalizeRequest, PositionFix, PushLocationSource, SessionEngine, SessionError,
    SessionEvent, SessionPhase, StopReason,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

mod common;

use common::{
    test_engine, test_engine_with_config, test_engine_with_source, test_session_config,
    wait_until, GatedLocationSource, T0, TIMEOUT_MS,
};

const MINUTE_MS: i64 = 60 * 1000;

/// Three fixes walking north from The Local Pub, 0.30 miles in total.
const WALK: [(f64, f64); 3] = [
    (40.71280, -74.0060),
    (40.71497, -74.0060),
    (40.71714, -74.0060),
];

async fn route_len(engine: &SessionEngine) -> usize {
    engine
        .snapshot()
        .await
        .crawl
        .map(|c| c.route.len())
        .unwrap_or(0)
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// ─── Start ───────────────────────────────────────────────────

#[tokio::test]
async fn test_start_creates_empty_crawl() {
    let t = test_engine();
    let crawl = t.engine.start_session().await.unwrap();

    assert_eq!(crawl.start_time, T0);
    assert!(crawl.route.is_empty());
    assert!(crawl.updates.is_empty());
    assert!(crawl.drinks.is_empty());
    assert!(crawl.bars_hit.is_empty());
    assert_eq!(t.engine.phase().await, SessionPhase::Active);
    assert!(t.location.is_watching());

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.deadline, Some(T0 + TIMEOUT_MS));
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let t = test_engine();
    let first = t.engine.start_session().await.unwrap();

    assert_eq!(
        t.engine.start_session().await.unwrap_err(),
        SessionError::SessionAlreadyActive
    );

    // Still rejected while the stopped crawl awaits review
    t.engine.tap_out().await.unwrap();
    assert_eq!(
        t.engine.start_session().await.unwrap_err(),
        SessionError::SessionAlreadyActive
    );

    let held = t.engine.snapshot().await.crawl.unwrap();
    assert_eq!(held.id, first.id, "Original crawl must be untouched");
}

#[tokio::test]
async fn test_slow_permission_prompt_does_not_block_reads() {
    let push = Arc::new(PushLocationSource::new());
    let gated = Arc::new(GatedLocationSource::gating_permission(push.clone()));
    let t = test_engine_with_source(gated.clone(), push.clone());

    let engine = t.engine.clone();
    let first = tokio::spawn(async move { engine.start_session().await });
    let gate = &gated;
    assert!(wait_until(|| async move { gate.waiting() == 1 }).await);

    let snapshot = tokio::time::timeout(Duration::from_millis(100), t.engine.snapshot())
        .await
        .expect("snapshot blocked behind the permission prompt");
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(!t.engine.tick().await);

    // Queued behind the first start, then sees its crawl
    let engine = t.engine.clone();
    let second = tokio::spawn(async move { engine.start_session().await });
    gated.open();

    let crawl = first.await.unwrap().unwrap();
    assert_eq!(
        second.await.unwrap().unwrap_err(),
        SessionError::SessionAlreadyActive
    );
    assert_eq!(t.engine.snapshot().await.crawl.unwrap().id, crawl.id);

    // The winner's subscription is still live
    push.push(PositionFix::new(40.7128, -74.0060, T0));
    let engine = &t.engine;
    assert!(wait_until(|| async move { route_len(engine).await == 1 }).await);
}

#[tokio::test]
async fn test_permission_denied_leaves_engine_idle() {
    let t = test_engine();
    t.location.set_permission(false);

    assert_eq!(
        t.engine.start_session().await.unwrap_err(),
        SessionError::PermissionDenied
    );
    assert_eq!(t.engine.phase().await, SessionPhase::Idle);
    assert!(!t.location.is_watching());
}

#[tokio::test]
async fn test_unavailable_location_leaves_engine_idle() {
    let t = test_engine();
    t.location.set_available(false);

    assert!(matches!(
        t.engine.start_session().await,
        Err(SessionError::LocationUnavailable(_))
    ));
    assert_eq!(t.engine.phase().await, SessionPhase::Idle);
}

// ─── Route & Bars ────────────────────────────────────────────

#[tokio::test]
async fn test_fixes_from_source_build_route_in_order() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    let mut previous = Vec::new();
    for (i, (lat, lon)) in WALK.iter().enumerate() {
        assert!(t
            .location
            .push(PositionFix::new(*lat, *lon, T0 + i as i64 * 1_000)));

        let engine = &t.engine;
        let expected = i + 1;
        assert!(wait_until(|| async move { route_len(engine).await == expected }).await);

        // Append-only: earlier points never change
        let route = t.engine.snapshot().await.crawl.unwrap().route;
        assert_eq!(&route[..previous.len()], &previous[..]);
        previous = route;
    }

    let timestamps: Vec<i64> = previous.iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![T0, T0 + 1_000, T0 + 2_000]);
}

#[tokio::test]
async fn test_bar_detected_once_across_fixes() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0))
        .await
        .unwrap();
    t.clock.advance(MINUTE_MS);
    t.engine
        .record_fix(PositionFix::new(40.71281, -74.0060, T0 + MINUTE_MS))
        .await
        .unwrap();

    let crawl = t.engine.snapshot().await.crawl.unwrap();
    assert_eq!(crawl.route.len(), 2);
    assert_eq!(crawl.bars_hit.len(), 1);
    assert_eq!(crawl.bars_hit[0].id, "bar1");
    assert!(crawl.bars_hit[0].visited);
    assert_eq!(
        crawl.bars_hit[0].visit_timestamp,
        Some(T0),
        "Visit time is set on first detection only"
    );
}

#[tokio::test]
async fn test_bars_accumulate_across_fixes() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0))
        .await
        .unwrap();
    t.engine
        .record_fix(PositionFix::new(40.7148, -74.0080, T0 + 1_000))
        .await
        .unwrap();

    let ids: Vec<String> = t
        .engine
        .snapshot()
        .await
        .crawl
        .unwrap()
        .bars_hit
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec!["bar1", "bar3"]);
}

#[tokio::test]
async fn test_elapsed_stats_track_crawl() {
    let t = test_engine();
    assert_eq!(
        t.engine.elapsed_stats().await.unwrap_err(),
        SessionError::NoActiveSession
    );

    t.engine.start_session().await.unwrap();
    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0))
        .await
        .unwrap();
    t.engine
        .record_fix(PositionFix::new(40.7138, -74.0070, T0 + 1_000))
        .await
        .unwrap();
    t.engine
        .record_update("file:///a.jpg", Some(DrinkType::Shot))
        .await
        .unwrap();

    let stats = t.engine.elapsed_stats().await.unwrap();
    assert_eq!(stats.drinks_count, 1);
    assert_eq!(stats.bars_hit_count, 2);
    assert_eq!(stats.miles_walked, 0.09);

    // Still readable while stopped
    t.engine.tap_out().await.unwrap();
    assert_eq!(t.engine.elapsed_stats().await.unwrap(), stats);
}

#[tokio::test]
async fn test_stream_error_keeps_session_active() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();
    t.location.push(PositionFix::new(40.7128, -74.0060, T0));
    let engine = &t.engine;
    assert!(wait_until(|| async move { route_len(engine).await == 1 }).await);

    t.location
        .fail(crawl_tracker::services::LocationError::PermissionDenied);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(snapshot.crawl.unwrap().route.len(), 1);
}

// ─── Photo Updates ───────────────────────────────────────────

#[tokio::test]
async fn test_update_tagged_with_last_position() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();
    t.location.push(PositionFix::new(40.7138, -74.0070, T0));

    t.clock.advance(MINUTE_MS);
    let update = t
        .engine
        .record_update("file:///beer.jpg", Some(DrinkType::Beer))
        .await
        .unwrap();

    assert_eq!(update.timestamp, T0 + MINUTE_MS);
    let location = update.location.expect("position should be attached");
    assert_eq!(location.latitude, 40.7138);
    assert_eq!(location.longitude, -74.0070);

    let crawl = t.engine.snapshot().await.crawl.unwrap();
    assert_eq!(crawl.updates.len(), 1);
    assert_eq!(crawl.drinks.len(), 1);
    assert_eq!(crawl.drinks[0].drink_type, DrinkType::Beer);
    assert_eq!(crawl.last_activity_time, T0 + MINUTE_MS);
}

#[tokio::test]
async fn test_update_without_position_is_kept() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    let update = t.engine.record_update("file:///dark.jpg", None).await.unwrap();
    assert!(update.location.is_none());
    assert_eq!(t.engine.snapshot().await.crawl.unwrap().updates.len(), 1);
}

#[tokio::test]
async fn test_update_requires_active_session() {
    let t = test_engine();
    assert_eq!(
        t.engine.record_update("file:///a.jpg", None).await.unwrap_err(),
        SessionError::NoActiveSession
    );

    t.engine.start_session().await.unwrap();
    t.engine.tap_out().await.unwrap();
    assert_eq!(
        t.engine.record_update("file:///a.jpg", None).await.unwrap_err(),
        SessionError::NoActiveSession
    );
}

#[tokio::test]
async fn test_update_rejects_empty_photo_uri() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    assert!(matches!(
        t.engine.record_update("  ", None).await,
        Err(SessionError::Validation(_))
    ));
    assert!(t.engine.snapshot().await.crawl.unwrap().updates.is_empty());
}

#[tokio::test]
async fn test_capture_in_flight_during_stop_keeps_photo() {
    let push = Arc::new(PushLocationSource::new());
    let gated = Arc::new(GatedLocationSource::new(push.clone()));
    let t = test_engine_with_source(gated.clone(), push.clone());
    t.engine.start_session().await.unwrap();
    push.push(PositionFix::new(40.7128, -74.0060, T0));

    let engine = t.engine.clone();
    let capture = tokio::spawn(async move {
        engine
            .record_update("file:///late.jpg", Some(DrinkType::Wine))
            .await
    });

    let gate = &gated;
    assert!(wait_until(|| async move { gate.waiting() == 1 }).await);
    t.engine.tap_out().await.unwrap();
    gated.open();

    let update = capture.await.unwrap().unwrap();
    assert!(
        update.location.is_none(),
        "Capture resolved after stop carries no location"
    );

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Stopped);
    let crawl = snapshot.crawl.unwrap();
    assert_eq!(crawl.updates.len(), 1);
    assert_eq!(crawl.drinks.len(), 1);
}

#[tokio::test]
async fn test_slow_position_lookup_times_out() {
    let push = Arc::new(PushLocationSource::new());
    let gated = Arc::new(GatedLocationSource::new(push.clone()));
    let t = test_engine_with_source(gated.clone(), push);
    t.engine.start_session().await.unwrap();

    // Gate never opens; the configured position timeout applies
    let update = t.engine.record_update("file:///a.jpg", None).await.unwrap();
    assert!(update.location.is_none());
    assert_eq!(t.engine.phase().await, SessionPhase::Active);
}

// ─── Inactivity Timeout ──────────────────────────────────────

#[tokio::test]
async fn test_timeout_auto_stops_exactly_once() {
    let t = test_engine();
    let mut events = t.engine.subscribe();
    let crawl = t.engine.start_session().await.unwrap();

    t.clock.set(T0 + TIMEOUT_MS - 1);
    assert!(!t.engine.tick().await);
    assert_eq!(t.engine.phase().await, SessionPhase::Active);

    t.clock.set(T0 + TIMEOUT_MS);
    assert!(t.engine.tick().await);
    assert!(!t.engine.tick().await);

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Stopped);
    assert_eq!(snapshot.stop_reason, Some(StopReason::InactivityTimeout));
    assert!(snapshot.pending_review);
    assert_eq!(snapshot.crawl.unwrap().id, crawl.id);

    let auto_stops = drain(&mut events)
        .into_iter()
        .filter(SessionEvent::is_auto_stop)
        .count();
    assert_eq!(auto_stops, 1);

    let location = &t.location;
    assert!(wait_until(|| async move { !location.is_watching() }).await);
}

#[tokio::test]
async fn test_background_ticker_auto_stops() {
    let t = test_engine_with_config(SessionConfig {
        tick_interval: Duration::from_millis(20),
        ..test_session_config()
    });
    let mut events = t.engine.subscribe();
    t.engine.start_session().await.unwrap();

    // Several ticks pass before the deadline
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(t.engine.phase().await, SessionPhase::Active);

    t.clock.set(T0 + TIMEOUT_MS + MINUTE_MS);
    let engine = &t.engine;
    assert!(wait_until(|| async move { engine.phase().await == SessionPhase::Stopped }).await);

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.stop_reason, Some(StopReason::InactivityTimeout));
    assert!(snapshot.pending_review);

    let location = &t.location;
    assert!(wait_until(|| async move { !location.is_watching() }).await);

    // Give a ticker that failed to exit a chance to fire again
    tokio::time::sleep(Duration::from_millis(60)).await;
    let auto_stops = drain(&mut events)
        .into_iter()
        .filter(SessionEvent::is_auto_stop)
        .count();
    assert_eq!(auto_stops, 1);
}

#[tokio::test]
async fn test_capture_resets_countdown() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    // Just before the original deadline
    t.clock.set(T0 + TIMEOUT_MS - MINUTE_MS);
    t.engine.record_update("file:///a.jpg", None).await.unwrap();

    // Past the original deadline: still active
    t.clock.set(T0 + TIMEOUT_MS + MINUTE_MS);
    assert!(!t.engine.tick().await);
    assert_eq!(t.engine.phase().await, SessionPhase::Active);

    // Past the re-armed deadline
    t.clock.set(T0 + 2 * TIMEOUT_MS - MINUTE_MS);
    assert!(t.engine.tick().await);
    assert_eq!(t.engine.phase().await, SessionPhase::Stopped);
}

#[tokio::test]
async fn test_route_fixes_do_not_reset_countdown() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    t.clock.set(T0 + TIMEOUT_MS - MINUTE_MS);
    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0 + TIMEOUT_MS - MINUTE_MS))
        .await
        .unwrap();

    let crawl = t.engine.snapshot().await.crawl.unwrap();
    assert_eq!(crawl.last_activity_time, T0 + TIMEOUT_MS - MINUTE_MS);

    // Walking counts as activity but the deadline stays where it was
    t.clock.set(T0 + TIMEOUT_MS);
    assert!(t.engine.tick().await);
    assert_eq!(t.engine.phase().await, SessionPhase::Stopped);
}

#[tokio::test]
async fn test_tap_out_is_not_an_auto_stop() {
    let t = test_engine();
    let mut events = t.engine.subscribe();
    t.engine.start_session().await.unwrap();
    t.engine.tap_out().await.unwrap();

    let snapshot = t.engine.snapshot().await;
    assert_eq!(snapshot.stop_reason, Some(StopReason::TappedOut));
    assert!(!snapshot.pending_review);

    // Deadline passing after a manual stop changes nothing
    t.clock.set(T0 + 2 * TIMEOUT_MS);
    assert!(!t.engine.tick().await);
    assert!(!drain(&mut events).iter().any(SessionEvent::is_auto_stop));
}

// ─── Stop & Cancel ───────────────────────────────────────────

#[tokio::test]
async fn test_tap_out_releases_location_subscription() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();
    assert!(t.location.is_watching());

    t.engine.tap_out().await.unwrap();
    let location = &t.location;
    assert!(wait_until(|| async move { !location.is_watching() }).await);

    // Fixes after the stop never reach the route
    t.location.push(PositionFix::new(40.7128, -74.0060, T0));
    assert_eq!(route_len(&t.engine).await, 0);
    assert_eq!(
        t.engine
            .record_fix(PositionFix::new(40.7128, -74.0060, T0))
            .await
            .unwrap_err(),
        SessionError::NoActiveSession
    );
}

#[tokio::test]
async fn test_tap_out_twice_is_harmless() {
    let t = test_engine();
    assert_eq!(
        t.engine.tap_out().await.unwrap_err(),
        SessionError::NoActiveSession
    );

    t.engine.start_session().await.unwrap();
    t.engine.tap_out().await.unwrap();
    t.engine.tap_out().await.unwrap();
    assert_eq!(t.engine.phase().await, SessionPhase::Stopped);
}

#[tokio::test]
async fn test_cancel_discards_crawl() {
    let t = test_engine();
    let mut events = t.engine.subscribe();
    t.engine.start_session().await.unwrap();
    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0))
        .await
        .unwrap();
    t.engine
        .record_update("file:///a.jpg", Some(DrinkType::Beer))
        .await
        .unwrap();

    assert!(t.engine.cancel_session().await);
    assert!(!t.engine.cancel_session().await);
    assert_eq!(t.engine.phase().await, SessionPhase::Idle);
    let location = &t.location;
    assert!(wait_until(|| async move { !location.is_watching() }).await);

    assert_eq!(
        t.engine
            .finalize(&FinalizeRequest::new("Nope"))
            .await
            .unwrap_err(),
        SessionError::NoActiveSession
    );
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::Cancelled { .. })));
}

#[tokio::test]
async fn test_new_crawl_after_cancel() {
    let t = test_engine();
    let first = t.engine.start_session().await.unwrap();
    t.engine.cancel_session().await;

    let second = t.engine.start_session().await.unwrap();
    assert_ne!(first.id, second.id);
    assert!(t.location.is_watching());
}

// ─── Finalize ────────────────────────────────────────────────

#[tokio::test]
async fn test_end_to_end_crawl() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    for (i, (lat, lon)) in WALK.iter().enumerate() {
        t.location
            .push(PositionFix::new(*lat, *lon, T0 + i as i64 * 60_000));
    }
    let engine = &t.engine;
    assert!(wait_until(|| async move { route_len(engine).await == 3 }).await);
    assert!(
        wait_until(|| async move {
            engine
                .elapsed_stats()
                .await
                .map(|s| s.bars_hit_count == 1)
                .unwrap_or(false)
        })
        .await
    );

    t.clock.advance(10 * MINUTE_MS);
    let photo_a = t
        .engine
        .record_update("file:///a.jpg", Some(DrinkType::Beer))
        .await
        .unwrap();
    t.engine.record_update("file:///b.jpg", None).await.unwrap();

    t.engine.tap_out().await.unwrap();
    t.clock.advance(MINUTE_MS);

    let crawl = t
        .engine
        .finalize(
            &FinalizeRequest::new("Friday Crawl")
                .with_caption("fun night")
                .with_selection([photo_a.id.clone()]),
        )
        .await
        .unwrap();

    assert_eq!(crawl.title, "Friday Crawl");
    assert_eq!(crawl.caption.as_deref(), Some("fun night"));
    assert_eq!(crawl.user_id, "user-1");
    assert_eq!(crawl.drinks_count, 1);
    assert_eq!(crawl.drinks.len(), 1);
    assert_eq!(crawl.miles_walked, 0.30);
    assert_eq!(crawl.updates.len(), 1);
    assert_eq!(crawl.updates[0].id, photo_a.id);
    assert_eq!(crawl.route.len(), 3);
    let bars: Vec<&str> = crawl.bars_hit.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(bars, vec!["bar1"]);
    assert_eq!(crawl.start_time, T0);
    assert_eq!(crawl.end_time, T0 + 11 * MINUTE_MS);
    assert_eq!(crawl.created_at, crawl.end_time);

    assert_eq!(t.engine.phase().await, SessionPhase::Idle);
}

#[tokio::test]
async fn test_selection_filter_keeps_original_order() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    let a = t
        .engine
        .record_update("file:///a.jpg", Some(DrinkType::Shot))
        .await
        .unwrap();
    let _b = t
        .engine
        .record_update("file:///b.jpg", Some(DrinkType::Wine))
        .await
        .unwrap();
    let c = t.engine.record_update("file:///c.jpg", None).await.unwrap();

    let preview = t
        .engine
        .prepare(&FinalizeRequest::new("t").with_selection([c.id.clone(), a.id.clone()]))
        .await
        .unwrap();
    let ids: Vec<&str> = preview.updates.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str(), c.id.as_str()]);

    // Drinks come from the log, not from the selected photos
    assert_eq!(preview.drinks_count, 2);

    let all = t
        .engine
        .finalize(&FinalizeRequest::new("t").with_selection(Vec::<String>::new()))
        .await
        .unwrap();
    assert_eq!(all.updates.len(), 3);
}

#[tokio::test]
async fn test_prepare_does_not_change_state() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    let preview = t.engine.prepare(&FinalizeRequest::new("Preview")).await.unwrap();
    assert_eq!(preview.title, "Preview");
    assert_eq!(t.engine.phase().await, SessionPhase::Active);
    assert!(t.location.is_watching());
}

#[tokio::test]
async fn test_finalize_from_active_stops_tracking() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    t.engine.finalize(&FinalizeRequest::new("Quick one")).await.unwrap();
    assert_eq!(t.engine.phase().await, SessionPhase::Idle);
    let location = &t.location;
    assert!(wait_until(|| async move { !location.is_watching() }).await);
}

#[tokio::test]
async fn test_blank_title_uses_city() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();
    t.engine
        .record_fix(PositionFix::new(40.7128, -74.0060, T0))
        .await
        .unwrap();

    let crawl = t.engine.finalize(&FinalizeRequest::new("   ")).await.unwrap();
    assert_eq!(crawl.title, "New York Bar Crawl");
}

#[tokio::test]
async fn test_blank_title_without_position() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();

    let crawl = t.engine.finalize(&FinalizeRequest::default()).await.unwrap();
    assert_eq!(crawl.title, "Bar Crawl");
    assert!(crawl.caption.is_none());
}

#[tokio::test]
async fn test_caption_too_long_is_rejected() {
    let t = test_engine();
    t.engine.start_session().await.unwrap();
    t.engine.tap_out().await.unwrap();

    let request = FinalizeRequest::new("t").with_caption("x".repeat(201));
    assert!(matches!(
        t.engine.finalize(&request).await,
        Err(SessionError::Validation(_))
    ));
    assert_eq!(t.engine.phase().await, SessionPhase::Stopped);

    let blank = FinalizeRequest::new("t").with_caption("   ");
    assert!(t.engine.finalize(&blank).await.unwrap().caption.is_none());
}

#[tokio::test]
async fn test_finalize_publishes_event() {
    let t = test_engine();
    let mut events = t.engine.subscribe();
    let crawl = t.engine.start_session().await.unwrap();
    t.engine.finalize(&FinalizeRequest::new("t")).await.unwrap();

    let seen = drain(&mut events);
    assert_eq!(
        seen.first(),
        Some(&SessionEvent::Started {
            crawl_id: crawl.id.clone()
        })
    );
    assert_eq!(
        seen.last(),
        Some(&SessionEvent::Finalized { crawl_id: crawl.id })
    );
}
