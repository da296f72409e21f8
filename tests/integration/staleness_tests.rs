//! Out-of-order response tests.
//!
//! Fetches are held open with gates so responses complete in a chosen
//! order. Tests verify:
//! - A superseded request never overwrites a newer one
//! - A superseded diff is discarded, as are failures of superseded requests
//! - Slice changes while a fetch is pending are honoured when it completes
//! - The slice count fallback while the base volume is loading

use std::sync::Arc;

use segview::{ImageKey, PanelKind};

use super::test_utils::{metrics, Harness, HostEvent};

// =============================================================================
// Segmentation Panels
// =============================================================================

#[tokio::test]
async fn test_latest_segmentation_wins() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.gate(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&slow).await;

    // The newer selection resolves first
    harness.orchestrator.select_seg2(0).await;
    harness.transport.release(&slow);
    pending.await.unwrap();

    let expected = ImageKey::segmentation("seg-a", "vol-0");
    assert_eq!(harness.shown(PanelKind::Seg2).await, Some(expected));
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 1.0, 1.0, 1.0]));

    // The stale response never reached the surface
    let frames = harness.frames(PanelKind::Seg2).await;
    assert!(frames
        .iter()
        .all(|frame| frame.as_deref() != Some(&[0.0, 3.0, 1.0, 3.0][..])));

    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-a", "seg-a"))
    );
    assert_eq!(harness.transport.fetch_count(&ImageKey::diff("seg-a", "seg-c")), 0);
}

#[tokio::test]
async fn test_stale_failure_is_not_reported() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.gate(&slow);
    harness.transport.fail(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&slow).await;

    harness.orchestrator.select_seg2(1).await;
    harness.transport.release(&slow);
    pending.await.unwrap();

    assert!(harness.host.failures().is_empty());
    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        Some(ImageKey::segmentation("seg-b", "vol-0"))
    );
}

#[tokio::test]
async fn test_panels_update_independently() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.gate(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&slow).await;

    // A pending seg2 fetch does not hold back seg1
    harness.orchestrator.select_seg1(1).await;
    assert_eq!(
        harness.shown(PanelKind::Seg1).await,
        Some(ImageKey::segmentation("seg-b", "vol-0"))
    );

    harness.transport.release(&slow);
    pending.await.unwrap();

    assert_eq!(harness.shown(PanelKind::Seg2).await, Some(slow));
    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-b", "seg-c"))
    );
}

// =============================================================================
// Diff Panel
// =============================================================================

#[tokio::test]
async fn test_superseded_diff_is_discarded() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::diff("seg-a", "seg-c");
    harness.transport.gate(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&slow).await;

    // Back to the original pair while (seg-a, seg-c) is in flight
    harness.orchestrator.select_seg2(1).await;
    harness.transport.release(&slow);
    pending.await.unwrap();

    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-a", "seg-b"))
    );
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 1.0, 2.0, 0.0]));
    assert_eq!(
        harness.orchestrator.diff_request().map(|request| request.key()),
        Some(ImageKey::diff("seg-a", "seg-b"))
    );

    let events = harness.host.events();
    assert!(!events.contains(&HostEvent::Metrics(metrics("seg-a", "seg-c"))));
    assert_eq!(
        events.last(),
        Some(&HostEvent::Metrics(metrics("seg-a", "seg-b")))
    );
}

#[tokio::test]
async fn test_diff_follows_latest_pair() {
    let harness = Harness::loaded().await;
    let first = ImageKey::diff("seg-a", "seg-c");
    harness.transport.gate(&first);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&first).await;

    harness.orchestrator.select_seg1(2).await;
    harness.transport.release(&first);
    pending.await.unwrap();

    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-c", "seg-c"))
    );
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 3.0, 3.0, 0.0]));
}

// =============================================================================
// Base Volume
// =============================================================================

#[tokio::test]
async fn test_superseded_volume_is_discarded() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::base("vol-1");
    harness.transport.gate(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_volume(1).await });
    harness.transport.wait_started(&slow).await;

    harness.orchestrator.select_volume(0).await;
    harness.transport.release(&slow);
    pending.await.unwrap();

    assert_eq!(harness.shown(PanelKind::Base).await, Some(ImageKey::base("vol-0")));
    assert_eq!(harness.orchestrator.slice_count(), 3);
    assert_eq!(harness.orchestrator.store().slice_count(), 3);
    assert!(!harness.host.events().contains(&HostEvent::SliceBounds(5, 0)));

    // Segmentations were never resampled onto the abandoned volume
    assert_eq!(
        harness
            .transport
            .fetch_count(&ImageKey::segmentation("seg-a", "vol-1")),
        0
    );
}

#[tokio::test]
async fn test_slice_count_while_base_is_loading() {
    let harness = Harness::new(super::test_utils::fixture_transport());
    let base = ImageKey::base("vol-0");
    harness.transport.gate(&base);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.load().await });
    harness.transport.wait_started(&base).await;

    assert_eq!(harness.orchestrator.slice_count(), 1);

    harness.transport.release(&base);
    pending.await.unwrap().unwrap();

    assert_eq!(harness.orchestrator.slice_count(), 3);
}

// =============================================================================
// Slices
// =============================================================================

#[tokio::test]
async fn test_slice_change_during_pending_fetch() {
    let harness = Harness::loaded().await;
    let slow = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.gate(&slow);

    let orchestrator = Arc::clone(&harness.orchestrator);
    let pending = tokio::spawn(async move { orchestrator.select_seg2(2).await });
    harness.transport.wait_started(&slow).await;

    harness.orchestrator.select_slice(2).await;
    // The old image follows the slice meanwhile
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 2.0, 3.0, 2.0]));

    harness.transport.release(&slow);
    pending.await.unwrap();

    // The new image appears at the current slice
    assert_eq!(harness.shown(PanelKind::Seg2).await, Some(slow));
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 3.0, 3.0, 3.0]));
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 1.0, 3.0, 0.0]));
}

#[tokio::test]
async fn test_concurrent_selections_fetch_once() {
    let harness = Harness::loaded().await;
    let key = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.gate(&key);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let orchestrator = Arc::clone(&harness.orchestrator);
        tasks.push(tokio::spawn(async move { orchestrator.select_seg2(2).await }));
    }
    let orchestrator = Arc::clone(&harness.orchestrator);
    tasks.push(tokio::spawn(async move { orchestrator.select_seg1(2).await }));

    harness.transport.wait_started(&key).await;
    harness.transport.release(&key);
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(harness.transport.fetch_count(&key), 1);
    assert_eq!(harness.shown(PanelKind::Seg1).await, Some(key.clone()));
    assert_eq!(harness.shown(PanelKind::Seg2).await, Some(key));
    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-c", "seg-c"))
    );
    assert!(harness.transport.fetch_count(&ImageKey::diff("seg-c", "seg-c")) <= 1);
}
