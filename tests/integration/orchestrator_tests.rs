//! End-to-end selection flows through the orchestrator.
//!
//! Tests verify:
//! - Loading a container makes the initial selections and informs the host
//! - Segmentation, label, slice and volume changes update the right panels
//! - Failures are reported per panel and can be retried
//! - Tag and comment edits write through to the service

use segview::{
    FileInfo, ImageKey, LabelFilter, PanelKind, SegRole, SelectionEvent, Transfer, ViewError,
};

use super::test_utils::{
    metrics, quantification, Harness, HostEvent, MockTransport, CONTAINER,
};

async fn transfer(harness: &Harness, kind: PanelKind) -> Option<Transfer> {
    let state = harness.orchestrator.panel(kind).lock().await;
    state.binding().surface().transfer.clone()
}

// =============================================================================
// Loading
// =============================================================================

#[tokio::test]
async fn test_load_makes_initial_selection() {
    let harness = Harness::loaded().await;
    let orchestrator = &harness.orchestrator;

    assert_eq!(orchestrator.container_id(), CONTAINER);

    let state = orchestrator.store().state();
    assert_eq!(state.volume_index, 0);
    assert_eq!(state.seg1_index, 0);
    assert_eq!(state.seg2_index, 1);
    assert_eq!(state.slice_index, 0);
    assert_eq!(orchestrator.slice_count(), 3);

    assert_eq!(harness.shown(PanelKind::Base).await, Some(ImageKey::base("vol-0")));
    assert_eq!(
        harness.shown(PanelKind::Seg1).await,
        Some(ImageKey::segmentation("seg-a", "vol-0"))
    );
    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        Some(ImageKey::segmentation("seg-b", "vol-0"))
    );
    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-a", "seg-b"))
    );

    assert_eq!(harness.frame(PanelKind::Base).await, Some(vec![0.0, 1.0, 2.0, 3.0]));
    assert_eq!(harness.frame(PanelKind::Seg1).await, Some(vec![0.0, 1.0, 1.0, 1.0]));
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 2.0, 1.0, 2.0]));
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 1.0, 2.0, 0.0]));

    assert!(harness.host.failures().is_empty());
}

#[tokio::test]
async fn test_load_reports_to_host() {
    let harness = Harness::loaded().await;
    let events = harness.host.events();

    assert_eq!(events[0], HostEvent::VolumesLoaded(2));
    assert_eq!(events[1], HostEvent::SegmentationsLoaded(3));
    assert!(events.contains(&HostEvent::SliceBounds(3, 0)));
    assert!(events.contains(&HostEvent::FileShown(PanelKind::Base, "vol-0".to_string())));
    assert!(events.contains(&HostEvent::FileShown(PanelKind::Seg1, "seg-a".to_string())));
    assert!(events.contains(&HostEvent::FileShown(PanelKind::Seg2, "seg-b".to_string())));
    assert!(events.contains(&HostEvent::Labels(PanelKind::Seg1, vec![1, 2, 3])));
    assert!(events.contains(&HostEvent::Quantification(
        PanelKind::Seg2,
        Some(quantification(2.0))
    )));
    assert!(events.contains(&HostEvent::Quantification(PanelKind::Base, None)));
    assert!(events.contains(&HostEvent::Metrics(metrics("seg-a", "seg-b"))));

    // File metadata arrives once per file, although seg1 was selected twice
    let seg1_infos: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, HostEvent::FileInfo(SegRole::Seg1, _)))
        .collect();
    assert_eq!(
        seg1_infos,
        vec![&HostEvent::FileInfo(
            SegRole::Seg1,
            FileInfo {
                tag: "reviewed".to_string(),
                comment: "good boundary".to_string(),
            }
        )]
    );
    assert_eq!(harness.transport.file_info_fetches(), 2);
}

#[tokio::test]
async fn test_load_empty_container() {
    let harness = Harness::new(MockTransport::new());
    harness.orchestrator.load().await.unwrap();

    for kind in PanelKind::ALL {
        assert_eq!(harness.shown(kind).await, None);
        assert!(harness.frames(kind).await.is_empty());
    }
    assert_eq!(harness.orchestrator.slice_count(), 1);
    assert_eq!(harness.orchestrator.diff_request(), None);
    assert_eq!(harness.transport.total_fetches(), 0);
}

#[tokio::test]
async fn test_single_segmentation_leaves_diff_empty() {
    let transport = MockTransport::new()
        .with_volume("vol-0", "CT")
        .with_segmentation("seg-a", "manual")
        .with_payload(ImageKey::base("vol-0"), super::test_utils::base_payload(3))
        .with_payload(
            ImageKey::segmentation("seg-a", "vol-0"),
            super::test_utils::seg_payload("seg-a", 3),
        );
    let harness = Harness::new(transport);
    harness.orchestrator.load().await.unwrap();

    assert_eq!(harness.orchestrator.store().state().seg2_index, 1);
    assert!(harness.shown(PanelKind::Seg1).await.is_some());
    assert_eq!(harness.shown(PanelKind::Seg2).await, None);
    assert_eq!(harness.shown(PanelKind::Diff).await, None);
    assert!(harness.host.failures().is_empty());
}

// =============================================================================
// Segmentation Selection
// =============================================================================

#[tokio::test]
async fn test_same_segmentation_on_both_panels() {
    let harness = Harness::loaded().await;

    harness.orchestrator.select_seg2(0).await;

    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        harness.shown(PanelKind::Seg1).await
    );
    assert_eq!(
        harness.frame(PanelKind::Seg2).await,
        harness.frame(PanelKind::Seg1).await
    );

    // Both panels share one payload
    let key = ImageKey::segmentation("seg-a", "vol-0");
    assert_eq!(harness.transport.fetch_count(&key), 1);

    assert_eq!(
        harness.shown(PanelKind::Diff).await,
        Some(ImageKey::diff("seg-a", "seg-a"))
    );
    assert!(harness
        .host
        .events()
        .contains(&HostEvent::Metrics(metrics("seg-a", "seg-a"))));
}

#[tokio::test]
async fn test_select_seg_returns_event() {
    let harness = Harness::loaded().await;

    let event = harness.orchestrator.select_seg1(2).await;

    match event {
        SelectionEvent::SegSelected {
            role,
            index,
            item,
            label,
        } => {
            assert_eq!(role, SegRole::Seg1);
            assert_eq!(index, 2);
            assert_eq!(item.map(|item| item.id), Some("seg-c".to_string()));
            assert_eq!(label, LabelFilter::All);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    assert_eq!(
        harness.orchestrator.diff_request().map(|request| request.key()),
        Some(ImageKey::diff("seg-c", "seg-b"))
    );
}

#[tokio::test]
async fn test_out_of_range_segmentation_keeps_panel() {
    let harness = Harness::loaded().await;

    harness.orchestrator.select_seg2(7).await;

    // Nothing to show; the previous image stays and the diff waits
    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        Some(ImageKey::segmentation("seg-b", "vol-0"))
    );
    assert_eq!(harness.orchestrator.diff_request(), None);
    assert!(harness.host.failures().is_empty());
}

// =============================================================================
// Labels
// =============================================================================

#[tokio::test]
async fn test_label_filter_isolates_label() {
    let harness = Harness::loaded().await;
    let fetches = harness.transport.total_fetches();

    harness.orchestrator.select_label2(LabelFilter::Value(2)).await;

    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 2.0, 0.0, 2.0]));
    // Seg1 keeps every label
    assert_eq!(harness.frame(PanelKind::Seg1).await, Some(vec![0.0, 1.0, 1.0, 1.0]));
    assert_eq!(harness.transport.total_fetches(), fetches);
    assert_eq!(harness.orchestrator.store().state().label2, LabelFilter::Value(2));
}

#[tokio::test]
async fn test_label_survives_segmentation_change() {
    let harness = Harness::loaded().await;

    harness.orchestrator.select_label1(LabelFilter::Value(1)).await;
    harness.orchestrator.select_seg1(2).await;

    // seg-c slice 0 is [0, 3, 1, 3]; only label 1 remains
    assert_eq!(harness.frame(PanelKind::Seg1).await, Some(vec![0.0, 0.0, 1.0, 0.0]));
}

// =============================================================================
// Slices
// =============================================================================

#[tokio::test]
async fn test_base_uses_grayscale_window() {
    let harness = Harness::loaded().await;

    assert_eq!(
        transfer(&harness, PanelKind::Base).await,
        Some(Transfer::grayscale((0.0, 3.0)))
    );
    assert!(transfer(&harness, PanelKind::Seg1)
        .await
        .is_some_and(|transfer| transfer.is_categorical()));

    harness.orchestrator.select_slice(2).await;

    assert_eq!(
        transfer(&harness, PanelKind::Base).await,
        Some(Transfer::grayscale((20.0, 23.0)))
    );
}

#[tokio::test]
async fn test_slice_change_rerenders_from_cache() {
    let harness = Harness::loaded().await;
    let fetches = harness.transport.total_fetches();

    let event = harness.orchestrator.select_slice(1).await;

    assert!(matches!(event, SelectionEvent::SliceSelected { index: 1 }));
    assert_eq!(harness.frame(PanelKind::Base).await, Some(vec![10.0, 11.0, 12.0, 13.0]));
    assert_eq!(harness.frame(PanelKind::Seg1).await, Some(vec![0.0, 1.0, 2.0, 1.0]));
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 2.0, 2.0, 2.0]));
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 1.0, 2.0, 0.0]));
    assert_eq!(harness.transport.total_fetches(), fetches);

    // A slice change redraws without re-initializing the surface
    let state = harness.orchestrator.panel(PanelKind::Base).lock().await;
    assert_eq!(state.binding().surface().initializations, 1);
}

#[tokio::test]
async fn test_slice_is_clamped() {
    let harness = Harness::loaded().await;
    let fetches = harness.transport.total_fetches();

    let event = harness.orchestrator.select_slice(99).await;
    assert!(matches!(event, SelectionEvent::SliceSelected { index: 2 }));
    assert_eq!(harness.orchestrator.store().state().slice_index, 2);

    let event = harness.orchestrator.select_slice(-5).await;
    assert!(matches!(event, SelectionEvent::SliceSelected { index: 0 }));

    assert_eq!(harness.transport.total_fetches(), fetches);
    assert!(harness.host.failures().is_empty());
}

#[tokio::test]
async fn test_slice_count_before_load() {
    let harness = Harness::new(super::test_utils::fixture_transport());
    assert_eq!(harness.orchestrator.slice_count(), 1);

    let event = harness.orchestrator.select_slice(5).await;
    assert!(matches!(event, SelectionEvent::SliceSelected { index: 0 }));
}

// =============================================================================
// Volumes
// =============================================================================

#[tokio::test]
async fn test_volume_change_updates_bounds_and_segmentations() {
    let harness = Harness::loaded().await;
    harness.host.clear();

    harness.orchestrator.select_volume(1).await;

    assert_eq!(harness.orchestrator.slice_count(), 5);
    assert!(harness.host.events().contains(&HostEvent::SliceBounds(5, 0)));
    assert_eq!(
        harness.shown(PanelKind::Seg1).await,
        Some(ImageKey::segmentation("seg-a", "vol-1"))
    );
    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        Some(ImageKey::segmentation("seg-b", "vol-1"))
    );

    // The diff does not depend on the volume
    assert_eq!(harness.transport.fetch_count(&ImageKey::diff("seg-a", "seg-b")), 1);
}

#[tokio::test]
async fn test_volume_change_clamps_slice() {
    let harness = Harness::loaded().await;
    harness.orchestrator.select_volume(1).await;
    harness.orchestrator.select_slice(4).await;
    harness.host.clear();

    harness.orchestrator.select_volume(0).await;

    assert_eq!(harness.orchestrator.store().state().slice_index, 2);
    assert!(harness.host.events().contains(&HostEvent::SliceBounds(3, 2)));
    assert_eq!(harness.frame(PanelKind::Base).await, Some(vec![20.0, 21.0, 22.0, 23.0]));
    assert_eq!(harness.frame(PanelKind::Seg1).await, Some(vec![0.0, 1.0, 3.0, 1.0]));
}

#[tokio::test]
async fn test_slice_beyond_diff_fails_diff_only() {
    let harness = Harness::loaded().await;
    harness.orchestrator.select_volume(1).await;
    harness.host.clear();

    // Volume 1 has 5 slices, the diff only 3
    harness.orchestrator.select_slice(4).await;

    let failures = harness.host.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, PanelKind::Diff);
    assert!(failures[0].1.contains("out of range"));

    assert_eq!(harness.frame(PanelKind::Base).await, Some(vec![40.0, 41.0, 42.0, 43.0]));
    assert_eq!(harness.frame(PanelKind::Seg2).await, Some(vec![0.0, 2.0, 2.0, 2.0]));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_fetch_failure_is_reported_and_retried() {
    let harness = Harness::loaded().await;
    let key = ImageKey::segmentation("seg-c", "vol-0");
    harness.transport.fail(&key);

    harness.orchestrator.select_seg2(2).await;

    let failures = harness.host.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, PanelKind::Seg2);
    assert!(failures[0].1.contains("unavailable"));

    // Selection is kept; the panel keeps its previous image
    assert_eq!(harness.orchestrator.store().state().seg2_index, 2);
    assert_eq!(
        harness.shown(PanelKind::Seg2).await,
        Some(ImageKey::segmentation("seg-b", "vol-0"))
    );

    harness.transport.recover(&key);
    harness.orchestrator.select_seg2(2).await;

    assert_eq!(harness.transport.fetch_count(&key), 2);
    assert_eq!(harness.shown(PanelKind::Seg2).await, Some(key));
    assert_eq!(harness.host.failures().len(), 1);
}

#[tokio::test]
async fn test_diff_failure_is_retried() {
    let harness = Harness::loaded().await;
    let key = ImageKey::diff("seg-a", "seg-c");
    harness.transport.fail(&key);

    harness.orchestrator.select_seg2(2).await;

    let failures = harness.host.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, PanelKind::Diff);
    assert_eq!(harness.orchestrator.diff_request(), None);

    harness.transport.recover(&key);
    harness.orchestrator.select_seg2(2).await;

    assert_eq!(harness.shown(PanelKind::Diff).await, Some(key));
    assert_eq!(harness.frame(PanelKind::Diff).await, Some(vec![0.0, 1.0, 3.0, 0.0]));
}

#[tokio::test]
async fn test_base_failure_is_reported_for_base_only() {
    let transport = super::test_utils::fixture_transport();
    transport.fail(&ImageKey::base("vol-0"));
    let harness = Harness::new(transport);

    harness.orchestrator.load().await.unwrap();

    let failures = harness.host.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, PanelKind::Base);
    assert_eq!(harness.shown(PanelKind::Base).await, None);
    assert_eq!(harness.orchestrator.slice_count(), 1);

    // Segmentations of the selected volume are still shown
    assert_eq!(
        harness.shown(PanelKind::Seg1).await,
        Some(ImageKey::segmentation("seg-a", "vol-0"))
    );
}

// =============================================================================
// File Metadata
// =============================================================================

#[tokio::test]
async fn test_set_tag_writes_through() {
    let harness = Harness::loaded().await;
    harness.host.clear();

    harness.orchestrator.set_tag(SegRole::Seg1, "approved").await.unwrap();

    assert_eq!(
        harness.transport.writes(),
        vec![("seg-a".to_string(), "tag".to_string(), "approved".to_string())]
    );
    assert_eq!(
        harness.host.events(),
        vec![HostEvent::FileInfo(
            SegRole::Seg1,
            FileInfo {
                tag: "approved".to_string(),
                comment: "good boundary".to_string(),
            }
        )]
    );
    // No refetch after the write
    assert_eq!(harness.transport.file_info_fetches(), 2);
}

#[tokio::test]
async fn test_set_comment_on_seg2() {
    let harness = Harness::loaded().await;

    harness
        .orchestrator
        .set_comment(SegRole::Seg2, "leaks into the liver")
        .await
        .unwrap();

    let info = harness.orchestrator.registry().file("seg-b").cached().await;
    assert_eq!(
        info.map(|info| info.comment),
        Some("leaks into the liver".to_string())
    );
}

#[tokio::test]
async fn test_rejected_write_keeps_cached_value() {
    let harness = Harness::loaded().await;
    harness.transport.reject_writes(true);
    harness.host.clear();

    let result = harness.orchestrator.set_comment(SegRole::Seg1, "wrong").await;

    assert!(matches!(result, Err(ViewError::WriteFailure { .. })));
    let info = harness.orchestrator.registry().file("seg-a").cached().await;
    assert_eq!(
        info.map(|info| info.comment),
        Some("good boundary".to_string())
    );
    assert!(harness.host.events().is_empty());
}

#[tokio::test]
async fn test_set_tag_without_segmentation() {
    let harness = Harness::new(MockTransport::new().with_volume("vol-0", "CT"));
    harness.orchestrator.load().await.unwrap();

    let result = harness.orchestrator.set_tag(SegRole::Seg1, "approved").await;

    assert!(matches!(result, Err(ViewError::NoBackingFile)));
    assert!(harness.transport.writes().is_empty());
}

// =============================================================================
// Camera
// =============================================================================

#[tokio::test]
async fn test_zoom_applies_to_every_panel() {
    let harness = Harness::loaded().await;

    harness.orchestrator.zoom_in().await;

    for kind in PanelKind::ALL {
        let state = harness.orchestrator.panel(kind).lock().await;
        assert!(state.binding().camera().zoom > segview::Camera::AUTO_ZOOM);
    }

    harness.orchestrator.auto_zoom().await;

    for kind in PanelKind::ALL {
        let state = harness.orchestrator.panel(kind).lock().await;
        assert_eq!(state.binding().camera(), segview::Camera::auto());
    }
}

#[tokio::test]
async fn test_auto_levels_redraws() {
    let harness = Harness::loaded().await;
    let before = harness.frames(PanelKind::Base).await.len();

    harness.orchestrator.auto_levels().await;

    assert_eq!(harness.frames(PanelKind::Base).await.len(), before + 1);
    assert!(harness.host.failures().is_empty());
}
