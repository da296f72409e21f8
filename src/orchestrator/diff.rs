//! Difference view bookkeeping.
//!
//! The diff panel shows the difference between whatever seg1 and seg2 are
//! selected. [`DiffCoordinator::update`] is called after every segmentation
//! change and decides whether a new diff has to be requested:
//!
//! - either segmentation missing: nothing to show, older requests become stale
//! - same pair as the latest request: nothing to do
//! - new pair: becomes the latest request and must be fetched
//!
//! Pairs are compared by item identity, not by collection index.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::transport::Item;
use crate::volume::ImageKey;

/// The pair of segmentations a diff is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffRequest {
    pub seg1_id: Arc<str>,
    pub seg2_id: Arc<str>,
}

impl DiffRequest {
    /// Build a request; `None` unless both segmentations are selected.
    pub fn from_items(seg1: Option<&Item>, seg2: Option<&Item>) -> Option<Self> {
        Some(Self {
            seg1_id: Arc::from(seg1?.id.as_str()),
            seg2_id: Arc::from(seg2?.id.as_str()),
        })
    }

    /// Identity of the diff image.
    pub fn key(&self) -> ImageKey {
        ImageKey::diff(Arc::clone(&self.seg1_id), Arc::clone(&self.seg2_id))
    }
}

/// Decision taken by [`DiffCoordinator::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffUpdate {
    /// At least one segmentation is not selected
    Incomplete,
    /// The pair was already requested
    Unchanged(DiffRequest),
    /// A new pair that must be fetched and applied
    Changed(DiffRequest),
}

/// Tracks the latest requested diff pair.
#[derive(Debug, Default)]
pub struct DiffCoordinator {
    latest: Mutex<Option<DiffRequest>>,
}

impl DiffCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate the diff for the current segmentation selection.
    pub fn update(&self, seg1: Option<&Item>, seg2: Option<&Item>) -> DiffUpdate {
        self.update_with(|| DiffRequest::from_items(seg1, seg2))
    }

    /// Like [`update`](Self::update), reading the pair while the latest
    /// request is locked so concurrent re-evaluations cannot interleave.
    pub fn update_with(&self, read: impl FnOnce() -> Option<DiffRequest>) -> DiffUpdate {
        let mut latest = self.latest.lock();

        let Some(request) = read() else {
            if latest.take().is_some() {
                debug!("Diff cleared: segmentation pair incomplete");
            }
            return DiffUpdate::Incomplete;
        };

        if latest.as_ref() == Some(&request) {
            return DiffUpdate::Unchanged(request);
        }

        debug!(
            "Diff pair changed to ({}, {})",
            request.seg1_id, request.seg2_id
        );
        *latest = Some(request.clone());
        DiffUpdate::Changed(request)
    }

    /// Whether `request` is still the pair the user wants to see.
    pub fn is_latest(&self, request: &DiffRequest) -> bool {
        self.latest.lock().as_ref() == Some(request)
    }

    /// Forget a failed request so selecting the pair again retries it.
    pub fn failed(&self, request: &DiffRequest) {
        let mut latest = self.latest.lock();
        if latest.as_ref() == Some(request) {
            *latest = None;
        }
    }

    pub fn latest(&self) -> Option<DiffRequest> {
        self.latest.lock().clone()
    }
}
