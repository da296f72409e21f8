//! Slice cache for decoded grids.
//!
//! This module provides an LRU cache of [`DecodedGrid`]s, preventing repeated
//! decoding of the same image under the same label filter.
//!
//! # Cache Key
//!
//! Grids are cached by a composite key including:
//! - Image identity (the [`ImageKey`] of the full payload)
//! - Payload identity, so a refetched image never reuses the grid of the
//!   payload it replaced
//! - Label filter
//!
//! The slice index is deliberately not part of the key: a grid holds every
//! slice, so moving through slices with the same label is a pure cache hit.
//!
//! # Immutability
//!
//! Entries are `Arc<DecodedGrid>` and never modified after insertion. Writers
//! only add entries, so readers on other panels backed by the same image can
//! keep using a grid they obtained earlier.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::volume::{ImageKey, LabelFilter, VolumetricImage};

use super::decoded::DecodedGrid;

/// Default maximum number of decoded grids kept per session.
pub const DEFAULT_GRID_CACHE_CAPACITY: usize = 32;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for decoded grids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridKey {
    /// Identity of the full image payload
    pub image: ImageKey,

    /// [`VolumetricImage::payload_id`] of the decoded payload
    pub payload: u64,

    /// Label filter applied while decoding
    pub label: LabelFilter,
}

impl GridKey {
    pub fn new(image: &VolumetricImage, label: LabelFilter) -> Self {
        Self {
            image: image.key().clone(),
            payload: image.payload_id(),
            label,
        }
    }
}

// =============================================================================
// Slice Cache
// =============================================================================

/// LRU cache of decoded grids keyed by image identity and label filter.
///
/// # Thread Safety
///
/// The cache is shared across every view binding via `Arc`. The lock is held
/// while a grid is built, so concurrent requests for a missing key build it
/// once.
pub struct SliceCache {
    grids: Mutex<LruCache<GridKey, Arc<DecodedGrid>>>,

    /// Number of grids built since creation
    builds: AtomicUsize,
}

impl SliceCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_GRID_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` grids.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            grids: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            builds: AtomicUsize::new(0),
        }
    }

    /// Get the decoded grid of `image` under `label`, building it on a miss.
    pub async fn get(&self, image: &VolumetricImage, label: LabelFilter) -> Arc<DecodedGrid> {
        let key = GridKey::new(image, label);
        let mut grids = self.grids.lock().await;

        if let Some(grid) = grids.get(&key) {
            debug!("Grid cache hit for {} label {}", key.image, label);
            return Arc::clone(grid);
        }

        debug!("Decoding grid for {} label {}", key.image, label);
        let grid = Arc::new(DecodedGrid::build(image, label));
        self.builds.fetch_add(1, Ordering::SeqCst);
        grids.put(key, Arc::clone(&grid));
        grid
    }

    /// Check if a grid of any payload of `image` is cached, without
    /// updating LRU order.
    pub async fn contains(&self, image: &ImageKey, label: LabelFilter) -> bool {
        self.grids
            .lock()
            .await
            .iter()
            .any(|(key, _)| key.image == *image && key.label == label)
    }

    /// Number of grids built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Get the current number of cached grids.
    pub async fn len(&self) -> usize {
        self.grids.lock().await.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.grids.lock().await.is_empty()
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        self.grids.lock().await.clear();
    }
}

impl Default for SliceCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
