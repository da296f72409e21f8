//! Lazily fetched image payloads and file metadata.
//!
//! An [`ImageSource`] owns the payload of exactly one [`ImageKey`]. The first
//! request performs the fetch appropriate to the key's role; every later
//! request, for any slice or label, is served from the stored payload.
//! Concurrent first requests share one in-flight fetch (singleflight), and
//! they also share its failure. A failed fetch is not memoized, so a later
//! request retries.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::error::{FetchError, FileField, ViewError};
use crate::transport::{FileInfo, Transport};

use super::image::{ImageKey, LabelFilter, SliceView, VolumetricImage};

// =============================================================================
// In-flight State
// =============================================================================

/// State for an in-flight fetch shared between the leader and its waiters.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the fetch (set before waiters are notified)
    result: parking_lot::Mutex<Option<Result<Arc<VolumetricImage>, ViewError>>>,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            result: parking_lot::Mutex::new(None),
        }
    }

    /// Wait until the leader has published a result.
    async fn wait(&self) -> Result<Arc<VolumetricImage>, ViewError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a notification between the check
            // and the await is not lost.
            notified.as_mut().enable();

            if let Some(result) = self.result.lock().clone() {
                return result;
            }

            notified.await;
        }
    }
}

// =============================================================================
// ImageSource
// =============================================================================

/// The lazily fetched payload of one image identity.
pub struct ImageSource<T: Transport> {
    key: ImageKey,
    transport: Arc<T>,

    /// Payload once a fetch succeeded
    image: parking_lot::RwLock<Option<Arc<VolumetricImage>>>,

    /// Fetch currently in flight, if any
    in_flight: Mutex<Option<Arc<InFlightState>>>,

    /// Metadata of the backing file (absent for diff images)
    file: Option<Arc<FileRecord<T>>>,
}

impl<T: Transport> ImageSource<T> {
    /// Create a source; nothing is fetched until the first request.
    pub fn new(key: ImageKey, transport: Arc<T>, file: Option<Arc<FileRecord<T>>>) -> Self {
        Self {
            key,
            transport,
            image: parking_lot::RwLock::new(None),
            in_flight: Mutex::new(None),
            file,
        }
    }

    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    /// Whether a payload is available without fetching.
    pub fn is_loaded(&self) -> bool {
        self.image.read().is_some()
    }

    /// The payload if it has been fetched already.
    pub fn loaded(&self) -> Option<Arc<VolumetricImage>> {
        self.image.read().clone()
    }

    /// Get one slice of the image, filtered by `label`.
    ///
    /// Fetches the full payload on first use.
    pub async fn get_slice(
        &self,
        slice: usize,
        label: LabelFilter,
    ) -> Result<SliceView, ViewError> {
        let image = self.load().await?;
        SliceView::new(image, slice, label)
    }

    /// Number of slices of the loaded payload.
    ///
    /// Fails with [`ViewError::NotLoaded`] until a fetch has succeeded.
    pub fn slice_count(&self) -> Result<usize, ViewError> {
        self.image
            .read()
            .as_ref()
            .map(|image| image.slice_count())
            .ok_or_else(|| ViewError::NotLoaded(self.key.to_string()))
    }

    /// Get the full payload, fetching it if necessary.
    ///
    /// Concurrent callers share a single fetch.
    pub async fn load(&self) -> Result<Arc<VolumetricImage>, ViewError> {
        // Fast path: already fetched
        if let Some(image) = self.loaded() {
            debug!("{}: payload cache hit", self.key);
            return Ok(image);
        }

        let state = {
            let mut in_flight = self.in_flight.lock().await;

            // A leader may have finished between the fast path and the lock
            if let Some(image) = self.loaded() {
                return Ok(image);
            }

            match in_flight.as_ref() {
                Some(state) => Some(Arc::clone(state)),
                None => {
                    *in_flight = Some(Arc::new(InFlightState::new()));
                    None
                }
            }
        };

        if let Some(state) = state {
            debug!("{}: joining in-flight fetch", self.key);
            return state.wait().await;
        }

        // We're the leader for this key
        let result = self.fetch().await;

        if let Ok(ref image) = result {
            *self.image.write() = Some(Arc::clone(image));
        }

        let state = self.in_flight.lock().await.take();
        if let Some(state) = state {
            *state.result.lock() = Some(result.clone());
            state.notify.notify_waiters();
        }

        result
    }

    /// Perform the role-specific fetch and validate the payload.
    async fn fetch(&self) -> Result<Arc<VolumetricImage>, ViewError> {
        info!("Fetching image data for {}", self.key);

        let payload = match &self.key {
            ImageKey::Base { volume_id } => {
                self.transport.fetch_base_image_slices(volume_id).await
            }
            ImageKey::Segmentation {
                segmentation_id,
                volume_id,
            } => {
                self.transport
                    .fetch_segmentation_slices(segmentation_id, volume_id)
                    .await
            }
            ImageKey::Diff { seg1_id, seg2_id } => {
                self.transport.fetch_diff_slices(seg1_id, seg2_id).await
            }
        };

        let image = payload
            .and_then(|payload| VolumetricImage::from_payload(self.key.clone(), payload))
            .map_err(|e| {
                warn!("Fetching {} failed: {}", self.key, e);
                ViewError::FetchFailure(e)
            })?;

        debug!(
            "{}: loaded {} slice(s) of {}x{}",
            self.key,
            image.slice_count(),
            image.shape()[0],
            image.shape()[1]
        );

        Ok(Arc::new(image))
    }

    /// Metadata record of the backing file.
    pub fn file(&self) -> Option<&Arc<FileRecord<T>>> {
        self.file.as_ref()
    }

    /// Tag and comment of the backing file.
    pub async fn file_info(&self) -> Result<FileInfo, ViewError> {
        self.file
            .as_ref()
            .ok_or(ViewError::NoBackingFile)?
            .file_info()
            .await
    }

    pub async fn set_tag(&self, tag: &str) -> Result<(), ViewError> {
        self.file
            .as_ref()
            .ok_or(ViewError::NoBackingFile)?
            .set_tag(tag)
            .await
    }

    pub async fn set_comment(&self, comment: &str) -> Result<(), ViewError> {
        self.file
            .as_ref()
            .ok_or(ViewError::NoBackingFile)?
            .set_comment(comment)
            .await
    }
}

// =============================================================================
// FileRecord
// =============================================================================

/// Cached tag and comment of one file, with write-through updates.
///
/// Shared by every image source backed by the same file so an edit made
/// through one panel is visible through all of them.
pub struct FileRecord<T: Transport> {
    file_id: String,
    transport: Arc<T>,

    /// Cached metadata; the lock is held across the fetch so concurrent
    /// readers share it
    info: Mutex<Option<FileInfo>>,
}

impl<T: Transport> FileRecord<T> {
    pub fn new(file_id: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            file_id: file_id.into(),
            transport,
            info: Mutex::new(None),
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Cached metadata without fetching.
    pub async fn cached(&self) -> Option<FileInfo> {
        self.info.lock().await.clone()
    }

    /// Get the file's tag and comment, fetching them once.
    pub async fn file_info(&self) -> Result<FileInfo, ViewError> {
        let mut info = self.info.lock().await;
        if let Some(ref cached) = *info {
            return Ok(cached.clone());
        }

        let fetched = self.transport.fetch_file_info(&self.file_id).await?;
        *info = Some(fetched.clone());
        Ok(fetched)
    }

    /// Replace the tag. The cached value changes only after the service
    /// confirmed the write.
    pub async fn set_tag(&self, tag: &str) -> Result<(), ViewError> {
        self.write(FileField::Tag, tag).await
    }

    /// Replace the comment. The cached value changes only after the service
    /// confirmed the write.
    pub async fn set_comment(&self, comment: &str) -> Result<(), ViewError> {
        self.write(FileField::Comment, comment).await
    }

    async fn write(&self, field: FileField, value: &str) -> Result<(), ViewError> {
        let result: Result<(), FetchError> = match field {
            FileField::Tag => self.transport.set_file_tag(&self.file_id, value).await,
            FileField::Comment => self.transport.set_file_comment(&self.file_id, value).await,
        };

        if let Err(source) = result {
            warn!("Updating {} of file {} failed: {}", field, self.file_id, source);
            return Err(ViewError::WriteFailure { field, source });
        }

        info!("Updated {} of file {}", field, self.file_id);

        // Unfetched metadata stays unfetched; the next read sees the new value
        if let Some(ref mut info) = *self.info.lock().await {
            match field {
                FileField::Tag => info.tag = value.to_string(),
                FileField::Comment => info.comment = value.to_string(),
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
