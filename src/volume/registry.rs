//! Source Registry for handing out image sources and file records.
//!
//! The registry provides:
//! - One shared [`ImageSource`] per image identity, so repeated selections of
//!   the same image never fetch twice
//! - LRU bounding of the number of retained payloads
//! - One shared [`FileRecord`] per file id, so tag/comment edits are seen by
//!   every image backed by that file
//!
//! Creating a source is cheap and synchronous; fetching happens on the
//! source's first request.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::transport::Transport;

use super::image::ImageKey;
use super::source::{FileRecord, ImageSource};

/// Default number of image payloads kept alive by the registry.
pub const DEFAULT_SOURCE_CACHE_CAPACITY: usize = 64;

/// Registry of image sources keyed by image identity.
pub struct SourceRegistry<T: Transport> {
    transport: Arc<T>,

    /// Sources indexed by image identity
    sources: Mutex<LruCache<ImageKey, Arc<ImageSource<T>>>>,

    /// File metadata records indexed by file id
    files: Mutex<HashMap<String, Arc<FileRecord<T>>>>,
}

impl<T: Transport> SourceRegistry<T> {
    /// Create a registry with the default capacity.
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_capacity(transport, DEFAULT_SOURCE_CACHE_CAPACITY)
    }

    /// Create a registry retaining at most `capacity` sources.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(transport: Arc<T>, capacity: usize) -> Self {
        Self {
            transport,
            sources: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Get the source for `key`, creating it if needed.
    pub fn source(&self, key: &ImageKey) -> Arc<ImageSource<T>> {
        let mut sources = self.sources.lock();
        if let Some(source) = sources.get(key) {
            return Arc::clone(source);
        }

        debug!("Creating image source for {}", key);
        let file = key.file_id().map(|id| self.file(id));
        let source = Arc::new(ImageSource::new(
            key.clone(),
            Arc::clone(&self.transport),
            file,
        ));
        sources.put(key.clone(), Arc::clone(&source));
        source
    }

    /// Get the source for `key` only if it exists already.
    pub fn existing(&self, key: &ImageKey) -> Option<Arc<ImageSource<T>>> {
        self.sources.lock().peek(key).cloned()
    }

    /// Get the metadata record of a file, creating it if needed.
    pub fn file(&self, file_id: &str) -> Arc<FileRecord<T>> {
        let mut files = self.files.lock();
        Arc::clone(files.entry(file_id.to_string()).or_insert_with(|| {
            Arc::new(FileRecord::new(file_id, Arc::clone(&self.transport)))
        }))
    }

    /// Drop a source so its next request fetches again.
    pub fn invalidate(&self, key: &ImageKey) {
        self.sources.lock().pop(key);
    }

    /// Number of retained sources.
    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }
}
