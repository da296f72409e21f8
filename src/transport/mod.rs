//! Transport layer.
//!
//! The viewer core never talks to the network directly. Everything it needs
//! from the segmentation service goes through the [`Transport`] trait, so the
//! same orchestration runs against the HTTP client in production and against
//! in-memory mocks in tests.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SourceRegistry / FileRecord       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            Transport Trait              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             GirderClient                │
//! │      (reqwest, JSON over HTTPS)         │
//! └─────────────────────────────────────────┘
//! ```

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::volume::ImagePayload;

pub use client::{GirderClient, DEFAULT_REQUEST_TIMEOUT_SECS};

/// A selectable entry of a collection (a volume or a segmentation file).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Stable id, used for every fetch
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    /// Display name
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name to show in dropdowns, falling back to a positional name.
    pub fn display_name(&self, index: usize) -> String {
        if self.name.is_empty() {
            format!("Segmentation {}", index + 1)
        } else {
            self.name.clone()
        }
    }
}

/// Editable metadata attached to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tag: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,
}

/// The service reports unset strings as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Logical operations the viewer needs from the segmentation service.
///
/// Implementations must be thread-safe. Timeouts and retries are the
/// implementation's concern; the core only sees success or [`FetchError`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch every slice of a segmentation resampled onto a base volume.
    async fn fetch_segmentation_slices(
        &self,
        segmentation_id: &str,
        volume_id: &str,
    ) -> Result<ImagePayload, FetchError>;

    /// Fetch every slice of the difference between two segmentations.
    async fn fetch_diff_slices(
        &self,
        seg1_id: &str,
        seg2_id: &str,
    ) -> Result<ImagePayload, FetchError>;

    /// Fetch every slice of a base volume.
    async fn fetch_base_image_slices(&self, volume_id: &str) -> Result<ImagePayload, FetchError>;

    /// List the base volumes available for a container.
    async fn fetch_volumes(&self, container_id: &str) -> Result<Vec<Item>, FetchError>;

    /// List the segmentation files attached to a container.
    async fn fetch_segmentations(&self, container_id: &str) -> Result<Vec<Item>, FetchError>;

    /// Read the tag and comment of a file.
    async fn fetch_file_info(&self, file_id: &str) -> Result<FileInfo, FetchError>;

    /// Replace the tag of a file. Returns once the service confirmed the write.
    async fn set_file_tag(&self, file_id: &str, tag: &str) -> Result<(), FetchError>;

    /// Replace the comment of a file. Returns once the service confirmed the write.
    async fn set_file_comment(&self, file_id: &str, comment: &str) -> Result<(), FetchError>;
}
