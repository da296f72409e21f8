//! Volumetric image data model.
//!
//! A [`VolumetricImage`] is the full per-slice payload of one fetched dataset
//! (a base volume, a segmentation of a volume, or the difference between two
//! segmentations). It is immutable once built and shared behind `Arc`.
//!
//! [`SliceView`] narrows an image to one slice and one [`LabelFilter`]. The
//! narrowing is a pure, synchronous derivation; no data is copied until the
//! filtered values are requested.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FetchError, ViewError};

// =============================================================================
// Image Identity
// =============================================================================

/// Stable identity of a fetched dataset.
///
/// The identity encodes both the role of the image and every id the fetch
/// depends on, so two keys are equal exactly when they would fetch the same
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageKey {
    /// The base image of a volume
    Base { volume_id: Arc<str> },

    /// A segmentation resampled onto a specific base volume
    Segmentation {
        segmentation_id: Arc<str>,
        volume_id: Arc<str>,
    },

    /// The computed difference between two segmentations
    Diff { seg1_id: Arc<str>, seg2_id: Arc<str> },
}

impl ImageKey {
    pub fn base(volume_id: impl Into<Arc<str>>) -> Self {
        ImageKey::Base {
            volume_id: volume_id.into(),
        }
    }

    pub fn segmentation(
        segmentation_id: impl Into<Arc<str>>,
        volume_id: impl Into<Arc<str>>,
    ) -> Self {
        ImageKey::Segmentation {
            segmentation_id: segmentation_id.into(),
            volume_id: volume_id.into(),
        }
    }

    pub fn diff(seg1_id: impl Into<Arc<str>>, seg2_id: impl Into<Arc<str>>) -> Self {
        ImageKey::Diff {
            seg1_id: seg1_id.into(),
            seg2_id: seg2_id.into(),
        }
    }

    /// Id of the file whose tag and comment describe this image, if any.
    pub fn file_id(&self) -> Option<&str> {
        match self {
            ImageKey::Base { volume_id } => Some(volume_id),
            ImageKey::Segmentation {
                segmentation_id, ..
            } => Some(segmentation_id),
            ImageKey::Diff { .. } => None,
        }
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKey::Base { volume_id } => write!(f, "base:{}", volume_id),
            ImageKey::Segmentation {
                segmentation_id,
                volume_id,
            } => write!(f, "seg:{}@{}", segmentation_id, volume_id),
            ImageKey::Diff { seg1_id, seg2_id } => write!(f, "diff:{}-{}", seg1_id, seg2_id),
        }
    }
}

// =============================================================================
// Label Filter
// =============================================================================

/// Selects which categorical segment of an image is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LabelFilter {
    /// Show every label; data passes through unchanged (wire value `-1`)
    #[default]
    All,

    /// Keep only voxels equal to this value, zero the rest
    Value(i64),
}

impl LabelFilter {
    /// Wire value used by the dropdowns and the REST API.
    pub const ALL_VALUE: i64 = -1;

    pub fn from_value(value: i64) -> Self {
        if value == Self::ALL_VALUE {
            LabelFilter::All
        } else {
            LabelFilter::Value(value)
        }
    }

    pub fn value(&self) -> i64 {
        match self {
            LabelFilter::All => Self::ALL_VALUE,
            LabelFilter::Value(v) => *v,
        }
    }

    /// Apply the filter to one scalar.
    #[inline]
    pub fn apply(&self, scalar: f32) -> f32 {
        match self {
            LabelFilter::All => scalar,
            LabelFilter::Value(v) => {
                if scalar == *v as f32 {
                    scalar
                } else {
                    0.0
                }
            }
        }
    }

    /// Apply the filter to a run of scalars.
    ///
    /// Borrows when the filter is `All`.
    pub fn apply_all<'a>(&self, values: &'a [f32]) -> Cow<'a, [f32]> {
        match self {
            LabelFilter::All => Cow::Borrowed(values),
            LabelFilter::Value(_) => Cow::Owned(values.iter().map(|&v| self.apply(v)).collect()),
        }
    }
}

impl From<i64> for LabelFilter {
    fn from(value: i64) -> Self {
        Self::from_value(value)
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelFilter::All => f.write_str("all"),
            LabelFilter::Value(v) => write!(f, "{}", v),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// A categorical label and its display color (RGB, each channel in `0..=1`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub value: i64,
    pub color: [f32; 3],
}

impl Label {
    /// Bring a color given on a 0-255 scale into `0..=1`.
    fn normalized(mut self) -> Self {
        if self.color.iter().any(|&c| c > 1.0) {
            for c in self.color.iter_mut() {
                *c = (*c / 255.0).clamp(0.0, 1.0);
            }
        }
        self
    }
}

/// Summary statistics computed by the segmentation service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantification {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sd: f64,
    pub volume: f64,
}

/// Agreement metrics between two segmentations, delivered with a diff payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiffMetrics {
    pub dice: f64,
    pub hausdorff: f64,
    pub assd: f64,
}

// =============================================================================
// Wire Payload
// =============================================================================

/// One slice as delivered on the wire: either flat or as rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawSlice {
    Flat(Vec<f32>),
    Rows(Vec<Vec<f32>>),
}

impl RawSlice {
    fn into_flat(self) -> Vec<f32> {
        match self {
            RawSlice::Flat(values) => values,
            RawSlice::Rows(rows) => rows.into_iter().flatten().collect(),
        }
    }
}

/// Image payload exactly as returned by the slice endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagePayload {
    pub data: Vec<RawSlice>,
    pub shape: [usize; 2],
    pub spacing: [f64; 2],
    #[serde(default)]
    pub labels: Option<Vec<Label>>,
    #[serde(default)]
    pub quantification: Option<Quantification>,
    #[serde(default)]
    pub metrics: Option<DiffMetrics>,
}

// =============================================================================
// VolumetricImage
// =============================================================================

/// Largest slice, in values, that can be held in one allocation.
const MAX_SLICE_LEN: usize = isize::MAX as usize / std::mem::size_of::<f32>();

/// Source of [`VolumetricImage::payload_id`] values.
static NEXT_PAYLOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Full per-slice payload of one dataset.
///
/// Invariant: every slice holds exactly `shape[0] * shape[1]` values.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumetricImage {
    key: ImageKey,
    payload_id: u64,
    shape: [usize; 2],
    spacing: [f64; 2],
    slices: Vec<Vec<f32>>,
    labels: Vec<Label>,
    quantification: Option<Quantification>,
    metrics: Option<DiffMetrics>,
}

impl VolumetricImage {
    /// Validate a wire payload and turn it into an image.
    pub fn from_payload(key: ImageKey, payload: ImagePayload) -> Result<Self, FetchError> {
        let [rows, cols] = payload.shape;
        let slice_len = rows
            .checked_mul(cols)
            .filter(|&len| len <= MAX_SLICE_LEN)
            .ok_or_else(|| {
                FetchError::InvalidPayload(format!(
                    "{}: shape {}x{} is too large",
                    key, rows, cols
                ))
            })?;
        let mut slices = Vec::with_capacity(payload.data.len());

        for (index, raw) in payload.data.into_iter().enumerate() {
            let values = raw.into_flat();
            if values.len() != slice_len {
                return Err(FetchError::InvalidPayload(format!(
                    "{}: slice {} has {} values, expected {} ({}x{})",
                    key,
                    index,
                    values.len(),
                    slice_len,
                    payload.shape[0],
                    payload.shape[1]
                )));
            }
            slices.push(values);
        }

        let labels = payload
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(Label::normalized)
            .collect();

        Ok(Self {
            key,
            payload_id: NEXT_PAYLOAD_ID.fetch_add(1, Ordering::Relaxed),
            shape: payload.shape,
            spacing: payload.spacing,
            slices,
            labels,
            quantification: payload.quantification,
            metrics: payload.metrics,
        })
    }

    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    /// Identity of this particular payload.
    ///
    /// Unique per decoded payload, so a refetch of the same [`ImageKey`]
    /// gets a new id. Clones share the id of their original.
    pub fn payload_id(&self) -> u64 {
        self.payload_id
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    /// Number of values in one slice.
    pub fn slice_len(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    pub fn slice(&self, index: usize) -> Option<&[f32]> {
        self.slices.get(index).map(Vec::as_slice)
    }

    pub fn slices(&self) -> impl Iterator<Item = &[f32]> {
        self.slices.iter().map(Vec::as_slice)
    }

    /// Categorical labels; empty for grayscale images.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn is_categorical(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn quantification(&self) -> Option<&Quantification> {
        self.quantification.as_ref()
    }

    pub fn metrics(&self) -> Option<&DiffMetrics> {
        self.metrics.as_ref()
    }
}

// =============================================================================
// SliceView
// =============================================================================

/// A [`VolumetricImage`] narrowed to one slice and filtered by one label.
#[derive(Debug, Clone)]
pub struct SliceView {
    image: Arc<VolumetricImage>,
    index: usize,
    label: LabelFilter,
}

impl SliceView {
    /// Narrow `image` to slice `index`.
    pub fn new(
        image: Arc<VolumetricImage>,
        index: usize,
        label: LabelFilter,
    ) -> Result<Self, ViewError> {
        let count = image.slice_count();
        if index >= count {
            return Err(ViewError::SliceOutOfRange { index, count });
        }
        Ok(Self {
            image,
            index,
            label,
        })
    }

    pub fn key(&self) -> &ImageKey {
        self.image.key()
    }

    /// The full payload this view was derived from.
    pub fn image(&self) -> &Arc<VolumetricImage> {
        &self.image
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> LabelFilter {
        self.label
    }

    /// Same slice with a different label filter.
    pub fn with_label(&self, label: LabelFilter) -> Self {
        Self {
            image: Arc::clone(&self.image),
            index: self.index,
            label,
        }
    }

    pub fn shape(&self) -> [usize; 2] {
        self.image.shape()
    }

    pub fn spacing(&self) -> [f64; 2] {
        self.image.spacing()
    }

    pub fn labels(&self) -> &[Label] {
        self.image.labels()
    }

    pub fn quantification(&self) -> Option<&Quantification> {
        self.image.quantification()
    }

    /// Filtered scalars of this slice.
    pub fn data(&self) -> Cow<'_, [f32]> {
        // index was validated in `new` and images are immutable
        let raw = self.image.slice(self.index).unwrap_or(&[]);
        self.label.apply_all(raw)
    }
}

// =============================================================================
// Tests
// =============================================================================
