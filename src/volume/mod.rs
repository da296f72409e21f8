//! Image data layer.
//!
//! This module owns everything about fetched volumetric data: the data model,
//! the lazily fetched per-identity sources and the registry that shares them.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Orchestrator               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SourceRegistry               │
//! │  (one ImageSource per ImageKey, LRU)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             ImageSource                 │
//! │  (singleflight fetch, slice + label)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            Transport Trait              │
//! └─────────────────────────────────────────┘
//! ```

mod image;
mod registry;
mod source;

pub use image::{
    DiffMetrics, ImageKey, ImagePayload, Label, LabelFilter, Quantification, RawSlice, SliceView,
    VolumetricImage,
};
pub use registry::{SourceRegistry, DEFAULT_SOURCE_CACHE_CAPACITY};
pub use source::{FileRecord, ImageSource};
