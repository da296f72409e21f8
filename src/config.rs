//! Configuration for the segview command-line renderer.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `SEGVIEW_` prefix:
//!
//! - `SEGVIEW_API_URL` - Base URL of the REST API (required)
//! - `SEGVIEW_TOKEN` - Authentication token
//! - `SEGVIEW_ITEM` - Item whose volumes and segmentations are compared (required)
//! - `SEGVIEW_VOLUME`, `SEGVIEW_SEG1`, `SEGVIEW_SEG2` - Selected indices (default: 0, 0, 1)
//! - `SEGVIEW_LABEL1`, `SEGVIEW_LABEL2` - Label filters, -1 for all labels (default: -1)
//! - `SEGVIEW_SLICE` - Slice index (default: 0)
//! - `SEGVIEW_OUTPUT_DIR` - Directory receiving the PNG files (default: .)
//! - `SEGVIEW_SURFACE_SIZE` - Edge length of each PNG in pixels (default: 256)
//! - `SEGVIEW_CACHE_SOURCES` - Max fetched payloads to keep (default: 64)
//! - `SEGVIEW_CACHE_GRIDS` - Max decoded grids to keep (default: 32)
//! - `SEGVIEW_REQUEST_TIMEOUT` - HTTP request timeout in seconds (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::grid::DEFAULT_GRID_CACHE_CAPACITY;
use crate::orchestrator::OrchestratorOptions;
use crate::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::view::{SurfaceSetup, DEFAULT_SURFACE_SIZE};
use crate::volume::{LabelFilter, DEFAULT_SOURCE_CACHE_CAPACITY};

/// Largest accepted PNG edge length.
pub const MAX_SURFACE_SIZE: u32 = 4096;

/// segview - compare two segmentations of a volume, slice by slice.
///
/// Loads the volumes and segmentations attached to an item, applies the
/// requested selection and writes one PNG per panel (base image, both
/// segmentations and their difference).
#[derive(Parser, Debug, Clone)]
#[command(name = "segview")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Service
    // =========================================================================
    /// Base URL of the REST API, e.g. https://host/api/v1
    #[arg(long, env = "SEGVIEW_API_URL")]
    pub api_url: String,

    /// Authentication token sent with every request.
    #[arg(long, env = "SEGVIEW_TOKEN")]
    pub token: Option<String>,

    /// Item whose volumes and segmentations are compared.
    #[arg(long, env = "SEGVIEW_ITEM")]
    pub item: String,

    /// HTTP request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "SEGVIEW_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // =========================================================================
    // Selection
    // =========================================================================
    /// Index of the base volume.
    #[arg(long, default_value_t = 0, env = "SEGVIEW_VOLUME")]
    pub volume: usize,

    /// Index of the first segmentation.
    #[arg(long, default_value_t = 0, env = "SEGVIEW_SEG1")]
    pub seg1: usize,

    /// Index of the second segmentation.
    #[arg(long, default_value_t = 1, env = "SEGVIEW_SEG2")]
    pub seg2: usize,

    /// Label shown for the first segmentation (-1 for all labels).
    #[arg(long, default_value_t = LabelFilter::ALL_VALUE, allow_negative_numbers = true, env = "SEGVIEW_LABEL1")]
    pub label1: i64,

    /// Label shown for the second segmentation (-1 for all labels).
    #[arg(long, default_value_t = LabelFilter::ALL_VALUE, allow_negative_numbers = true, env = "SEGVIEW_LABEL2")]
    pub label2: i64,

    /// Slice to render; clamped to the slices of the base volume.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true, env = "SEGVIEW_SLICE")]
    pub slice: i64,

    // =========================================================================
    // File Metadata
    // =========================================================================
    /// New tag for the first segmentation's file.
    #[arg(long, env = "SEGVIEW_SEG1_TAG")]
    pub seg1_tag: Option<String>,

    /// New comment for the first segmentation's file.
    #[arg(long, env = "SEGVIEW_SEG1_COMMENT")]
    pub seg1_comment: Option<String>,

    /// New tag for the second segmentation's file.
    #[arg(long, env = "SEGVIEW_SEG2_TAG")]
    pub seg2_tag: Option<String>,

    /// New comment for the second segmentation's file.
    #[arg(long, env = "SEGVIEW_SEG2_COMMENT")]
    pub seg2_comment: Option<String>,

    // =========================================================================
    // Output
    // =========================================================================
    /// Directory receiving base.png, seg1.png, seg2.png and diff.png.
    #[arg(long, default_value = ".", env = "SEGVIEW_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Edge length of each PNG in pixels.
    #[arg(long, default_value_t = DEFAULT_SURFACE_SIZE, env = "SEGVIEW_SURFACE_SIZE")]
    pub surface_size: u32,

    // =========================================================================
    // Cache
    // =========================================================================
    /// Maximum number of fetched image payloads to keep.
    #[arg(long, default_value_t = DEFAULT_SOURCE_CACHE_CAPACITY, env = "SEGVIEW_CACHE_SOURCES")]
    pub cache_sources: usize,

    /// Maximum number of decoded grids to keep.
    #[arg(long, default_value_t = DEFAULT_GRID_CACHE_CAPACITY, env = "SEGVIEW_CACHE_GRIDS")]
    pub cache_grids: usize,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(format!(
                "api_url must start with http:// or https://, got '{}'",
                self.api_url
            ));
        }

        if self.item.trim().is_empty() {
            return Err("Item id is required. Set --item or SEGVIEW_ITEM".to_string());
        }

        if self.cache_sources == 0 {
            return Err("cache_sources must be greater than 0".to_string());
        }

        if self.cache_grids == 0 {
            return Err("cache_grids must be greater than 0".to_string());
        }

        if self.surface_size == 0 || self.surface_size > MAX_SURFACE_SIZE {
            return Err(format!(
                "surface_size must be between 1 and {}",
                MAX_SURFACE_SIZE
            ));
        }

        if self.request_timeout == 0 {
            return Err("request_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn label1(&self) -> LabelFilter {
        LabelFilter::from_value(self.label1)
    }

    pub fn label2(&self) -> LabelFilter {
        LabelFilter::from_value(self.label2)
    }

    /// Cache and surface sizing for the orchestrator.
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            source_capacity: self.cache_sources,
            grid_capacity: self.cache_grids,
            surface: SurfaceSetup::square(self.surface_size),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
