//! # segview
//!
//! Side-by-side comparison of two volumetric segmentations against a shared
//! base image, slice by slice, with per-label isolation and a difference
//! overlay.
//!
//! The heavy lifting is done elsewhere: a REST service computes the
//! segmentations, their difference and the statistics, and a rendering
//! surface draws pixels. This crate decides, on every selection change,
//! which data can be reused, which must be fetched and which panels must be
//! redrawn, while tolerating responses that arrive out of order.
//!
//! ## Architecture
//!
//! ```text
//!  user action ──► SelectionStore ──► Orchestrator ──► SourceRegistry / ImageSource ──► Transport
//!                                          │                     │
//!                                          │                     ▼
//!                                          │               SliceCache (decoded grids)
//!                                          ▼                     │
//!                                   DiffCoordinator              ▼
//!                                          └─────────────► ViewBinding ──► RenderSurface
//! ```
//!
//! - [`transport`] - Fetch collaborator trait and the HTTP client
//! - [`volume`] - Image payloads, identities and lazily fetched sources
//! - [`grid`] - Decoded grids and the slice cache
//! - [`selection`] - Selection state and change notifications
//! - [`view`] - View bindings, transfer functions and rendering surfaces
//! - [`orchestrator`] - Wiring of selection changes to panels
//! - [`config`] - CLI configuration of the `segview` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use segview::{GirderClient, NoopHost, Orchestrator, PanelSurfaces, PngSurface};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GirderClient::new(
//!     "https://data.example.org/api/v1",
//!     None,
//!     std::time::Duration::from_secs(30),
//! )?;
//! let orchestrator = Orchestrator::new(
//!     "5f1a",
//!     Arc::new(client),
//!     Arc::new(NoopHost),
//!     PanelSurfaces::<PngSurface>::default(),
//! );
//!
//! orchestrator.load().await?;
//! orchestrator.select_seg2(2).await;
//! orchestrator.select_slice(40).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod orchestrator;
pub mod selection;
pub mod transport;
pub mod view;
pub mod volume;

// Re-export commonly used types
pub use config::Config;
pub use error::{FetchError, FileField, SurfaceError, ViewError};
pub use grid::{DecodedGrid, GridKey, GridSlice, SliceCache, DEFAULT_GRID_CACHE_CAPACITY};
pub use orchestrator::{
    Applied, DiffCoordinator, DiffRequest, DiffUpdate, NoopHost, Orchestrator,
    OrchestratorOptions, Panel, PanelKind, PanelState, PanelSurfaces, Ticket, ViewHost,
};
pub use selection::{
    Collection, ListenerId, SegRole, SelectionEvent, SelectionRole, SelectionState,
    SelectionStore,
};
pub use transport::{FileInfo, GirderClient, Item, Transport, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use view::{
    Camera, ColorTransferFunction, PiecewiseFunction, PngSurface, RenderSurface, SurfaceSetup,
    Transfer, ViewBinding, WindowLevel,
};
pub use volume::{
    DiffMetrics, FileRecord, ImageKey, ImagePayload, ImageSource, Label, LabelFilter,
    Quantification, RawSlice, SliceView, SourceRegistry, VolumetricImage,
    DEFAULT_SOURCE_CACHE_CAPACITY,
};
