//! Binding between a slice view and a rendering surface.
//!
//! ```text
//! SliceView ──► SliceCache::get(image, label) ──► DecodedGrid::slice(index)
//!                                                        │
//!                      Transfer (palette or window) ◄────┤
//!                                                        ▼
//!                                                 RenderSurface
//! ```
//!
//! [`ViewBinding::render`] performs the full setup (surface, camera, levels)
//! and is meant to run once per surface. [`ViewBinding::rerender_slice`] is
//! the cheap path used after a slice or label change: it swaps the scalars
//! and the transfer function but keeps the camera. Calling it before any
//! full render performs the full render instead.

use std::sync::Arc;

use tracing::debug;

use crate::error::ViewError;
use crate::grid::{GridSlice, SliceCache};
use crate::volume::{LabelFilter, SliceView};

use super::surface::{Camera, RenderSurface, SurfaceSetup};
use super::transfer::Transfer;

/// Adapts a [`SliceView`] into calls on one [`RenderSurface`].
pub struct ViewBinding<S: RenderSurface> {
    surface: S,
    cache: Arc<SliceCache>,
    setup: SurfaceSetup,

    /// Slice currently bound
    image: Option<SliceView>,

    /// Label filter applied when decoding, independent of the view's own
    label: LabelFilter,

    camera: Camera,
    transfer: Option<Transfer>,
    rendered: bool,
}

impl<S: RenderSurface> ViewBinding<S> {
    pub fn new(surface: S, cache: Arc<SliceCache>) -> Self {
        Self::with_setup(surface, cache, SurfaceSetup::default())
    }

    pub fn with_setup(surface: S, cache: Arc<SliceCache>, setup: SurfaceSetup) -> Self {
        Self {
            surface,
            cache,
            setup,
            image: None,
            label: LabelFilter::All,
            camera: Camera::auto(),
            transfer: None,
            rendered: false,
        }
    }

    /// Bind a slice; its label filter becomes the binding's filter.
    ///
    /// Nothing is drawn until the next render.
    pub fn set_image(&mut self, view: SliceView) -> &mut Self {
        self.label = view.label();
        self.image = Some(view);
        self
    }

    pub fn set_label_value(&mut self, label: LabelFilter) -> &mut Self {
        self.label = label;
        self
    }

    pub fn image(&self) -> Option<&SliceView> {
        self.image.as_ref()
    }

    pub fn label(&self) -> LabelFilter {
        self.label
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// Whether the full render has run.
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Full render: set up the surface, upload data, reset levels and camera.
    pub async fn render(&mut self) -> Result<(), ViewError> {
        debug!("Full render");
        self.surface.initialize(&self.setup);
        self.upload().await?;
        self.camera = Camera::auto();
        self.surface.set_camera(&self.camera);
        self.surface.draw();
        self.rendered = true;
        Ok(())
    }

    /// Cheap render after a slice or label change; keeps the camera.
    pub async fn rerender_slice(&mut self) -> Result<(), ViewError> {
        if !self.rendered {
            return self.render().await;
        }
        self.upload().await?;
        self.surface.draw();
        Ok(())
    }

    /// Push the bound slice and its transfer function to the surface.
    async fn upload(&mut self) -> Result<(), ViewError> {
        let Some(view) = self.image.as_ref() else {
            self.transfer = None;
            return Ok(());
        };

        let grid = self.cache.get(view.image(), self.label).await;
        let slice = grid
            .slice(view.index())
            .ok_or(ViewError::SliceOutOfRange {
                index: view.index(),
                count: grid.slice_count(),
            })?;

        let transfer = transfer_for(view, slice);
        self.surface.set_scalars(slice);
        self.surface.set_transfer(&transfer);
        self.transfer = Some(transfer);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Camera and levels
    // -------------------------------------------------------------------------

    pub fn zoom_in(&mut self) {
        self.zoom(Camera::ZOOM_IN_FACTOR);
    }

    pub fn zoom_out(&mut self) {
        self.zoom(Camera::ZOOM_OUT_FACTOR);
    }

    fn zoom(&mut self, factor: f64) {
        if !self.rendered {
            debug!("Zoom ignored before first render");
            return;
        }
        self.camera = self.camera.zoomed(factor);
        self.surface.set_camera(&self.camera);
        self.surface.draw();
    }

    /// Reset the camera to fit the slice.
    pub fn auto_zoom(&mut self) {
        if !self.rendered {
            debug!("Auto-zoom ignored before first render");
            return;
        }
        self.camera = Camera::auto();
        self.surface.set_camera(&self.camera);
        self.surface.draw();
    }

    /// Recompute the grayscale window from the displayed slice.
    ///
    /// Categorical panels keep their palette.
    pub async fn auto_levels(&mut self) -> Result<(), ViewError> {
        if !self.rendered {
            debug!("Auto-levels ignored before first render");
            return Ok(());
        }
        self.upload().await?;
        self.surface.draw();
        Ok(())
    }
}

/// Palette for categorical data, auto-levels over the slice otherwise.
fn transfer_for(view: &SliceView, slice: GridSlice<'_>) -> Transfer {
    if view.labels().is_empty() {
        Transfer::grayscale(slice.scalar_range())
    } else {
        Transfer::categorical(view.labels())
    }
}
