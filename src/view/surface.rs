use crate::grid::GridSlice;

use super::transfer::Transfer;

/// Background color of every panel.
pub const DEFAULT_BACKGROUND: [f32; 3] = [0.33, 0.33, 0.33];

/// Default edge length of a panel in pixels.
pub const DEFAULT_SURFACE_SIZE: u32 = 256;

/// One-time setup of a drawable element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSetup {
    /// Width and height in pixels
    pub size: [u32; 2],
    pub background: [f32; 3],
}

impl SurfaceSetup {
    pub fn square(size: u32) -> Self {
        Self {
            size: [size, size],
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl Default for SurfaceSetup {
    fn default() -> Self {
        Self::square(DEFAULT_SURFACE_SIZE)
    }
}

/// Camera looking at a slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Magnification; at [`Camera::AUTO_ZOOM`] the slice fills the surface
    pub zoom: f64,
    pub view_up: [f64; 3],
}

impl Camera {
    pub const AUTO_ZOOM: f64 = 1.44;
    pub const ZOOM_IN_FACTOR: f64 = 9.0 / 8.0;
    pub const ZOOM_OUT_FACTOR: f64 = 8.0 / 9.0;

    /// Camera reset to fit the slice, first row at the top.
    pub fn auto() -> Self {
        Self {
            zoom: Self::AUTO_ZOOM,
            view_up: [0.0, -1.0, 0.0],
        }
    }

    pub fn zoomed(self, factor: f64) -> Self {
        Self {
            zoom: self.zoom * factor,
            ..self
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::auto()
    }
}

/// A drawable element a [`ViewBinding`](super::ViewBinding) drives.
///
/// Calls arrive in a fixed pattern: `initialize` once per full render,
/// then any of the setters, then `draw`. Implementations only need to
/// retain state; nothing is visible until `draw`.
pub trait RenderSurface: Send + 'static {
    /// Create the drawing context. Discards anything set before.
    fn initialize(&mut self, setup: &SurfaceSetup);

    /// Replace the displayed scalars.
    fn set_scalars(&mut self, slice: GridSlice<'_>);

    fn set_transfer(&mut self, transfer: &Transfer);

    fn set_camera(&mut self, camera: &Camera);

    /// Present the current state.
    fn draw(&mut self);
}
