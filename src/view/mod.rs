//! View layer.
//!
//! A [`ViewBinding`] turns the currently bound [`SliceView`](crate::volume::SliceView)
//! into calls on a [`RenderSurface`], the external drawable element of one
//! panel. Decoding goes through the shared [`SliceCache`](crate::grid::SliceCache).
//!
//! # Components
//!
//! - [`ViewBinding`]: Full and cheap render paths, camera and levels
//! - [`RenderSurface`]: Trait implemented by drawable elements
//! - [`Transfer`]: Categorical palette or grayscale window/level
//! - [`PngSurface`]: Offscreen surface encoding PNG images

mod binding;
mod png;
mod surface;
mod transfer;

pub use binding::ViewBinding;
pub use png::PngSurface;
pub use surface::{
    Camera, RenderSurface, SurfaceSetup, DEFAULT_BACKGROUND, DEFAULT_SURFACE_SIZE,
};
pub use transfer::{
    ColorTransferFunction, PiecewiseFunction, Transfer, WindowLevel, BACKGROUND_VALUE,
    LABEL_OPACITY,
};
