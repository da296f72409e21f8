//! Offscreen rendering surface producing PNG images.
//!
//! The slice is placed in the middle of the surface keeping its physical
//! aspect ratio (pixel count times spacing). At [`Camera::AUTO_ZOOM`] the
//! longer side exactly fills the surface; other zoom levels scale around the
//! center. Sampling is nearest-neighbour. Each pixel is colored through the
//! active [`Transfer`] and composited over the background color.

use std::path::Path;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::RgbImage;
use tracing::debug;

use crate::error::SurfaceError;
use crate::grid::GridSlice;

use super::surface::{Camera, RenderSurface, SurfaceSetup};
use super::transfer::Transfer;

/// Scalars retained from the last `set_scalars` call.
#[derive(Debug, Clone)]
struct Scalars {
    values: Vec<f32>,
    shape: [usize; 2],
    spacing: [f64; 2],
}

/// [`RenderSurface`] rasterizing into an RGB frame.
#[derive(Debug, Clone, Default)]
pub struct PngSurface {
    setup: SurfaceSetup,
    scalars: Option<Scalars>,
    transfer: Option<Transfer>,
    camera: Camera,

    /// Last drawn frame
    frame: Option<RgbImage>,
    draws: usize,
}

impl PngSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last drawn frame, if any.
    pub fn frame(&self) -> Option<&RgbImage> {
        self.frame.as_ref()
    }

    /// Number of frames drawn.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    /// Encode the last drawn frame as PNG.
    pub fn encode_png(&self) -> Result<Bytes, SurfaceError> {
        let frame = self.frame.as_ref().ok_or(SurfaceError::NotDrawn)?;

        let mut output = Vec::new();
        frame
            .write_with_encoder(PngEncoder::new(&mut output))
            .map_err(|e| SurfaceError::Encode(e.to_string()))?;

        Ok(Bytes::from(output))
    }

    /// Encode the last drawn frame and write it to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), SurfaceError> {
        let png = self.encode_png()?;
        std::fs::write(path, &png).map_err(|e| SurfaceError::Io(e.to_string()))?;
        debug!("Wrote {} bytes to {}", png.len(), path.display());
        Ok(())
    }

    fn rasterize(&self) -> RgbImage {
        let [width, height] = self.setup.size;
        let background = self.setup.background;
        let mut frame = RgbImage::from_pixel(width, height, to_pixel(background));

        let (Some(scalars), Some(transfer)) = (&self.scalars, &self.transfer) else {
            return frame;
        };
        let [columns, rows] = scalars.shape;
        if columns == 0 || rows == 0 {
            return frame;
        }

        // Physical extent of the slice
        let extent_x = columns as f64 * scalars.spacing[0];
        let extent_y = rows as f64 * scalars.spacing[1];
        if extent_x <= 0.0 || extent_y <= 0.0 {
            return frame;
        }

        let fit = (width as f64 / extent_x).min(height as f64 / extent_y);
        let scale = fit * self.camera.zoom / Camera::AUTO_ZOOM;
        let center = (width as f64 / 2.0, height as f64 / 2.0);
        let flip = self.camera.view_up[1] > 0.0;

        for (px, py, pixel) in frame.enumerate_pixels_mut() {
            let x = (px as f64 + 0.5 - center.0) / scale + extent_x / 2.0;
            let y = (py as f64 + 0.5 - center.1) / scale + extent_y / 2.0;
            if x < 0.0 || y < 0.0 || x >= extent_x || y >= extent_y {
                continue;
            }

            let column = ((x / scalars.spacing[0]) as usize).min(columns - 1);
            let mut row = ((y / scalars.spacing[1]) as usize).min(rows - 1);
            if flip {
                row = rows - 1 - row;
            }

            let (rgb, alpha) = transfer.rgba(scalars.values[row * columns + column]);
            let alpha = alpha.clamp(0.0, 1.0);
            let blended = [
                background[0] * (1.0 - alpha) + rgb[0] * alpha,
                background[1] * (1.0 - alpha) + rgb[1] * alpha,
                background[2] * (1.0 - alpha) + rgb[2] * alpha,
            ];
            *pixel = to_pixel(blended);
        }

        frame
    }
}

fn to_pixel(rgb: [f32; 3]) -> image::Rgb<u8> {
    image::Rgb(rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
}

impl RenderSurface for PngSurface {
    fn initialize(&mut self, setup: &SurfaceSetup) {
        self.setup = *setup;
        self.scalars = None;
        self.transfer = None;
        self.camera = Camera::auto();
        self.frame = None;
    }

    fn set_scalars(&mut self, slice: GridSlice<'_>) {
        self.scalars = Some(Scalars {
            values: slice.values.to_vec(),
            shape: slice.shape,
            spacing: slice.spacing,
        });
    }

    fn set_transfer(&mut self, transfer: &Transfer) {
        self.transfer = Some(transfer.clone());
    }

    fn set_camera(&mut self, camera: &Camera) {
        self.camera = *camera;
    }

    fn draw(&mut self) {
        self.frame = Some(self.rasterize());
        self.draws += 1;
    }
}
