//! Scalar-to-color transfer functions.
//!
//! Categorical images (with labels) are colored through a piecewise-linear
//! color function and a matching opacity function: value 0 is transparent
//! background, every other label gets its declared color at
//! [`LABEL_OPACITY`]. Images without labels are drawn in grayscale through a
//! window/level transform.

use crate::volume::Label;

/// Opacity of every non-background label.
pub const LABEL_OPACITY: f32 = 0.7;

/// Scalar value treated as background in categorical images.
pub const BACKGROUND_VALUE: f32 = 0.0;

// =============================================================================
// Piecewise Functions
// =============================================================================

/// Piecewise-linear mapping from scalar to RGB.
///
/// Values outside the node range take the color of the nearest node. An
/// empty function maps everything to black.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorTransferFunction {
    /// Nodes sorted by scalar value
    nodes: Vec<(f32, [f32; 3])>,
}

impl ColorTransferFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; a node at the same value is replaced.
    pub fn add_rgb_point(&mut self, x: f32, rgb: [f32; 3]) {
        insert_node(&mut self.nodes, x, rgb);
    }

    pub fn nodes(&self) -> &[(f32, [f32; 3])] {
        &self.nodes
    }

    pub fn map(&self, x: f32) -> [f32; 3] {
        interpolate(&self.nodes, x, [0.0; 3], |a, b, t| {
            [
                lerp(a[0], b[0], t),
                lerp(a[1], b[1], t),
                lerp(a[2], b[2], t),
            ]
        })
    }
}

/// Piecewise-linear mapping from scalar to opacity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PiecewiseFunction {
    nodes: Vec<(f32, f32)>,
}

impl PiecewiseFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; a node at the same value is replaced.
    pub fn add_point(&mut self, x: f32, y: f32) {
        insert_node(&mut self.nodes, x, y);
    }

    pub fn nodes(&self) -> &[(f32, f32)] {
        &self.nodes
    }

    pub fn map(&self, x: f32) -> f32 {
        interpolate(&self.nodes, x, 0.0, lerp)
    }
}

fn insert_node<V>(nodes: &mut Vec<(f32, V)>, x: f32, value: V) {
    match nodes.binary_search_by(|(nx, _)| nx.total_cmp(&x)) {
        Ok(i) => nodes[i].1 = value,
        Err(i) => nodes.insert(i, (x, value)),
    }
}

fn interpolate<V: Copy>(
    nodes: &[(f32, V)],
    x: f32,
    empty: V,
    mix: impl Fn(V, V, f32) -> V,
) -> V {
    let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
        return empty;
    };
    // NaN compares false against every node
    if x <= first.0 || x.is_nan() {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }

    let upper = nodes.partition_point(|(nx, _)| *nx <= x);
    let (x0, v0) = nodes[upper - 1];
    let (x1, v1) = nodes[upper];
    mix(v0, v1, (x - x0) / (x1 - x0))
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// =============================================================================
// Window / Level
// =============================================================================

/// Grayscale window/level transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    /// Width of the displayed value range
    pub window: f32,
    /// Center of the displayed value range
    pub level: f32,
}

impl WindowLevel {
    /// Auto-levels: window `max - min` centered on `(min + max) / 2`.
    pub fn from_range(min: f32, max: f32) -> Self {
        Self {
            window: max - min,
            level: (min + max) / 2.0,
        }
    }

    /// Map a scalar to an intensity in `0..=1`.
    ///
    /// With a zero window everything at or above the level is white.
    pub fn map(&self, x: f32) -> f32 {
        if self.window <= 0.0 {
            return if x >= self.level { 1.0 } else { 0.0 };
        }
        let low = self.level - self.window / 2.0;
        ((x - low) / self.window).clamp(0.0, 1.0)
    }
}

// =============================================================================
// Transfer
// =============================================================================

/// How scalars of one panel are turned into colors.
#[derive(Debug, Clone, PartialEq)]
pub enum Transfer {
    Categorical {
        color: ColorTransferFunction,
        opacity: PiecewiseFunction,
    },
    Grayscale(WindowLevel),
}

impl Transfer {
    /// Palette derived from a label set.
    pub fn categorical(labels: &[Label]) -> Self {
        let mut color = ColorTransferFunction::new();
        let mut opacity = PiecewiseFunction::new();
        color.add_rgb_point(BACKGROUND_VALUE, [0.0; 3]);
        opacity.add_point(BACKGROUND_VALUE, 0.0);

        for label in labels {
            let x = label.value as f32;
            if x == BACKGROUND_VALUE {
                continue;
            }
            color.add_rgb_point(x, label.color);
            opacity.add_point(x, LABEL_OPACITY);
        }

        Transfer::Categorical { color, opacity }
    }

    /// Grayscale auto-levels over a scalar range.
    pub fn grayscale(range: (f32, f32)) -> Self {
        Transfer::Grayscale(WindowLevel::from_range(range.0, range.1))
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Transfer::Categorical { .. })
    }

    /// RGB color and opacity of a scalar.
    pub fn rgba(&self, x: f32) -> ([f32; 3], f32) {
        match self {
            Transfer::Categorical { color, opacity } => (color.map(x), opacity.map(x)),
            Transfer::Grayscale(window) => {
                let v = window.map(x);
                ([v; 3], 1.0)
            }
        }
    }
}
