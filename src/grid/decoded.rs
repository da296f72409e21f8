use crate::volume::{LabelFilter, VolumetricImage};

/// The display-ready form of a whole image under one label filter.
///
/// Building it walks every voxel of every slice, which is the cost the
/// [`SliceCache`](super::SliceCache) exists to avoid. Narrowing to a slice
/// afterwards is a cheap sub-slice.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGrid {
    shape: [usize; 2],
    spacing: [f64; 2],
    label: LabelFilter,

    /// All slices back to back, each `shape[0] * shape[1]` values long
    values: Vec<f32>,
    slice_count: usize,
}

impl DecodedGrid {
    /// Decode `image` with `label` applied to every voxel.
    pub fn build(image: &VolumetricImage, label: LabelFilter) -> Self {
        let slice_len = image.slice_len();
        let mut values = Vec::with_capacity(slice_len * image.slice_count());
        for slice in image.slices() {
            values.extend(slice.iter().map(|&v| label.apply(v)));
        }

        Self {
            shape: image.shape(),
            spacing: image.spacing(),
            label,
            values,
            slice_count: image.slice_count(),
        }
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    pub fn label(&self) -> LabelFilter {
        self.label
    }

    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    /// Narrow to one slice.
    pub fn slice(&self, index: usize) -> Option<GridSlice<'_>> {
        if index >= self.slice_count {
            return None;
        }
        let len = self.shape[0] * self.shape[1];
        let start = index * len;
        Some(GridSlice {
            values: &self.values[start..start + len],
            shape: self.shape,
            spacing: self.spacing,
        })
    }
}

/// One slice of a [`DecodedGrid`], as handed to a rendering surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSlice<'a> {
    /// Row-major scalars, `shape[0]` columns by `shape[1]` rows
    pub values: &'a [f32],
    pub shape: [usize; 2],
    pub spacing: [f64; 2],
}

impl GridSlice<'_> {
    /// Minimum and maximum scalar, `(0, 0)` for an empty slice.
    pub fn scalar_range(&self) -> (f32, f32) {
        let mut iter = self.values.iter().copied().filter(|v| v.is_finite());
        let Some(first) = iter.next() else {
            return (0.0, 0.0);
        };
        iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
    }

    pub fn width(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }
}
