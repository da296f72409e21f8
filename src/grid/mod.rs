//! Decoded grid layer.
//!
//! Rendering surfaces consume a [`GridSlice`]: one 2-D slice of scalars with
//! its geometry. Producing it requires decoding the whole image under a label
//! filter into a [`DecodedGrid`], which the [`SliceCache`] memoizes per
//! `(image identity, label filter)`.
//!
//! # Components
//!
//! - [`DecodedGrid`]: Full image decoded under one label filter
//! - [`GridSlice`]: Borrowed view of one slice of a grid
//! - [`SliceCache`]: LRU cache of decoded grids with a build counter
//! - [`GridKey`]: Composite key (image identity, payload identity, label filter)

mod cache;
mod decoded;

pub use cache::{GridKey, SliceCache, DEFAULT_GRID_CACHE_CAPACITY};
pub use decoded::{DecodedGrid, GridSlice};
