//! Selection layer.
//!
//! Presentation state of the comparison view: which base volume, which two
//! segmentations (and which label of each) and which slice are shown. No I/O
//! happens here; the orchestrator reacts to the events this layer emits.

mod collection;
mod store;

pub use collection::Collection;
pub use store::{
    ListenerId, SegRole, SelectionEvent, SelectionRole, SelectionState, SelectionStore,
};
