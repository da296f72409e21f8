//! Selection state and change notifications.
//!
//! The store holds the indices the user picked (base volume, two
//! segmentations, a label per segmentation and the slice) together with the
//! collections they index into. Every mutation produces a
//! [`SelectionEvent`], which is returned to the caller and delivered to the
//! listeners registered for its role.
//!
//! Listeners run synchronously, in registration order, after the mutation is
//! complete and after every internal lock has been released, so a listener
//! may read or even mutate the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::transport::Item;
use crate::volume::LabelFilter;

use super::collection::Collection;

// =============================================================================
// Roles
// =============================================================================

/// One of the two compared segmentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegRole {
    Seg1,
    Seg2,
}

impl SegRole {
    pub fn selection_role(self) -> SelectionRole {
        match self {
            SegRole::Seg1 => SelectionRole::Seg1,
            SegRole::Seg2 => SelectionRole::Seg2,
        }
    }

    /// The other segmentation role.
    pub fn opposite(self) -> SegRole {
        match self {
            SegRole::Seg1 => SegRole::Seg2,
            SegRole::Seg2 => SegRole::Seg1,
        }
    }
}

/// Notification channel a listener subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionRole {
    /// `volume-selected`
    Volume,
    /// `seg1-selected`
    Seg1,
    /// `seg2-selected`
    Seg2,
    /// Slice index changed
    Slice,
}

// =============================================================================
// State and Events
// =============================================================================

/// Snapshot of everything the user has selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionState {
    pub volume_index: usize,
    pub seg1_index: usize,
    pub seg2_index: usize,
    pub label1: LabelFilter,
    pub label2: LabelFilter,
    pub slice_index: usize,
}

impl SelectionState {
    pub fn seg_index(&self, role: SegRole) -> usize {
        match role {
            SegRole::Seg1 => self.seg1_index,
            SegRole::Seg2 => self.seg2_index,
        }
    }

    pub fn label(&self, role: SegRole) -> LabelFilter {
        match role {
            SegRole::Seg1 => self.label1,
            SegRole::Seg2 => self.label2,
        }
    }
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            volume_index: 0,
            seg1_index: 0,
            seg2_index: 1,
            label1: LabelFilter::All,
            label2: LabelFilter::All,
            slice_index: 0,
        }
    }
}

/// A completed selection change.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    /// The base volume changed
    VolumeSelected { index: usize, item: Option<Item> },

    /// A segmentation or its label filter changed
    SegSelected {
        role: SegRole,
        index: usize,
        item: Option<Item>,
        label: LabelFilter,
    },

    /// The slice index changed (already clamped)
    SliceSelected { index: usize },
}

impl SelectionEvent {
    pub fn role(&self) -> SelectionRole {
        match self {
            SelectionEvent::VolumeSelected { .. } => SelectionRole::Volume,
            SelectionEvent::SegSelected { role, .. } => role.selection_role(),
            SelectionEvent::SliceSelected { .. } => SelectionRole::Slice,
        }
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Handle returned by [`SelectionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SelectionEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    role: SelectionRole,
    listener: Listener,
}

// =============================================================================
// SelectionStore
// =============================================================================

/// Selection state of one comparison view.
///
/// Item indices are not validated: the collections are the source of truth
/// and an index past the end simply yields an event without an item. The
/// slice index is clamped to the known slice count.
pub struct SelectionStore {
    state: Mutex<SelectionState>,

    /// Slice count of the base volume, 1 until known
    slice_count: Mutex<usize>,

    /// Base volume the slice count was taken from
    counted_volume: Mutex<Option<String>>,

    volumes: RwLock<Collection>,
    segmentations: RwLock<Collection>,

    listeners: RwLock<Vec<Registration>>,
    next_listener: AtomicU64,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::with_collections(Collection::new(), Collection::new())
    }

    pub fn with_collections(volumes: Collection, segmentations: Collection) -> Self {
        Self {
            state: Mutex::new(SelectionState::default()),
            slice_count: Mutex::new(1),
            counted_volume: Mutex::new(None),
            volumes: RwLock::new(volumes),
            segmentations: RwLock::new(segmentations),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Collections
    // -------------------------------------------------------------------------

    /// Add or update base volumes.
    pub fn merge_volumes(&self, items: Vec<Item>) {
        self.volumes.write().merge(items);
    }

    /// Add or update segmentations.
    pub fn merge_segmentations(&self, items: Vec<Item>) {
        self.segmentations.write().merge(items);
    }

    pub fn volumes(&self) -> Collection {
        self.volumes.read().clone()
    }

    pub fn segmentations(&self) -> Collection {
        self.segmentations.read().clone()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Snapshot of the current selection.
    pub fn state(&self) -> SelectionState {
        *self.state.lock()
    }

    pub fn slice_count(&self) -> usize {
        *self.slice_count.lock()
    }

    /// Slice count recorded for `volume_id`, if its base image was applied.
    pub fn volume_slice_count(&self, volume_id: &str) -> Option<usize> {
        let counted = self.counted_volume.lock();
        (counted.as_deref() == Some(volume_id)).then(|| self.slice_count())
    }

    /// Currently selected base volume, if the index points at one.
    pub fn volume_item(&self) -> Option<Item> {
        let index = self.state.lock().volume_index;
        self.volumes.read().get(index).cloned()
    }

    /// Currently selected segmentation for `role`, if the index points at one.
    pub fn seg_item(&self, role: SegRole) -> Option<Item> {
        let index = self.state.lock().seg_index(role);
        self.segmentations.read().get(index).cloned()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub fn select_volume(&self, index: usize) -> SelectionEvent {
        info!("Selecting volume {}", index);
        self.state.lock().volume_index = index;
        let item = self.volumes.read().get(index).cloned();
        self.emit(SelectionEvent::VolumeSelected { index, item })
    }

    pub fn select_seg1(&self, index: usize) -> SelectionEvent {
        self.select_seg(SegRole::Seg1, index)
    }

    pub fn select_seg2(&self, index: usize) -> SelectionEvent {
        self.select_seg(SegRole::Seg2, index)
    }

    pub fn select_label1(&self, label: impl Into<LabelFilter>) -> SelectionEvent {
        self.select_label(SegRole::Seg1, label.into())
    }

    pub fn select_label2(&self, label: impl Into<LabelFilter>) -> SelectionEvent {
        self.select_label(SegRole::Seg2, label.into())
    }

    /// Select a segmentation; the event carries the role's current label.
    pub fn select_seg(&self, role: SegRole, index: usize) -> SelectionEvent {
        info!("Selecting {:?} index {}", role, index);
        let label = {
            let mut state = self.state.lock();
            match role {
                SegRole::Seg1 => state.seg1_index = index,
                SegRole::Seg2 => state.seg2_index = index,
            }
            state.label(role)
        };
        let item = self.segmentations.read().get(index).cloned();
        self.emit(SelectionEvent::SegSelected {
            role,
            index,
            item,
            label,
        })
    }

    /// Select a label filter; the event carries the role's current item.
    pub fn select_label(&self, role: SegRole, label: LabelFilter) -> SelectionEvent {
        info!("Selecting {:?} label {}", role, label);
        let index = {
            let mut state = self.state.lock();
            match role {
                SegRole::Seg1 => state.label1 = label,
                SegRole::Seg2 => state.label2 = label,
            }
            state.seg_index(role)
        };
        let item = self.segmentations.read().get(index).cloned();
        self.emit(SelectionEvent::SegSelected {
            role,
            index,
            item,
            label,
        })
    }

    /// Select a slice, clamped to `[0, slice_count - 1]`.
    pub fn select_slice(&self, index: i64) -> SelectionEvent {
        let max = self.slice_count().saturating_sub(1);
        let clamped = index.clamp(0, max as i64) as usize;
        if clamped as i64 != index {
            debug!("Clamped slice {} to {}", index, clamped);
        }
        self.state.lock().slice_index = clamped;
        self.emit(SelectionEvent::SliceSelected { index: clamped })
    }

    /// Record the slice count of the base volume and clamp the current slice.
    ///
    /// Returns the (possibly clamped) slice index. A count of zero is
    /// treated as one.
    pub fn set_slice_count(&self, count: usize) -> usize {
        let count = count.max(1);
        *self.slice_count.lock() = count;

        let mut state = self.state.lock();
        if state.slice_index >= count {
            debug!("Clamped slice {} to {}", state.slice_index, count - 1);
            state.slice_index = count - 1;
        }
        state.slice_index
    }

    /// Record the slice count of the base image of `volume_id`.
    ///
    /// Same as [`set_slice_count`](Self::set_slice_count), remembering which
    /// volume the count belongs to.
    pub fn set_volume_slice_count(&self, volume_id: &str, count: usize) -> usize {
        *self.counted_volume.lock() = Some(volume_id.to_string());
        self.set_slice_count(count)
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Register a listener for one role.
    pub fn subscribe<F>(&self, role: SelectionRole, listener: F) -> ListenerId
    where
        F: Fn(&SelectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push(Registration {
            id,
            role,
            listener: Arc::new(listener),
        });
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    /// Deliver `event` to its role's listeners and hand it back.
    fn emit(&self, event: SelectionEvent) -> SelectionEvent {
        let role = event.role();
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|registration| registration.role == role)
            .map(|registration| Arc::clone(&registration.listener))
            .collect();

        for listener in listeners {
            listener(&event);
        }
        event
    }
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
