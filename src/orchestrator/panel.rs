//! One panel of the comparison view.
//!
//! A panel pairs a [`ViewBinding`] with the bookkeeping needed to discard
//! stale results:
//!
//! - Every request takes a [`Ticket`] from a per-panel generation counter.
//!   Taking a ticket invalidates every older one.
//! - Results are applied while holding the binding lock and only if their
//!   ticket is still the latest, so a slow response for an old selection can
//!   never overwrite a newer one.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::ViewError;
use crate::selection::SegRole;
use crate::view::{RenderSurface, ViewBinding};
use crate::volume::{ImageKey, LabelFilter, SliceView, VolumetricImage};

/// The four panels of the comparison view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    Base,
    Seg1,
    Seg2,
    Diff,
}

impl PanelKind {
    pub const ALL: [PanelKind; 4] = [
        PanelKind::Base,
        PanelKind::Seg1,
        PanelKind::Seg2,
        PanelKind::Diff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PanelKind::Base => "base",
            PanelKind::Seg1 => "seg1",
            PanelKind::Seg2 => "seg2",
            PanelKind::Diff => "diff",
        }
    }
}

impl From<SegRole> for PanelKind {
    fn from(role: SegRole) -> Self {
        match role {
            SegRole::Seg1 => PanelKind::Seg1,
            SegRole::Seg2 => PanelKind::Seg2,
        }
    }
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies one request made for a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Outcome of applying a result to a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A newer request exists; nothing changed
    Stale,
    /// The panel now shows the result
    Shown {
        /// The panel showed a different image (or nothing) before
        new_file: bool,
    },
}

/// Binding plus the identity of what it shows.
pub struct PanelState<S: RenderSurface> {
    binding: ViewBinding<S>,
    shown: Option<ImageKey>,
}

impl<S: RenderSurface> PanelState<S> {
    pub fn binding(&self) -> &ViewBinding<S> {
        &self.binding
    }

    pub fn binding_mut(&mut self) -> &mut ViewBinding<S> {
        &mut self.binding
    }

    /// Identity of the image currently displayed.
    pub fn shown(&self) -> Option<&ImageKey> {
        self.shown.as_ref()
    }

    /// Display slice `slice` of `image` filtered by `label`.
    ///
    /// A different image gets a full render; the same image only swaps the
    /// slice data and keeps the camera.
    pub async fn show(
        &mut self,
        image: Arc<VolumetricImage>,
        slice: usize,
        label: LabelFilter,
    ) -> Result<bool, ViewError> {
        let new_file = self.shown.as_ref() != Some(image.key());
        let key = image.key().clone();
        let view = SliceView::new(image, slice, label)?;

        self.binding.set_image(view);
        if new_file {
            self.binding.render().await?;
        } else {
            self.binding.rerender_slice().await?;
        }
        self.shown = Some(key);
        Ok(new_file)
    }

    /// Move the displayed image to another slice.
    ///
    /// Returns `Ok(false)` when the panel shows nothing.
    pub async fn show_slice(&mut self, slice: usize) -> Result<bool, ViewError> {
        let Some(current) = self.binding.image() else {
            return Ok(false);
        };
        if current.index() == slice {
            return Ok(true);
        }

        let view = SliceView::new(Arc::clone(current.image()), slice, self.binding.label())?;
        self.binding.set_image(view);
        self.binding.rerender_slice().await?;
        Ok(true)
    }
}

/// A panel: its binding, what it shows and its request generation.
pub struct Panel<S: RenderSurface> {
    kind: PanelKind,
    state: Mutex<PanelState<S>>,

    /// Latest ticket handed out
    generation: parking_lot::Mutex<u64>,
}

impl<S: RenderSurface> Panel<S> {
    pub fn new(kind: PanelKind, binding: ViewBinding<S>) -> Self {
        Self {
            kind,
            state: Mutex::new(PanelState {
                binding,
                shown: None,
            }),
            generation: parking_lot::Mutex::new(0),
        }
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    /// Start a request, invalidating every earlier one.
    ///
    /// `read` runs while the generation is held, so the request with the
    /// latest ticket also observes the latest selection.
    pub fn begin<R>(&self, read: impl FnOnce() -> R) -> (Ticket, R) {
        let mut generation = self.generation.lock();
        *generation += 1;
        let ticket = Ticket(*generation);
        (ticket, read())
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        *self.generation.lock() == ticket.0
    }

    /// Lock the binding.
    pub async fn lock(&self) -> MutexGuard<'_, PanelState<S>> {
        self.state.lock().await
    }

    /// Lock the binding if `ticket` is still current.
    ///
    /// The check is made after the lock is acquired, so no newer request can
    /// have applied its result in between.
    pub async fn lock_current(&self, ticket: Ticket) -> Option<MutexGuard<'_, PanelState<S>>> {
        let state = self.lock_if(|| self.is_current(ticket)).await;
        if state.is_none() {
            debug!("{}: discarding stale result {:?}", self.kind, ticket);
        }
        state
    }

    /// Lock the binding if `still_wanted` holds once the lock is acquired.
    pub async fn lock_if(
        &self,
        still_wanted: impl FnOnce() -> bool,
    ) -> Option<MutexGuard<'_, PanelState<S>>> {
        let state = self.state.lock().await;
        still_wanted().then_some(state)
    }

    /// Show `image` if `ticket` is still current.
    pub async fn apply(
        &self,
        ticket: Ticket,
        image: Arc<VolumetricImage>,
        slice: impl FnOnce() -> usize,
        label: LabelFilter,
    ) -> Result<Applied, ViewError> {
        let Some(mut state) = self.lock_current(ticket).await else {
            return Ok(Applied::Stale);
        };
        let new_file = state.show(image, slice(), label).await?;
        Ok(Applied::Shown { new_file })
    }

    /// Identity of the image currently displayed.
    pub async fn shown(&self) -> Option<ImageKey> {
        self.state.lock().await.shown.clone()
    }
}
