//! Orchestration of the comparison view.
//!
//! The orchestrator reacts to selection changes by fetching (or reusing)
//! image payloads and updating the four panels:
//!
//! ```text
//!  select_volume ──► base panel ──► slice bounds ──► seg1 panel ─┐
//!                                                 └► seg2 panel ─┤
//!  select_seg1 / select_label1 ──────────────────► seg1 panel ───┤
//!  select_seg2 / select_label2 ──────────────────► seg2 panel ───┼─► DiffCoordinator ─► diff panel
//!  select_slice ──► every panel, from cache
//! ```
//!
//! # Ordering
//!
//! - Payloads come from the [`SourceRegistry`], so every image identity is
//!   fetched at most once while it stays cached, however often and however
//!   concurrently it is selected.
//! - Every panel request takes a ticket. A result is applied only if its
//!   ticket is still the latest for the panel; older results are dropped
//!   silently. The diff panel applies a result only if its pair is still the
//!   latest requested pair.
//! - A volume change sets the slice bounds before the segmentation panels
//!   are refreshed. A segmentation change re-evaluates the diff after its own
//!   panel was updated, unless a newer request for that panel superseded it.
//!
//! # Failures
//!
//! Fetch and render failures are reported to the [`ViewHost`] for the panel
//! concerned. The selection stays as it is, so selecting again retries.

mod diff;
mod host;
mod panel;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ViewError;
use crate::grid::{SliceCache, DEFAULT_GRID_CACHE_CAPACITY};
use crate::selection::{SegRole, SelectionEvent, SelectionStore};
use crate::transport::{Item, Transport};
use crate::view::{RenderSurface, SurfaceSetup, ViewBinding};
use crate::volume::{
    FileRecord, ImageKey, LabelFilter, SourceRegistry, VolumetricImage,
    DEFAULT_SOURCE_CACHE_CAPACITY,
};

pub use diff::{DiffCoordinator, DiffRequest, DiffUpdate};
pub use host::{NoopHost, ViewHost};
pub use panel::{Applied, Panel, PanelKind, PanelState, Ticket};

// =============================================================================
// Construction
// =============================================================================

/// One rendering surface per panel.
#[derive(Debug, Clone, Default)]
pub struct PanelSurfaces<S> {
    pub base: S,
    pub seg1: S,
    pub seg2: S,
    pub diff: S,
}

/// Sizing of caches and surfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorOptions {
    /// Number of fetched payloads kept by the source registry
    pub source_capacity: usize,

    /// Number of decoded grids kept by the slice cache
    pub grid_capacity: usize,

    pub surface: SurfaceSetup,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            source_capacity: DEFAULT_SOURCE_CACHE_CAPACITY,
            grid_capacity: DEFAULT_GRID_CACHE_CAPACITY,
            surface: SurfaceSetup::default(),
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives one comparison view: selection, fetching and the four panels.
///
/// Methods take `&self`; an `Arc<Orchestrator>` may be driven from several
/// tasks at once.
pub struct Orchestrator<T: Transport, S: RenderSurface> {
    /// Item whose volumes and segmentations are compared
    container_id: String,

    store: Arc<SelectionStore>,
    registry: SourceRegistry<T>,
    cache: Arc<SliceCache>,
    host: Arc<dyn ViewHost>,
    diff_coordinator: DiffCoordinator,

    base: Panel<S>,
    seg1: Panel<S>,
    seg2: Panel<S>,
    diff: Panel<S>,
}

impl<T: Transport, S: RenderSurface> Orchestrator<T, S> {
    pub fn new(
        container_id: impl Into<String>,
        transport: Arc<T>,
        host: Arc<dyn ViewHost>,
        surfaces: PanelSurfaces<S>,
    ) -> Self {
        Self::with_options(
            container_id,
            transport,
            host,
            surfaces,
            OrchestratorOptions::default(),
        )
    }

    pub fn with_options(
        container_id: impl Into<String>,
        transport: Arc<T>,
        host: Arc<dyn ViewHost>,
        surfaces: PanelSurfaces<S>,
        options: OrchestratorOptions,
    ) -> Self {
        let cache = Arc::new(SliceCache::with_capacity(options.grid_capacity));
        let panel = |kind: PanelKind, surface: S| {
            let binding = ViewBinding::with_setup(surface, Arc::clone(&cache), options.surface);
            Panel::new(kind, binding)
        };

        Self {
            container_id: container_id.into(),
            store: Arc::new(SelectionStore::new()),
            registry: SourceRegistry::with_capacity(transport, options.source_capacity),
            host,
            diff_coordinator: DiffCoordinator::new(),
            base: panel(PanelKind::Base, surfaces.base),
            seg1: panel(PanelKind::Seg1, surfaces.seg1),
            seg2: panel(PanelKind::Seg2, surfaces.seg2),
            diff: panel(PanelKind::Diff, surfaces.diff),
            cache,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Selection state; hosts subscribe here for change notifications.
    pub fn store(&self) -> &Arc<SelectionStore> {
        &self.store
    }

    pub fn registry(&self) -> &SourceRegistry<T> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<SliceCache> {
        &self.cache
    }

    pub fn panel(&self, kind: PanelKind) -> &Panel<S> {
        match kind {
            PanelKind::Base => &self.base,
            PanelKind::Seg1 => &self.seg1,
            PanelKind::Seg2 => &self.seg2,
            PanelKind::Diff => &self.diff,
        }
    }

    fn panels(&self) -> [&Panel<S>; 4] {
        [&self.base, &self.seg1, &self.seg2, &self.diff]
    }

    /// Pair the diff panel currently wants to show.
    pub fn diff_request(&self) -> Option<DiffRequest> {
        self.diff_coordinator.latest()
    }

    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Fetch the container's volumes and segmentations and make the initial
    /// selections: volume 0, then seg1 0 and seg2 1 when they exist.
    pub async fn load(&self) -> Result<(), ViewError> {
        info!("Loading container {}", self.container_id);

        let transport = self.registry.transport();
        let (volumes, segmentations) = tokio::join!(
            transport.fetch_volumes(&self.container_id),
            transport.fetch_segmentations(&self.container_id)
        );
        let volumes = volumes.map_err(|e| {
            warn!("Listing volumes of {} failed: {}", self.container_id, e);
            ViewError::from(e)
        })?;
        let segmentations = segmentations.map_err(|e| {
            warn!("Listing segmentations of {} failed: {}", self.container_id, e);
            ViewError::from(e)
        })?;

        self.store.merge_volumes(volumes);
        self.store.merge_segmentations(segmentations);

        let volumes = self.store.volumes();
        let segmentations = self.store.segmentations();
        info!(
            "Container {} has {} volume(s) and {} segmentation(s)",
            self.container_id,
            volumes.len(),
            segmentations.len()
        );
        self.host.volumes_loaded(&volumes);
        self.host.segmentations_loaded(&segmentations);

        if !volumes.is_empty() {
            self.select_volume(0).await;
        }
        if !segmentations.is_empty() {
            self.select_seg1(0).await;
        }
        if segmentations.len() > 1 {
            self.select_seg2(1).await;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    pub async fn select_volume(&self, index: usize) -> SelectionEvent {
        let event = self.store.select_volume(index);
        self.handle(&event).await;
        event
    }

    pub async fn select_seg1(&self, index: usize) -> SelectionEvent {
        self.select_seg(SegRole::Seg1, index).await
    }

    pub async fn select_seg2(&self, index: usize) -> SelectionEvent {
        self.select_seg(SegRole::Seg2, index).await
    }

    pub async fn select_seg(&self, role: SegRole, index: usize) -> SelectionEvent {
        let event = self.store.select_seg(role, index);
        self.handle(&event).await;
        event
    }

    pub async fn select_label1(&self, label: impl Into<LabelFilter>) -> SelectionEvent {
        self.select_label(SegRole::Seg1, label.into()).await
    }

    pub async fn select_label2(&self, label: impl Into<LabelFilter>) -> SelectionEvent {
        self.select_label(SegRole::Seg2, label.into()).await
    }

    pub async fn select_label(&self, role: SegRole, label: LabelFilter) -> SelectionEvent {
        let event = self.store.select_label(role, label);
        self.handle(&event).await;
        event
    }

    /// Select a slice; out-of-range indices are clamped.
    pub async fn select_slice(&self, index: i64) -> SelectionEvent {
        let event = self.store.select_slice(index);
        self.handle(&event).await;
        event
    }

    /// Bring the panels in line with a selection change.
    ///
    /// Each handler re-reads the selection when it starts a request, so an
    /// event that was overtaken by a newer one does no harm.
    async fn handle(&self, event: &SelectionEvent) {
        match event {
            SelectionEvent::VolumeSelected { .. } => self.on_volume_selected().await,
            SelectionEvent::SegSelected { role, .. } => self.refresh_seg(*role).await,
            SelectionEvent::SliceSelected { .. } => self.on_slice_selected().await,
        }
    }

    // -------------------------------------------------------------------------
    // Base volume
    // -------------------------------------------------------------------------

    async fn on_volume_selected(&self) {
        let (ticket, volume) = self.base.begin(|| self.store.volume_item());

        let current = match volume {
            Some(volume) => self.show_base(ticket, &volume).await,
            None => {
                debug!("No base volume at the selected index");
                true
            }
        };

        // Segmentations are resampled onto the base volume
        if current {
            tokio::join!(
                self.refresh_seg(SegRole::Seg1),
                self.refresh_seg(SegRole::Seg2)
            );
        }
    }

    /// Fetch and show a base volume. Returns `false` if superseded.
    async fn show_base(&self, ticket: Ticket, volume: &Item) -> bool {
        let key = ImageKey::base(volume.id.as_str());
        let image = match self.registry.source(&key).load().await {
            Ok(image) => image,
            Err(e) => return self.fail_if_current(&self.base, ticket, e),
        };

        let Some(mut state) = self.base.lock_current(ticket).await else {
            return false;
        };

        let count = image.slice_count().max(1);
        let slice = self.store.set_volume_slice_count(&volume.id, count);
        let result = state.show(Arc::clone(&image), slice, LabelFilter::All).await;
        drop(state);

        self.host.slice_bounds(count, slice);
        match result {
            Ok(new_file) => {
                if new_file {
                    self.announce(PanelKind::Base, Some(volume), &image);
                }
            }
            Err(e) => self.report(PanelKind::Base, &e),
        }
        true
    }

    /// Slice count of the selected base volume.
    ///
    /// Once the volume was shown, its count is remembered even if the
    /// registry has since evicted its source. Falls back to 1 while the
    /// volume has not been loaded.
    pub fn slice_count(&self) -> usize {
        let Some(volume) = self.store.volume_item() else {
            return 1;
        };
        let key = ImageKey::base(volume.id.as_str());
        let count = match self.registry.existing(&key) {
            Some(source) => source.slice_count(),
            None => self
                .store
                .volume_slice_count(&volume.id)
                .ok_or_else(|| ViewError::NotLoaded(key.to_string())),
        };

        match count {
            Ok(count) => count,
            Err(e) => {
                warn!("{}; assuming a single slice", e);
                1
            }
        }
    }

    // -------------------------------------------------------------------------
    // Segmentations
    // -------------------------------------------------------------------------

    fn seg_panel(&self, role: SegRole) -> &Panel<S> {
        match role {
            SegRole::Seg1 => &self.seg1,
            SegRole::Seg2 => &self.seg2,
        }
    }

    /// Update one segmentation panel, then the diff.
    async fn refresh_seg(&self, role: SegRole) {
        let panel = self.seg_panel(role);
        let (ticket, (volume, seg, label)) = panel.begin(|| {
            (
                self.store.volume_item(),
                self.store.seg_item(role),
                self.store.state().label(role),
            )
        });

        let current = match (volume, seg) {
            (Some(volume), Some(seg)) => self.show_seg(role, ticket, &volume, &seg, label).await,
            (None, _) => {
                debug!("{}: waiting for a base volume", panel.kind());
                true
            }
            (_, None) => {
                debug!("{}: no segmentation at the selected index", panel.kind());
                true
            }
        };

        if current {
            self.refresh_diff().await;
        } else {
            debug!("{}: superseded, skipping diff update", panel.kind());
        }
    }

    /// Fetch and show a segmentation. Returns `false` if superseded.
    async fn show_seg(
        &self,
        role: SegRole,
        ticket: Ticket,
        volume: &Item,
        seg: &Item,
        label: LabelFilter,
    ) -> bool {
        let panel = self.seg_panel(role);
        let source = self
            .registry
            .source(&ImageKey::segmentation(seg.id.as_str(), volume.id.as_str()));

        // File metadata is fetched once per file and cached by its record
        let (image, info) = tokio::join!(source.load(), source.file_info());
        let image = match image {
            Ok(image) => image,
            Err(e) => return self.fail_if_current(panel, ticket, e),
        };

        let applied = panel
            .apply(
                ticket,
                Arc::clone(&image),
                || self.store.state().slice_index,
                label,
            )
            .await;

        match applied {
            Ok(Applied::Stale) => false,
            Ok(Applied::Shown { new_file }) => {
                if new_file {
                    self.announce(panel.kind(), Some(seg), &image);
                    match info {
                        Ok(info) => self.host.file_info(role, &info),
                        Err(e) => self.report(panel.kind(), &e),
                    }
                }
                true
            }
            Err(e) => {
                self.report(panel.kind(), &e);
                true
            }
        }
    }

    // -------------------------------------------------------------------------
    // Diff
    // -------------------------------------------------------------------------

    async fn refresh_diff(&self) {
        let update = self.diff_coordinator.update_with(|| {
            DiffRequest::from_items(
                self.store.seg_item(SegRole::Seg1).as_ref(),
                self.store.seg_item(SegRole::Seg2).as_ref(),
            )
        });

        match update {
            DiffUpdate::Incomplete => debug!("Diff waits for both segmentations"),
            DiffUpdate::Unchanged(request) => {
                debug!("Diff ({}, {}) already requested", request.seg1_id, request.seg2_id)
            }
            DiffUpdate::Changed(request) => self.show_diff(request).await,
        }
    }

    async fn show_diff(&self, request: DiffRequest) {
        let image = match self.registry.source(&request.key()).load().await {
            Ok(image) => image,
            Err(e) => {
                if self.diff_coordinator.is_latest(&request) {
                    self.diff_coordinator.failed(&request);
                    self.report(PanelKind::Diff, &e);
                } else {
                    debug!("Ignoring failure of superseded diff: {}", e);
                }
                return;
            }
        };

        let Some(mut state) = self
            .diff
            .lock_if(|| self.diff_coordinator.is_latest(&request))
            .await
        else {
            debug!(
                "Discarding stale diff ({}, {})",
                request.seg1_id, request.seg2_id
            );
            return;
        };

        let slice = self.store.state().slice_index;
        let result = state.show(Arc::clone(&image), slice, LabelFilter::All).await;
        drop(state);

        match result {
            Ok(new_file) => {
                if new_file {
                    self.announce(PanelKind::Diff, None, &image);
                }
                if let Some(metrics) = image.metrics() {
                    self.host.diff_metrics(metrics);
                }
            }
            Err(e) => {
                self.diff_coordinator.failed(&request);
                self.report(PanelKind::Diff, &e);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Slice
    // -------------------------------------------------------------------------

    async fn on_slice_selected(&self) {
        tokio::join!(
            self.show_slice(&self.base),
            self.show_slice(&self.seg1),
            self.show_slice(&self.seg2),
            self.show_slice(&self.diff)
        );
    }

    /// Move a panel to the selected slice, reusing its decoded grid.
    async fn show_slice(&self, panel: &Panel<S>) {
        let mut state = panel.lock().await;
        let slice = self.store.state().slice_index;
        let result = state.show_slice(slice).await;
        drop(state);

        if let Err(e) = result {
            self.report(panel.kind(), &e);
        }
    }

    // -------------------------------------------------------------------------
    // Camera and levels
    // -------------------------------------------------------------------------

    pub async fn zoom_in(&self) {
        for panel in self.panels() {
            panel.lock().await.binding_mut().zoom_in();
        }
    }

    pub async fn zoom_out(&self) {
        for panel in self.panels() {
            panel.lock().await.binding_mut().zoom_out();
        }
    }

    pub async fn auto_zoom(&self) {
        for panel in self.panels() {
            panel.lock().await.binding_mut().auto_zoom();
        }
    }

    pub async fn auto_levels(&self) {
        for panel in self.panels() {
            let result = panel.lock().await.binding_mut().auto_levels().await;
            if let Err(e) = result {
                self.report(panel.kind(), &e);
            }
        }
    }

    // -------------------------------------------------------------------------
    // File metadata
    // -------------------------------------------------------------------------

    /// Replace the tag of the file selected for `role`.
    pub async fn set_tag(&self, role: SegRole, tag: &str) -> Result<(), ViewError> {
        let file = self.selected_file(role)?;
        file.set_tag(tag).await?;
        if let Some(info) = file.cached().await {
            self.host.file_info(role, &info);
        }
        Ok(())
    }

    /// Replace the comment of the file selected for `role`.
    pub async fn set_comment(&self, role: SegRole, comment: &str) -> Result<(), ViewError> {
        let file = self.selected_file(role)?;
        file.set_comment(comment).await?;
        if let Some(info) = file.cached().await {
            self.host.file_info(role, &info);
        }
        Ok(())
    }

    fn selected_file(&self, role: SegRole) -> Result<Arc<FileRecord<T>>, ViewError> {
        let seg = self.store.seg_item(role).ok_or(ViewError::NoBackingFile)?;
        Ok(self.registry.file(&seg.id))
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Tell the host about an image a panel started showing.
    fn announce(&self, kind: PanelKind, item: Option<&Item>, image: &VolumetricImage) {
        if let Some(item) = item {
            self.host.file_shown(kind, item);
        }
        self.host.labels_available(kind, image.labels());
        self.host.quantification(kind, image.quantification());
    }

    fn report(&self, kind: PanelKind, error: &ViewError) {
        warn!("{} panel: {}", kind, error);
        self.host.panel_failed(kind, error);
    }

    /// Report a failure unless the request was superseded. Returns whether
    /// the request was still current.
    fn fail_if_current(&self, panel: &Panel<S>, ticket: Ticket, error: ViewError) -> bool {
        if panel.is_current(ticket) {
            self.report(panel.kind(), &error);
            true
        } else {
            debug!("{}: ignoring failure of superseded request: {}", panel.kind(), error);
            false
        }
    }
}
