use crate::error::ViewError;
use crate::selection::{Collection, SegRole};
use crate::transport::{FileInfo, Item};
use crate::volume::{DiffMetrics, Label, Quantification};

use super::panel::PanelKind;

/// Callbacks into the application hosting the comparison view.
///
/// Every method has an empty default so hosts implement only what they
/// display. Calls are made from the task that drove the selection, outside
/// of every orchestrator lock.
pub trait ViewHost: Send + Sync + 'static {
    /// A panel could not be updated. The selection is left as is so the
    /// user can retry by selecting again.
    fn panel_failed(&self, panel: PanelKind, error: &ViewError) {
        let _ = (panel, error);
    }

    /// A panel now shows a different item than before.
    fn file_shown(&self, panel: PanelKind, item: &Item) {
        let _ = (panel, item);
    }

    /// Labels of the image a panel started showing (empty for grayscale).
    fn labels_available(&self, panel: PanelKind, labels: &[Label]) {
        let _ = (panel, labels);
    }

    /// Statistics of the image a panel started showing.
    fn quantification(&self, panel: PanelKind, quantification: Option<&Quantification>) {
        let _ = (panel, quantification);
    }

    /// Tag and comment of the file selected for a segmentation role.
    fn file_info(&self, role: SegRole, info: &FileInfo) {
        let _ = (role, info);
    }

    /// Metrics delivered with the diff currently displayed.
    fn diff_metrics(&self, metrics: &DiffMetrics) {
        let _ = metrics;
    }

    /// Valid slice range is `0..count`; `current` is the selected slice.
    fn slice_bounds(&self, count: usize, current: usize) {
        let _ = (count, current);
    }

    fn volumes_loaded(&self, volumes: &Collection) {
        let _ = volumes;
    }

    fn segmentations_loaded(&self, segmentations: &Collection) {
        let _ = segmentations;
    }
}

/// Host that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl ViewHost for NoopHost {}
