//! segview - render a segmentation comparison to PNG files.
//!
//! Loads the volumes and segmentations of an item, applies the selection
//! given on the command line and writes one image per panel.

use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segview::{
    Collection, Config, DiffMetrics, FileInfo, GirderClient, Item, Label, Orchestrator,
    PanelKind, PanelSurfaces, PngSurface, Quantification, SegRole, SurfaceError, ViewError,
    ViewHost,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    run(config).await
}

// =============================================================================
// Run
// =============================================================================

async fn run(config: Config) -> ExitCode {
    info!("Configuration:");
    info!("  API: {}", config.api_url);
    info!("  Item: {}", config.item);
    info!(
        "  Cache: {} payloads, {} decoded grids",
        config.cache_sources, config.cache_grids
    );
    info!("  Output: {}", config.output_dir.display());

    let client = match GirderClient::new(
        &config.api_url,
        config.token.as_deref(),
        config.request_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create API client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let host = Arc::new(LoggingHost::default());
    let orchestrator = Orchestrator::with_options(
        config.item.clone(),
        Arc::new(client),
        host.clone(),
        PanelSurfaces::<PngSurface>::default(),
        config.orchestrator_options(),
    );

    if let Err(e) = orchestrator.load().await {
        error!("Failed to load item {}: {}", config.item, e);
        return ExitCode::FAILURE;
    }

    apply_selection(&orchestrator, &config).await;

    let mut failed = !apply_edits(&orchestrator, &config).await;
    failed |= !write_panels(&orchestrator, &config).await;

    let panel_failures = host.failures();
    if panel_failures > 0 {
        warn!("{} panel update(s) failed", panel_failures);
        failed = true;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Move from the initial selection to the requested one.
async fn apply_selection(orchestrator: &Orchestrator<GirderClient, PngSurface>, config: &Config) {
    let state = orchestrator.store().state();

    if config.volume != state.volume_index {
        orchestrator.select_volume(config.volume).await;
    }
    if config.seg1 != state.seg1_index {
        orchestrator.select_seg1(config.seg1).await;
    }
    if config.seg2 != state.seg2_index {
        orchestrator.select_seg2(config.seg2).await;
    }
    if config.label1() != state.label1 {
        orchestrator.select_label1(config.label1()).await;
    }
    if config.label2() != state.label2 {
        orchestrator.select_label2(config.label2()).await;
    }
    if config.slice != state.slice_index as i64 {
        orchestrator.select_slice(config.slice).await;
    }

    let state = orchestrator.store().state();
    info!(
        "Showing slice {} of {}",
        state.slice_index,
        orchestrator.slice_count()
    );
}

/// Apply tag and comment edits. Returns `false` if any write failed.
async fn apply_edits(orchestrator: &Orchestrator<GirderClient, PngSurface>, config: &Config) -> bool {
    let edits = [
        (SegRole::Seg1, &config.seg1_tag, &config.seg1_comment),
        (SegRole::Seg2, &config.seg2_tag, &config.seg2_comment),
    ];

    let mut ok = true;
    for (role, tag, comment) in edits {
        if let Some(tag) = tag {
            if let Err(e) = orchestrator.set_tag(role, tag).await {
                error!("{:?}: {}", role, e);
                ok = false;
            }
        }
        if let Some(comment) = comment {
            if let Err(e) = orchestrator.set_comment(role, comment).await {
                error!("{:?}: {}", role, e);
                ok = false;
            }
        }
    }
    ok
}

/// Write one PNG per panel. Returns `false` if any write failed.
async fn write_panels(orchestrator: &Orchestrator<GirderClient, PngSurface>, config: &Config) -> bool {
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        error!(
            "Failed to create output directory {}: {}",
            config.output_dir.display(),
            e
        );
        return false;
    }

    let mut ok = true;
    for kind in PanelKind::ALL {
        let path = config.output_dir.join(format!("{}.png", kind.name()));
        let state = orchestrator.panel(kind).lock().await;

        match state.binding().surface().write_to(&path) {
            Ok(()) => info!("Wrote {}", path.display()),
            Err(SurfaceError::NotDrawn) => warn!("{} panel has nothing to show", kind),
            Err(e) => {
                error!("Failed to write {}: {}", path.display(), e);
                ok = false;
            }
        }
    }
    ok
}

// =============================================================================
// Host
// =============================================================================

/// Reports everything the viewer would display to the log.
#[derive(Default)]
struct LoggingHost {
    failures: AtomicUsize,
}

impl LoggingHost {
    fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

impl ViewHost for LoggingHost {
    fn panel_failed(&self, panel: PanelKind, error: &ViewError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        error!("{} panel failed: {}", panel, error);
    }

    fn file_shown(&self, panel: PanelKind, item: &Item) {
        info!("{}: {}", panel, item.name);
    }

    fn labels_available(&self, panel: PanelKind, labels: &[Label]) {
        if !labels.is_empty() {
            let values: Vec<_> = labels.iter().map(|l| l.value.to_string()).collect();
            info!("{}: labels {}", panel, values.join(", "));
        }
    }

    fn quantification(&self, panel: PanelKind, quantification: Option<&Quantification>) {
        if let Some(q) = quantification {
            info!(
                "{}: min {:.3}, max {:.3}, mean {:.3}, sd {:.3}, volume {:.3}",
                panel, q.min, q.max, q.mean, q.sd, q.volume
            );
        }
    }

    fn file_info(&self, role: SegRole, info: &FileInfo) {
        info!("{:?}: tag '{}', comment '{}'", role, info.tag, info.comment);
    }

    fn diff_metrics(&self, metrics: &DiffMetrics) {
        info!(
            "diff: dice {:.4}, hausdorff {:.4}, assd {:.4}",
            metrics.dice, metrics.hausdorff, metrics.assd
        );
    }

    fn slice_bounds(&self, count: usize, current: usize) {
        info!("base: {} slice(s), at {}", count, current);
    }

    fn volumes_loaded(&self, volumes: &Collection) {
        for (index, item) in volumes.iter().enumerate() {
            info!("  volume {}: {}", index, item.name);
        }
    }

    fn segmentations_loaded(&self, segmentations: &Collection) {
        for (index, item) in segmentations.iter().enumerate() {
            info!("  segmentation {}: {}", index, item.display_name(index));
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "segview=debug"
    } else {
        "segview=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
