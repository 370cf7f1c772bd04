//! ---
//! rcs_section: "03-persistence-logging"
//! rcs_subsection: "module"
//! rcs_type: "source"
//! rcs_scope: "code"
//! rcs_description: "Node-exporter textfile sink for scrape-less hosts."
//! rcs_version: "v0.0.0-prealpha"
//! rcs_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use prometheus::TextEncoder;
use tracing::debug;

use crate::SharedRegistry;

/// Encode the registry in the Prometheus text format and swap it into place
/// at `path`. The write goes to `<path>.tmp` first and is renamed so a
/// concurrent node-exporter scrape never observes a partial file.
pub fn write_textfile(registry: &SharedRegistry, path: &Path) -> Result<()> {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    let body = encoder
        .encode_to_string(&families)
        .context("failed to encode metrics for textfile export")?;

    let tmp_path = path.with_extension("prom.tmp");
    std::fs::write(&tmp_path, &body)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;

    debug!(path = %path.display(), bytes = body.len(), "textfile metrics written");
    Ok(())
}
