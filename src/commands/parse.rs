use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::chatctx::config::load_config;
use crate::commands::CommandReport;
use crate::transcript::ingest::ingest;

pub fn run(path: &Path) -> Result<CommandReport> {
    let cfg = load_config()?;
    let registry = cfg.registry()?;
    let normalizer = cfg.normalizer()?;
    let mut report = CommandReport::new("parse");

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let batch = ingest(&bytes, &registry, &normalizer)
        .with_context(|| format!("failed to ingest {}", path.display()))?;

    report.detail(format!("source={}", path.display()));
    report.detail(format!("lines={}", batch.line_count));
    report.detail(format!("messages={}", batch.messages.len()));
    report.detail(format!("skipped={}", batch.skipped.len()));
    report.detail(format!("discarded_lines={}", batch.discarded_lines));
    if batch.ambiguous_dates > 0 {
        report.detail(format!(
            "ambiguous_dates={} (resolved by pattern order)",
            batch.ambiguous_dates
        ));
    }
    for reason in batch.skip_reasons() {
        report.detail(format!("skipped {reason}"));
    }
    report.data = Some(serde_json::json!({
        "messages": batch.messages,
        "skipped": batch.skip_reasons(),
        "discarded_sample": batch.discarded_sample,
    }));
    Ok(report)
}
