use anyhow::Result;
use std::env;

use crate::chatctx::config::{load_config, resolve_config_path};
use crate::chatctx::inference::resolve_answerer;
use crate::chatctx::paths::resolve_paths;
use crate::commands::CommandReport;
use crate::transcript::patterns::PatternKind;

include!(concat!(env!("OUT_DIR"), "/chatctx_env_allowlist.rs"));

/// Names of `CHATCTX_*` variables the binary reads that are currently set.
pub fn active_overrides() -> Vec<(String, String)> {
    GENERATED_CHATCTX_ENV_ALLOWLIST
        .iter()
        .filter_map(|key| {
            env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| (key.to_string(), v))
        })
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("chatctx_home={}", paths.chatctx_home.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("store_file={}", paths.store_file.display()));
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_file={}", path.display())),
        Some(path) => report.detail(format!("config_file={} (absent, defaults)", path.display())),
        None => report.detail("config_file=none"),
    }

    let cfg = load_config()?;
    report.detail(format!("budget_units={}", cfg.chunking.budget_units));
    report.detail(format!("max_chunks={}", cfg.chunking.max_chunks));
    report.detail(format!("time_zone={}", cfg.format.time_zone));
    report.detail(format!(
        "labels=self:{} contact:{}",
        cfg.format.self_label, cfg.format.contact_label
    ));
    report.detail(format!("bridge={}", cfg.bridge.base_url));
    report.detail(format!("session_ttl_secs={}", cfg.store.ttl_secs));

    let registry = cfg.registry()?;
    let names = registry
        .patterns()
        .iter()
        .map(|p| match p.kind() {
            PatternKind::Timestamped(_) => p.name().to_string(),
            PatternKind::Untimed => format!("{} (untimed)", p.name()),
        })
        .collect::<Vec<_>>();
    report.detail(format!("patterns={}", names.join(", ")));

    match resolve_answerer(&cfg.inference) {
        Ok(answerer) => report.detail(format!("inference={}", answerer.label())),
        Err(err) => report.detail(format!("inference=unavailable ({err})")),
    }

    for (key, value) in active_overrides() {
        report.detail(format!("override {key}={value}"));
    }
    Ok(report)
}
