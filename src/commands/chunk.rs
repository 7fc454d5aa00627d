use anyhow::Result;

use crate::chatctx::config::load_config;
use crate::commands::{CommandReport, Source, load_messages};
use crate::error::ChatCtxError;
use crate::transcript::chunker::chunk;

pub fn run(source: &Source, budget: Option<usize>, print: bool) -> Result<CommandReport> {
    let cfg = load_config()?;
    let budget_units = budget.unwrap_or(cfg.chunking.budget_units);
    if budget_units == 0 {
        return Err(ChatCtxError::InvalidConfig("--budget must be >= 1".to_string()).into());
    }
    let mut report = CommandReport::new("chunk");

    let loaded = load_messages(source, &cfg)?;
    let (messages, skipped) = loaded.usable();
    let chunks = chunk(&messages, budget_units, &cfg.labels());

    report.detail(format!("source={}", source.label()));
    report.detail(format!("budget_units={budget_units}"));
    report.detail(format!("messages={}", messages.len()));
    report.detail(format!(
        "skipped={}",
        loaded.skip_reasons.len() + skipped.len()
    ));
    loaded.note_ambiguity(&mut report);
    report.detail(format!("chunks={}", chunks.len()));
    for c in &chunks {
        let oversized = if c.is_oversized(budget_units) {
            " oversized"
        } else {
            ""
        };
        report.detail(format!(
            "chunk[{}] messages={} chars={} units={}{oversized}",
            c.index,
            c.messages.len(),
            c.size_chars,
            c.approx_units()
        ));
    }

    if print {
        let text = chunks
            .iter()
            .map(|c| format!("--- chunk {} ---\n{}", c.index, c.text))
            .collect::<String>();
        report.output = Some(text);
    }
    report.data = Some(serde_json::json!({
        "budget_units": budget_units,
        "chunks": chunks
            .iter()
            .map(|c| serde_json::json!({
                "index": c.index,
                "messages": c.messages.len(),
                "size_chars": c.size_chars,
                "approx_units": c.approx_units(),
            }))
            .collect::<Vec<_>>(),
    }));
    Ok(report)
}
