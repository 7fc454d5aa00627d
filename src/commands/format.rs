use anyhow::Result;
use chrono_tz::Tz;

use crate::chatctx::config::load_config;
use crate::commands::{CommandReport, Source, load_messages};
use crate::error::ChatCtxError;
use crate::transcript::context::ContextFormatter;

pub fn run(source: &Source, tz: Option<&str>) -> Result<CommandReport> {
    let cfg = load_config()?;
    let mut options = cfg.format_options()?;
    if let Some(name) = tz {
        options.tz = name
            .trim()
            .parse::<Tz>()
            .map_err(|_| ChatCtxError::InvalidConfig(format!("unknown time zone `{name}`")))?;
    }
    let mut report = CommandReport::new("format");

    let loaded = load_messages(source, &cfg)?;
    let doc = ContextFormatter::new(options.clone()).format(&loaded.messages);

    report.detail(format!("source={}", source.label()));
    report.detail(format!("time_zone={}", options.tz.name()));
    report.detail(format!("date_blocks={}", doc.blocks.len()));
    report.detail(format!("messages={}", doc.message_count()));
    report.detail(format!(
        "skipped={}",
        loaded.skip_reasons.len() + doc.skipped.len()
    ));
    loaded.note_ambiguity(&mut report);
    for skipped in &doc.skipped {
        report.detail(format!("skipped #{}: {}", skipped.position, skipped.reason));
    }
    if doc.is_empty() {
        report.issue("nothing left to format after filtering");
    } else {
        report.output = Some(doc.render());
    }
    Ok(report)
}
