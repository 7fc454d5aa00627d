use anyhow::Result;

use crate::chatctx::config::load_config;
use crate::chatctx::paths::resolve_paths;
use crate::chatctx::session_store::SessionStore;
use crate::chatctx::util::now_epoch_secs;
use crate::commands::CommandReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    List,
    Remove(String),
    Clear,
    Purge,
}

/// First 12 characters of a stored hash.
fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}

pub fn run(action: SessionAction) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let store = SessionStore::new(&paths.store_file, cfg.store.ttl_secs);
    let now = now_epoch_secs()?;

    let mut report = CommandReport::new("session");
    report.detail(format!("store={}", store.path().display()));
    match action {
        SessionAction::List => {
            let entries = store.list(now)?;
            report.detail(format!("sessions={}", entries.len()));
            for (key, entry) in &entries {
                report.detail(format!(
                    "{key}: messages={} source={} expires_in={}s hash={}",
                    entry.message_count,
                    entry.source,
                    entry.expires_at_epoch_secs.saturating_sub(now),
                    short_hash(&entry.content_hash)
                ));
            }
        }
        SessionAction::Remove(key) => {
            if store.remove(&key)? {
                report.detail(format!("removed={key}"));
            } else {
                report.issue(format!("no session `{key}`"));
            }
        }
        SessionAction::Clear => {
            let removed = store.clear()?;
            report.detail(format!("cleared={removed}"));
        }
        SessionAction::Purge => {
            let purged = store.purge_expired(now)?;
            report.detail(format!("purged={purged}"));
        }
    }
    Ok(report)
}
