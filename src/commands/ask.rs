use anyhow::{Result, anyhow};

use crate::chatctx::audit;
use crate::chatctx::config::load_config;
use crate::chatctx::inference::{answer_parts, resolve_answerer};
use crate::chatctx::paths::resolve_paths;
use crate::chatctx::session_store::SessionStore;
use crate::chatctx::util::now_epoch_secs;
use crate::commands::{CommandReport, Source, load_messages};
use crate::transcript::chunker::{chunk, tail};
use crate::transcript::context::ContextFormatter;

pub struct AskOptions<'a> {
    pub source: Option<Source>,
    pub question: &'a str,
    pub session: Option<&'a str>,
}

pub fn run(opts: AskOptions<'_>) -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let store = SessionStore::new(&paths.store_file, cfg.store.ttl_secs);
    let mut report = CommandReport::new("ask");

    if opts.question.trim().is_empty() {
        return Err(anyhow!("question cannot be empty"));
    }

    let answerer = match resolve_answerer(&cfg.inference) {
        Ok(a) => a,
        Err(err) => {
            audit::record(&paths, "ask", "unavailable", &err.to_string());
            return Err(err.into());
        }
    };
    report.detail(format!("answerer={}", answerer.label()));

    let now = now_epoch_secs()?;
    let contexts: Vec<String> = match (&opts.source, opts.session) {
        (Some(source), session) => {
            let loaded = load_messages(source, &cfg)?;
            let (messages, _) = loaded.usable();
            let chunks = chunk(&messages, cfg.chunking.budget_units, &cfg.labels());
            let selected = tail(&chunks, cfg.chunking.max_chunks);
            let formatter = ContextFormatter::new(cfg.format_options()?);
            let contexts: Vec<String> = selected
                .iter()
                .map(|c| formatter.format(&c.messages).render())
                .collect();

            report.detail(format!("source={}", source.label()));
            report.detail(format!("messages={}", messages.len()));
            loaded.note_ambiguity(&mut report);
            report.detail(format!(
                "chunks={} answered={}",
                chunks.len(),
                selected.len()
            ));

            if let (Some(key), Some(last), Some(last_chunk)) =
                (session, contexts.last(), selected.last())
            {
                store.put(key, last, &source.label(), last_chunk.messages.len(), now)?;
                report.detail(format!("session={key} stored"));
            }
            contexts
        }
        (None, Some(key)) => {
            let entry = store.get(key, now)?.ok_or_else(|| {
                anyhow!("session `{key}` has no stored context; pass an export, --feed or --chat-id")
            })?;
            report.detail(format!("session={key} reused ({})", entry.source));
            vec![entry.context]
        }
        (None, None) => return Err(anyhow!("nothing to ask about: pass an input or --session")),
    };

    match answer_parts(answerer.as_ref(), &contexts, opts.question) {
        Ok(answer) => {
            audit::record(
                &paths,
                "ask",
                "ok",
                &format!("{} part(s) via {}", contexts.len(), answerer.label()),
            );
            report.output = Some(format!("{answer}\n"));
            Ok(report)
        }
        Err(err) => {
            audit::record(&paths, "ask", "failed", &format!("{err:#}"));
            Err(err)
        }
    }
}
