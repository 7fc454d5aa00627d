pub mod ask;
pub mod chunk;
pub mod format;
pub mod parse;
pub mod session;
pub mod status;

use crate::chatctx::bridge::BridgeClient;
use crate::chatctx::config::ChatCtxConfig;
use crate::error::{TranscriptError, code_for};
use crate::transcript::feed::{messages_from_feed, parse_feed_json, usable_feed_messages};
use crate::transcript::ingest::ingest;
use crate::transcript::message::Message;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Primary output (a document, chunk texts, an answer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            output: None,
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    /// Record a whole-request failure, prefixed with its error code when it has one.
    pub fn fail(&mut self, err: &anyhow::Error) {
        match code_for(err) {
            Some(code) => self.issue(format!("{}: {err:#}", code.as_str())),
            None => self.issue(format!("{err:#}")),
        }
    }
}

/// Where messages come from.
#[derive(Debug, Clone)]
pub enum Source {
    Export(PathBuf),
    FeedFile(PathBuf),
    Chat(String),
}

impl Source {
    pub fn label(&self) -> String {
        match self {
            Source::Export(path) => path.display().to_string(),
            Source::FeedFile(path) => format!("feed:{}", path.display()),
            Source::Chat(id) => format!("chat:{id}"),
        }
    }
}

/// Messages from any source, in the order they should be read.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub messages: Vec<Message>,
    pub skip_reasons: Vec<String>,
    pub ambiguous_dates: usize,
}

impl Loaded {
    /// Messages the chunker should see: readable time and a non-empty body.
    pub fn usable(&self) -> (Vec<Message>, Vec<String>) {
        let batch = usable_feed_messages(self.messages.clone());
        let reasons = batch.skip_reasons();
        (batch.items, reasons)
    }

    /// Dates whose day/month order was settled by pattern order.
    pub fn note_ambiguity(&self, report: &mut CommandReport) {
        if self.ambiguous_dates > 0 {
            report.detail(format!(
                "ambiguous_dates={} (resolved by pattern order)",
                self.ambiguous_dates
            ));
        }
    }
}

pub fn load_messages(source: &Source, cfg: &ChatCtxConfig) -> Result<Loaded> {
    let normalizer = cfg.normalizer()?;
    match source {
        Source::Export(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let registry = cfg.registry()?;
            let batch = ingest(&bytes, &registry, &normalizer)
                .with_context(|| format!("failed to ingest {}", path.display()))?;
            Ok(Loaded {
                skip_reasons: batch.skip_reasons(),
                messages: batch.messages,
                ambiguous_dates: batch.ambiguous_dates,
            })
        }
        Source::FeedFile(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let records = parse_feed_json(&raw)
                .with_context(|| format!("failed to parse feed {}", path.display()))?;
            feed_to_loaded(messages_from_feed(&records, &normalizer))
                .with_context(|| format!("failed to load feed {}", path.display()))
        }
        Source::Chat(chat_id) => {
            let records = BridgeClient::new(&cfg.bridge).fetch(chat_id)?;
            feed_to_loaded(messages_from_feed(&records, &normalizer))
                .with_context(|| format!("failed to load chat {chat_id}"))
        }
    }
}

fn feed_to_loaded(messages: Vec<Message>) -> Result<Loaded> {
    let loaded = Loaded {
        messages,
        ..Loaded::default()
    };
    let (usable, reasons) = loaded.usable();
    if usable.is_empty() {
        return Err(TranscriptError::NoMessagesFound {
            line_count: loaded.messages.len(),
            unmatched_sample: reasons.into_iter().take(5).collect(),
        }
        .into());
    }
    Ok(loaded)
}
