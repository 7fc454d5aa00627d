use crate::error::TranscriptError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    ParsedFromText,
    SuppliedNumeric,
}

/// When a message was sent, as far as the input tells us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MessageTime {
    Known { at: DateTime<Utc> },
    /// Header carried no timestamp at all (fallback pattern).
    Unknown,
    /// Feed value could not be read; pinned to the epoch and excluded from rendering.
    Invalid { raw: String },
}

impl MessageTime {
    pub fn known(at: DateTime<Utc>) -> Self {
        Self::Known { at }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Known { at } => Some(*at),
            Self::Unknown => None,
            Self::Invalid { .. } => Some(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }
}

/// Who sent a message. Feeds only know whether it was the account owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "kebab-case")]
pub enum Speaker {
    Named(String),
    SelfParty,
    Counterpart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerLabels {
    pub self_label: String,
    pub contact_label: String,
}

impl Default for SpeakerLabels {
    fn default() -> Self {
        Self {
            self_label: "Me".to_string(),
            contact_label: "Contact".to_string(),
        }
    }
}

impl Speaker {
    pub fn label<'a>(&'a self, labels: &'a SpeakerLabels) -> &'a str {
        match self {
            Self::Named(name) => name,
            Self::SelfParty => &labels.self_label,
            Self::Counterpart => &labels.contact_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Speaker,
    pub time: MessageTime,
    pub body: String,
    pub origin: Origin,
}

impl Message {
    /// `sender: body` with the given labels, no trailing newline.
    pub fn render_plain(&self, labels: &SpeakerLabels) -> String {
        format!("{}: {}", self.sender.label(labels), self.body)
    }
}

/// A record that did not make it into the usable message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMessage {
    /// 1-based input line for text transcripts, 0-based feed index otherwise.
    pub position: usize,
    pub reason: TranscriptError,
}

/// Usable messages plus the ones dropped on the way, with reasons.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedMessage>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn push(&mut self, position: usize, outcome: Result<T, TranscriptError>) {
        match outcome {
            Ok(item) => self.items.push(item),
            Err(reason) => self.skipped.push(SkippedMessage { position, reason }),
        }
    }

    pub fn skip_reasons(&self) -> Vec<String> {
        self.skipped
            .iter()
            .map(|s| format!("#{}: {}", s.position, s.reason))
            .collect()
    }
}
