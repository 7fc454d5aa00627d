use crate::transcript::patterns::{PatternKind, PatternRegistry};
use crate::chatctx::util::truncate_with_ellipsis;
use serde::Serialize;

const MAX_DISCARDED_SAMPLE: usize = 5;
const MAX_SAMPLE_CHARS: usize = 120;

/// A message header plus folded continuation lines, timestamps still raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMessageRecord {
    /// 1-based line of the header.
    pub line: usize,
    pub pattern: String,
    #[serde(skip)]
    pub kind: PatternKind,
    pub sender: String,
    pub raw_date: Option<String>,
    pub raw_time: Option<String>,
    pub body: String,
}

impl RawMessageRecord {
    fn append_continuation(&mut self, line: &str) {
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(line);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub records: Vec<RawMessageRecord>,
    pub line_count: usize,
    /// Non-blank lines dropped because no message was open.
    pub discarded_lines: usize,
    pub discarded_sample: Vec<String>,
}

enum State {
    NoOpenMessage,
    OpenMessage(RawMessageRecord),
}

/// Folds a transcript into message records.
///
/// A header line opens a record (closing any open one). Other non-blank
/// lines extend the open record's body, or are dropped as noise when nothing
/// is open. Every line is tried against the whole registry, untimed
/// `sender: body` fallback included, unless the registry retires that
/// fallback after the first timestamped header.
pub struct MessageReconstructor<'a> {
    registry: &'a PatternRegistry,
}

fn clean_line(raw: &str) -> &str {
    raw.trim_start_matches(['\u{feff}', '\u{200e}', '\u{200f}'])
        .trim_end()
}

impl<'a> MessageReconstructor<'a> {
    pub fn new(registry: &'a PatternRegistry) -> Self {
        Self { registry }
    }

    pub fn reconstruct(&self, text: &str) -> Reconstruction {
        let mut out = Reconstruction::default();
        let mut state = State::NoOpenMessage;
        let mut seen_timestamped = false;
        let retire_untimed = self.registry.retires_untimed_after_dated();

        for (idx, raw) in text.lines().enumerate() {
            out.line_count += 1;
            let line = clean_line(raw);
            if line.trim().is_empty() {
                continue;
            }

            let allow_untimed = !(retire_untimed && seen_timestamped);
            if let Some((pattern, header)) = self.registry.first_match(line, allow_untimed) {
                if !pattern.is_untimed() {
                    seen_timestamped = true;
                }
                let record = RawMessageRecord {
                    line: idx + 1,
                    pattern: pattern.name().to_string(),
                    kind: pattern.kind(),
                    sender: header.sender.to_string(),
                    raw_date: header.date.map(str::to_string),
                    raw_time: header.time.map(str::to_string),
                    body: header.body.to_string(),
                };
                if let State::OpenMessage(done) =
                    std::mem::replace(&mut state, State::OpenMessage(record))
                {
                    out.records.push(done);
                }
                continue;
            }

            match &mut state {
                State::OpenMessage(open) => open.append_continuation(line),
                State::NoOpenMessage => {
                    out.discarded_lines += 1;
                    if out.discarded_sample.len() < MAX_DISCARDED_SAMPLE {
                        out.discarded_sample
                            .push(truncate_with_ellipsis(line.trim(), MAX_SAMPLE_CHARS));
                    }
                }
            }
        }

        if let State::OpenMessage(done) = state {
            out.records.push(done);
        }
        tracing::debug!(
            lines = out.line_count,
            records = out.records.len(),
            discarded = out.discarded_lines,
            "reconstructed transcript"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(text: &str) -> Reconstruction {
        let registry = PatternRegistry::builtin();
        MessageReconstructor::new(&registry).reconstruct(text)
    }

    fn rebuild_retiring_untimed(text: &str) -> Reconstruction {
        let registry = PatternRegistry::builtin().retiring_untimed_after_dated(true);
        MessageReconstructor::new(&registry).reconstruct(text)
    }

    #[test]
    fn headers_come_out_in_input_order() {
        let text = (0..10)
            .map(|i| format!("1/2/24, 3:{i:02} PM - User{i}: message {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let out = rebuild(&text);
        assert_eq!(out.records.len(), 10);
        for (i, record) in out.records.iter().enumerate() {
            assert_eq!(record.sender, format!("User{i}"));
            assert_eq!(record.line, i + 1);
        }
    }

    #[test]
    fn continuation_lines_fold_into_open_message() {
        let out = rebuild(
            "1/2/24, 3:04 PM - Alice: hello\ncontinued line\nand another\n1/2/24, 3:05 PM - Bob: hi Alice",
        );
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].sender, "Alice");
        assert_eq!(out.records[0].body, "hello\ncontinued line\nand another");
        assert_eq!(out.records[0].raw_date.as_deref(), Some("1/2/24"));
        assert_eq!(out.records[0].raw_time.as_deref(), Some("3:04 PM"));
        assert_eq!(out.records[1].sender, "Bob");
        assert_eq!(out.records[1].body, "hi Alice");
    }

    #[test]
    fn blank_lines_do_not_touch_open_body() {
        let out = rebuild("1/2/24, 3:04 PM - Alice: hello\n\n   \r\nafter blank\n");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].body, "hello\nafter blank");
    }

    #[test]
    fn leading_noise_is_discarded_and_sampled() {
        let out = rebuild(
            "\u{feff}Messages and calls are end-to-end encrypted.\n\n1/2/24, 3:04 PM - Alice: hello",
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.discarded_lines, 1);
        assert_eq!(
            out.discarded_sample,
            vec!["Messages and calls are end-to-end encrypted.".to_string()]
        );
        assert_eq!(out.line_count, 3);
    }

    #[test]
    fn untimed_fallback_still_matches_after_dated_header() {
        let out = rebuild("1/2/24, 3:04 PM - Alice: hi\nBob: yo");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].body, "hi");
        assert_eq!(out.records[1].sender, "Bob");
        assert_eq!(out.records[1].body, "yo");
        assert_eq!(out.records[1].raw_date, None);
    }

    #[test]
    fn colon_lines_stay_continuations_when_untimed_is_retired() {
        let text = "1/2/24, 3:04 PM - Alice: agenda\nRe: lunch\nNote: bring snacks";
        let out = rebuild_retiring_untimed(text);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].body, "agenda\nRe: lunch\nNote: bring snacks");

        let split = rebuild(text);
        assert_eq!(split.records.len(), 3);
        assert_eq!(split.records[1].sender, "Re");
    }

    #[test]
    fn retired_fallback_still_serves_headerless_prefix() {
        let out = rebuild_retiring_untimed("Alice: hi\n1/2/24, 3:04 PM - Bob: yo\nCarol: hey");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].sender, "Alice");
        assert_eq!(out.records[1].body, "yo\nCarol: hey");
    }

    #[test]
    fn headerless_transcripts_use_untimed_fallback() {
        let out = rebuild("Alice: hi\nBob: yo\nstill bob");
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].raw_date, None);
        assert_eq!(out.records[1].body, "yo\nstill bob");
        assert_eq!(out.records[1].pattern, "sender-only");
    }

    #[test]
    fn empty_input_yields_nothing() {
        let out = rebuild("");
        assert!(out.records.is_empty());
        assert_eq!(out.line_count, 0);
    }

    #[test]
    fn empty_header_body_takes_first_continuation_verbatim() {
        let out = rebuild("1/2/24, 3:04 PM - Alice:\nfirst real line");
        assert_eq!(out.records[0].body, "first real line");
    }
}
