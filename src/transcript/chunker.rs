use crate::transcript::message::{Message, SpeakerLabels};
use serde::Serialize;

/// Characters counted as one budget unit.
pub const CHARS_PER_UNIT: usize = 4;
pub const DEFAULT_BUDGET_UNITS: usize = 450;

/// A contiguous run of messages that fits the budget, or a single message
/// that does not.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub messages: Vec<Message>,
    pub text: String,
    pub size_chars: usize,
}

impl Chunk {
    pub fn approx_units(&self) -> usize {
        self.size_chars.div_ceil(CHARS_PER_UNIT)
    }

    pub fn is_oversized(&self, budget_units: usize) -> bool {
        self.size_chars > char_limit(budget_units)
    }
}

fn char_limit(budget_units: usize) -> usize {
    budget_units.max(1).saturating_mul(CHARS_PER_UNIT)
}

/// `sender: body\n`, the unit the chunker measures.
pub fn render_line(message: &Message, labels: &SpeakerLabels) -> String {
    let mut line = message.render_plain(labels);
    line.push('\n');
    line
}

#[derive(Default)]
struct Pending {
    messages: Vec<Message>,
    text: String,
    chars: usize,
}

impl Pending {
    fn take(&mut self, index: usize) -> Chunk {
        let done = std::mem::take(self);
        Chunk {
            index,
            messages: done.messages,
            text: done.text,
            size_chars: done.chars,
        }
    }
}

/// Greedy single pass over `messages`, handing each closed chunk to
/// `on_chunk`. Returns the number of chunks emitted.
pub fn stream_chunks<F>(
    messages: &[Message],
    budget_units: usize,
    labels: &SpeakerLabels,
    mut on_chunk: F,
) -> usize
where
    F: FnMut(Chunk),
{
    let limit = char_limit(budget_units);
    let mut pending = Pending::default();
    let mut emitted = 0usize;

    for message in messages {
        let line = render_line(message, labels);
        let line_chars = line.chars().count();
        if !pending.messages.is_empty() && pending.chars + line_chars > limit {
            on_chunk(pending.take(emitted));
            emitted += 1;
        }
        pending.messages.push(message.clone());
        pending.text.push_str(&line);
        pending.chars += line_chars;
    }

    if !pending.messages.is_empty() {
        on_chunk(pending.take(emitted));
        emitted += 1;
    }
    emitted
}

pub fn chunk(
    messages: &[Message],
    budget_units: usize,
    labels: &SpeakerLabels,
) -> Vec<Chunk> {
    let mut out = Vec::new();
    stream_chunks(messages, budget_units, labels, |c| out.push(c));
    tracing::debug!(
        messages = messages.len(),
        chunks = out.len(),
        budget_units,
        "chunked messages"
    );
    out
}

/// The most recent `max` chunks, oldest first.
pub fn tail(chunks: &[Chunk], max: usize) -> &[Chunk] {
    &chunks[chunks.len().saturating_sub(max)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::message::{MessageTime, Origin, Speaker};

    fn msg(sender: &str, body: &str) -> Message {
        Message {
            sender: Speaker::Named(sender.to_string()),
            time: MessageTime::Unknown,
            body: body.to_string(),
            origin: Origin::ParsedFromText,
        }
    }

    fn chunked(messages: &[Message], budget_units: usize) -> Vec<Chunk> {
        chunk(messages, budget_units, &SpeakerLabels::default())
    }

    #[test]
    fn default_budget_is_450_units() {
        assert_eq!(DEFAULT_BUDGET_UNITS, 450);
        assert_eq!(char_limit(DEFAULT_BUDGET_UNITS), 1800);
    }

    #[test]
    fn concatenated_chunks_equal_unchunked_rendering() {
        let messages: Vec<Message> = (0..40)
            .map(|i| msg(&format!("user{}", i % 3), &"word ".repeat(i % 7 + 1)))
            .collect();
        let labels = SpeakerLabels::default();
        let whole: String = messages.iter().map(|m| render_line(m, &labels)).collect();

        let chunks = chunked(&messages, 10);
        assert!(chunks.len() > 1);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, whole);

        let flattened: Vec<Message> = chunks.iter().flat_map(|c| c.messages.clone()).collect();
        assert_eq!(flattened, messages);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn chunks_within_budget_unless_single_message() {
        let messages: Vec<Message> = (0..25).map(|i| msg("a", &"x".repeat(i * 3))).collect();
        for chunk in chunked(&messages, 8) {
            if chunk.messages.len() > 1 {
                assert!(chunk.size_chars <= 32, "chunk {} too big", chunk.index);
            }
        }
    }

    #[test]
    fn oversized_message_stands_alone_and_whole() {
        let big = "y".repeat(500);
        let messages = vec![msg("a", "hi"), msg("b", &big), msg("c", "bye")];
        let chunks = chunked(&messages, 1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].messages.len(), 1);
        assert_eq!(chunks[1].text, format!("b: {big}\n"));
        assert!(chunks[1].is_oversized(1));
    }

    #[test]
    fn zero_budget_behaves_like_one_unit() {
        let messages = vec![msg("a", "b"), msg("c", "d")];
        assert_eq!(chunked(&messages, 0).len(), chunked(&messages, 1).len());
    }

    #[test]
    fn large_budget_keeps_conversation_in_one_chunk() {
        let messages = vec![msg("Alice", "hello\ncontinued line"), msg("Bob", "hi Alice")];
        let chunks = chunked(&messages, 100_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Alice: hello\ncontinued line\nBob: hi Alice\n");
        assert_eq!(chunks[0].size_chars, 42);
        assert_eq!(chunks[0].approx_units(), 11);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(chunked(&[], 450).is_empty());
    }

    #[test]
    fn tail_keeps_latest_chunks() {
        let messages: Vec<Message> = (0..6).map(|i| msg("a", &"z".repeat(i + 10))).collect();
        let chunks = chunked(&messages, 1);
        let last = tail(&chunks, 2);
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].index, 4);
        assert_eq!(tail(&chunks, 100).len(), 6);
    }
}
