use thiserror::Error;

/// Failures of the transcript pipeline.
///
/// `UndecodableInput` and `NoMessagesFound` end the whole request. The other
/// two are per-message and only ever show up as skip reasons in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("input is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    UndecodableInput { valid_up_to: usize },
    #[error(
        "no messages found in {line_count} lines{}",
        describe_sample(.unmatched_sample)
    )]
    NoMessagesFound {
        line_count: usize,
        unmatched_sample: Vec<String>,
    },
    #[error("unparseable timestamp `{date} {time}`")]
    UnparseableTimestamp { date: String, time: String },
    #[error("message body is empty after trimming")]
    EmptyAfterFilter,
}

fn describe_sample(sample: &[String]) -> String {
    if sample.is_empty() {
        String::new()
    } else {
        format!("; unmatched lines: {}", sample.join(" | "))
    }
}

impl TranscriptError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::UndecodableInput { .. } => Some(ErrorCode::E001UndecodableInput),
            Self::NoMessagesFound { .. } => Some(ErrorCode::E002NoMessagesFound),
            Self::UnparseableTimestamp { .. } | Self::EmptyAfterFilter => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChatCtxError {
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),
    #[error("bridge unavailable: {0}")]
    BridgeUnavailable(String),
}

impl ChatCtxError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::E003ConfigInvalid,
            Self::InferenceUnavailable(_) => ErrorCode::E004InferenceUnavailable,
            Self::BridgeUnavailable(_) => ErrorCode::E005BridgeUnavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    E001UndecodableInput,
    E002NoMessagesFound,
    E003ConfigInvalid,
    E004InferenceUnavailable,
    E005BridgeUnavailable,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001UndecodableInput => "E001_UNDECODABLE_INPUT",
            Self::E002NoMessagesFound => "E002_NO_MESSAGES_FOUND",
            Self::E003ConfigInvalid => "E003_CONFIG_INVALID",
            Self::E004InferenceUnavailable => "E004_INFERENCE_UNAVAILABLE",
            Self::E005BridgeUnavailable => "E005_BRIDGE_UNAVAILABLE",
        }
    }
}

/// Find the error code of the first known failure in an `anyhow` chain.
pub fn code_for(err: &anyhow::Error) -> Option<ErrorCode> {
    for cause in err.chain() {
        if let Some(known) = cause.downcast_ref::<TranscriptError>() {
            return known.code();
        }
        if let Some(known) = cause.downcast_ref::<ChatCtxError>() {
            return Some(known.code());
        }
    }
    None
}
