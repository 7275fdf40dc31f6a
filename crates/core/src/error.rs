use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpanTreeError {
    #[error("trace contains no spans")]
    EmptyTrace,

    #[error("duplicate span id: {0}")]
    DuplicateSpanId(String),

    #[error("span {0} is its own ancestor")]
    CyclicParent(String),

    #[error("invalid timestamps on span {span_id}: {reason}")]
    InvalidTimestamp { span_id: String, reason: String },

    #[error("trace has {count} spans, limit is {limit}")]
    TooManySpans { count: usize, limit: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SpanTreeError>;
