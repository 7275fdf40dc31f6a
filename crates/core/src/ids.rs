use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanTreeError};

/// A 32-character lowercase hex trace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    pub fn parse(input: &str) -> Result<Self> {
        let valid = input.len() == 32
            && input.chars().all(|c| c.is_ascii_hexdigit())
            && !input.bytes().all(|b| b == b'0');
        if !valid {
            return Err(SpanTreeError::Parse(format!("invalid trace id: {input}")));
        }
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
