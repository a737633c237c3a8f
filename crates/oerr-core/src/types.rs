//! Core data types: message identifiers, payloads and the messages pairing them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix assumed when a user-supplied identifier carries only a number.
pub const DEFAULT_PREFIX: &str = "ORA";

/// Length in bytes of an identifier prefix.
pub const PREFIX_LEN: usize = 3;

/// An `href` as written on the table of contents, usually relative.
/// Never persisted.
pub type Link = String;

/// Identifies one message: a three-letter facility prefix and a numeric code.
///
/// The prefix is upper-cased on construction. Its length is checked when the
/// identifier is encoded as a store key, so extraction can carry odd prefixes
/// far enough to be logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Facility prefix such as `ORA` or `TNS`
    pub prefix: String,
    /// Numeric message code
    pub code: u32,
}

impl Identifier {
    /// Create an identifier, normalizing the prefix to upper case.
    pub fn new(prefix: impl AsRef<str>, code: u32) -> Self {
        Self {
            prefix: prefix.as_ref().trim().to_uppercase(),
            code,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:05}", self.prefix, self.code)
    }
}

impl FromStr for Identifier {
    type Err = Error;

    /// Parse `ORA-00001`, `tns-12541` or a bare `1` (prefix defaults to `ORA`).
    ///
    /// A prefix that is not exactly three letters or digits is rejected, so
    /// `ORACLE-1` never silently becomes a different message.
    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let (prefix, code) = match text.split_once('-') {
            Some((prefix, code)) if !prefix.is_empty() => (prefix, code),
            Some((_, code)) => (DEFAULT_PREFIX, code),
            None => (DEFAULT_PREFIX, text),
        };
        if prefix.len() != PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::Parse(format!(
                "'{prefix}' is not a message prefix; expected three characters such as ORA"
            )));
        }
        let code = code
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::Parse(format!("'{code}' is not a message code: {e}")))?;
        Ok(Self::new(prefix, code))
    }
}

/// The explanatory text stored for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// One-line message text, e.g. `unique constraint (string.string) violated`
    pub description: String,
    /// Why the message is raised
    pub cause: String,
    /// What to do about it
    pub action: String,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\nCause: {}\nAction: {}",
            self.description, self.cause, self.action
        )
    }
}

/// An extracted record: identifier plus payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store key
    pub id: Identifier,
    /// Store value
    pub payload: Payload,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.payload)
    }
}
