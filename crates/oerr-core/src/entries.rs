//! Message-entry extraction from one documentation page.
//!
//! Each entry in the reference looks like:
//!
//! ```html
//! <div class="msgentry">
//!   <dl>
//!     <dt><span class="msg">ORA-00001: unique constraint (string.string) violated</span></dt>
//!     <dd><div class="msgexplan"><span>Cause:</span> An UPDATE or INSERT ...</div></dd>
//!     <dd><div class="msgaction"><span>Action:</span> Either remove ...</div></dd>
//!   </dl>
//! </div>
//! ```
//!
//! Messages are handed to the caller one at a time in document order, so the
//! caller can forward them before the rest of the page is processed.

use crate::types::{Identifier, Message, Payload};
use crate::Result;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// SAFETY: Selectors are compile-time constants that are known to be valid.
#[allow(clippy::unwrap_used)]
static ENTRY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.msgentry").unwrap());

#[allow(clippy::unwrap_used)]
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("dt").unwrap());

#[allow(clippy::unwrap_used)]
static DETAIL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.msgexplan, div.msgaction").unwrap());

const CAUSE_LABEL: &str = "Cause: ";
const ACTION_LABEL: &str = "Action: ";

/// A field that either parsed cleanly or carries the text it failed on.
///
/// A defect in one field never aborts the record it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<T> {
    /// The field parsed
    Value(T),
    /// The field could not be parsed
    Defect {
        /// Text as it appeared on the page
        raw: String,
        /// Why it was rejected
        reason: String,
    },
}

impl<T: Default> FieldValue<T> {
    /// Take the value, logging a defect and substituting the default.
    pub fn or_default_logged(self, field: &str, context: &str) -> T {
        match self {
            Self::Value(value) => value,
            Self::Defect { raw, reason } => {
                warn!(field, raw = %raw, reason = %reason, context, "Defective field, using default");
                T::default()
            },
        }
    }
}

/// Parse a message code such as `00001`.
pub fn parse_code(raw: &str) -> FieldValue<u32> {
    match raw.trim().parse::<u32>() {
        Ok(code) => FieldValue::Value(code),
        Err(e) => FieldValue::Defect {
            raw: raw.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Split a title line `ORA-00001: description` into identifier parts.
///
/// Returns `(prefix, code, description)`. A line without a colon has an
/// empty description; a header without a hyphen is all prefix and its code
/// is a defect.
pub fn split_title(line: &str) -> (String, FieldValue<u32>, String) {
    let (header, description) = line.split_once(':').unwrap_or((line, ""));
    let (prefix, code) = match header.split_once('-') {
        Some((prefix, code)) => (prefix, parse_code(code)),
        None => (
            header,
            FieldValue::Defect {
                raw: header.to_string(),
                reason: "no '-' between prefix and code".to_string(),
            },
        ),
    };
    (
        prefix.trim().to_uppercase(),
        code,
        description.trim().to_string(),
    )
}

/// Parse one page and pass every message entry to `emit`, in document order.
///
/// Returns how many messages were emitted. An error from `emit` stops the
/// scan and is returned as is; defective fields inside an entry do not.
pub fn parse_messages<F>(html: &str, mut emit: F) -> Result<usize>
where
    F: FnMut(Message) -> Result<()>,
{
    let document = Html::parse_document(html);
    let mut emitted = 0;

    for entry in document.select(&ENTRY) {
        let Some(message) = message_from_entry(entry) else {
            continue;
        };
        emit(message)?;
        emitted += 1;
    }

    debug!(emitted, "Parsed message entries");
    Ok(emitted)
}

fn message_from_entry(entry: ElementRef<'_>) -> Option<Message> {
    let Some(title) = entry.select(&TITLE).next() else {
        warn!("Message entry without a title, skipping");
        return None;
    };

    let line = title.text().collect::<String>();
    let (prefix, code, description) = split_title(line.trim());
    let code = code.or_default_logged("code", line.trim());

    let mut payload = Payload {
        description,
        ..Payload::default()
    };
    for detail in entry.select(&DETAIL) {
        let text = detail.text().collect::<String>();
        if detail.value().classes().any(|c| c == "msgaction") {
            payload.action = strip_label(&text, ACTION_LABEL);
        } else {
            payload.cause = strip_label(&text, CAUSE_LABEL);
        }
    }

    Some(Message {
        id: Identifier::new(prefix, code),
        payload,
    })
}

fn strip_label(text: &str, label: &str) -> String {
    let text = text.trim_start();
    text.strip_prefix(label).unwrap_or(text).trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;

    const PAGE: &str = include_str!("../tests/fixtures/e0.htm");

    fn collect(html: &str) -> Vec<Message> {
        let mut out = Vec::new();
        parse_messages(html, |m| {
            out.push(m);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn test_fixture_page_yields_seven_messages() {
        let messages = collect(PAGE);
        assert_eq!(messages.len(), 7);

        let unique = messages.iter().find(|m| m.id.code == 1).unwrap();
        assert_eq!(unique.id, Identifier::new("ORA", 1));
        assert_eq!(
            unique.payload.description,
            "unique constraint (string.string) violated"
        );
        assert!(unique.payload.cause.starts_with("An UPDATE or INSERT statement"));
        assert_eq!(
            unique.payload.action,
            "Either remove the unique restriction or do not insert the key."
        );
    }

    #[test]
    fn test_messages_keep_document_order() {
        let codes: Vec<u32> = collect(PAGE).iter().map(|m| m.id.code).collect();
        assert_eq!(codes, vec![0, 1, 17, 18, 19, 850, 851]);
    }

    #[test]
    fn test_labels_are_stripped() {
        let first = collect(PAGE).into_iter().next().unwrap();
        assert_eq!(first.payload.cause, "Normal exit.");
        assert_eq!(first.payload.action, "None");
    }

    #[test]
    fn test_malformed_code_does_not_stop_siblings() {
        let html = r#"
            <div class="msgentry"><dl><dt>ORA-0000X: broken code</dt></dl></div>
            <div class="msgentry"><dl><dt>ORA-00942: table or view does not exist</dt>
              <dd><div class="msgexplan"><span>Cause:</span> The table does not exist.</div></dd>
            </dl></div>"#;

        let messages = collect(html);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, Identifier::new("ORA", 0));
        assert_eq!(messages[0].payload.description, "broken code");
        assert_eq!(messages[1].id, Identifier::new("ORA", 942));
        assert_eq!(messages[1].payload.cause, "The table does not exist.");
    }

    #[test]
    fn test_missing_blocks_leave_fields_empty() {
        let html = r#"<div class="msgentry"><dl><dt>tns-12541: TNS:no listener</dt></dl></div>"#;
        let messages = collect(html);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Identifier::new("TNS", 12541));
        assert_eq!(messages[0].payload.description, "TNS:no listener");
        assert!(messages[0].payload.cause.is_empty());
        assert!(messages[0].payload.action.is_empty());
    }

    #[test]
    fn test_entry_without_title_is_skipped() {
        let html = r#"
            <div class="msgentry"><p>stray</p></div>
            <div class="msgentry"><dl><dt>ORA-00018: maximum number of sessions exceeded</dt></dl></div>"#;
        let messages = collect(html);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.code, 18);
    }

    #[test]
    fn test_non_entry_divs_are_ignored() {
        let html = r#"<div class="msgset"><div class="other"><dt>ORA-1: no</dt></div></div>"#;
        assert!(collect(html).is_empty());
    }

    #[test]
    fn test_emit_error_stops_the_scan() {
        let mut seen = 0;
        let result = parse_messages(PAGE, |_| {
            seen += 1;
            if seen == 2 {
                Err(Error::StreamClosed)
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::StreamClosed)));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_split_title_edge_cases() {
        let (prefix, code, description) = split_title("ORA-00001: a: b");
        assert_eq!(prefix, "ORA");
        assert_eq!(code, FieldValue::Value(1));
        assert_eq!(description, "a: b");

        let (prefix, code, description) = split_title("ORA-00017");
        assert_eq!(prefix, "ORA");
        assert_eq!(code, FieldValue::Value(17));
        assert!(description.is_empty());

        let (prefix, code, _) = split_title("ORA00017: no hyphen");
        assert_eq!(prefix, "ORA00017");
        assert!(matches!(code, FieldValue::Defect { .. }));
    }

    #[test]
    fn test_defect_resolves_to_default() {
        assert_eq!(parse_code("12a").or_default_logged("code", "test"), 0);
        assert_eq!(parse_code(" 42 ").or_default_logged("code", "test"), 42);
    }
}
