//! Compact binary encoding of store keys and values.
//!
//! Keys are exactly seven bytes: the three prefix bytes followed by the code
//! as a big-endian `u32`. Byte order therefore sorts by prefix, then by
//! numeric code.
//!
//! Values are three `(u16 big-endian length, bytes)` segments in the order
//! description, cause, action. There is no padding and no compression, so
//! equal records always encode to equal bytes.
//!
//! ```rust
//! use oerr_core::codec::{decode_identifier, encode_identifier};
//! use oerr_core::Identifier;
//!
//! let id = Identifier::new("ORA", 1);
//! let key = encode_identifier(&id)?;
//! assert_eq!(key, *b"ORA\x00\x00\x00\x01");
//! assert_eq!(decode_identifier(&key)?, id);
//! # Ok::<(), oerr_core::Error>(())
//! ```

use crate::types::{Identifier, PREFIX_LEN, Payload};
use crate::{Error, Result};

/// Width of an encoded identifier.
pub const KEY_LEN: usize = PREFIX_LEN + 4;

const LEN_PREFIX: usize = 2;

/// Encode an identifier as a fixed-width key.
pub fn encode_identifier(id: &Identifier) -> Result<[u8; KEY_LEN]> {
    let prefix = id.prefix.as_bytes();
    if prefix.len() != PREFIX_LEN {
        return Err(Error::InvalidIdentifier(format!(
            "prefix '{}' must be exactly {PREFIX_LEN} bytes",
            id.prefix
        )));
    }

    let mut key = [0u8; KEY_LEN];
    key[..PREFIX_LEN].copy_from_slice(prefix);
    key[PREFIX_LEN..].copy_from_slice(&id.code.to_be_bytes());
    Ok(key)
}

/// Decode a key produced by [`encode_identifier`].
///
/// Bytes past the seventh are ignored.
pub fn decode_identifier(bytes: &[u8]) -> Result<Identifier> {
    if bytes.len() < KEY_LEN {
        return Err(Error::MalformedKey(format!(
            "{} bytes, expected {KEY_LEN}",
            bytes.len()
        )));
    }

    let prefix = std::str::from_utf8(&bytes[..PREFIX_LEN])
        .map_err(|e| Error::MalformedKey(format!("prefix is not UTF-8: {e}")))?;
    let mut code = [0u8; 4];
    code.copy_from_slice(&bytes[PREFIX_LEN..KEY_LEN]);

    Ok(Identifier {
        prefix: prefix.to_string(),
        code: u32::from_be_bytes(code),
    })
}

/// Encode a payload as three length-prefixed segments.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>> {
    let fields = payload_fields(payload);
    let total = fields
        .iter()
        .map(|(_, text)| LEN_PREFIX + text.len())
        .sum::<usize>();

    let mut out = Vec::with_capacity(total);
    for (name, text) in fields {
        let len = u16::try_from(text.len()).map_err(|_| Error::FieldTooLong {
            field: name,
            len: text.len(),
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(text.as_bytes());
    }
    Ok(out)
}

/// Decode a value produced by [`encode_payload`].
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    let mut rest = bytes;
    let description = read_segment(&mut rest, "description")?;
    let cause = read_segment(&mut rest, "cause")?;
    let action = read_segment(&mut rest, "action")?;
    Ok(Payload {
        description,
        cause,
        action,
    })
}

const fn payload_fields(payload: &Payload) -> [(&'static str, &String); 3] {
    [
        ("description", &payload.description),
        ("cause", &payload.cause),
        ("action", &payload.action),
    ]
}

fn read_segment(rest: &mut &[u8], field: &str) -> Result<String> {
    let Some((len, tail)) = rest.split_first_chunk::<LEN_PREFIX>() else {
        return Err(Error::MalformedPayload(format!(
            "missing length prefix for {field}"
        )));
    };
    let len = usize::from(u16::from_be_bytes(*len));
    if tail.len() < len {
        return Err(Error::MalformedPayload(format!(
            "{field} claims {len} bytes but only {} remain",
            tail.len()
        )));
    }

    let (text, tail) = tail.split_at(len);
    let text = std::str::from_utf8(text)
        .map_err(|e| Error::MalformedPayload(format!("{field} is not UTF-8: {e}")))?;
    *rest = tail;
    Ok(text.to_string())
}
