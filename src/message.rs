// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Message Model (C1): parses raw RFC 5322 bytes into addressed header
//! fields plus a truncated body preview, and extracts a bare recipient
//! address from a `To:` header value.

use crate::error::ParseError;
use mail_parser::{HeaderValue, Message};

/// An opaque byte sequence as retrieved from upstream. Immutable after
/// capture; cloned cheaply since staging, delivery, and quarantine all
/// need their own copy of the same bytes.
pub type RawMessage = Vec<u8>;

/// Derived view of a `RawMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body_preview: String,
}

impl ParsedMessage {
    /// Bare recipient address derived from `to`, falling back to the raw
    /// header text when no address-spec can be isolated.
    pub fn recipient_address(&self) -> String {
        get_recipient_address(&self.to)
    }
}

/// Parse raw bytes into a `ParsedMessage`. Never returns a partial object:
/// any failure is a single `ParseError`.
pub fn parse(raw: &RawMessage) -> Result<ParsedMessage, ParseError> {
    let message = Message::parse(raw)
        .ok_or_else(|| ParseError::Malformed("mail-parser could not parse message".to_string()))?;

    let message_id = message.message_id().unwrap_or("").to_string();
    let from = header_addr_string(message.from());
    let to = header_addr_string(message.to());
    let reply_to = {
        let s = header_addr_string(message.reply_to());
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    };
    let subject = message.subject().unwrap_or("").to_string();
    let body_preview = extract_body_preview(&message);

    Ok(ParsedMessage {
        message_id,
        from,
        to,
        reply_to,
        subject,
        body_preview,
    })
}

/// Render an address-list header field (already RFC 2047-decoded by
/// `mail-parser`) back to a single display string, joining multiple
/// addresses with `, `.
fn header_addr_string(addr: &HeaderValue) -> String {
    let mut parts = Vec::new();
    match addr {
        HeaderValue::Address(a) => {
            push_addr_part(&mut parts, a.name.as_deref(), a.address.as_deref());
        }
        HeaderValue::AddressList(list) => {
            for a in list {
                push_addr_part(&mut parts, a.name.as_deref(), a.address.as_deref());
            }
        }
        HeaderValue::Group(g) => {
            for a in &g.addresses {
                push_addr_part(&mut parts, a.name.as_deref(), a.address.as_deref());
            }
        }
        HeaderValue::GroupList(groups) => {
            for g in groups {
                for a in &g.addresses {
                    push_addr_part(&mut parts, a.name.as_deref(), a.address.as_deref());
                }
            }
        }
        _ => {}
    }
    parts.join(", ")
}

fn push_addr_part(parts: &mut Vec<String>, name: Option<&str>, address: Option<&str>) {
    match (name, address) {
        (Some(name), Some(address)) if !name.is_empty() => {
            parts.push(format!("{} <{}>", name, address));
        }
        (_, Some(address)) => parts.push(address.to_string()),
        (Some(name), None) => parts.push(name.to_string()),
        (None, None) => {}
    }
}

/// Select the first `text/plain` part (or the first `text/html` part if
/// there is no plain-text part), per `mail-parser`'s own MIME body-part
/// selection rules. `mail-parser` decodes each part's charset into a Rust
/// `String` up front, so the 800-byte truncation below operates on the
/// already-UTF-8-decoded text's byte representation, not on the original
/// pre-decode wire bytes — a multi-byte source charset (e.g. Latin-1 with
/// non-ASCII characters) can therefore land the cut point earlier than it
/// would for a byte-for-byte truncate-then-decode over the raw part
/// bytes. `from_utf8_lossy` repairs any UTF-8 sequence split by the cut.
/// Newlines are then collapsed to spaces and the result trimmed.
fn extract_body_preview(message: &mail_parser::Message) -> String {
    let raw_text: String = if let Some(body) = message.body_text(0) {
        body.to_string()
    } else if let Some(body) = message.body_html(0) {
        body.to_string()
    } else {
        String::new()
    };

    let bytes = raw_text.as_bytes();
    let truncated = if bytes.len() > 800 { &bytes[..800] } else { bytes };
    let decoded = String::from_utf8_lossy(truncated).to_string();

    let collapsed: String = decoded
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control() || *c == ' ')
        .collect();

    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the bare `addr-spec` from a header value, stripping any
/// display name. Falls back to the raw header text if no `<...>` pair or
/// bare-address pattern can be isolated. Empty input yields empty output.
pub fn get_recipient_address(to_header: &str) -> String {
    let trimmed = to_header.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // "Name <addr>" or "<addr>" forms: take the first angle-bracket pair.
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            let inner = &trimmed[start + 1..start + end];
            if !inner.is_empty() {
                return inner.trim().to_string();
            }
        }
    }

    // Bare "a@b" form, possibly with a trailing ", Name <c@d>" list — take
    // the first comma-delimited token if it looks like a bare address.
    let first = trimmed.split(',').next().unwrap_or(trimmed).trim();
    if first.contains('@') && !first.contains('<') {
        return first.to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_address_name_and_addr() {
        assert_eq!(get_recipient_address("Name <a@b>"), "a@b");
    }

    #[test]
    fn recipient_address_angle_only() {
        assert_eq!(get_recipient_address("<a@b>"), "a@b");
    }

    #[test]
    fn recipient_address_bare() {
        assert_eq!(get_recipient_address("a@b"), "a@b");
    }

    #[test]
    fn recipient_address_empty() {
        assert_eq!(get_recipient_address(""), "");
    }

    #[test]
    fn parse_simple_message() {
        let raw = b"From: sender@example.com\r\nTo: recipient@example.com\r\nSubject: Hello\r\nMessage-ID: <abc123@example.com>\r\n\r\nHello world.\r\n".to_vec();
        let parsed = parse(&raw).expect("should parse");
        assert_eq!(parsed.subject, "Hello");
        assert_eq!(parsed.message_id, "abc123@example.com");
        assert!(parsed.body_preview.contains("Hello world."));
        assert_eq!(parsed.recipient_address(), "recipient@example.com");
    }

    #[test]
    fn parse_is_idempotent() {
        let raw = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: X\r\n\r\nBody text here.\r\n".to_vec();
        let p1 = parse(&raw).unwrap();
        let p2 = parse(&raw).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn body_preview_collapses_newlines_to_spaces() {
        let raw = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: X\r\n\r\nHello\r\nworld\r\nagain\r\n".to_vec();
        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.body_preview, "Hello world again");
    }

    #[test]
    fn body_preview_truncated_and_collapsed() {
        let long_body = "a".repeat(1000);
        let raw = format!(
            "From: a@b.com\r\nTo: c@d.com\r\nSubject: X\r\n\r\n{}\r\n",
            long_body
        )
        .into_bytes();
        let parsed = parse(&raw).unwrap();
        assert!(parsed.body_preview.len() <= 800);
    }
}
