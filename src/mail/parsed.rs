//! Parsed inbound email.
//!
//! Header lookups and the MIME walk live here so the ingestor only asks
//! questions of the message, never of the MIME tree.

use mail_parser::{Address, HeaderName, Message, MessageParser, MessagePart, MimeHeaders, PartType};

/// Forwarders such as mailing lists record the real sender here.
const ORIGINAL_FROM: &str = "X-Original-From";

/// An inbound email parsed by mail-parser.
pub struct ParsedEmail<'x> {
    message: Message<'x>,
}

impl<'x> ParsedEmail<'x> {
    /// Parse raw RFC 5322 bytes. Returns `None` when nothing resembling a
    /// message could be read.
    pub fn parse(raw: &'x [u8]) -> Option<Self> {
        // A custom header map turns off the built-in defaults, so the
        // standard headers are listed again alongside X-Original-From.
        MessageParser::new()
            .with_mime_headers()
            .with_date_headers()
            .with_address_headers()
            .with_message_ids()
            .header_text(HeaderName::Subject)
            .header_text(HeaderName::Comments)
            .header_address(ORIGINAL_FROM)
            .parse(raw)
            .map(|message| Self { message })
    }

    /// First value of header `name` (case-insensitive), unfolded and trimmed.
    pub fn header(&self, name: &str) -> Option<String> {
        self.raw_header_values(name).next()
    }

    /// Every value of header `name`, in message order.
    pub fn all_headers(&self, name: &str) -> Vec<String> {
        self.raw_header_values(name).collect()
    }

    /// Subject with RFC 2047 encoded words decoded.
    pub fn subject(&self) -> Option<String> {
        self.message.subject().map(str::to_string)
    }

    /// Addresses in the structured `From` header.
    pub fn from_addresses(&self) -> Vec<String> {
        extract_addresses(self.message.from())
    }

    /// Addresses in every `X-Original-From` header, parsed with the same
    /// address grammar as `From` (comments, groups, display names).
    pub fn original_from_addresses(&self) -> Vec<String> {
        self.message
            .header_values(ORIGINAL_FROM)
            .flat_map(|value| extract_addresses(value.as_address()))
            .collect()
    }

    /// Decoded `text/plain` parts in document order (depth-first),
    /// descending into attached `message/rfc822` parts.
    pub fn plain_text_parts(&self) -> impl Iterator<Item = String> + '_ {
        let mut found = Vec::new();
        collect_plain_text(&self.message, &mut found);
        found.into_iter()
    }

    fn raw_header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = String> + 'a {
        let raw = self.message.raw_message();
        self.message
            .headers()
            .iter()
            .filter(move |h| h.name.as_str().eq_ignore_ascii_case(name))
            .filter_map(move |h| raw.get(h.offset_start as usize..h.offset_end as usize))
            .map(|bytes| unfold(&String::from_utf8_lossy(bytes)))
    }
}

fn collect_plain_text(message: &Message, found: &mut Vec<String>) {
    for part in &message.parts {
        match &part.body {
            PartType::Text(text) if is_plain_text(part) => found.push(text.to_string()),
            PartType::Message(inner) => collect_plain_text(inner, found),
            _ => {}
        }
    }
}

/// Parts without a Content-Type default to text/plain.
fn is_plain_text(part: &MessagePart) -> bool {
    match MimeHeaders::content_type(part) {
        None => true,
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_none_or(|s| s.eq_ignore_ascii_case("plain"))
        }
    }
}

/// Join folded header lines into one.
fn unfold(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Email addresses in an optional mail-parser address field.
pub fn extract_addresses(addr: Option<&Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}
