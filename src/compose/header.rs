//! Header values: validation of archive text, deterministic fallbacks, and
//! serialization through `mail-builder`, which applies RFC 2047 encoding and
//! line folding.

use std::borrow::Cow;
use std::io;

use mail_builder::headers::address::Address;
use mail_builder::headers::text::Text;
use mail_builder::headers::Header;
use sha2::{Digest, Sha256};

use crate::error::EncodeError;

/// Prefix of the synthetic subject used when the real one cannot be encoded.
pub const SUBJECT_FALLBACK_PREFIX: &str = "pgo2mbox-subject-";

/// Check raw archive text and flatten it to a single line.
///
/// Rejects invalid UTF-8 and control characters other than TAB, CR and LF.
/// Each CR LF pair, lone CR and lone LF becomes `_`, so nothing the archive
/// holds can start a new header.
pub fn header_text(raw: &[u8]) -> Result<String, EncodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| EncodeError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;

    if let Some(c) = text
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\t' | '\r' | '\n'))
    {
        return Err(EncodeError::ControlCharacter(c));
    }

    Ok(text.replace("\r\n", "_").replace(['\r', '\n'], "_"))
}

/// `Subject:` value for raw subject bytes.
pub fn subject(raw: &[u8]) -> Result<Text<'static>, EncodeError> {
    header_text(raw).map(Text::new)
}

/// Deterministic replacement for a subject that [`subject`] rejected:
/// a fixed prefix and the SHA-256 of the original bytes.
pub fn subject_fallback(raw: &[u8]) -> Text<'static> {
    Text::new(format!(
        "{SUBJECT_FALLBACK_PREFIX}{}",
        hex::encode(Sha256::digest(raw))
    ))
}

/// `From:` value: display name and address.
///
/// An empty (or whitespace-only) name yields the address alone.
pub fn sender(name: &[u8], address: &str) -> Result<Address<'static>, EncodeError> {
    let name = header_text(name)?;
    let name = name.trim();
    if name.is_empty() {
        return Ok(sender_fallback(address));
    }
    Ok(Address::new_address(
        Some(name.to_string()),
        address.to_string(),
    ))
}

/// `From:` value without a display name.
pub fn sender_fallback(address: &str) -> Address<'static> {
    Address::new_address(None::<Cow<'static, str>>, address.to_string())
}

/// Append `Name: value` to `out`.
///
/// `mail-builder` ends lines with CR LF; mailboxes use LF, so line ends are
/// rewritten. Values never carry a CR or LF of their own.
pub fn write_header(out: &mut Vec<u8>, name: &str, value: &impl Header) -> io::Result<()> {
    let mut line = Vec::with_capacity(name.len() + 64);
    line.extend_from_slice(name.as_bytes());
    line.extend_from_slice(b": ");
    value.write_header(&mut line, name.len() + 2)?;
    out.extend_from_slice(&crlf_to_lf(&line));
    Ok(())
}

/// Replace every CR LF pair with LF.
pub(crate) fn crlf_to_lf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::MessageParser;

    /// Serialize one header and parse it back.
    fn round_trip(name: &str, value: &impl Header) -> (Vec<u8>, mail_parser::Message<'static>) {
        let mut raw = Vec::new();
        write_header(&mut raw, name, value).unwrap();
        raw.extend_from_slice(b"\nbody\n");
        let parsed = MessageParser::default()
            .parse(&raw)
            .unwrap()
            .into_owned();
        (raw, parsed)
    }

    #[test]
    fn test_plain_subject() {
        let (raw, parsed) = round_trip("Subject", &subject(b"Hello World").unwrap());
        assert!(raw.starts_with(b"Subject: Hello World\n"));
        assert_eq!(parsed.subject(), Some("Hello World"));
    }

    #[test]
    fn test_line_breaks_replaced() {
        assert_eq!(header_text(b"Hi\r\nBcc: evil@x.com").unwrap(), "Hi_Bcc: evil@x.com");
        assert_eq!(header_text(b"a\nb\rc").unwrap(), "a_b_c");
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let (raw, parsed) = round_trip("Subject", &subject("Café con leña".as_bytes()).unwrap());
        assert!(raw.is_ascii());
        assert_eq!(parsed.subject(), Some("Café con leña"));
    }

    #[test]
    fn test_long_subject_is_folded() {
        let long = "word ".repeat(400);
        let (raw, parsed) = round_trip("Subject", &subject(long.as_bytes()).unwrap());
        let longest = raw.split(|&b| b == b'\n').map(<[u8]>::len).max().unwrap();
        assert!(longest <= 998, "longest line: {longest}");
        assert!(!raw.contains(&b'\r'));
        assert!(parsed.subject().unwrap().starts_with("word"));
    }

    #[test]
    fn test_long_non_ascii_subject_is_folded() {
        let long = "é".repeat(600);
        let (raw, parsed) = round_trip("Subject", &subject(long.as_bytes()).unwrap());
        let longest = raw.split(|&b| b == b'\n').map(<[u8]>::len).max().unwrap();
        assert!(longest <= 998, "longest line: {longest}");
        assert_eq!(parsed.subject(), Some(long.as_str()));
    }

    #[test]
    fn test_invalid_utf8_subject_is_rejected() {
        assert_eq!(
            header_text(b"ok\xff"),
            Err(EncodeError::InvalidUtf8 { valid_up_to: 2 })
        );
        assert!(subject(b"ok\xff").is_err());
    }

    #[test]
    fn test_control_character_is_rejected() {
        assert_eq!(
            header_text(b"bell\x07"),
            Err(EncodeError::ControlCharacter('\u{7}'))
        );
    }

    #[test]
    fn test_subject_fallback_is_deterministic() {
        let (a, _) = round_trip("Subject", &subject_fallback(b"\xff\xfe"));
        let (b, _) = round_trip("Subject", &subject_fallback(b"\xff\xfe"));
        let (c, parsed) = round_trip("Subject", &subject_fallback(b"\xff"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        let text = parsed.subject().unwrap();
        assert!(text.starts_with(SUBJECT_FALLBACK_PREFIX));
        assert_eq!(text.len(), SUBJECT_FALLBACK_PREFIX.len() + 64);
    }

    #[test]
    fn test_sender_with_name() {
        let (_, parsed) = round_trip("From", &sender(b"Alice", "a@b.com").unwrap());
        let from = parsed.from().and_then(|a| a.first()).unwrap();
        assert_eq!(from.name(), Some("Alice"));
        assert_eq!(from.address(), Some("a@b.com"));
    }

    #[test]
    fn test_sender_non_ascii_name() {
        let (raw, parsed) = round_trip("From", &sender("José".as_bytes(), "j@x.com").unwrap());
        assert!(raw.is_ascii());
        let from = parsed.from().and_then(|a| a.first()).unwrap();
        assert_eq!(from.name(), Some("José"));
        assert_eq!(from.address(), Some("j@x.com"));
    }

    #[test]
    fn test_sender_empty_name() {
        let (_, parsed) = round_trip("From", &sender(b"  ", "a@b.com").unwrap());
        let from = parsed.from().and_then(|a| a.first()).unwrap();
        assert_eq!(from.name(), None);
        assert_eq!(from.address(), Some("a@b.com"));
    }

    #[test]
    fn test_sender_invalid_name_fails() {
        assert!(sender(b"\xc3", "a@b.com").is_err());
    }

    #[test]
    fn test_crlf_to_lf() {
        assert_eq!(crlf_to_lf(b"a\r\nb\rc\n"), b"a\nb\rc\n");
    }
}
