//! Synthetic addresses and message identifiers.
//!
//! Archives rarely hold usable email addresses, so every author gets a
//! deterministic pseudo-address. Addresses and Message-IDs that the archive
//! cannot supply live under [`INVALID_DOMAIN`], a non-routable domain that
//! never collides with real mail traffic.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Domain used for every synthesized address and identifier.
pub const INVALID_DOMAIN: &str = "yahoogroups.invalid";

/// Characters other than word characters, whitespace, `.`, `-` and `@`.
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.@-]").expect("valid regex"));

/// Runs of hyphens and whitespace.
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// Derive the sender address for a person from its raw email column.
///
/// The text is NFKD-normalized, reduced to ASCII, stripped of everything but
/// word characters, whitespace, `.`, `-` and `@`, trimmed, and separator runs
/// become `_`. If that does not leave exactly one `@` with something on both
/// sides, the result becomes the local part of
/// `<text>_uid<person_id>@yahoogroups.invalid`.
///
/// # Examples
/// - `"a@b.com"` → `"a@b.com"`
/// - `""` (id 7) → `"_uid7@yahoogroups.invalid"`
/// - `"Jean Dupont"` (id 3) → `"Jean_Dupont_uid3@yahoogroups.invalid"`
pub fn pseudo_address(raw_email: &[u8], person_id: i64) -> String {
    let text = String::from_utf8_lossy(raw_email);
    let ascii: String = text.nfkd().filter(char::is_ascii).collect();
    let kept = DISALLOWED.replace_all(&ascii, "");
    let trimmed = kept.trim().trim_matches('.');
    let value = SEPARATOR_RUNS.replace_all(trimmed, "_").into_owned();

    if is_single_address(&value) {
        value
    } else {
        format!(
            "{}_uid{person_id}@{INVALID_DOMAIN}",
            value.replace('@', "_")
        )
    }
}

/// Exactly one `@`, with a non-empty local part and domain.
fn is_single_address(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Reduce a group name to characters allowed in an address local part.
///
/// Anything outside RFC 5322 `atext` and `.` becomes `_`.
pub fn id_token(group_name: &str) -> String {
    let token: String = group_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();

    if token.is_empty() {
        "group".to_string()
    } else {
        token
    }
}

/// The `To:` address of every message of a group.
pub fn group_address(group_name: &str) -> String {
    format!("{}@{INVALID_DOMAIN}", id_token(group_name))
}

/// Message-ID for message `number` of a group, angle brackets included.
///
/// Stable across runs: it depends only on the group name and the number.
pub fn message_id(group_name: &str, number: i64) -> String {
    format!("<{}_{number}@{INVALID_DOMAIN}>", id_token(group_name))
}
