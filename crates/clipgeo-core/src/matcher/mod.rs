//! Address extraction from free-form text
//!
//! Matching runs in two phases. Permissive regexes find candidate spans, then
//! a validation pass decides what is really an address. Invalid candidates
//! are dropped silently; there is no error type here.
//!
//! ## Usage
//!
//! ```rust
//! use clipgeo_core::matcher::{find_addresses, FamilyFilters};
//! use clipgeo_core::traits::AddressFamily;
//!
//! let found: Vec<_> = find_addresses("server 203.0.113.5 is up", FamilyFilters::all()).collect();
//! assert_eq!(found[0].address, "203.0.113.5");
//! assert_eq!(found[0].family, AddressFamily::V4);
//! ```

use regex::Regex;
use std::iter::FusedIterator;
use std::sync::LazyLock;

use crate::traits::AddressFamily;

static IPV4_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b").expect("IPv4 candidate pattern is valid")
});

static IPV6_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{0,4}(?::[0-9a-f]{0,4}){2,}")
        .expect("IPv6 candidate pattern is valid")
});

/// Which address families to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyFilters {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl FamilyFilters {
    /// Both families enabled
    pub fn all() -> Self {
        Self {
            ipv4: true,
            ipv6: true,
        }
    }
}

impl Default for FamilyFilters {
    fn default() -> Self {
        Self::all()
    }
}

/// One validated address found in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedAddress {
    /// The address exactly as it appears in the text
    pub address: String,
    pub family: AddressFamily,
    /// Byte offset of the address in the scanned text
    pub offset: usize,
}

/// Addresses found in one text, left to right
///
/// Consumed once; scan the text again to get a fresh sequence.
#[derive(Debug)]
pub struct Matches {
    inner: std::vec::IntoIter<DetectedAddress>,
}

impl Iterator for Matches {
    type Item = DetectedAddress;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Matches {}

impl FusedIterator for Matches {}

/// Address matcher bound to a set of family filters
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressMatcher {
    filters: FamilyFilters,
}

impl AddressMatcher {
    /// Create a matcher for the given families
    pub fn new(filters: FamilyFilters) -> Self {
        Self { filters }
    }

    /// Filters this matcher applies
    pub fn filters(&self) -> FamilyFilters {
        self.filters
    }

    /// Find every valid address in `text`
    pub fn find_addresses(&self, text: &str) -> Matches {
        find_addresses(text, self.filters)
    }

    /// First valid address in `text`, if any
    pub fn first_address(&self, text: &str) -> Option<DetectedAddress> {
        self.find_addresses(text).next()
    }
}

/// Find every valid address in `text`, ordered by position
pub fn find_addresses(text: &str, filters: FamilyFilters) -> Matches {
    let mut found = Vec::new();

    if filters.ipv4 {
        for m in IPV4_CANDIDATE.find_iter(text) {
            if continues_dotted_run(text, m.start(), m.end()) {
                continue;
            }
            if is_valid_ipv4(m.as_str()) {
                found.push(DetectedAddress {
                    address: m.as_str().to_string(),
                    family: AddressFamily::V4,
                    offset: m.start(),
                });
            }
        }
    }

    if filters.ipv6 {
        for m in IPV6_CANDIDATE.find_iter(text) {
            if let Some((start, end)) = ipv6_in_span(text, m.start(), m.end()) {
                found.push(DetectedAddress {
                    address: text[start..end].to_string(),
                    family: AddressFamily::V6,
                    offset: start,
                });
            }
        }
    }

    found.sort_by_key(|detected| detected.offset);

    Matches {
        inner: found.into_iter(),
    }
}

/// Validate a dotted-decimal IPv4 address
///
/// Four octets in [0, 255], no leading zeros ("0" itself is fine).
pub fn is_valid_ipv4(candidate: &str) -> bool {
    let octets: Vec<&str> = candidate.split('.').collect();
    if octets.len() != 4 {
        return false;
    }

    octets.iter().all(|octet| {
        !octet.is_empty()
            && octet.len() <= 3
            && octet.bytes().all(|b| b.is_ascii_digit())
            && !(octet.len() > 1 && octet.starts_with('0'))
            && octet.parse::<u16>().is_ok_and(|value| value <= 255)
    })
}

/// Validate a textual IPv6 address
///
/// Embedded IPv4 tails and zone ids are not accepted.
pub fn is_valid_ipv6(candidate: &str) -> bool {
    if candidate == "::" || candidate.contains(":::") {
        return false;
    }

    match candidate.matches("::").count() {
        0 => {
            let groups: Vec<&str> = candidate.split(':').collect();
            groups.len() == 8 && groups.iter().all(|g| is_hex_group(g))
        }
        1 => {
            let Some((head, tail)) = candidate.split_once("::") else {
                return false;
            };
            let head_groups = split_groups(head);
            let tail_groups = split_groups(tail);

            // "::" has to stand for at least one group
            let explicit = head_groups.len() + tail_groups.len();
            explicit <= 7
                && head_groups
                    .iter()
                    .chain(tail_groups.iter())
                    .all(|g| is_hex_group(g))
        }
        _ => false,
    }
}

fn split_groups(part: &str) -> Vec<&str> {
    if part.is_empty() {
        Vec::new()
    } else {
        part.split(':').collect()
    }
}

fn is_hex_group(group: &str) -> bool {
    (1..=4).contains(&group.len()) && group.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A dotted run like "1.2.3.4.5" or "9.1.2.3.4" is a version string, not an address.
fn continues_dotted_run(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();

    let before = start >= 2 && bytes[start - 1] == b'.' && bytes[start - 2].is_ascii_digit();
    let after = end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit();

    before || after
}

/// Drop a single stray ':' at either edge, keeping a real "::" intact.
fn trim_stray_colons(text: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    let span = &text[start..end];
    if span.starts_with(':') && !span.starts_with("::") {
        start += 1;
    }

    let span = &text[start..end];
    if span.ends_with(':') && !span.ends_with("::") {
        end -= 1;
    }

    (start, end)
}

/// Bounds of a valid IPv6 address inside a candidate span
///
/// A span that starts in the middle of a word is retried from its next group
/// boundary, so "deadbeef:2001:db8::1" still yields "2001:db8::1".
fn ipv6_in_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let (start, end) = trim_stray_colons(text, start, end);
    if start >= end {
        return None;
    }

    if follows_word(text, start) {
        let boundary = text[start..end].find(':')?;
        return ipv6_in_span(text, start + boundary + 1, end);
    }

    if runs_into_word(text, end) || !is_valid_ipv6(&text[start..end]) {
        return None;
    }
    Some((start, end))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn follows_word(text: &str, start: usize) -> bool {
    text[..start].chars().next_back().is_some_and(is_word_char)
}

/// Candidate touches a word character, or continues into an embedded IPv4 tail.
fn runs_into_word(text: &str, end: usize) -> bool {
    let mut rest = text[end..].chars();
    match rest.next() {
        Some('.') => rest.next().is_some_and(|c| c.is_ascii_digit()),
        Some(c) => is_word_char(c),
        None => false,
    }
}
