//! Literal, case-insensitive, token-bounded matching over raw bytes.
//!
//! # Matching rule
//! - Host tokens: the byte before a match must not be `[A-Za-z0-9_-]` (a `.`
//!   is fine, so subdomains are caught). The byte after must not be
//!   `[A-Za-z0-9_-]`, nor a `.` that continues into a longer name.
//! - Address tokens: no digit or `.` before, no digit (or `.` + digit) after.
//! - Scheme-qualified patterns only check the trailing boundary.
//! - A token-bounded occurrence of the protected value is copied verbatim and
//!   skipped, unless the needle matches a longer span at the same position.
//!
//! Everything works on `&[u8]`: needles are ASCII, so a replacement never
//! splits a multi-byte UTF-8 sequence and mislabeled binary is still safe.

/// Which boundary rule applies to a needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Host,
    Address,
}

/// A needle, optionally required to be preceded by one of `schemes`.
#[derive(Debug, Clone, Copy)]
pub struct Pattern<'a> {
    pub schemes: &'a [&'a str],
    pub needle: &'a str,
    pub kind: TokenKind,
}

impl<'a> Pattern<'a> {
    pub fn bare(needle: &'a str, kind: TokenKind) -> Self {
        Self { schemes: &[], needle, kind }
    }

    pub fn with_schemes(schemes: &'a [&'a str], needle: &'a str, kind: TokenKind) -> Self {
        Self { schemes, needle, kind }
    }
}

fn starts_with_ci(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_host_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn left_ok(haystack: &[u8], start: usize, kind: TokenKind) -> bool {
    let Some(&prev) = start.checked_sub(1).and_then(|i| haystack.get(i)) else {
        return true;
    };
    match kind {
        TokenKind::Host => !is_host_byte(prev),
        TokenKind::Address => !(prev.is_ascii_digit() || prev == b'.'),
    }
}

fn right_ok(haystack: &[u8], end: usize, kind: TokenKind) -> bool {
    let Some(&next) = haystack.get(end) else {
        return true;
    };
    let after = haystack.get(end + 1).copied();
    match kind {
        TokenKind::Host => {
            if is_host_byte(next) {
                return false;
            }
            !(next == b'.' && after.is_some_and(|b| b.is_ascii_alphanumeric()))
        }
        TokenKind::Address => {
            if next.is_ascii_digit() {
                return false;
            }
            !(next == b'.' && after.is_some_and(|b| b.is_ascii_digit()))
        }
    }
}

/// Length of the match at `at`, if the pattern matches there.
fn match_at(haystack: &[u8], at: usize, pattern: &Pattern<'_>) -> Option<usize> {
    let rest = &haystack[at..];
    let needle = pattern.needle.as_bytes();

    let scheme_len = if pattern.schemes.is_empty() {
        if !left_ok(haystack, at, pattern.kind) {
            return None;
        }
        0
    } else {
        pattern
            .schemes
            .iter()
            .find(|s| starts_with_ci(rest, s.as_bytes()))?
            .len()
    };

    if !starts_with_ci(&rest[scheme_len..], needle) {
        return None;
    }
    let len = scheme_len + needle.len();
    right_ok(haystack, at + len, pattern.kind).then_some(len)
}

/// Length of the protected value at `at`, if it stands as a whole host token.
fn protected_at(haystack: &[u8], at: usize, protect: &[u8]) -> Option<usize> {
    let end = at + protect.len();
    (!protect.is_empty()
        && starts_with_ci(&haystack[at..], protect)
        && left_ok(haystack, at, TokenKind::Host)
        && right_ok(haystack, end, TokenKind::Host))
    .then_some(protect.len())
}

/// What the scanner does at one position.
enum Step {
    Skip(usize),
    Replace(usize),
    Advance,
}

fn step(haystack: &[u8], at: usize, pattern: &Pattern<'_>, protect: &[u8]) -> Step {
    let found = match_at(haystack, at, pattern);
    match (protected_at(haystack, at, protect), found) {
        (Some(kept), Some(len)) if len > kept => Step::Replace(len),
        (Some(kept), _) => Step::Skip(kept),
        (None, Some(len)) => Step::Replace(len),
        (None, None) => Step::Advance,
    }
}

/// Replace every token-bounded occurrence of `pattern` with `replacement`.
///
/// Returns `None` when nothing matched, so callers can keep the original buffer.
pub fn replace_all(
    haystack: &[u8],
    pattern: &Pattern<'_>,
    replacement: &[u8],
    protect: &[u8],
) -> Option<Vec<u8>> {
    if pattern.needle.is_empty() || haystack.len() < pattern.needle.len() {
        return None;
    }

    let mut out: Option<Vec<u8>> = None;
    let mut copied = 0;
    let mut i = 0;

    while i < haystack.len() {
        match step(haystack, i, pattern, protect) {
            Step::Skip(len) => i += len,
            Step::Replace(len) => {
                let buf = out.get_or_insert_with(|| Vec::with_capacity(haystack.len()));
                buf.extend_from_slice(&haystack[copied..i]);
                buf.extend_from_slice(replacement);
                i += len;
                copied = i;
            }
            Step::Advance => i += 1,
        }
    }

    out.map(|mut buf| {
        buf.extend_from_slice(&haystack[copied..]);
        buf
    })
}

/// Whether `pattern` occurs anywhere outside protected regions.
pub fn contains(haystack: &[u8], pattern: &Pattern<'_>, protect: &[u8]) -> bool {
    let mut i = 0;
    while i < haystack.len() {
        match step(haystack, i, pattern, protect) {
            Step::Skip(len) => i += len,
            Step::Replace(_) => return true,
            Step::Advance => i += 1,
        }
    }
    false
}
