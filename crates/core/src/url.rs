//! URL canonicalization shared by the rule builder and the resolution engine.
//!
//! Plain redirects are looked up by the canonical form of their source path,
//! so the same function must be applied on the write path (when a rule is
//! saved) and on the read path (for every inbound request).

use std::collections::BTreeSet;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes left untouched when encoding a path: the RFC 3986 unreserved marks
/// plus the reserved characters that are kept literally in stored paths.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/')
    .remove(b':')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b',')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b'?');

/// Unordered key/value view of a query string.
pub type QueryParams = BTreeSet<(String, String)>;

// ---------------------------------------------------------------------------
// Splitting helpers
// ---------------------------------------------------------------------------

/// Return the part after `scheme://` when `url` starts with a URL scheme.
fn after_scheme(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
    valid.then_some(rest)
}

/// The `host/path` part of `url` when it names a host, either with a scheme
/// or protocol-relative (`//host/path`).
fn after_authority_marker(url: &str) -> Option<&str> {
    after_scheme(url).or_else(|| url.strip_prefix("//"))
}

/// Whether `url` carries its own host (`scheme://` or `//`).
pub fn is_absolute(url: &str) -> bool {
    after_authority_marker(url).is_some()
}

/// Path component of the home URL without its trailing slash (`""` at the
/// domain root).
fn home_path(home_url: &str) -> &str {
    let Some(rest) = after_scheme(home_url) else {
        return "";
    };
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    rest.find('/')
        .map(|i| rest[i..].trim_end_matches('/'))
        .unwrap_or_default()
}

/// `tail` when `value` starts with `prefix` (ASCII case-insensitive) on a
/// path boundary.
fn strip_prefix_at_boundary<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() < prefix.len() || !value.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, tail) = value.split_at(prefix.len());
    (head.eq_ignore_ascii_case(prefix) && (tail.is_empty() || tail.starts_with(['/', '?', '#'])))
        .then_some(tail)
}

/// Strip the site's home URL from the front of `url`.
///
/// Absolute and protocol-relative URLs lose the home host and path; the
/// comparison ignores the scheme and ASCII case. Site-relative URLs lose the
/// home URL's path when the site lives in a subdirectory. Anything else,
/// including URLs on other hosts, is returned unchanged.
pub fn strip_home<'a>(url: &'a str, home_url: &str) -> &'a str {
    match after_authority_marker(url) {
        Some(rest) => {
            let Some(home) = after_scheme(home_url) else {
                return url;
            };
            let home = home.trim_end_matches('/');
            if home.is_empty() {
                return url;
            }
            strip_prefix_at_boundary(rest, home).unwrap_or(url)
        }
        None => {
            let path = home_path(home_url);
            if path.is_empty() {
                return url;
            }
            strip_prefix_at_boundary(url, path).unwrap_or(url)
        }
    }
}

/// Split `url` into its path and optional query string, dropping any fragment.
pub fn split_query(url: &str) -> (&str, Option<&str>) {
    let without_fragment = url.split('#').next().unwrap_or_default();
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

// ---------------------------------------------------------------------------
// Path canonicalization
// ---------------------------------------------------------------------------

/// Percent-encode `input`, keeping existing well-formed `%XX` escapes intact.
fn encode_preserving_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let is_escape = bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if is_escape {
            out.extend(utf8_percent_encode(&input[start..i], PATH_ENCODE_SET));
            out.push_str(&input[i..i + 3]);
            i += 3;
            start = i;
        } else {
            i += 1;
        }
    }
    out.extend(utf8_percent_encode(&input[start..], PATH_ENCODE_SET));
    out
}

/// Canonical matching key for a URL or path.
///
/// Strips the home URL, drops query and fragment, lowercases, percent-encodes
/// everything outside the allow-list (hex digits in lowercase), removes
/// trailing slashes and forces a single leading slash. Idempotent.
pub fn normalize_path(url: &str, home_url: &str) -> String {
    let relative = strip_home(url.trim(), home_url);
    let (path, _) = split_query(relative);
    let encoded = encode_preserving_escapes(&path.to_lowercase()).to_ascii_lowercase();
    format!("/{}", encoded.trim_matches('/'))
}

/// Canonical stored form of a literal destination.
///
/// Destinations on the site's own host become relative; external URLs are
/// kept verbatim. Case and query strings are preserved since the target
/// server may be case-sensitive.
pub fn canonical_destination(url: &str, home_url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let relative = strip_home(trimmed, home_url);
    if is_absolute(relative) {
        return relative.to_string();
    }
    format!("/{}", relative.trim_start_matches('/'))
}

/// The string regex sources are tested against: the request URL relative to
/// the home URL, without its leading slash, query string included.
pub fn regex_subject(url: &str, home_url: &str) -> String {
    let relative = strip_home(url.trim(), home_url);
    let without_fragment = relative.split('#').next().unwrap_or_default();
    without_fragment.trim_start_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Parse a raw query string into an unordered set of decoded pairs.
///
/// A key without `=` gets an empty value; empty segments are skipped.
pub fn parse_query(query: &str) -> QueryParams {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(segment), String::new()),
        })
        .collect()
}

/// Query parameters carried by a full URL (empty when it has no query).
pub fn query_params(url: &str) -> QueryParams {
    split_query(url).1.map(parse_query).unwrap_or_default()
}

/// Whether `destination` points back at the request described by `current`.
///
/// Only on-site destinations can loop; both sides are compared by canonical
/// path and query parameter set.
pub fn is_same_target(destination: &str, current: &str, home_url: &str) -> bool {
    let destination = strip_home(destination.trim(), home_url);
    if is_absolute(destination) {
        return false;
    }
    normalize_path(destination, home_url) == normalize_path(current, home_url)
        && query_params(destination) == query_params(current)
}
