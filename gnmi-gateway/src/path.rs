//! Conversion between structured gNMI paths and flat path strings.
//!
//! Two string dialects are in play:
//!
//! - protocol dialect: `/ietf-interfaces:interfaces/interface[name='eth0']`,
//!   the module prefix is separated from the first node by a colon
//! - store dialect: `/ietf-interfaces/interfaces/interface[name='eth0']`,
//!   purely slash-separated, as the datastore addresses its nodes
//!
//! Moving between dialects only rewrites the separator right after the first
//! segment. Paths whose module prefix spans more than one segment are not
//! rewritten correctly; see the tests pinning that behavior.

use std::collections::BTreeMap;

use crate::error::{GatewayError, Result};
use crate::gnmi::{Path, PathElem};

/// Render a path as a string: `/name[k='v']/name...`.
///
/// The empty (root) path renders as the empty string so that it can be
/// concatenated with [`join`].
pub fn encode(path: &Path) -> Result<String> {
    let mut out = String::new();

    for elem in &path.elem {
        if elem.name.is_empty() {
            return Err(GatewayError::decode("path element with empty name"));
        }
        out.push('/');
        out.push_str(&elem.name);
        for (key, value) in &elem.key {
            push_predicate(&mut out, key, value);
        }
    }

    Ok(out)
}

fn push_predicate(out: &mut String, key: &str, value: &str) {
    // Prefer the quote the value does not contain; backslash-escape the rest.
    let quote = if value.contains('\'') { '"' } else { '\'' };
    out.push('[');
    out.push_str(key);
    out.push('=');
    out.push(quote);
    for c in value.chars() {
        if c == quote || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(quote);
    out.push(']');
}

/// Parse a path string into its elements and key predicates.
///
/// Accepts `[k='v']`, `[k="v"]` and unquoted `[k=v]` predicates. Quoted
/// values may contain `/`, `[` and `]`; inside them `\` escapes the next
/// character. `""` and `"/"` parse to the root path.
pub fn decode(input: &str) -> Result<Path> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut pos = usize::from(input.starts_with('/'));
    let mut elems = Vec::new();

    while pos < len {
        let start = pos;
        while pos < len && bytes[pos] != b'/' && bytes[pos] != b'[' {
            if bytes[pos] == b']' {
                return Err(GatewayError::decode(format!(
                    "unexpected ']' at offset {} in '{}'",
                    pos, input
                )));
            }
            pos += 1;
        }

        let name = &input[start..pos];
        if name.is_empty() {
            return Err(GatewayError::decode(format!(
                "empty node name at offset {} in '{}'",
                start, input
            )));
        }

        let mut key = BTreeMap::new();
        while pos < len && bytes[pos] == b'[' {
            let (key_name, value, next) = parse_predicate(input, pos + 1)?;
            if key.insert(key_name.to_string(), value).is_some() {
                return Err(GatewayError::decode(format!(
                    "duplicate key '{}' on node '{}'",
                    key_name, name
                )));
            }
            pos = next;
        }

        elems.push(PathElem {
            name: name.to_string(),
            key,
        });

        if pos < len {
            if bytes[pos] != b'/' {
                return Err(GatewayError::decode(format!(
                    "expected '/' at offset {} in '{}'",
                    pos, input
                )));
            }
            pos += 1;
        }
    }

    Ok(Path {
        elem: elems,
        ..Default::default()
    })
}

/// Parse one `key=value]` predicate body starting just after `[`.
///
/// Returns the key, the value and the offset following the closing bracket.
fn parse_predicate(input: &str, start: usize) -> Result<(&str, String, usize)> {
    let bytes = input.as_bytes();
    let rest = &input[start..];

    let eq = rest
        .find('=')
        .ok_or_else(|| GatewayError::decode(format!("missing '=' in predicate of '{}'", input)))?;
    let key = rest[..eq].trim();
    if key.is_empty() || key.contains(['[', ']', '/']) {
        return Err(GatewayError::decode(format!(
            "malformed key in predicate at offset {} of '{}'",
            start, input
        )));
    }

    let mut pos = start + eq + 1;
    let value = match bytes.get(pos) {
        Some(&quote) if quote == b'\'' || quote == b'"' => {
            pos += 1;
            let (value, len) = unquote(&input[pos..], quote as char).ok_or_else(|| {
                GatewayError::decode(format!("unterminated quoted value in '{}'", input))
            })?;
            pos += len;
            value
        }
        _ => {
            let close = input[pos..].find(']').ok_or_else(|| {
                GatewayError::decode(format!("unterminated predicate in '{}'", input))
            })?;
            let value = input[pos..pos + close].trim().to_string();
            pos += close;
            value
        }
    };

    if bytes.get(pos) != Some(&b']') {
        return Err(GatewayError::decode(format!(
            "expected ']' at offset {} in '{}'",
            pos, input
        )));
    }

    Ok((key, value, pos + 1))
}

/// Unescape a quoted value up to its closing `quote`.
///
/// Returns the value and the number of bytes consumed, closing quote
/// included, or `None` if the quote is never closed.
fn unquote(rest: &str, quote: char) -> Option<(String, usize)> {
    let mut value = String::new();
    let mut chars = rest.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            c if c == quote => return Some((value, idx + 1)),
            c => value.push(c),
        }
    }
    None
}

/// Concatenate an encoded prefix and an encoded path.
///
/// Both are already slash-led (or empty), so this is plain concatenation,
/// except that two empty inputs address the root, `/`.
pub fn join(prefix: &str, path: &str) -> String {
    if prefix.is_empty() && path.is_empty() {
        return "/".to_string();
    }
    format!("{}{}", prefix, path)
}

/// Rewrite a store-dialect path into the protocol dialect.
///
/// Replaces the `/` that ends the first segment with `:`. A first segment
/// carrying key predicates has no module boundary and is left as is, as is
/// every `/` inside a key value.
pub fn to_protocol_dialect(store: &str) -> String {
    match first_boundary(store, ['/', '[']) {
        Some(idx) if store.as_bytes()[idx] == b'/' => replace_at(store, idx, ':'),
        _ => store.to_string(),
    }
}

/// Rewrite a protocol-dialect path into the store dialect.
///
/// Replaces the `:` that separates the module prefix from the first node,
/// i.e. a colon inside the first segment before any `/` or `[`. Colons
/// further along, such as inside key values, are left untouched.
pub fn to_store_dialect(protocol: &str) -> String {
    match first_boundary(protocol, [':', '/', '[']) {
        Some(idx) if protocol.as_bytes()[idx] == b':' => replace_at(protocol, idx, '/'),
        _ => protocol.to_string(),
    }
}

/// Offset of the first of `stops` after the leading slash.
fn first_boundary<const N: usize>(path: &str, stops: [char; N]) -> Option<usize> {
    let offset = usize::from(path.starts_with('/'));
    path[offset..].find(stops).map(|idx| idx + offset)
}

/// Copy of `path` with the ASCII separator at `idx` swapped for `with`.
fn replace_at(path: &str, idx: usize, with: char) -> String {
    let mut out = String::with_capacity(path.len());
    out.push_str(&path[..idx]);
    out.push(with);
    out.push_str(&path[idx + 1..]);
    out
}

/// Compose the store-dialect datastore path for `prefix + path`.
pub fn store_path(prefix: Option<&Path>, path: Option<&Path>) -> Result<String> {
    let prefix = prefix.map(encode).transpose()?.unwrap_or_default();
    let path = path.map(encode).transpose()?.unwrap_or_default();
    Ok(to_store_dialect(&join(&prefix, &path)))
}

/// Parse a store-dialect datastore path into a protocol-dialect [`Path`].
pub fn protocol_path(store: &str) -> Result<Path> {
    decode(&to_protocol_dialect(store))
}
