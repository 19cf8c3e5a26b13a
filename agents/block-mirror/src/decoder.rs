//! Splitting of the node's batch endpoint output into individual blocks.
//!
//! The `/blocks/seq` endpoint emits block documents back to back. Blocks are
//! large, can contain `{`/`}` inside string values and carry integers wider
//! than an `f64` mantissa, so rather than parsing the whole body at once we
//! locate object boundaries with a brace/quote scanner and parse each piece
//! on its own. Numbers are parsed with `serde_json`'s arbitrary precision
//! representation and therefore re-serialize digit for digit.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::{MirrorError, MirrorResult};

/// The JSON escape for U+0000. Postgres refuses it inside `jsonb` values.
const NUL_ESCAPE: &str = "\\u0000";

/// Remove NUL characters, both raw and as `\u0000` escapes, from a response
/// body. An escaped backslash followed by `u0000` is literal text and is kept.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if !text.contains('\0') && !text.contains(NUL_ESCAPE) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    // whether the previous character was a backslash that escapes this one
    let mut escaped = false;
    while let Some(c) = rest.chars().next() {
        if c == '\0' {
            rest = &rest[1..];
            continue;
        }
        if !escaped && rest.starts_with(NUL_ESCAPE) {
            rest = &rest[NUL_ESCAPE.len()..];
            continue;
        }
        escaped = c == '\\' && !escaped;
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// Strip one level of `[`/`]` if the body arrives wrapped in an array.
pub fn strip_array(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed)
}

/// Iterator over the raw object literals of a concatenated stream.
///
/// Purely a view over the input buffer, so it can be restarted by calling
/// [`split_blocks`] again. An unterminated trailing object ends the
/// iteration.
#[derive(Debug, Clone)]
pub struct BlockSplit<'a> {
    rest: &'a str,
}

/// Split `{..},{..},{..}` into its object literals, in order.
pub fn split_blocks(text: &str) -> BlockSplit<'_> {
    BlockSplit { rest: text }
}

impl<'a> Iterator for BlockSplit<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self
            .rest
            .trim_start_matches(|c: char| c == ',' || c.is_whitespace());
        self.rest = rest;
        if rest.is_empty() {
            return None;
        }

        let Some(end) = object_end(rest) else {
            self.rest = "";
            return None;
        };
        let (object, tail) = rest.split_at(end + 1);
        self.rest = tail;
        Some(object)
    }
}

/// Byte index of the brace that closes the first object in `s`.
///
/// The counter starts at 1, as if the scanner were already inside an
/// enclosing object, and the object is closed when it drops back to 1.
/// Braces inside string literals are ignored. All structural characters are
/// ASCII, so scanning bytes never splits a UTF-8 sequence.
fn object_end(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut opened = false;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in s.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                depth += 1;
                opened = true;
            }
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if opened && depth == 1 {
            return Some(i);
        }
    }
    None
}

/// Sanitize, split and parse a batch response body into block documents.
pub fn decode_blocks(body: &str) -> MirrorResult<Vec<Value>> {
    let clean = sanitize(body);
    split_blocks(strip_array(&clean))
        .enumerate()
        .map(|(idx, raw)| {
            serde_json::from_str::<Value>(raw).map_err(|err| {
                MirrorError::Protocol(format!("block #{idx} in batch is not valid JSON: {err}"))
            })
        })
        .collect()
}
