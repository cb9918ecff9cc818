//! String splitting: long literals become a parenthesised concatenation

use veil_core::TransformProfile;

use super::{Stage, StageContext, previous_significant, rewritable_strings};
use crate::error::Result;
use crate::lexer::{Segment, is_ident_char, tokenize};

/// Keywords that may directly precede an expression
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "void", "throw", "yield", "await", "else", "do",
    "delete", "instanceof", "new",
];

/// Punctuation after which a `(` cannot turn into a call
const EXPRESSION_PUNCT: &str = "([{,;=:?+-*%&|^!~<>";

/// `stringSplitting`
pub struct StringSplit;

impl Stage for StringSplit {
    fn name(&self) -> &'static str {
        "string-splitting"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.string_splitting
    }

    fn apply(&self, source: &str, ctx: &mut StageContext<'_>) -> Result<String> {
        let segments = tokenize(source)?;
        let rewritable = rewritable_strings(&segments);
        let chunk_len = ctx.profile.string_split_chunk_length.max(1);

        let mut out = String::with_capacity(source.len() + source.len() / 4);
        for (idx, (seg, ok)) in segments.iter().zip(rewritable).enumerate() {
            if ok && starts_expression(&segments, idx) {
                if let Some(split) = split_literal(seg.text, chunk_len) {
                    out.push_str(&split);
                    continue;
                }
            }
            out.push_str(seg.text);
        }
        Ok(out)
    }
}

/// A `(` at this position cannot be read as a call on the previous line
fn starts_expression(segments: &[Segment<'_>], idx: usize) -> bool {
    match previous_significant(segments, idx) {
        (None, _) => true,
        (Some(c), word) if is_ident_char(c) => EXPRESSION_KEYWORDS.contains(&word.as_str()),
        (Some(c), _) => EXPRESSION_PUNCT.contains(c),
    }
}

/// Split a quoted literal into `("..."+"...")` chunks of at most `chunk_len`
/// characters, never breaking an escape sequence
///
/// Returns `None` when the literal already fits.
pub fn split_literal(literal: &str, chunk_len: usize) -> Option<String> {
    let quote = literal.chars().next()?;
    let body = literal.get(1..literal.len().checked_sub(1)?)?;
    let units = literal_units(body);
    if units.len() <= chunk_len {
        return None;
    }

    let mut out = String::with_capacity(literal.len() + units.len() / chunk_len * 3 + 2);
    out.push('(');
    for (i, chunk) in units.chunks(chunk_len).enumerate() {
        if i > 0 {
            out.push('+');
        }
        out.push(quote);
        for unit in chunk {
            out.push_str(unit);
        }
        out.push(quote);
    }
    out.push(')');
    Some(out)
}

/// Break a literal body into characters, keeping each escape sequence whole
pub(crate) fn literal_units(body: &str) -> Vec<&str> {
    let mut units = Vec::with_capacity(body.len());
    let mut rest = body;
    while let Some(c) = rest.chars().next() {
        let len = if c == '\\' {
            escape_len(rest)
        } else {
            c.len_utf8()
        };
        let len = len.min(rest.len());
        units.push(&rest[..len]);
        rest = &rest[len..];
    }
    units
}

/// Byte length of the escape sequence at the start of `s` (which begins with `\`)
fn escape_len(s: &str) -> usize {
    let mut chars = s[1..].chars();
    match chars.next() {
        None => 1,
        Some('x') => 4,
        Some('u') => {
            if s[2..].starts_with('{') {
                s.find('}').map_or(s.len(), |end| end + 1)
            } else {
                6
            }
        }
        Some('\r') if s[2..].starts_with('\n') => 3,
        Some(c) => 1 + c.len_utf8(),
    }
}
