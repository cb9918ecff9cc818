//! Static property access rewriting: `obj.key` becomes `obj["key"]`

use once_cell::sync::Lazy;
use regex::Regex;
use veil_core::TransformProfile;

use super::{Stage, StageContext};
use crate::error::Result;
use crate::lexer::{SegmentKind, is_ident_char, tokenize};

static MEMBER_ACCESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.([A-Za-z_$][A-Za-z0-9_$]*)").expect("member access pattern is valid")
});

/// Meta-properties that have no computed form
const META_OBJECTS: &[&str] = &["import", "new"];

/// `objectKeyTransform`
pub struct PropertyAccess;

impl Stage for PropertyAccess {
    fn name(&self) -> &'static str {
        "object-key-transform"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.object_key_transform
    }

    fn apply(&self, source: &str, _ctx: &mut StageContext<'_>) -> Result<String> {
        let segments = tokenize(source)?;
        let mut out = String::with_capacity(source.len() + source.len() / 8);
        for seg in &segments {
            match seg.kind {
                SegmentKind::Code => rewrite_code(seg.text, &mut out),
                _ => out.push_str(seg.text),
            }
        }
        Ok(out)
    }
}

fn rewrite_code(code: &str, out: &mut String) {
    let mut last = 0;
    for caps in MEMBER_ACCESS.captures_iter(code) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !is_rewritable_access(&code[..whole.start()]) {
            continue;
        }
        out.push_str(&code[last..whole.start()]);
        out.push_str("[\"");
        out.push_str(key.as_str());
        out.push_str("\"]");
        last = whole.end();
    }
    out.push_str(&code[last..]);
}

/// Decide from the text before a `.` whether it is a plain member access
fn is_rewritable_access(before: &str) -> bool {
    let trimmed = before.trim_end();
    let Some(prev) = trimmed.chars().last() else {
        return false;
    };
    if prev == ')' || prev == ']' {
        return true;
    }
    if !is_ident_char(prev) {
        return false;
    }
    let word_len = trimmed
        .chars()
        .rev()
        .take_while(|&c| is_ident_char(c))
        .count();
    let word = &trimmed[trimmed.len() - word_len..];
    // number literals (`1.e5`) and meta-properties (`new.target`)
    !word.starts_with(|c: char| c.is_ascii_digit()) && !META_OBJECTS.contains(&word)
}
