//! Transform stages of the built-in engine
//!
//! Each stage takes the current source text, re-lexes it, and returns the
//! rewritten text. Stages that need runtime support code (pool accessors,
//! guards, decoys) add it to the shared prelude instead of inlining it; the
//! engine inserts the prelude once all stages have run.

pub mod compact;
pub mod dead_code;
pub mod guards;
pub mod pool;
pub mod property;
pub mod split;

use veil_core::TransformProfile;

use crate::error::Result;
use crate::lexer::{Segment, SegmentKind, is_ident_char, unescape_string};
use crate::names::NameGenerator;

pub use compact::Compact;
pub use dead_code::DeadCode;
pub use guards::RuntimeGuards;
pub use pool::StringPool;
pub use property::PropertyAccess;
pub use split::StringSplit;

/// Where a prelude fragment goes relative to the others
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreludeSlot {
    /// Runtime guards run before anything else
    Guards,
    /// String pool and accessor
    Pool,
    /// Unreachable decoys
    Decoys,
}

/// State shared by the stages of one transform call
pub struct StageContext<'a> {
    /// Active profile
    pub profile: &'a TransformProfile,
    /// Fresh-name source for everything the stages introduce
    pub names: NameGenerator<'a>,
    prelude: Vec<(PreludeSlot, String)>,
}

impl<'a> StageContext<'a> {
    /// Context for one transform call
    pub fn new(profile: &'a TransformProfile, names: NameGenerator<'a>) -> Self {
        Self {
            profile,
            names,
            prelude: Vec::new(),
        }
    }

    /// Queue support code for insertion ahead of the program
    pub fn push_prelude(&mut self, slot: PreludeSlot, code: String) {
        self.prelude.push((slot, code));
    }

    /// Prelude fragments in slot order
    pub fn take_prelude(&mut self) -> Vec<String> {
        let mut prelude = std::mem::take(&mut self.prelude);
        prelude.sort_by_key(|(slot, _)| *slot);
        prelude.into_iter().map(|(_, code)| code).collect()
    }
}

/// One rewriting step
pub trait Stage {
    /// Name used in debug logs
    fn name(&self) -> &'static str;

    /// Whether the profile asks for this stage
    fn enabled(&self, profile: &TransformProfile) -> bool;

    /// Rewrite `source`
    fn apply(&self, source: &str, ctx: &mut StageContext<'_>) -> Result<String>;
}

/// Directive prologue values that must stay literal
const DIRECTIVES: &[&str] = &["use strict", "use asm"];

/// Words after which a string is a module specifier
const SPECIFIER_KEYWORDS: &[&str] = &["import", "from", "export"];

/// For each segment, whether it is a string literal that may be moved or
/// rewritten without changing what the program means
///
/// Object keys, `case` labels, module specifiers, method names and directive
/// prologues are left alone.
pub fn rewritable_strings(segments: &[Segment<'_>]) -> Vec<bool> {
    segments
        .iter()
        .enumerate()
        .map(|(idx, seg)| {
            if seg.kind != SegmentKind::Str {
                return false;
            }
            if unescape_string(seg.text).is_some_and(|v| DIRECTIVES.contains(&v.as_str())) {
                return false;
            }
            let (prev_char, prev_word) = previous_significant(segments, idx);
            let next_char = next_significant(segments, idx);

            if next_char == Some(':') {
                return false;
            }
            if SPECIFIER_KEYWORDS.contains(&prev_word.as_str()) {
                return false;
            }
            if next_char == Some('(') && matches!(prev_char, None | Some('{' | '}' | ',' | ';')) {
                return false;
            }
            true
        })
        .collect()
}

/// Last significant code character before segment `idx`, and the identifier
/// ending there (empty if that character is punctuation)
fn previous_significant(segments: &[Segment<'_>], idx: usize) -> (Option<char>, String) {
    for seg in segments[..idx].iter().rev() {
        if seg.is_comment() {
            continue;
        }
        if seg.kind != SegmentKind::Code {
            return (seg.text.chars().last(), String::new());
        }
        let trimmed = seg.text.trim_end();
        if let Some(last) = trimmed.chars().last() {
            let word: String = trimmed
                .chars()
                .rev()
                .take_while(|&c| is_ident_char(c))
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return (Some(last), word);
        }
    }
    (None, String::new())
}

/// First significant code character after segment `idx`
fn next_significant(segments: &[Segment<'_>], idx: usize) -> Option<char> {
    for seg in &segments[idx + 1..] {
        if seg.is_comment() {
            continue;
        }
        if let Some(c) = seg.text.trim_start().chars().next() {
            return Some(c);
        }
    }
    None
}

/// Append `code` to `out`, separating it from a preceding identifier
pub(crate) fn push_token(out: &mut String, code: &str) {
    let needs_space = out.chars().last().is_some_and(is_ident_char)
        && code.chars().next().is_some_and(is_ident_char);
    if needs_space {
        out.push(' ');
    }
    out.push_str(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn rewritable(src: &str) -> Vec<&str> {
        let segs = tokenize(src).unwrap();
        rewritable_strings(&segs)
            .into_iter()
            .zip(&segs)
            .filter_map(|(ok, seg)| ok.then_some(seg.text))
            .collect()
    }

    #[test]
    fn test_plain_strings_rewritable() {
        assert_eq!(
            rewritable("var a = 'x'; f(\"y\", 'z');"),
            vec!["'x'", "\"y\"", "'z'"]
        );
    }

    #[test]
    fn test_object_keys_and_case_labels_kept() {
        assert_eq!(
            rewritable("var o = {'k': 'v'}; switch (a) { case 'c': break; }"),
            vec!["'v'"]
        );
    }

    #[test]
    fn test_module_specifiers_kept() {
        assert!(rewritable("import x from 'mod'; import 'side'; export * from \"re\";").is_empty());
    }

    #[test]
    fn test_directive_kept() {
        assert_eq!(rewritable("'use strict';\nvar a = 'b';"), vec!["'b'"]);
    }

    #[test]
    fn test_method_name_kept() {
        assert_eq!(rewritable("class A { 'm'() { return 'r'; } }"), vec!["'r'"]);
    }

    #[test]
    fn test_comment_between_string_and_colon() {
        assert!(rewritable("var o = {'k' /* key */ : 1};").is_empty());
    }

    #[test]
    fn test_push_token_spacing() {
        let mut out = String::from("return");
        push_token(&mut out, "_0xabc(1)");
        assert_eq!(out, "return _0xabc(1)");

        let mut out = String::from("f(");
        push_token(&mut out, "_0xabc(1)");
        assert_eq!(out, "f(_0xabc(1)");
    }
}
