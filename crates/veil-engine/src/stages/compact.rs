//! Whitespace and comment compaction
//!
//! Comments are dropped except a leading hashbang and license comments
//! (`/*! ... */`, or any comment mentioning `@license` or `@preserve`).
//! Whitespace runs shrink to nothing, a single space where two tokens would
//! otherwise fuse, or a single newline when the run crossed a line break, so
//! automatic semicolon insertion behaves as before.

use veil_core::TransformProfile;

use super::{Stage, StageContext};
use crate::error::Result;
use crate::lexer::{Segment, SegmentKind, is_ident_char, tokenize};

/// `compact`
pub struct Compact;

impl Stage for Compact {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.compact
    }

    fn apply(&self, source: &str, _ctx: &mut StageContext<'_>) -> Result<String> {
        let segments = tokenize(source)?;
        let mut writer = Writer::with_capacity(source.len());

        for (idx, seg) in segments.iter().enumerate() {
            match seg.kind {
                SegmentKind::Code => {
                    for c in seg.text.chars() {
                        if is_line_terminator(c) {
                            writer.space(true);
                        } else if c.is_whitespace() || c == '\u{feff}' {
                            writer.space(false);
                        } else {
                            writer.token(c.encode_utf8(&mut [0; 4]));
                        }
                    }
                }
                SegmentKind::Str | SegmentKind::Template | SegmentKind::Regex => {
                    writer.token(seg.text)
                }
                SegmentKind::LineComment => {
                    if is_preserved(seg, idx) {
                        writer.token(seg.text);
                        writer.space(true);
                    } else {
                        writer.space(false);
                    }
                }
                SegmentKind::BlockComment => {
                    if is_preserved(seg, idx) {
                        writer.token(seg.text);
                    } else {
                        writer.space(seg.text.chars().any(is_line_terminator));
                    }
                }
            }
        }
        Ok(writer.out)
    }
}

fn is_preserved(seg: &Segment<'_>, idx: usize) -> bool {
    (idx == 0 && seg.text.starts_with("#!"))
        || seg.text.starts_with("/*!")
        || seg.text.contains("@license")
        || seg.text.contains("@preserve")
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Output buffer that defers whitespace until it knows the next token
struct Writer {
    out: String,
    /// Pending whitespace; `true` once it has crossed a line break
    pending: Option<bool>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            pending: None,
        }
    }

    fn space(&mut self, newline: bool) {
        self.pending = Some(self.pending.unwrap_or(false) || newline);
    }

    fn token(&mut self, text: &str) {
        if let Some(newline) = self.pending.take() {
            let prev = self.out.chars().last();
            let next = text.chars().next();
            match (prev, next) {
                (None, _) => {}
                (Some(_), _) if newline => self.out.push('\n'),
                (Some(p), Some(n)) if needs_space(p, n) => self.out.push(' '),
                _ => {}
            }
        }
        self.out.push_str(text);
    }
}

/// Would `prev` and `next` read differently if written side by side
fn needs_space(prev: char, next: char) -> bool {
    let word = |c: char| is_ident_char(c) || !c.is_ascii();
    (word(prev) && word(next))
        || (prev == next && (prev == '+' || prev == '-'))
        || (prev == '/' && (next == '/' || next == '*' || word(next)))
        || (prev.is_ascii_digit() && next == '.')
        || (prev == '<' && next == '!')
        || (prev == '-' && next == '>')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::{NameGenerator, seeded_rng};
    use rstest::rstest;

    fn run(src: &str) -> String {
        let profile = TransformProfile {
            compact: true,
            ..Default::default()
        };
        let names = NameGenerator::new(
            profile.identifier_strategy,
            src,
            seeded_rng(src, "test"),
        );
        let mut ctx = StageContext::new(&profile, names);
        Compact.apply(src, &mut ctx).unwrap()
    }

    #[rstest]
    #[case("var  a  =  1 ;", "var a=1;")]
    #[case("function f ( a , b ) { return a + b ; }", "function f(a,b){return a+b;}")]
    #[case("a + +b; c - -d;", "a+ +b;c- -d;")]
    #[case("x = a / b / c;", "x=a/b/c;")]
    #[case("x = a / /re/.source;", "x=a/ /re/.source;")]
    #[case("ok = /a/ in m;", "ok=/a/ in m;")]
    #[case("n = 1 .toString();", "n=1 .toString();")]
    #[case("return 'x' ;", "return'x';")]
    #[case("var s = 'keep   this';", "var s='keep   this';")]
    #[case("var r = /a  b/g ;", "var r=/a  b/g;")]
    #[case("héllo  wörld", "héllo wörld")]
    fn test_whitespace(#[case] src: &str, #[case] expected: &str) {
        assert_eq!(run(src), expected);
    }

    #[test]
    fn test_line_breaks_collapse_to_one() {
        assert_eq!(run("a = 1\n\n\n   b = 2\n"), "a=1\nb=2");
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(run("a = 1; // note\nb = 2; /* inline */ c = 3;"), "a=1;\nb=2;c=3;");
        assert_eq!(run("a/**/b"), "a b");
        // a multi-line comment still separates statements
        assert_eq!(run("a = 1 /*\n*/ b = 2"), "a=1\nb=2");
    }

    #[test]
    fn test_license_and_hashbang_kept() {
        let src = "#!/usr/bin/env node\n/*! lib v1 | MIT */\n/* @license Apache-2.0 */\nrun();";
        assert_eq!(
            run(src),
            "#!/usr/bin/env node\n/*! lib v1 | MIT */\n/* @license Apache-2.0 */\nrun();"
        );
    }

    #[test]
    fn test_idempotent() {
        let once = run("if (a) {\n  b ++ ;\n} // done\nvar c = d - -e;");
        assert_eq!(run(&once), once);
    }
}
