//! JavaScript source lexer
//!
//! Splits source into coarse segments: code, string literals, template
//! literals, regular expression literals and comments. That is enough for the
//! built-in stages, which only ever rewrite strings, property accesses and
//! whitespace, and it lets malformed input be rejected before anything is
//! rewritten.

use std::fmt;

/// Kind of a source segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Anything that is not one of the literal or comment kinds
    Code,
    /// `'...'` or `"..."`
    Str,
    /// `` `...` ``, including any `${}` substitutions
    Template,
    /// `/.../flags`
    Regex,
    /// `// ...` (without the terminating newline)
    LineComment,
    /// `/* ... */`
    BlockComment,
}

/// A contiguous slice of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Kind
    pub kind: SegmentKind,
    /// Exact source text
    pub text: &'a str,
    /// 1-based line the segment starts on
    pub line: usize,
}

impl Segment<'_> {
    /// Whether this segment is a comment
    pub fn is_comment(&self) -> bool {
        matches!(
            self.kind,
            SegmentKind::LineComment | SegmentKind::BlockComment
        )
    }
}

/// Malformed source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// What went wrong
    pub message: String,
    /// 1-based line
    pub line: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.message, self.line)
    }
}

impl std::error::Error for LexError {}

/// Keywords after which a `/` starts a regular expression
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "instanceof",
    "yield",
    "await",
];

/// Split `src` into segments, checking literal termination and bracket balance
pub fn tokenize(src: &str) -> Result<Vec<Segment<'_>>, LexError> {
    Lexer::new(src).run()
}

/// Is `c` valid inside an identifier (ASCII subset)
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    segments: Vec<Segment<'a>>,
    /// Open brackets with their line; braces also record whether they open a block
    brackets: Vec<(u8, usize, bool)>,
    code_start: usize,
    code_line: usize,
    /// Last significant code character and the word ending there, if any
    last_sig: Option<u8>,
    /// Significant character before `last_sig`
    prev_sig: Option<u8>,
    last_word: String,
    in_word: bool,
    /// Length of the latest run of one repeated operator character
    op_run: usize,
    /// Whether that run can still grow (no whitespace or word since)
    in_op: bool,
    /// Whether a value ended just before that run started
    value_before_op: bool,
    /// Whether the most recent `}` closed a block rather than an object
    closed_block: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            segments: Vec::new(),
            brackets: Vec::new(),
            code_start: 0,
            code_line: 1,
            last_sig: None,
            prev_sig: None,
            last_word: String::new(),
            in_word: false,
            op_run: 0,
            in_op: false,
            value_before_op: false,
            closed_block: false,
        }
    }

    fn error(&self, message: impl Into<String>, line: usize) -> LexError {
        LexError {
            message: message.into(),
            line,
        }
    }

    fn run(mut self) -> Result<Vec<Segment<'a>>, LexError> {
        // A leading hashbang is kept as a line comment
        if self.src.starts_with("#!") {
            let end = self.src.find('\n').unwrap_or(self.src.len());
            self.segments.push(Segment {
                kind: SegmentKind::LineComment,
                text: &self.src[..end],
                line: 1,
            });
            self.pos = end;
            self.code_start = end;
        }

        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            match b {
                b'\'' | b'"' => {
                    let start = self.begin_literal();
                    self.scan_string(b)?;
                    self.end_literal(SegmentKind::Str, start);
                }
                b'`' => {
                    let start = self.begin_literal();
                    self.scan_template()?;
                    self.end_literal(SegmentKind::Template, start);
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    let start = self.begin_literal();
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                    self.push_comment(SegmentKind::LineComment, start);
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    let start = self.begin_literal();
                    let line = self.line;
                    self.pos += 2;
                    loop {
                        match self.bytes.get(self.pos) {
                            None => return Err(self.error("unterminated block comment", line)),
                            Some(b'*') if self.peek(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(b'\n') => {
                                self.line += 1;
                                self.pos += 1;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                    self.push_comment(SegmentKind::BlockComment, start);
                }
                b'/' if self.regex_allowed() => {
                    let start = self.begin_literal();
                    self.scan_regex()?;
                    self.end_literal(SegmentKind::Regex, start);
                }
                _ => self.code_byte(b)?,
            }
        }

        self.flush_code(self.pos);
        if let Some(&(open, line, _)) = self.brackets.last() {
            return Err(self.error(format!("unclosed '{}'", open as char), line));
        }
        Ok(self.segments)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn code_byte(&mut self, b: u8) -> Result<(), LexError> {
        let ends_value = self.ends_value();
        match b {
            b'(' | b'[' => self.brackets.push((b, self.line, false)),
            b'{' => {
                let block = self.brace_opens_block();
                self.brackets.push((b, self.line, block));
            }
            b')' | b']' | b'}' => {
                let expected = match b {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match self.brackets.pop() {
                    Some((open, _, block)) if open == expected => self.closed_block = block,
                    Some((open, line, _)) => {
                        return Err(self.error(
                            format!(
                                "'{}' does not match '{}' opened at line {}",
                                b as char, open as char, line
                            ),
                            self.line,
                        ));
                    }
                    None => {
                        return Err(self.error(format!("unexpected '{}'", b as char), self.line));
                    }
                }
            }
            b'\n' => self.line += 1,
            _ => {}
        }

        if b.is_ascii_whitespace() {
            self.in_word = false;
            self.in_op = false;
        } else if is_ident_char(b as char) {
            if !self.in_word {
                self.last_word.clear();
                self.in_word = true;
            }
            self.last_word.push(b as char);
            self.op_run = 0;
            self.in_op = false;
            self.prev_sig = self.last_sig;
            self.last_sig = Some(b);
        } else {
            if self.in_op && self.last_sig == Some(b) {
                self.op_run += 1;
            } else {
                self.op_run = 1;
                self.value_before_op = ends_value;
            }
            self.in_op = true;
            self.in_word = false;
            self.last_word.clear();
            self.prev_sig = self.last_sig;
            self.last_sig = Some(b);
        }
        self.pos += 1;
        Ok(())
    }

    /// Does the code so far end with a complete value (so `/` divides)
    fn ends_value(&self) -> bool {
        match self.last_sig {
            None => false,
            Some(c) if is_ident_char(c as char) => {
                !REGEX_PREFIX_KEYWORDS.contains(&self.last_word.as_str())
            }
            Some(b')' | b']') => true,
            Some(b'}') => !self.closed_block,
            // postfix increment or decrement
            Some(b'+' | b'-') => self.op_run == 2 && self.value_before_op,
            Some(_) => false,
        }
    }

    /// Would a `{` here open a block rather than an object literal
    fn brace_opens_block(&self) -> bool {
        match self.last_sig {
            None | Some(b')' | b';' | b'{' | b'}') => true,
            Some(b'>') => self.prev_sig == Some(b'='),
            Some(c) if is_ident_char(c as char) => {
                matches!(self.last_word.as_str(), "do" | "else")
                    || !REGEX_PREFIX_KEYWORDS.contains(&self.last_word.as_str())
            }
            Some(_) => false,
        }
    }

    fn regex_allowed(&self) -> bool {
        !self.ends_value()
    }

    fn flush_code(&mut self, end: usize) {
        if end > self.code_start {
            self.segments.push(Segment {
                kind: SegmentKind::Code,
                text: &self.src[self.code_start..end],
                line: self.code_line,
            });
        }
    }

    fn begin_literal(&mut self) -> (usize, usize) {
        self.flush_code(self.pos);
        (self.pos, self.line)
    }

    fn end_literal(&mut self, kind: SegmentKind, (start, line): (usize, usize)) {
        self.segments.push(Segment {
            kind,
            text: &self.src[start..self.pos],
            line,
        });
        // A literal is a value: a following `/` divides
        self.last_sig = Some(b')');
        self.prev_sig = None;
        self.last_word.clear();
        self.in_word = false;
        self.op_run = 0;
        self.in_op = false;
        self.code_start = self.pos;
        self.code_line = self.line;
    }

    fn push_comment(&mut self, kind: SegmentKind, (start, line): (usize, usize)) {
        self.segments.push(Segment {
            kind,
            text: &self.src[start..self.pos],
            line,
        });
        self.in_word = false;
        self.in_op = false;
        self.code_start = self.pos;
        self.code_line = self.line;
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), LexError> {
        let line = self.line;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => {
                    return Err(self.error("unterminated string literal", line));
                }
                Some(b'\\') => {
                    if self.peek(1) == Some(b'\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some(&c) if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_template(&mut self) -> Result<(), LexError> {
        let line = self.line;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(self.error("unterminated template literal", line)),
                Some(b'\\') => {
                    if self.peek(1) == Some(b'\n') {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.scan_substitution()?;
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Skip a `${ ... }` body up to and including its closing brace
    fn scan_substitution(&mut self) -> Result<(), LexError> {
        let line = self.line;
        let mut depth = 0usize;
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(self.error("unterminated template substitution", line)),
                Some(&q @ (b'\'' | b'"')) => self.scan_string(q)?,
                Some(b'`') => self.scan_template()?,
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') if depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'}') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(), LexError> {
        let line = self.line;
        let mut in_class = false;
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => {
                    return Err(self.error("unterminated regular expression", line));
                }
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    while self
                        .bytes
                        .get(self.pos)
                        .is_some_and(|c| c.is_ascii_alphabetic())
                    {
                        self.pos += 1;
                    }
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

/// Decode the value of a quoted string literal (including its quotes)
///
/// Returns `None` when the literal holds something a Rust `String` cannot,
/// such as a lone surrogate.
pub fn unescape_string(literal: &str) -> Option<String> {
    let inner = literal.get(1..literal.len().checked_sub(1)?)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(char::is_ascii_digit) => out.push('\0'),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            'u' => {
                let code = if chars.peek() == Some(&'{') {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                    u32::from_str_radix(&hex, 16).ok()?
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    let unit = u32::from_str_radix(&hex, 16).ok()?;
                    if (0xD800..0xDC00).contains(&unit) {
                        // high surrogate: must be followed by `\uDC00`-`\uDFFF`
                        if chars.next()? != '\\' || chars.next()? != 'u' {
                            return None;
                        }
                        let low_hex: String = chars.by_ref().take(4).collect();
                        let low = u32::from_str_radix(&low_hex, 16).ok()?;
                        if !(0xDC00..0xE000).contains(&low) {
                            return None;
                        }
                        0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00)
                    } else {
                        unit
                    }
                };
                out.push(char::from_u32(code)?);
            }
            // legacy octal escapes are rare in generated bundles
            d if d.is_ascii_digit() => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(src: &str) -> Vec<SegmentKind> {
        tokenize(src).unwrap().iter().map(|s| s.kind).collect()
    }

    #[test]
    fn test_segments_cover_source() {
        let src = "var a = 'x'; // note\nvar b = `t${a}`; /* c */ var r = /ab+c/g;";
        let joined: String = tokenize(src).unwrap().iter().map(|s| s.text).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn test_basic_kinds() {
        use SegmentKind::*;
        assert_eq!(
            kinds("a = \"s\"; // c\n/* b */x"),
            vec![Code, Str, Code, LineComment, Code, BlockComment, Code]
        );
    }

    #[test]
    fn test_division_vs_regex() {
        use SegmentKind::*;
        assert_eq!(kinds("a = b / c / d;"), vec![Code]);
        assert_eq!(kinds("x = (a) / 2;"), vec![Code]);
        assert_eq!(kinds("x = /[/]/.test(s);"), vec![Code, Regex, Code]);
        assert_eq!(kinds("return /x/g"), vec![Code, Regex]);
        assert_eq!(kinds("f('a') / 2"), vec![Code, Str, Code]);
        assert_eq!(kinds("'a' / 2"), vec![Str, Code]);
        assert_eq!(kinds("typeof /x/"), vec![Code, Regex]);
    }

    #[rstest]
    #[case("var h = i++ / 2;")]
    #[case("var h = i-- / 2 / 3;")]
    #[case("var h = a[0]++ / 2;")]
    #[case("var o = {} / 2;")]
    #[case("x = { a: 1 } / 2;")]
    fn test_division_after_value(#[case] src: &str) {
        assert_eq!(kinds(src), vec![SegmentKind::Code], "{src}");
    }

    #[rstest]
    #[case("if (true) {}\n/[(]/.test('(')")]
    #[case("function f() {}\n/x/.test(s);")]
    #[case("var f = () => {}\n/y/.exec(s);")]
    #[case("x = a + +/z/.source.length;")]
    #[case("x = a++ + /z/.source.length;")]
    #[case("do {} while (/w/.test(s));")]
    fn test_regex_after_operator_or_block(#[case] src: &str) {
        let segs = tokenize(src).unwrap();
        assert!(
            segs.iter().any(|s| s.kind == SegmentKind::Regex),
            "{src}: {segs:?}"
        );
    }

    #[test]
    fn test_regex_with_quote_is_not_string() {
        use SegmentKind::*;
        assert_eq!(
            kinds("s.replace(/'/g, \"\\\\'\")"),
            vec![Code, Regex, Code, Str, Code]
        );
    }

    #[test]
    fn test_template_with_nested_braces_and_strings() {
        let src = "const t = `a ${ {k: '}'}.k } b ${`in${1}`}`;";
        let segs = tokenize(src).unwrap();
        assert_eq!(segs[1].kind, SegmentKind::Template);
        assert_eq!(segs[1].text, "`a ${ {k: '}'}.k } b ${`in${1}`}`");
    }

    #[test]
    fn test_hashbang_kept() {
        let segs = tokenize("#!/usr/bin/env node\nrun();").unwrap();
        assert_eq!(segs[0].kind, SegmentKind::LineComment);
        assert_eq!(segs[0].text, "#!/usr/bin/env node");
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("var a = 1;\nvar b = 'oops;\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_unterminated_comment_and_template() {
        assert!(tokenize("/* never closed").is_err());
        assert!(tokenize("`open ${ x").is_err());
    }

    #[test]
    fn test_bracket_mismatch() {
        let err = tokenize("function f() { return [1, 2); }").unwrap_err();
        assert!(err.message.contains("does not match"));
        assert!(tokenize("f(").is_err());
        assert!(tokenize("}").is_err());
    }

    #[test]
    fn test_brackets_inside_literals_ignored() {
        assert!(tokenize("var s = '(['; var r = /[)]/; var t = `}`;").is_ok());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape_string(r#""a\nb""#).as_deref(), Some("a\nb"));
        assert_eq!(unescape_string(r#"'it\'s'"#).as_deref(), Some("it's"));
        assert_eq!(unescape_string(r#""\x41B\u{43}""#).as_deref(), Some("ABC"));
        assert_eq!(
            unescape_string(r#""\uD83D\uDE00""#).as_deref(),
            Some("\u{1F600}")
        );
        assert_eq!(unescape_string(r#""\uD83D""#), None);
        assert_eq!(unescape_string(r#""\q""#).as_deref(), Some("q"));
    }
}
