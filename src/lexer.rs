//! Template lexer
//!
//! Scans normalized template text left to right, one character at a time,
//! splitting it into literal markup spans and embedded code spans. The state
//! machine guarantees *containment*: an open or close delimiter occurring
//! inside a quoted string or a comment within a code block never switches
//! states, so template authors can write the delimiter characters freely in
//! embedded code.
//!
//! Span Boundaries
//!
//!     Markup is split at every newline so each literal span covers at most
//!     one source line (including its trailing `\n`). Code spans cover a whole
//!     code block, except that comments are cut out of them: a block with an
//!     embedded comment produces several code spans, all but the first marked
//!     as continuations. The code generator uses the continuation flag to know
//!     where it may safely interleave line-marker statements.
//!
//! Line Accounting
//!
//!     Every span records the 1-indexed line it starts on. Newlines skipped by
//!     the lexer (inside comments, or the single newline consumed after a
//!     close delimiter) still advance the line counter, which is how the
//!     generator keeps the generated chunk line-for-line aligned with the
//!     template.
//!
//! Comment Syntax vs. Lua
//!
//!     The comment states recognize `/*..*/` and `//..` only. The evaluator
//!     is Lua 5.4, where `//` is the floor-division operator, so an
//!     expression like `<?= 7 // 2 ?>` lexes everything after `//` as a
//!     line comment; parenthesize or avoid the operator in templates.
//!     Conversely Lua's own `--` comments are not comments here: a close
//!     delimiter inside `-- ... ?>` ends the code block. Both interactions
//!     are pinned by tests below.

use std::fmt;

/// The configured delimiter pair plus the expression-shorthand marker.
///
/// Recognized at engine construction time; changing them changes tokenization
/// of all subsequent compiles.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
    pub shorthand: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            open: "<?".to_string(),
            close: "?>".to_string(),
            shorthand: '=',
        }
    }
}

impl Delimiters {
    /// Check that the configured sequences can drive the lexer. An empty
    /// open or close sequence would match at every scan position without
    /// consuming input, so both are rejected up front.
    pub fn validate(&self) -> Result<(), DelimiterError> {
        if self.open.is_empty() {
            return Err(DelimiterError::EmptyOpen);
        }
        if self.close.is_empty() {
            return Err(DelimiterError::EmptyClose);
        }
        Ok(())
    }
}

/// Rejected delimiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterError {
    EmptyOpen,
    EmptyClose,
}

impl fmt::Display for DelimiterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterError::EmptyOpen => write!(f, "open delimiter must not be empty"),
            DelimiterError::EmptyClose => write!(f, "close delimiter must not be empty"),
        }
    }
}

impl std::error::Error for DelimiterError {}

/// Lexer state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    /// Literal markup.
    Html,
    /// Embedded code between delimiters.
    Code,
    SingleQuote,
    DoubleQuote,
    Backtick,
    BlockComment,
    LineComment,
}

impl LexState {
    fn describe(self) -> &'static str {
        match self {
            LexState::Html => "markup",
            LexState::Code => "an unclosed code block",
            LexState::SingleQuote | LexState::DoubleQuote | LexState::Backtick => {
                "an unterminated string literal"
            }
            LexState::BlockComment => "an unterminated block comment",
            LexState::LineComment => "a line comment in an unclosed code block",
        }
    }
}

/// Classification of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Literal,
    Code,
}

/// A contiguous run of source text, classified as markup or code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub text: String,
    /// 1-indexed line the span starts on.
    pub line: u32,
    /// False only for a code span that continues an already-open block after
    /// a comment was cut out of it. The generator must not inject marker
    /// statements in front of a continuation because the surrounding
    /// statement may still be incomplete.
    pub opens_block: bool,
}

/// End-of-input in any state other than [`LexState::Html`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub state: LexState,
    /// Last line the lexer processed.
    pub line: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected end of file inside {}",
            self.state.describe()
        )
    }
}

impl std::error::Error for LexError {}

fn char_width(text: &str, at: usize) -> usize {
    text[at..].chars().next().map(char::len_utf8).unwrap_or(0)
}

/// Split template text into literal and code spans.
///
/// The input must already be BOM-stripped and newline-normalized (see
/// [`crate::source::TemplateSource`]). Returns an error if the input ends in
/// any state other than markup.
pub fn tokenize(text: &str, delimiters: &Delimiters) -> Result<Vec<Span>, LexError> {
    let mut spans = Vec::new();
    let mut state = LexState::Html;
    let mut cur = 0usize; // byte offset of the scan position
    let mut start = 0usize; // byte offset where the current run began
    let mut line: u32 = 1;
    let mut run_line: u32 = 1; // line the current run began on
    let mut continues_block = false;

    let flush = |spans: &mut Vec<Span>, kind, from: usize, to: usize, at: u32, opens: bool| {
        if from != to {
            spans.push(Span {
                kind,
                text: text[from..to].to_string(),
                line: at,
                opens_block: opens,
            });
        }
    };

    while cur < text.len() {
        match state {
            LexState::Html => {
                if text[cur..].starts_with('\n') {
                    // The newline belongs to this literal chunk.
                    cur += 1;
                    flush(&mut spans, SpanKind::Literal, start, cur, run_line, true);
                    line += 1;
                    start = cur;
                    run_line = line;
                } else if !delimiters.open.is_empty()
                    && text[cur..].starts_with(delimiters.open.as_str())
                {
                    flush(&mut spans, SpanKind::Literal, start, cur, run_line, true);
                    cur += delimiters.open.len();
                    start = cur;
                    run_line = line;
                    state = LexState::Code;
                    continues_block = false;
                } else {
                    cur += char_width(text, cur);
                }
            }
            LexState::Code => {
                if text[cur..].starts_with('\n') {
                    line += 1;
                    cur += 1;
                } else if text[cur..].starts_with('\\') {
                    // Backslash consumes the next character unconditionally.
                    cur += 1;
                    if text[cur..].starts_with('\n') {
                        line += 1;
                    }
                    cur += char_width(text, cur);
                } else if text[cur..].starts_with('\'') {
                    cur += 1;
                    state = LexState::SingleQuote;
                } else if text[cur..].starts_with('"') {
                    cur += 1;
                    state = LexState::DoubleQuote;
                } else if text[cur..].starts_with('`') {
                    cur += 1;
                    state = LexState::Backtick;
                } else if text[cur..].starts_with("/*") {
                    flush(&mut spans, SpanKind::Code, start, cur, run_line, !continues_block);
                    continues_block = true;
                    cur += 2;
                    start = cur;
                    state = LexState::BlockComment;
                } else if text[cur..].starts_with("//") {
                    flush(&mut spans, SpanKind::Code, start, cur, run_line, !continues_block);
                    continues_block = true;
                    cur += 2;
                    start = cur;
                    state = LexState::LineComment;
                } else if !delimiters.close.is_empty()
                    && text[cur..].starts_with(delimiters.close.as_str())
                {
                    flush(&mut spans, SpanKind::Code, start, cur, run_line, !continues_block);
                    cur += delimiters.close.len();
                    state = LexState::Html;
                    // Consume one trailing newline so markup resumes cleanly
                    // on the following line.
                    if text[cur..].starts_with('\n') {
                        cur += 1;
                        line += 1;
                    }
                    start = cur;
                    run_line = line;
                } else {
                    cur += char_width(text, cur);
                }
            }
            LexState::SingleQuote | LexState::DoubleQuote | LexState::Backtick => {
                let closer = match state {
                    LexState::SingleQuote => '\'',
                    LexState::DoubleQuote => '"',
                    _ => '`',
                };
                if text[cur..].starts_with('\\') {
                    cur += 1;
                    if text[cur..].starts_with('\n') {
                        line += 1;
                    }
                    cur += char_width(text, cur);
                } else if text[cur..].starts_with(closer) {
                    cur += 1;
                    state = LexState::Code;
                } else {
                    if text[cur..].starts_with('\n') {
                        line += 1;
                    }
                    cur += char_width(text, cur);
                }
            }
            LexState::BlockComment => {
                if text[cur..].starts_with('\n') {
                    line += 1;
                    cur += 1;
                } else if text[cur..].starts_with("*/") {
                    cur += 2;
                    start = cur;
                    run_line = line;
                    state = LexState::Code;
                } else {
                    cur += char_width(text, cur);
                }
            }
            LexState::LineComment => {
                if text[cur..].starts_with('\n') {
                    line += 1;
                    cur += 1;
                    start = cur;
                    run_line = line;
                    state = LexState::Code;
                } else {
                    cur += char_width(text, cur);
                }
            }
        }
    }

    match state {
        LexState::Html => {
            flush(&mut spans, SpanKind::Literal, start, text.len(), run_line, true);
            Ok(spans)
        }
        other => Err(LexError { state: other, line }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Span> {
        tokenize(text, &Delimiters::default()).expect("tokenize failed")
    }

    fn kinds(spans: &[Span]) -> Vec<SpanKind> {
        spans.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn literal_only_source_is_one_span_per_line() {
        let spans = lex("one\ntwo\nthree");
        assert_eq!(
            spans,
            vec![
                Span {
                    kind: SpanKind::Literal,
                    text: "one\n".to_string(),
                    line: 1,
                    opens_block: true
                },
                Span {
                    kind: SpanKind::Literal,
                    text: "two\n".to_string(),
                    line: 2,
                    opens_block: true
                },
                Span {
                    kind: SpanKind::Literal,
                    text: "three".to_string(),
                    line: 3,
                    opens_block: true
                },
            ]
        );
    }

    #[test]
    fn splits_markup_and_code() {
        let spans = lex("Hello <?= name ?>!");
        assert_eq!(kinds(&spans), vec![SpanKind::Literal, SpanKind::Code, SpanKind::Literal]);
        assert_eq!(spans[0].text, "Hello ");
        assert_eq!(spans[1].text, "= name ");
        assert_eq!(spans[2].text, "!");
    }

    #[test]
    fn empty_code_block_produces_no_code_span() {
        let spans = lex("<<??>>");
        assert_eq!(kinds(&spans), vec![SpanKind::Literal, SpanKind::Literal]);
        assert_eq!(spans[0].text, "<");
        assert_eq!(spans[1].text, ">");
    }

    #[test]
    fn close_delimiter_inside_single_quotes_is_inert() {
        let spans = lex("A<? local s = '?>' ?>B");
        assert_eq!(kinds(&spans), vec![SpanKind::Literal, SpanKind::Code, SpanKind::Literal]);
        assert_eq!(spans[1].text, " local s = '?>' ");
    }

    #[test]
    fn close_delimiter_inside_double_quotes_is_inert() {
        let spans = lex("<? local s = \"?>\" ?>");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, " local s = \"?>\" ");
    }

    #[test]
    fn close_delimiter_inside_backticks_is_inert() {
        let spans = lex("<? x = `?>` ?>");
        assert_eq!(spans[0].text, " x = `?>` ");
    }

    #[test]
    fn escaped_quote_does_not_close_string() {
        let spans = lex("<? s = 'a\\'?>b' ?>");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, " s = 'a\\'?>b' ");
    }

    #[test]
    fn block_comment_is_cut_out_of_code() {
        let spans = lex("<? a = 1 /* ?> */ b = 2 ?>");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, " a = 1 ");
        assert!(spans[0].opens_block);
        assert_eq!(spans[1].text, " b = 2 ");
        assert!(!spans[1].opens_block);
    }

    #[test]
    fn line_comment_runs_to_newline() {
        let spans = lex("<? a = 1 // ?> comment\nb = 2 ?>");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, " a = 1 ");
        assert_eq!(spans[1].text, "b = 2 ");
        assert_eq!(spans[1].line, 2);
        assert!(!spans[1].opens_block);
    }

    #[test]
    fn newline_after_close_delimiter_is_consumed() {
        let spans = lex("<? a = 1 ?>\nrest");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].text, "rest");
        assert_eq!(spans[1].line, 2);
    }

    #[test]
    fn code_span_records_starting_line() {
        let spans = lex("one\ntwo\n<? go() ?>");
        let code = spans.iter().find(|s| s.kind == SpanKind::Code).unwrap();
        assert_eq!(code.line, 3);
    }

    #[test]
    fn unterminated_code_block_is_an_error() {
        let err = tokenize("line1\n<? local x = 1\n", &Delimiters::default()).unwrap_err();
        assert_eq!(err.state, LexState::Code);
        assert_eq!(err.line, 3);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = tokenize("<? s = 'oops ?>", &Delimiters::default()).unwrap_err();
        assert_eq!(err.state, LexState::SingleQuote);
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let err = tokenize("<? /* never closed", &Delimiters::default()).unwrap_err();
        assert_eq!(err.state, LexState::BlockComment);
    }

    #[test]
    fn custom_delimiters_are_honored() {
        let delims = Delimiters {
            open: "{%".to_string(),
            close: "%}".to_string(),
            shorthand: '=',
        };
        let spans = tokenize("a{% x = 1 %}b", &delims).unwrap();
        assert_eq!(kinds(&spans), vec![SpanKind::Literal, SpanKind::Code, SpanKind::Literal]);
        // The default delimiters are plain markup under this configuration.
        let spans = tokenize("a<?b", &delims).unwrap();
        assert_eq!(kinds(&spans), vec![SpanKind::Literal]);
    }

    #[test]
    fn empty_delimiter_sequences_are_rejected() {
        let no_open = Delimiters {
            open: String::new(),
            ..Delimiters::default()
        };
        assert_eq!(no_open.validate(), Err(DelimiterError::EmptyOpen));
        let no_close = Delimiters {
            close: String::new(),
            ..Delimiters::default()
        };
        assert_eq!(no_close.validate(), Err(DelimiterError::EmptyClose));
        assert_eq!(Delimiters::default().validate(), Ok(()));
    }

    #[test]
    fn tokenize_terminates_on_empty_delimiters() {
        // Unvalidated delimiters must never stall the scan loop: an empty
        // open sequence is simply never matched, so the input stays markup.
        let delims = Delimiters {
            open: String::new(),
            close: String::new(),
            shorthand: '=',
        };
        let spans = tokenize("a<?b?>c", &delims).expect("tokenize failed");
        assert_eq!(kinds(&spans), vec![SpanKind::Literal]);
        assert_eq!(spans[0].text, "a<?b?>c");
    }

    #[test]
    fn floor_division_is_lexed_as_a_line_comment() {
        // Lua's `//` operator collides with the line-comment syntax; the
        // comment wins and even eats a close delimiter on the same line,
        // which is why the module docs warn against it.
        let spans = lex("<?= 7 // 2 ?>\n?>rest");
        assert_eq!(spans[0].text, "= 7 ");
        assert_eq!(spans[1].text, "rest");
        assert_eq!(spans[1].kind, SpanKind::Literal);
    }

    #[test]
    fn lua_comment_does_not_contain_delimiters() {
        // `--` is not a comment state, so a close delimiter inside one ends
        // the code block.
        let spans = lex("<? a = 1 -- ?>rest");
        assert_eq!(spans[0].text, " a = 1 -- ");
        assert_eq!(spans[1].text, "rest");
    }

    #[test]
    fn multibyte_markup_is_preserved() {
        let spans = lex("héllo wörld ünïcode");
        assert_eq!(spans[0].text, "héllo wörld ünïcode");
    }
}
