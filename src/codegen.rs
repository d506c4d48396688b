//! Code generation
//!
//! Turns the span stream into a single Lua chunk. Literal spans become calls
//! to the injected `print` primitive with the markup encoded as a Lua string
//! literal; code spans pass through verbatim; an expression-shorthand span
//! (`=expr`) becomes `print(expr)` with one trailing statement terminator
//! stripped.
//!
//! Line Parity
//!
//!     The generated chunk is kept line-for-line aligned with the template:
//!     statement text never introduces newlines of its own, and wherever the
//!     lexer swallowed newlines (comments, the newline after a close
//!     delimiter) the generator pads the chunk back up to the next span's
//!     starting line. Because of this, a syntax error the evaluator reports at
//!     chunk line N is an error at template line N, with no mapping table.
//!
//! Line Markers
//!
//!     `__line = N;` assignments are interleaved at every safe line boundary:
//!     in front of every literal span and every code span that opens a block.
//!     Continuation code spans (a block resumed after an embedded comment) get
//!     no marker since the statement around the comment may be incomplete.
//!     At run time the scope's `__line` field therefore always names the line
//!     of the statement being executed, which is what the diagnostics layer
//!     reports when a failure carries no structured position of its own.
//!
//! The whole chunk is wrapped, on a single line to preserve parity, as
//! `return function(__scope) local _ENV = __scope; ... end`. Evaluating the
//! chunk once yields a reusable template function; every call binds a fresh
//! scope table as the environment, so concurrent executions of one compiled
//! artifact never share state.

use crate::lexer::{Delimiters, Span, SpanKind};
use crate::source::TemplateSource;
use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_TERMINATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";\s*$").expect("trailing terminator pattern"));

/// Encode markup text as the body of a double-quoted Lua string literal.
///
/// Control characters are emitted as three-digit decimal escapes so a digit
/// following the escape can never be absorbed into it.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Generate the Lua chunk for a span stream.
///
/// Deterministic: the same spans always produce byte-identical output.
pub fn generate(spans: &[Span], source: &TemplateSource, delimiters: &Delimiters) -> String {
    let mut out = String::with_capacity(source.text.len() + source.text.len() / 2 + 64);
    out.push_str("return function(__scope) local _ENV = __scope; ");
    let mut out_line: u32 = 1;

    for span in spans {
        // Restore any newlines the lexer consumed between spans.
        while out_line < span.line {
            out.push('\n');
            out_line += 1;
        }

        let stmt = match span.kind {
            SpanKind::Literal => format!(
                "__line = {}; print(\"{}\"); ",
                span.line,
                escape_literal(&span.text)
            ),
            SpanKind::Code => {
                let mut code = span.text.as_str();
                // Shorthand applies to any code span that starts with the
                // marker, continuations included (`<?/* note */= x ?>`); the
                // line marker still only goes in front of block openers.
                let shorthand = code.chars().next() == Some(delimiters.shorthand);
                if shorthand {
                    code = &code[delimiters.shorthand.len_utf8()..];
                    let expr = TRAILING_TERMINATOR.replace(code, "");
                    if span.opens_block {
                        format!("__line = {}; print({}); ", span.line, expr)
                    } else {
                        format!("print({}); ", expr)
                    }
                } else if span.opens_block {
                    format!("__line = {}; {} ", span.line, code)
                } else {
                    format!("{} ", code)
                }
            }
        };
        out_line += stmt.matches('\n').count() as u32;
        out.push_str(&stmt);
    }

    // Pad out to the last template line so end-of-chunk errors stay in range.
    let total = source.lines.len() as u32;
    while out_line < total {
        out.push('\n');
        out_line += 1;
    }
    out.push_str("\nend");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn gen(text: &str) -> String {
        let source = TemplateSource::from_text("test.weft", text);
        let delims = Delimiters::default();
        let spans = tokenize(&source.text, &delims).expect("tokenize failed");
        generate(&spans, &source, &delims)
    }

    #[test]
    fn literal_becomes_print_call() {
        let chunk = gen("hello");
        assert!(chunk.contains("print(\"hello\")"));
        assert!(chunk.starts_with("return function(__scope) local _ENV = __scope; "));
        assert!(chunk.ends_with("\nend"));
    }

    #[test]
    fn markup_quotes_and_newlines_are_escaped() {
        let chunk = gen("say \"hi\"\n");
        assert!(chunk.contains(r#"print("say \"hi\"\n")"#));
    }

    #[test]
    fn shorthand_becomes_print_expression() {
        let chunk = gen("<?= 40 + 2 ?>");
        assert!(chunk.contains("print( 40 + 2 )"));
    }

    #[test]
    fn shorthand_strips_single_trailing_terminator() {
        let chunk = gen("<?= value; ?>");
        assert!(chunk.contains("print( value)"));
    }

    #[test]
    fn statements_pass_through_verbatim() {
        let chunk = gen("<? local x = 1 ?>");
        assert!(chunk.contains(" local x = 1 "));
        assert!(!chunk.contains("print( local"));
    }

    #[test]
    fn line_markers_precede_each_literal_line() {
        let chunk = gen("one\ntwo\n<? go() ?>");
        assert!(chunk.contains("__line = 1; print(\"one\\n\")"));
        assert!(chunk.contains("__line = 2; print(\"two\\n\")"));
        assert!(chunk.contains("__line = 3;  go() "));
    }

    #[test]
    fn shorthand_after_leading_comment_still_prints() {
        let chunk = gen("<?/* note */= x ?>");
        assert!(chunk.contains("print( x )"));
        // The span continues a block, so no marker precedes it.
        assert_eq!(chunk.matches("__line").count(), 0);
    }

    #[test]
    fn continuation_after_comment_gets_no_marker() {
        let chunk = gen("<? a = 1 /* note */ + 2 ?>");
        assert!(chunk.contains("__line = 1;  a = 1 "));
        assert!(chunk.contains(" + 2 "));
        assert_eq!(chunk.matches("__line").count(), 1);
    }

    #[test]
    fn generated_chunk_preserves_line_parity() {
        let text = "one\n<? a = 1 /* multi\nline\ncomment */ b = 2 ?>\nfive";
        let source = TemplateSource::from_text("test.weft", text);
        let delims = Delimiters::default();
        let spans = tokenize(&source.text, &delims).unwrap();
        let chunk = generate(&spans, &source, &delims);
        // Chunk body has as many lines as the template; the trailing `end`
        // adds exactly one more.
        let template_lines = source.lines.len();
        assert_eq!(chunk.lines().count(), template_lines + 1);
        // "five" is on template line 5 and must sit on chunk line 5.
        let line5 = chunk.lines().nth(4).unwrap();
        assert!(line5.contains("print(\"five\")"), "line 5 was: {line5}");
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(gen("a<?= b ?>c"), gen("a<?= b ?>c"));
    }

    #[test]
    fn control_characters_use_padded_escapes() {
        assert_eq!(escape_literal("\u{1}5"), "\\0015");
        assert_eq!(escape_literal("a\tb"), "a\\tb");
    }
}
