//! Tokenizer for C-Next source
//!
//! Produces a token stream for the parser plus two side channels: comments
//! (hidden channel, kept for MISRA checks and output preservation) and
//! preprocessor directives (classified here, validated by later stages).
//!
//! Directive policy: `#include`, flag-only `#define`, `#ifdef`, `#ifndef`,
//! `#else`, `#endif`, and `#pragma target` are legal. `#define NAME value`
//! and `#define NAME(args)` are classified but kept in the stream so the
//! parser can report them as hard errors with a position.

use crate::ast::{Comment, CommentStyle, Directive, DirectiveToken, SourceLocation};
use crate::diagnostics::Diagnostic;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Str,
    Char,
    Punct,
    Eof,
}

/// A token with source position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    pub fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

/// Everything the lexer produces for one translation unit
#[derive(Debug, Default)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
    pub directives: Vec<DirectiveToken>,
    pub errors: Vec<Diagnostic>,
}

/// Multi-character operators, longest first so maximal munch wins.
/// `<<<-` must be tried before `<<` and `<-`; `<-` before `<`.
const OPERATORS: &[&str] = &[
    "<<<-", ">><-", "+<-", "-<-", "*<-", "/<-", "%<-", "&<-", "|<-", "^<-", "<-", "<<", ">>",
    "<=", ">=", "!=", "&&", "||",
];

const SINGLE_CHARS: &str = "=<>+-*/%&|^~!?:;,.(){}[]@";

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    file: &'a Path,
    out: LexOutput,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &str, file: &'a Path) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file,
            out: LexOutput::default(),
        }
    }

    pub fn tokenize(mut self) -> LexOutput {
        while !self.at_end() {
            let c = self.peek();
            if c == '\n' {
                self.advance();
                continue;
            }
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            // Directives start at a '#' that is first non-whitespace on its line
            if c == '#' && self.at_line_start() {
                self.lex_directive();
                continue;
            }
            if c == '/' && self.peek_ahead(1) == Some('/') {
                self.lex_line_comment();
                continue;
            }
            if c == '/' && self.peek_ahead(1) == Some('*') {
                self.lex_block_comment();
                continue;
            }
            if c.is_ascii_digit() {
                self.lex_number();
                continue;
            }
            if c == '"' {
                self.lex_string();
                continue;
            }
            if c == '\'' {
                self.lex_char();
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                self.lex_ident();
                continue;
            }
            if self.lex_operator() {
                continue;
            }
            let (line, column) = (self.line, self.column);
            self.out.errors.push(Diagnostic::error(
                self.file,
                line,
                column,
                format!("Unexpected character '{}'", c),
            ));
            self.advance();
        }
        let (line, column) = (self.line, self.column);
        self.out
            .tokens
            .push(Token::new(TokenKind::Eof, "", line, column));
        self.out
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// True when only whitespace precedes the cursor on the current line
    fn at_line_start(&self) -> bool {
        let mut i = self.pos;
        while i > 0 {
            let c = self.chars[i - 1];
            if c == '\n' {
                return true;
            }
            if !c.is_whitespace() {
                return false;
            }
            i -= 1;
        }
        true
    }

    fn lex_ident(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.at_end() && (self.peek().is_alphanumeric() || self.peek() == '_') {
            text.push(self.advance());
        }
        self.out
            .tokens
            .push(Token::new(TokenKind::Ident, text, line, column));
    }

    fn lex_number(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut is_float = false;

        if self.peek() == '0'
            && matches!(self.peek_ahead(1), Some('x') | Some('X') | Some('b') | Some('B'))
        {
            text.push(self.advance());
            text.push(self.advance());
            while !self.at_end() && (self.peek().is_ascii_hexdigit() || self.peek() == '_') {
                text.push(self.advance());
            }
        } else {
            while !self.at_end() && (self.peek().is_ascii_digit() || self.peek() == '_') {
                text.push(self.advance());
            }
            // Fractional part; a lone '.' not followed by a digit is member access
            if !self.at_end()
                && self.peek() == '.'
                && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                text.push(self.advance());
                while !self.at_end() && self.peek().is_ascii_digit() {
                    text.push(self.advance());
                }
            }
        }

        // Width suffix: u8..u64, i8..i64, f32, f64 attached directly
        if !self.at_end() && matches!(self.peek(), 'u' | 'i' | 'f') {
            let mut suffix = String::new();
            let mut lookahead = 0;
            suffix.push(self.peek());
            while let Some(c) = self.peek_ahead(lookahead + 1) {
                if c.is_ascii_digit() {
                    suffix.push(c);
                    lookahead += 1;
                } else {
                    break;
                }
            }
            if matches!(
                suffix.as_str(),
                "u8" | "u16" | "u32" | "u64" | "i8" | "i16" | "i32" | "i64" | "f32" | "f64"
            ) {
                if suffix.starts_with('f') {
                    is_float = true;
                }
                for _ in 0..suffix.len() {
                    text.push(self.advance());
                }
            }
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        self.out.tokens.push(Token::new(kind, text, line, column));
    }

    fn lex_string(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        text.push(self.advance()); // opening quote
        let mut closed = false;
        while !self.at_end() {
            let c = self.advance();
            text.push(c);
            if c == '\\' && !self.at_end() {
                text.push(self.advance());
                continue;
            }
            if c == '"' {
                closed = true;
                break;
            }
            if c == '\n' {
                break;
            }
        }
        if !closed {
            self.out.errors.push(Diagnostic::error(
                self.file,
                line,
                column,
                "Unclosed string literal, missing closing quote",
            ));
        }
        self.out
            .tokens
            .push(Token::new(TokenKind::Str, text, line, column));
    }

    fn lex_char(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        text.push(self.advance());
        while !self.at_end() {
            let c = self.advance();
            text.push(c);
            if c == '\\' && !self.at_end() {
                text.push(self.advance());
                continue;
            }
            if c == '\'' || c == '\n' {
                break;
            }
        }
        self.out
            .tokens
            .push(Token::new(TokenKind::Char, text, line, column));
    }

    fn lex_line_comment(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        // Three slashes is a doc comment
        let style = if self.peek_ahead(2) == Some('/') {
            CommentStyle::Doc
        } else {
            CommentStyle::Line
        };
        while !self.at_end() && self.peek() != '\n' {
            text.push(self.advance());
        }
        self.out.comments.push(Comment {
            style,
            text,
            loc: SourceLocation::new(line, column),
        });
    }

    fn lex_block_comment(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        text.push(self.advance()); // '/'
        text.push(self.advance()); // '*'
        let mut closed = false;
        while !self.at_end() {
            let c = self.advance();
            text.push(c);
            if c == '*' && !self.at_end() && self.peek() == '/' {
                text.push(self.advance());
                closed = true;
                break;
            }
        }
        if !closed {
            self.out.errors.push(Diagnostic::error(
                self.file,
                line,
                column,
                "Unterminated block comment",
            ));
        }
        self.out.comments.push(Comment {
            style: CommentStyle::Block,
            text,
            loc: SourceLocation::new(line, column),
        });
    }

    fn lex_operator(&mut self) -> bool {
        let (line, column) = (self.line, self.column);
        for op in OPERATORS {
            if self.source_matches(op) {
                for _ in 0..op.len() {
                    self.advance();
                }
                self.out
                    .tokens
                    .push(Token::new(TokenKind::Punct, *op, line, column));
                return true;
            }
        }
        let c = self.peek();
        if SINGLE_CHARS.contains(c) {
            self.advance();
            self.out
                .tokens
                .push(Token::new(TokenKind::Punct, c.to_string(), line, column));
            return true;
        }
        false
    }

    fn source_matches(&self, op: &str) -> bool {
        op.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    /// Consume a `#...` line and classify it
    fn lex_directive(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.at_end() && self.peek() != '\n' {
            text.push(self.advance());
        }
        let directive = classify_directive(&text);
        self.out.directives.push(DirectiveToken {
            directive,
            text,
            loc: SourceLocation::new(line, column),
        });
    }
}

/// Classify a full `#...` directive line
pub fn classify_directive(text: &str) -> Directive {
    let body = text.trim_start_matches('#').trim();
    let mut parts = body.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "include" => {
            if let Some(path) = rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
                Directive::Include {
                    path: path.trim().to_string(),
                    system: true,
                }
            } else {
                let path = rest.trim_matches('"').to_string();
                Directive::Include {
                    path,
                    system: false,
                }
            }
        }
        "define" => {
            // A '(' glued to the name is a function-like macro
            let name_end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let name = rest[..name_end].to_string();
            let after = &rest[name_end..];
            if after.starts_with('(') {
                Directive::DefineFunction { name }
            } else if after.trim().is_empty() {
                Directive::DefineFlag { name }
            } else {
                Directive::DefineValue { name }
            }
        }
        "ifdef" => Directive::Ifdef {
            name: rest.to_string(),
        },
        "ifndef" => Directive::Ifndef {
            name: rest.to_string(),
        },
        "else" => Directive::Else,
        "endif" => Directive::Endif,
        "pragma" => {
            let mut pragma_parts = rest.splitn(2, char::is_whitespace);
            if pragma_parts.next() == Some("target") {
                Directive::PragmaTarget {
                    name: pragma_parts.next().unwrap_or("").trim().to_string(),
                }
            } else {
                Directive::PragmaOther {
                    text: rest.to_string(),
                }
            }
        }
        _ => Directive::PragmaOther {
            text: body.to_string(),
        },
    }
}

/// Convenience entry point
pub fn tokenize(source: &str, file: &Path) -> LexOutput {
    Lexer::new(source, file).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lex(source: &str) -> LexOutput {
        tokenize(source, &PathBuf::from("test.cnx"))
    }

    fn token_texts(out: &LexOutput) -> Vec<&str> {
        out.tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.text.as_str())
            .collect()
    }

    #[test]
    fn test_assignment_operator_munch() {
        let out = lex("x <- 1;\ny +<- 2;\nz <<<- 3;");
        let texts = token_texts(&out);
        assert!(texts.contains(&"<-"));
        assert!(texts.contains(&"+<-"));
        assert!(texts.contains(&"<<<-"));
    }

    #[test]
    fn test_shift_vs_compound_shift() {
        let out = lex("a <- b << 2;");
        let texts = token_texts(&out);
        assert_eq!(texts, vec!["a", "<-", "b", "<<", "2", ";"]);
    }

    #[test]
    fn test_comparison_not_assignment() {
        // Space keeps '<' and '-' apart
        let out = lex("if (a < -1) { }");
        let texts = token_texts(&out);
        assert!(texts.contains(&"<"));
        assert!(texts.contains(&"-"));
        assert!(!texts.contains(&"<-"));
    }

    #[test]
    fn test_number_suffixes() {
        let out = lex("x <- 5u8; y <- 3.5f32; z <- 0xFFu32;");
        let ints: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Int)
            .map(|t| t.text.as_str())
            .collect();
        let floats: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Float)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(ints, vec!["5u8", "0xFFu32"]);
        assert_eq!(floats, vec!["3.5f32"]);
    }

    #[test]
    fn test_comments_on_hidden_channel() {
        let out = lex("// line\n/// doc\n/* block */\nu8 x <- 1;");
        assert_eq!(out.comments.len(), 3);
        assert_eq!(out.comments[0].style, CommentStyle::Line);
        assert_eq!(out.comments[1].style, CommentStyle::Doc);
        assert_eq!(out.comments[2].style, CommentStyle::Block);
        // Comments never surface in the token stream
        assert!(!token_texts(&out).iter().any(|t| t.contains("//")));
    }

    #[test]
    fn test_directive_classification() {
        assert_eq!(
            classify_directive("#include \"util.cnx\""),
            Directive::Include {
                path: "util.cnx".to_string(),
                system: false
            }
        );
        assert_eq!(
            classify_directive("#include <stdint.h>"),
            Directive::Include {
                path: "stdint.h".to_string(),
                system: true
            }
        );
        assert_eq!(
            classify_directive("#define DEBUG"),
            Directive::DefineFlag {
                name: "DEBUG".to_string()
            }
        );
        assert_eq!(
            classify_directive("#define MAX 10"),
            Directive::DefineValue {
                name: "MAX".to_string()
            }
        );
        assert_eq!(
            classify_directive("#define SQR(x) ((x)*(x))"),
            Directive::DefineFunction {
                name: "SQR".to_string()
            }
        );
        assert_eq!(
            classify_directive("#pragma target cortex-m7"),
            Directive::PragmaTarget {
                name: "cortex-m7".to_string()
            }
        );
    }

    #[test]
    fn test_unclosed_string_reported() {
        let out = lex("string<8> s <- \"oops;\n");
        assert!(!out.errors.is_empty());
        assert!(out.errors[0].message.contains("Unclosed string"));
    }

    #[test]
    fn test_directive_positions_kept() {
        let out = lex("#include \"a.cnx\"\nu8 x <- 1;");
        assert_eq!(out.directives.len(), 1);
        assert_eq!(out.directives[0].loc.line, 1);
        assert_eq!(out.tokens[0].line, 2);
    }

    #[test]
    fn test_hash_mid_line_is_not_directive() {
        // '#' only opens a directive at line start
        let out = lex("u8 x <- 1; # stray");
        assert_eq!(out.directives.len(), 0);
    }
}
