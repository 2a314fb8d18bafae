//! Hidden-channel comment validation
//!
//! Implements the MISRA C:2012 comment rules the dialect enforces:
//!
//! - Rule 3.1: the character sequences `/*` and `//` shall not be used
//!   within a comment. URIs (`://`) are exempt.
//! - Rule 3.2: line-splicing shall not be used within `//` comments, i.e.
//!   a line or doc comment must not end in a backslash.

use crate::ast::{Comment, CommentStyle};
use crate::diagnostics::Diagnostic;
use std::path::Path;

/// Check every hidden-channel comment, returning one warning per violation
pub fn check_comments(comments: &[Comment], file: &Path) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for comment in comments {
        check_rule_3_1(comment, file, &mut diagnostics);
        check_rule_3_2(comment, file, &mut diagnostics);
    }
    diagnostics
}

/// Nested comment openers inside any comment body
fn check_rule_3_1(comment: &Comment, file: &Path, diagnostics: &mut Vec<Diagnostic>) {
    // Skip the comment's own opening delimiter
    let body_start = match comment.style {
        CommentStyle::Doc => 3,
        CommentStyle::Line | CommentStyle::Block => 2,
    };
    let body: Vec<char> = comment.text.chars().collect();
    let body_end = if comment.style == CommentStyle::Block && comment.text.ends_with("*/") {
        body.len().saturating_sub(2)
    } else {
        body.len()
    };

    let mut i = body_start;
    while i + 1 < body_end {
        let pair = (body[i], body[i + 1]);
        let hit = match pair {
            ('/', '*') => true,
            // `//` only counts inside block comments; inside line comments a
            // second slash pair is just more of the same comment
            ('/', '/') => comment.style == CommentStyle::Block,
            _ => false,
        };
        // `://` is a URI, exempt
        let is_uri = pair == ('/', '/') && i > 0 && body[i - 1] == ':';
        if hit && !is_uri {
            let column = comment.loc.column + i;
            diagnostics.push(
                Diagnostic::warning(
                    file,
                    comment.loc.line,
                    column,
                    format!(
                        "Comment contains nested '{}{}' sequence",
                        pair.0, pair.1
                    ),
                )
                .with_code("M3.1"),
            );
            i += 2;
            continue;
        }
        i += 1;
    }
}

/// Line-splice: a line or doc comment whose last character is a backslash
fn check_rule_3_2(comment: &Comment, file: &Path, diagnostics: &mut Vec<Diagnostic>) {
    if comment.style == CommentStyle::Block {
        return;
    }
    if comment.text.trim_end_matches([' ', '\t']).ends_with('\\') {
        diagnostics.push(
            Diagnostic::warning(
                file,
                comment.loc.line,
                comment.loc.column,
                "Line comment ends with a backslash (line-splice)",
            )
            .with_code("M3.2"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use std::path::PathBuf;

    fn comment(style: CommentStyle, text: &str) -> Comment {
        Comment {
            style,
            text: text.to_string(),
            loc: SourceLocation::new(1, 1),
        }
    }

    fn check(style: CommentStyle, text: &str) -> Vec<Diagnostic> {
        check_comments(&[comment(style, text)], &PathBuf::from("t.cnx"))
    }

    #[test]
    fn test_clean_comments_pass() {
        assert!(check(CommentStyle::Line, "// all fine").is_empty());
        assert!(check(CommentStyle::Block, "/* all fine */").is_empty());
        assert!(check(CommentStyle::Doc, "/// all fine").is_empty());
    }

    #[test]
    fn test_nested_block_opener_flagged() {
        let hits = check(CommentStyle::Block, "/* outer /* inner */");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code.as_deref(), Some("M3.1"));
    }

    #[test]
    fn test_nested_line_in_block_flagged() {
        let hits = check(CommentStyle::Block, "/* has // inside */");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_nested_block_in_line_flagged() {
        let hits = check(CommentStyle::Line, "// has /* inside");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_uri_exempt() {
        assert!(check(CommentStyle::Line, "// see https://example.com/docs").is_empty());
        assert!(check(CommentStyle::Block, "/* see https://example.com */").is_empty());
    }

    #[test]
    fn test_line_splice_flagged() {
        let hits = check(CommentStyle::Line, "// continues \\");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code.as_deref(), Some("M3.2"));
    }

    #[test]
    fn test_doc_splice_flagged() {
        let hits = check(CommentStyle::Doc, "/// continues\\");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code.as_deref(), Some("M3.2"));
    }

    #[test]
    fn test_block_comment_trailing_backslash_allowed() {
        assert!(check(CommentStyle::Block, "/* path C:\\ */").is_empty());
    }
}
