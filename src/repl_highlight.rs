//! Syntax highlighting for echoed REPL input.

use colored::Colorize;

use crate::lexer::token::{Token, TokenKind};
use crate::lexer::Scanner;

#[derive(Clone, Default)]
pub struct SyntaxHighlighter;

impl SyntaxHighlighter {
    pub fn new() -> Self {
        Self
    }

    /// Colorize `source` token by token. Input that fails to lex comes back
    /// unchanged.
    pub fn highlight(&self, source: &str) -> String {
        match Scanner::new(source).scan_tokens() {
            Ok(tokens) => self.render_highlighted(source, &tokens),
            Err(_) => source.to_string(),
        }
    }

    fn render_highlighted(&self, source: &str, tokens: &[Token]) -> String {
        let mut result = String::new();
        let mut last_end = 0;

        for token in tokens {
            if token.kind == TokenKind::Eof {
                break;
            }

            let token_text = &source[token.span.start..token.span.end];
            result.push_str(&source[last_end..token.span.start]);
            result.push_str(&self.colorize_token(token, token_text));
            last_end = token.span.end;
        }

        result.push_str(&source[last_end..]);
        result
    }

    fn colorize_token(&self, token: &Token, text: &str) -> String {
        use TokenKind::*;

        match &token.kind {
            IntLiteral(_) => text.bright_blue().to_string(),
            StringLiteral(_) => text.bright_green().to_string(),
            BoolLiteral(_) => text.bright_magenta().to_string(),
            Null => text.cyan().to_string(),

            Fn | Return | If | Else | While | Import => text.bright_yellow().bold().to_string(),

            ColonEqual | Equal | Plus | Minus | Star | Slash | Percent | Pipe | Caret
            | Ampersand | Tilde | LessLess | GreaterGreater | EqualEqual | BangEqual | Less
            | LessEqual | Greater | GreaterEqual | Bang | And | Or => text.red().to_string(),

            LeftParen | RightParen | LeftBrace | RightBrace | LeftBracket | RightBracket
            | Comma | Semicolon | Colon | Dot => text.white().bold().to_string(),

            Identifier(_) => text.white().to_string(),
            Eof => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_keeps_text() {
        colored::control::set_override(false);
        let source = "x := fn(a) { a + 1 } # note";
        assert_eq!(SyntaxHighlighter::new().highlight(source), source);
    }

    #[test]
    fn test_unlexable_input_unchanged() {
        let source = "\"unterminated";
        assert_eq!(SyntaxHighlighter::new().highlight(source), source);
    }
}
