//! Operator precedence for Pratt parsing.

use crate::lexer::TokenKind;

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Lowest = 1,
    Or = 2,          // ||
    And = 3,         // &&
    Assign = 4,      // := =
    Equals = 5,      // == !=
    LessGreater = 6, // < <= > >=
    BitOr = 7,       // |
    BitXor = 8,      // ^
    BitAnd = 9,      // &
    Shift = 10,      // << >>
    Sum = 11,        // + -
    Product = 12,    // * / %
    Prefix = 13,     // - ! ~
    Call = 14,       // ()
    Index = 15,      // [] .
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Lowest,
            Precedence::Lowest => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Assign,
            Precedence::Assign => Precedence::Equals,
            Precedence::Equals => Precedence::LessGreater,
            Precedence::LessGreater => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Shift,
            Precedence::Shift => Precedence::Sum,
            Precedence::Sum => Precedence::Product,
            Precedence::Product => Precedence::Prefix,
            Precedence::Prefix => Precedence::Call,
            Precedence::Call => Precedence::Index,
            Precedence::Index => Precedence::Index,
        }
    }
}

pub fn get_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::ColonEqual | TokenKind::Equal => Precedence::Assign,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equals,
        TokenKind::Less | TokenKind::LessEqual | TokenKind::Greater | TokenKind::GreaterEqual => {
            Precedence::LessGreater
        }
        TokenKind::Pipe => Precedence::BitOr,
        TokenKind::Caret => Precedence::BitXor,
        TokenKind::Ampersand => Precedence::BitAnd,
        TokenKind::LessLess | TokenKind::GreaterGreater => Precedence::Shift,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
        TokenKind::LeftParen => Precedence::Call,
        TokenKind::LeftBracket | TokenKind::Dot => Precedence::Index,
        _ => Precedence::None,
    }
}
