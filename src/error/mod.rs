//! Error types for all phases: lexing, parsing, compiling and running.

use std::fmt;

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Expected identifier on the left of ':=' at {0}")]
    InvalidBindTarget(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn invalid_bind_target(span: Span) -> Self {
        Self::InvalidBindTarget(span)
    }

    pub fn invalid_assignment_target(span: Span) -> Self {
        Self::InvalidAssignmentTarget(span)
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::InvalidBindTarget(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Every error the parser recovered from while reading one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParserError>);

impl ParseErrors {
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(|e| e.to_string()).collect()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl From<ParserError> for ParseErrors {
    fn from(err: ParserError) -> Self {
        ParseErrors(vec![err])
    }
}

impl From<LexerError> for ParseErrors {
    fn from(err: LexerError) -> Self {
        ParseErrors(vec![err.into()])
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("undefined variable '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("cannot assign to {kind} '{name}' at {span}")]
    InvalidAssignment {
        kind: &'static str,
        name: String,
        span: Span,
    },

    #[error("unusable as hash key: {0} at {1}")]
    UnhashableKey(String, Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedVariable(name.into(), span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable(_, span) => *span,
            Self::InvalidAssignment { span, .. } => *span,
            Self::UnhashableKey(_, span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Errors that abort a running unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("wrong number of arguments: want={expected}, got={got}")]
    WrongArity { expected: usize, got: usize },

    #[error("calling non-closure and non-builtin: {0}")]
    NotCallable(String),

    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedOperands { left: String, right: String },

    #[error("unsupported operand for {op}: {operand}")]
    UnsupportedOperand { op: &'static str, operand: String },

    #[error("unusable as hash key: {0}")]
    UnhashableKey(String),

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(i64),

    #[error("index operator not supported: left={left} index={index}")]
    IndexNotSupported { left: String, index: String },

    #[error("set item operation not supported: left={left} index={index}")]
    SetItemNotSupported { left: String, index: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("negative shift amount: {0}")]
    NegativeShift(i64),

    #[error("repeat count too large: {0}")]
    RepeatTooLarge(i64),

    #[error("not a function: {0}")]
    NotAFunction(String),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Module(String),
}

impl RuntimeError {
    pub fn unsupported_operands(left: &str, right: &str) -> Self {
        Self::UnsupportedOperands {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn wrong_arity(expected: usize, got: usize) -> Self {
        Self::WrongArity { expected, got }
    }

    pub fn module(message: impl Into<String>) -> Self {
        Self::Module(message.into())
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum MonkeyError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParseErrors),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonkeyError {
    /// Process exit status for this error, following sysexits: 65 for bad
    /// input, 70 for failures while running, 74 for I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lexer(_) | Self::Parser(_) | Self::Compile(_) => 65,
            Self::Runtime(_) => 70,
            Self::Io(_) => 74,
        }
    }
}
