//! Error types for the compilation pipeline.
//!
//! Every error carries the source line it was raised at, following the
//! same `"{message} ({line})"` convention the rest of this crate's
//! diagnostics use.

use std::error::Error;
use std::fmt::{self, Display};

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub line: usize,
}

impl Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl Error for LexError {}

#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl Error for SyntaxError {}

#[derive(Debug, Clone)]
pub struct SemanticError {
    pub message: String,
    pub line: usize,
}

impl SemanticError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl Error for SemanticError {}

#[derive(Debug, Clone)]
pub enum CompileError {
    Lex(LexError),
    Syntax(SyntaxError),
    Semantic(SemanticError),
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "lexical error: {e}"),
            CompileError::Syntax(e) => write!(f, "syntax error: {e}"),
            CompileError::Semantic(e) => write!(f, "semantic error: {e}"),
        }
    }
}

impl Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<SyntaxError> for CompileError {
    fn from(e: SyntaxError) -> Self {
        CompileError::Syntax(e)
    }
}

impl From<SemanticError> for CompileError {
    fn from(e: SemanticError) -> Self {
        CompileError::Semantic(e)
    }
}
