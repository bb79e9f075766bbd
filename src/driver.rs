//! The compiler driver: the single public entry point that turns
//! source text into a stack-machine listing, or a [`CompileError`]
//! naming the first lexical, syntax, or semantic problem encountered.

use crate::error::CompileError;
use crate::parser::Parser;

/// Compiles `source`, a program written in the Pascal subset, into a
/// textual stack-machine instruction listing.
///
/// Compilation is single-pass: lexing, parsing, semantic checking and
/// code generation all happen in one left-to-right walk over `source`,
/// so the first error encountered is reported and compilation stops
/// there (errors are not accumulated).
pub fn compile(source: &str) -> Result<String, CompileError> {
    log::debug!("compiling {} bytes of source", source.len());
    let parser = Parser::new(source)?;
    let listing = parser.parse_program();
    match &listing {
        Ok(listing) => log::info!("compiled successfully, {} lines of assembly emitted", listing.lines().count()),
        Err(e) => log::debug!("compilation failed: {e}"),
    }
    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_the_smallest_legal_program() {
        let listing = compile("program Empty;\nbegin\nend.\n").unwrap();
        assert!(listing.starts_with("JUMP MAIN\n"));
        assert!(listing.contains("MAIN:\n"));
        assert!(listing.trim_end().ends_with("STOP"));
    }

    #[test]
    fn reports_undeclared_variable_as_semantic_error() {
        let err = compile("program P;\nbegin\n  x := 1;\nend.\n").unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));
        assert!(err.to_string().contains("x"));
    }

    #[test]
    fn reports_missing_semicolon_as_syntax_error() {
        let err = compile("program P;\nvar x : integer\nbegin\n  x := 1;\nend.\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
    }

    #[test]
    fn reports_unterminated_comment_as_lexical_error() {
        let err = compile("program P; { oops\nbegin end.").unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
    }
}
