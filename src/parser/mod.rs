//! Parser for sheaf templates

pub mod ast;
mod document;
mod grammar;
pub mod lexer;

pub use ast::*;

use crate::error::ParseError;

/// Turns template bytes into an unresolved node sequence
///
/// `label` names the source in every [`SourceSpan`] the parser produces.
pub trait TemplateParser: Send + Sync {
    fn parse(&self, source: &[u8], label: &str) -> Result<Vec<SyntaxNode>, ParseError>;
}

/// The built-in `#tag(...)` syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxParser;

impl TemplateParser for SyntaxParser {
    fn parse(&self, source: &[u8], label: &str) -> Result<Vec<SyntaxNode>, ParseError> {
        match std::str::from_utf8(source) {
            Ok(text) => parse(text, label),
            Err(err) => {
                let valid = &source[..err.valid_up_to()];
                // the prefix is valid UTF-8 by construction
                let prefix = String::from_utf8_lossy(valid);
                let locator = document::Locator::new(label, &prefix);
                let end = (err.valid_up_to() + err.error_len().unwrap_or(1)).min(source.len());
                let mut span = locator.span(err.valid_up_to()..err.valid_up_to());
                span.range = err.valid_up_to()..end;
                Err(ParseError::InvalidEncoding { span })
            }
        }
    }
}

/// Parse template source text
pub fn parse(source: &str, label: &str) -> Result<Vec<SyntaxNode>, ParseError> {
    document::parse_document(source, label)
}
