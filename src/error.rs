//! Error types for parsing and rendering

use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::data::EncodeError;
use crate::parser::ast::SourceSpan;
use crate::renderer::SerializeError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{span}: {message}")]
    Syntax {
        span: SourceSpan,
        message: String,
        expected: Vec<String>,
    },

    #[error("{span}: #{tag} is never closed (expected #end{tag})")]
    UnclosedBlock { tag: String, span: SourceSpan },

    /// `span` points at the first invalid byte
    #[error("{span}: template is not valid UTF-8")]
    InvalidEncoding { span: SourceSpan },
}

impl ParseError {
    pub fn syntax(span: SourceSpan, message: impl Into<String>, expected: Vec<String>) -> Self {
        ParseError::Syntax {
            span,
            message: message.into(),
            expected,
        }
    }

    /// The error without its location
    pub fn message(&self) -> String {
        match self {
            ParseError::Syntax { message, .. } => message.clone(),
            ParseError::UnclosedBlock { tag, .. } => {
                format!("#{} is never closed (expected #end{})", tag, tag)
            }
            ParseError::InvalidEncoding { .. } => "template is not valid UTF-8".to_string(),
        }
    }

    pub fn span(&self) -> &SourceSpan {
        match self {
            ParseError::Syntax { span, .. }
            | ParseError::UnclosedBlock { span, .. }
            | ParseError::InvalidEncoding { span } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str) -> String {
        let (message, note) = match self {
            ParseError::Syntax {
                message, expected, ..
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                (message.clone(), format!("{}{}", message, expected_str))
            }
            ParseError::UnclosedBlock { tag, .. } => (
                format!("#{} is never closed", tag),
                format!("add #end{} to close this block", tag),
            ),
            ParseError::InvalidEncoding { .. } => (
                "template is not valid UTF-8".to_string(),
                "invalid byte sequence starts here".to_string(),
            ),
        };
        annotate(self.span(), source, &message, &note)
    }
}

/// Failures of the render pipeline, each reducible to `{identifier, reason, span}`
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("template not found: {}", path.display())]
    FileNotFound {
        path: PathBuf,
        span: Option<SourceSpan>,
    },

    #[error("error reading template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{span}: no export named '{identifier}' is visible here")]
    NoSuchExport {
        identifier: String,
        span: SourceSpan,
    },

    #[error("{span}: resolved to no nodes where exactly one is required")]
    EmptyResolutionResult { span: SourceSpan },

    #[error("{span}: circular extend: {}", chain.join(" -> "))]
    CircularExtend {
        chain: Vec<String>,
        span: SourceSpan,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializeError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodeError),
}

impl RenderError {
    pub fn file_not_found(path: impl Into<PathBuf>, span: Option<SourceSpan>) -> Self {
        RenderError::FileNotFound {
            path: path.into(),
            span,
        }
    }

    pub fn no_such_export(identifier: impl Into<String>, span: SourceSpan) -> Self {
        RenderError::NoSuchExport {
            identifier: identifier.into(),
            span,
        }
    }

    /// Stable machine-readable name of the failure
    pub fn identifier(&self) -> &'static str {
        match self {
            RenderError::FileNotFound { .. } => "file_not_found",
            RenderError::Io { .. } => "io",
            RenderError::NoSuchExport { .. } => "no_such_export",
            RenderError::EmptyResolutionResult { .. } => "empty_resolution_result",
            RenderError::CircularExtend { .. } => "circular_extend",
            RenderError::Parse(_) => "parse_error",
            RenderError::Serialization(_) => "serialization_error",
            RenderError::Encoding(_) => "encoding_error",
        }
    }

    /// Human-readable message without the location, which [`Self::span`] carries
    pub fn reason(&self) -> String {
        match self {
            RenderError::NoSuchExport { identifier, .. } => {
                format!("no export named '{}' is visible here", identifier)
            }
            RenderError::EmptyResolutionResult { .. } => {
                "resolved to no nodes where exactly one is required".to_string()
            }
            RenderError::CircularExtend { chain, .. } => {
                format!("circular extend: {}", chain.join(" -> "))
            }
            RenderError::Parse(err) => err.message(),
            RenderError::Serialization(err) => err.message(),
            RenderError::FileNotFound { .. } | RenderError::Io { .. } | RenderError::Encoding(_) => {
                self.to_string()
            }
        }
    }

    /// Location of the offending node, when there is one
    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            RenderError::FileNotFound { span, .. } => span.as_ref(),
            RenderError::Io { .. } | RenderError::Encoding(_) => None,
            RenderError::NoSuchExport { span, .. }
            | RenderError::EmptyResolutionResult { span }
            | RenderError::CircularExtend { span, .. } => Some(span),
            RenderError::Parse(err) => Some(err.span()),
            RenderError::Serialization(err) => err.span(),
        }
    }

    /// Source-annotated report; `source` must be the text of the file named by [`Self::span`]
    pub fn report(&self, source: &str) -> String {
        if let RenderError::Parse(err) = self {
            return err.format(source);
        }
        match self.span() {
            Some(span) => annotate(span, source, &self.reason(), self.identifier()),
            None => self.reason(),
        }
    }
}

fn annotate(span: &SourceSpan, source: &str, message: &str, note: &str) -> String {
    let filename: &str = &span.file;
    // ariadne counts in characters
    let start = char_offset(source, span.range.start);
    let end = char_offset(source, span.range.end).max(start);

    let mut buf = Vec::new();
    let written = Report::build(ReportKind::Error, filename, start)
        .with_message(message)
        .with_label(
            Label::new((filename, start..end))
                .with_message(note)
                .with_color(Color::Red),
        )
        .finish()
        .write((filename, Source::from(source)), &mut buf);

    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("{}: {}", span, message),
    }
}

fn char_offset(source: &str, byte: usize) -> usize {
    let byte = byte.min(source.len());
    source
        .char_indices()
        .take_while(|(i, _)| *i < byte)
        .count()
}
