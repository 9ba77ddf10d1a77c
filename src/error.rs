use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

/// Source region of a token or node. `start`/`end` are char offsets,
/// `line`/`column` are 1-based and point at the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Covers `self` through the end of `other`, keeping the starting position.
    pub fn to(&self, other: &Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    SyntaxError,
    SemanticError,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::SyntaxError => "Syntax Error",
            ErrorKind::SemanticError => "Semantic Error",
            ErrorKind::RuntimeError => "Runtime Error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct PascalError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl PascalError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn syntax_error(span: Span, expected: &str, found: &str) -> Self {
        Self::new(
            ErrorKind::SyntaxError,
            span,
            format!("Expected {}, found {}", expected, found),
        )
    }

    pub fn semantic_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::SemanticError, span, message)
    }

    pub fn semantic_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::SemanticError, span, message, help)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::RuntimeError, span, message)
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<stdin>");

        let color = match self.kind {
            ErrorKind::LexError => Color::Red,
            ErrorKind::SyntaxError => Color::Yellow,
            ErrorKind::SemanticError => Color::Blue,
            ErrorKind::RuntimeError => Color::Magenta,
        };

        // ariadne panics on spans past the end of the source, e.g. at EOF.
        let len = source.chars().count();
        let start = self.span.start.min(len);
        let end = self.span.end.min(len).max(start);

        let mut report_builder = Report::build(ReportKind::Error, filename, start)
            .with_message(format!(
                "{} at line {}, column {}: {}",
                self.kind.fg(color),
                self.span.line,
                self.span.column,
                self.message
            ))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        if let Err(error) = report_builder
            .finish()
            .eprint((filename, Source::from(source)))
        {
            eprintln!("{} (failed to render diagnostic: {})", self, error);
        }
    }
}

impl fmt::Display for PascalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {}: {}",
            self.kind, self.span.line, self.span.column, self.message
        )
    }
}

impl std::error::Error for PascalError {}
