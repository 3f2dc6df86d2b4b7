use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use thiserror::Error;

/// Something wrong with a workspace script, located in its source.
///
/// Warnings are collected next to the loaded [`Script`](super::Script);
/// errors replace it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
    /// Byte range the problem is reported at.
    pub span: Range<usize>,
    pub file_id: usize,
    fatal: bool,
    /// Secondary places, each with a short caption.
    related: Vec<(Range<usize>, String)>,
    notes: Vec<String>,
}

impl LoadError {
    fn new(fatal: bool, message: String, span: Range<usize>, file_id: usize) -> Self {
        LoadError {
            message,
            span,
            file_id,
            fatal,
            related: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        Self::new(true, message.into(), span, file_id)
    }

    pub fn warning(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        Self::new(false, message.into(), span, file_id)
    }

    /// A script that is not valid TOML, or does not have the script's shape.
    pub(crate) fn from_toml(err: &toml::de::Error, file_id: usize) -> Self {
        Self::error(err.message(), err.span().unwrap_or(0..0), file_id)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Point at a second place in the same script.
    pub fn also_at(mut self, span: Range<usize>, caption: impl Into<String>) -> Self {
        self.related.push((span, caption.into()));
        self
    }

    pub fn is_warning(&self) -> bool {
        !self.fatal
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// 1-based line of the reported position within `source`.
    pub fn line_in(&self, source: &str) -> usize {
        let end = self.span.start.min(source.len());
        source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
    }

    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let severity = if self.fatal {
            Severity::Error
        } else {
            Severity::Warning
        };
        let labels = std::iter::once(Label::primary(self.file_id, self.span.clone()))
            .chain(self.related.iter().map(|(span, caption)| {
                Label::secondary(self.file_id, span.clone()).with_message(caption.clone())
            }))
            .collect();
        Diagnostic::new(severity)
            .with_message(self.message.clone())
            .with_labels(labels)
            .with_notes(self.notes.clone())
    }
}
