use std::fmt;

/// A non-fatal observation made while reading a statement.
///
/// Diagnostics are logged as they happen and also returned to the caller;
/// they never change control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Charset analysis was not confident enough; the first fallback was used.
    LowConfidence { guessed: String, confidence: f32 },
    /// Charset analysis failed outright; the first fallback was used.
    AnalyzerFailed(String),
    /// No header row among the scanned lines; line 0 was used.
    HeaderNotFound,
    /// Canonical columns still absent after alias resolution.
    MissingColumns(Vec<&'static str>),
    /// The file holds nothing but whitespace.
    EmptyInput,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::LowConfidence { guessed, confidence } => write!(
                f,
                "low charset confidence ({confidence:.2}, guessed {guessed}); using fallback chain"
            ),
            Diagnostic::AnalyzerFailed(reason) => {
                write!(f, "charset analysis failed ({reason}); using fallback chain")
            }
            Diagnostic::HeaderNotFound => write!(f, "header row not found; reading from line 0"),
            Diagnostic::MissingColumns(cols) => {
                write!(f, "missing required columns: {}", cols.join(", "))
            }
            Diagnostic::EmptyInput => write!(f, "empty file"),
        }
    }
}
