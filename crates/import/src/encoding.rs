use std::fmt;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use thiserror::Error;

use crate::diagnostic::Diagnostic;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Guesses below this confidence are replaced by the first fallback.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

/// A text encoding the reader can decode with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, with a leading byte-order mark stripped if present.
    Utf8Sig,
    /// Strict UTF-8; a byte-order mark is kept as U+FEFF.
    Utf8,
    /// Windows code page 932 (Shift_JIS with Microsoft extensions).
    Cp932,
    /// Anything else the charset analyzer may report.
    Other(&'static Encoding),
}

impl TextEncoding {
    /// Fixed fallback order, tried after the detected encoding.
    pub const FALLBACKS: [TextEncoding; 3] =
        [TextEncoding::Utf8Sig, TextEncoding::Utf8, TextEncoding::Cp932];

    fn from_encoding_rs(encoding: &'static Encoding) -> Self {
        if encoding == UTF_8 {
            TextEncoding::Utf8
        } else if encoding == SHIFT_JIS {
            TextEncoding::Cp932
        } else {
            TextEncoding::Other(encoding)
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Cp932 => "cp932",
            TextEncoding::Other(enc) => enc.name(),
        }
    }

    /// Strict decode; `None` if any byte sequence is malformed.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                std::str::from_utf8(body).ok().map(str::to_owned)
            }
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Cp932 => SHIFT_JIS
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
            TextEncoding::Other(enc) => enc
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }

    /// `self` followed by the fallbacks it is not already one of.
    pub fn chain(self) -> Vec<TextEncoding> {
        std::iter::once(self)
            .chain(Self::FALLBACKS.into_iter().filter(|e| *e != self))
            .collect()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Charset analysis ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Charset analyzer error: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharsetGuess {
    pub encoding: TextEncoding,
    /// 0.0 = no idea, 1.0 = certain.
    pub confidence: f32,
}

/// Statistical charset inference over raw file bytes.
pub trait CharsetAnalyzer {
    fn analyze(&self, bytes: &[u8]) -> Result<CharsetGuess, AnalyzerError>;
}

/// Default analyzer: BOM sniffing, a strict UTF-8 check, then `chardetng`.
pub struct StatisticalAnalyzer;

impl StatisticalAnalyzer {
    /// chardetng preferred this guess over at least one competing candidate.
    const ASSESSED: f32 = 0.9;
    /// No distinguishing evidence: ASCII-only input, or chardetng fell back to its default.
    const UNASSESSED: f32 = 0.2;
}

impl CharsetAnalyzer for StatisticalAnalyzer {
    fn analyze(&self, bytes: &[u8]) -> Result<CharsetGuess, AnalyzerError> {
        if bytes.starts_with(UTF8_BOM) {
            return Ok(CharsetGuess { encoding: TextEncoding::Utf8Sig, confidence: 1.0 });
        }
        if bytes.is_ascii() {
            // Every candidate decodes ASCII identically; there is nothing to tell apart.
            return Ok(CharsetGuess { encoding: TextEncoding::Utf8, confidence: Self::UNASSESSED });
        }
        if std::str::from_utf8(bytes).is_ok() {
            return Ok(CharsetGuess { encoding: TextEncoding::Utf8, confidence: 0.99 });
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let (encoding, assessed) = detector.guess_assess(None, true);
        Ok(CharsetGuess {
            encoding: TextEncoding::from_encoding_rs(encoding),
            confidence: if assessed { Self::ASSESSED } else { Self::UNASSESSED },
        })
    }
}

/// Result of [`detect`]: the encoding to try first, plus the diagnostic
/// raised when the analyzer could not be trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub encoding: TextEncoding,
    pub diagnostic: Option<Diagnostic>,
}

pub fn detect(bytes: &[u8]) -> Detection {
    detect_with(&StatisticalAnalyzer, bytes)
}

/// Runs `analyzer`; low confidence or failure yields the first fallback.
/// Never fails.
pub fn detect_with<A: CharsetAnalyzer + ?Sized>(analyzer: &A, bytes: &[u8]) -> Detection {
    let fallback = TextEncoding::FALLBACKS[0];
    match analyzer.analyze(bytes) {
        Ok(guess) if guess.confidence >= CONFIDENCE_THRESHOLD => Detection {
            encoding: guess.encoding,
            diagnostic: None,
        },
        Ok(guess) => Detection {
            encoding: fallback,
            diagnostic: Some(Diagnostic::LowConfidence {
                guessed: guess.encoding.label().to_string(),
                confidence: guess.confidence,
            }),
        },
        Err(e) => Detection {
            encoding: fallback,
            diagnostic: Some(Diagnostic::AnalyzerFailed(e.to_string())),
        },
    }
}

/// Decodes with `first`, then each remaining fallback in order.
/// Returns the text with the encoding that succeeded.
pub fn decode_with_fallback(bytes: &[u8], first: TextEncoding) -> Option<(String, TextEncoding)> {
    first
        .chain()
        .into_iter()
        .find_map(|enc| enc.decode(bytes).map(|text| (text, enc)))
}
