//! Per-request options and protocol tags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranslateError};

/// How the input text is cut into sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// One sentence per line; lines are never split further
    Sentence,
    /// One paragraph per line; every line is split into sentences
    Paragraph,
    /// Paragraphs separated by blank lines, with lines inside a paragraph
    /// wrapped and joined before splitting
    #[default]
    WrappedText,
}

/// Validated options attached to a request.
///
/// Unknown keys are rejected when deserializing, so a typo in an adapter's
/// payload surfaces as [`TranslateError::Validation`] instead of being ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslationOptions {
    /// Hypotheses to return per sentence
    pub n_best: usize,

    pub input_format: InputFormat,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            n_best: 1,
            input_format: InputFormat::default(),
        }
    }
}

impl TranslationOptions {
    /// Reads options out of a JSON value handed over by a protocol adapter.
    ///
    /// `null` means "all defaults".
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value).map_err(|err| TranslateError::Validation(err.to_string()))
    }

    pub fn with_n_best(mut self, n_best: usize) -> Self {
        self.n_best = n_best;
        self
    }

    pub fn with_input_format(mut self, input_format: InputFormat) -> Self {
        self.input_format = input_format;
        self
    }

    pub fn validate(&self, max_n_best: usize) -> Result<()> {
        if self.n_best == 0 || self.n_best > max_n_best {
            return Err(TranslateError::Validation(format!(
                "n_best must be between 1 and {max_n_best}, got {}",
                self.n_best
            )));
        }
        Ok(())
    }
}

/// Which wire protocol a request came in through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Bergamot,
    Elg,
    Ug,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Protocol::Bergamot => "bergamot",
            Protocol::Elg => "elg",
            Protocol::Ug => "ug",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = TranslationOptions::default();
        assert_eq!(options.n_best, 1);
        assert_eq!(options.input_format, InputFormat::WrappedText);
        assert!(options.validate(8).is_ok());
    }

    #[test]
    fn test_from_json_reads_known_fields() {
        let options = TranslationOptions::from_json(&json!({
            "n_best": 3,
            "input_format": "sentence"
        }))
        .unwrap();
        assert_eq!(options, TranslationOptions::default().with_n_best(3).with_input_format(InputFormat::Sentence));
    }

    #[test]
    fn test_from_json_null_is_default() {
        let options = TranslationOptions::from_json(&serde_json::Value::Null).unwrap();
        assert_eq!(options, TranslationOptions::default());
    }

    #[test]
    fn test_unknown_option_is_a_validation_error() {
        let err = TranslationOptions::from_json(&json!({ "beam_size": 4 })).unwrap_err();
        assert!(matches!(err, TranslateError::Validation(msg) if msg.contains("beam_size")));
    }

    #[test]
    fn test_wrong_type_is_a_validation_error() {
        let err = TranslationOptions::from_json(&json!({ "n_best": "many" })).unwrap_err();
        assert!(matches!(err, TranslateError::Validation(_)));
    }

    #[test]
    fn test_n_best_bounds() {
        assert!(TranslationOptions::default().with_n_best(0).validate(8).is_err());
        assert!(TranslationOptions::default().with_n_best(9).validate(8).is_err());
        assert!(TranslationOptions::default().with_n_best(8).validate(8).is_ok());
    }

    #[test]
    fn test_protocol_tags() {
        assert_eq!(Protocol::Bergamot.to_string(), "bergamot");
        assert_eq!(serde_json::to_value(Protocol::Elg).unwrap(), json!("elg"));
    }
}
