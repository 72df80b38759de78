//! Classification stage
//!
//! Cleans a source record's text and asks a classifier for its language.
//! The stage never fails: an empty cleaned text short-circuits to an empty
//! language, and a classifier error is reported in the returned
//! [`Outcome`] so the caller can log it and still emit a result row.

use regex::Regex;

use crate::error::ClassifyError;
use crate::types::{LanguageCode, ResultRecord, SourceRecord};

pub mod ngram;

pub use ngram::NgramClassifier;

/// Text normalisation applied before classification
pub trait TextCleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

impl<F> TextCleaner for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn clean(&self, text: &str) -> String {
        self(text)
    }
}

/// Language detector
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<LanguageCode, ClassifyError>;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> Result<LanguageCode, ClassifyError> + Send + Sync,
{
    fn classify(&self, text: &str) -> Result<LanguageCode, ClassifyError> {
        self(text)
    }
}

/// Removes every match of a pattern
#[derive(Debug, Clone)]
pub struct RegexCleaner {
    pattern: Regex,
}

impl RegexCleaner {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl TextCleaner for RegexCleaner {
    fn clean(&self, text: &str) -> String {
        self.pattern.replace_all(text, "").into_owned()
    }
}

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Detected(LanguageCode),
    /// Nothing left after cleaning; the classifier was not called
    Empty,
    /// The classifier rejected the cleaned text
    Failed(ClassifyError),
}

/// Cleaned text plus classification outcome for one source record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub cleaned_text: String,
    pub outcome: Outcome,
}

impl StageOutput {
    /// Build the result row; empty and failed outcomes get an empty language
    pub fn into_result(self, record: &SourceRecord) -> ResultRecord {
        let language = match self.outcome {
            Outcome::Detected(code) => Some(code),
            Outcome::Empty | Outcome::Failed(_) => None,
        };
        ResultRecord {
            source_id: record.id,
            cleaned_text: self.cleaned_text,
            language,
        }
    }
}

/// Cleaner and classifier applied to each record
pub struct ClassificationStage {
    cleaner: Box<dyn TextCleaner>,
    classifier: Box<dyn Classifier>,
}

impl ClassificationStage {
    pub fn new(cleaner: impl TextCleaner + 'static, classifier: impl Classifier + 'static) -> Self {
        Self {
            cleaner: Box::new(cleaner),
            classifier: Box::new(classifier),
        }
    }

    pub fn evaluate(&self, record: &SourceRecord) -> StageOutput {
        let cleaned_text = self.cleaner.clean(&record.text);

        let outcome = if cleaned_text.is_empty() {
            Outcome::Empty
        } else {
            match self.classifier.classify(&cleaned_text) {
                Ok(code) => Outcome::Detected(code),
                Err(err) => Outcome::Failed(err),
            }
        };

        StageOutput {
            cleaned_text,
            outcome,
        }
    }
}
