//! Record types flowing through the pipeline

/// Primary key of a source row
///
/// Must be unique and totally ordered; offset pagination orders by it.
pub type SourceId = i64;

/// A row read from the source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: SourceId,
    pub text: String,
}

impl SourceRecord {
    pub fn new(id: SourceId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Language code produced by a classifier, e.g. "en"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// A row written to the target table, one per consumed [`SourceRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub source_id: SourceId,
    pub cleaned_text: String,
    /// `None` when the text was empty after cleaning or classification failed
    pub language: Option<LanguageCode>,
}

impl ResultRecord {
    /// Language as stored in the target column; empty when unclassified
    pub fn language_str(&self) -> &str {
        self.language.as_ref().map(LanguageCode::as_str).unwrap_or("")
    }
}
