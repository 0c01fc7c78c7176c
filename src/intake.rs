//! Intake document model (the extractor's JSON output) and gender detection.
//!
//! Deserialization is lenient: absent keys are empty, malformed list entries
//! are dropped and scalar answers are rendered as text.

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Cannot read intake document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Intake document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeDocument {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub pages: Vec<IntakePage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakePage {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub sections: Vec<IntakeSection>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub responses: Vec<IntakeResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeSection {
    #[serde(default, deserialize_with = "lenient_text")]
    pub section: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub questions: Vec<QuestionAnswer>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub checkboxes: Vec<Checkbox>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeResponse {
    #[serde(default, deserialize_with = "lenient_text")]
    pub section: String,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub questions: Vec<QuestionAnswer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionAnswer {
    #[serde(default, deserialize_with = "lenient_text")]
    pub question: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub answer: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Checkbox {
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
}

impl Checkbox {
    pub fn is_ticked(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("ticked")
    }
}

/// Any JSON value as text: strings verbatim, `null` empty, arrays joined.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Borrowed view over a `sections` or `responses` entry.
#[derive(Debug, Clone, Copy)]
pub struct SectionView<'a> {
    pub name: &'a str,
    pub questions: &'a [QuestionAnswer],
    pub checkboxes: &'a [Checkbox],
}

impl<'a> SectionView<'a> {
    /// Non-empty answers as `"<question>: <answer>"`.
    pub fn qa_lines(&self) -> impl Iterator<Item = String> + 'a {
        self.questions.iter().filter_map(|qa| {
            let answer = qa.answer.trim();
            (!answer.is_empty()).then(|| format!("{}: {}", qa.question.trim(), answer))
        })
    }

    /// Labels of ticked checkboxes.
    pub fn ticked_labels(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.checkboxes
            .iter()
            .filter(|cb| cb.is_ticked())
            .map(|cb| cb.label.trim())
            .filter(|l| !l.is_empty())
    }
}

impl IntakeDocument {
    pub fn from_json(raw: &str) -> Result<Self, IntakeError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, IntakeError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Every section and response entry, in page order (sections before responses).
    pub fn all_sections(&self) -> impl Iterator<Item = SectionView<'_>> {
        self.pages.iter().flat_map(|page| {
            let sections = page.sections.iter().map(|s| SectionView {
                name: s.section.as_str(),
                questions: &s.questions,
                checkboxes: &s.checkboxes,
            });
            let responses = page.responses.iter().map(|r| SectionView {
                name: r.section.as_str(),
                questions: &r.questions,
                checkboxes: &[],
            });
            sections.chain(responses)
        })
    }

    /// Sections whose trimmed name satisfies `matches` (given lower-cased).
    pub fn sections_where<'a>(
        &'a self,
        matches: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = SectionView<'a>> + 'a {
        self.all_sections()
            .filter(move |s| matches(&s.name.trim().to_lowercase()))
    }

    /// Sections named `name`, case-insensitively.
    pub fn sections_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = SectionView<'a>> + 'a {
        let wanted = name.trim().to_lowercase();
        self.sections_where(move |n| n == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Female => write!(f, "female"),
            Self::Male => write!(f, "male"),
        }
    }
}

/// From "Female/Male Patient Information" sections; Female wins when both appear.
pub fn detect_gender(doc: &IntakeDocument) -> Option<Gender> {
    let mut found = None;
    for section in doc.all_sections() {
        match section.name.trim().to_lowercase().as_str() {
            "female patient information" => found = Some(Gender::Female),
            "male patient information" if found != Some(Gender::Female) => {
                found = Some(Gender::Male)
            }
            _ => {}
        }
    }
    found
}
