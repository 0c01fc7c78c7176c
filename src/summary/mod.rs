//! Intake document → chart section text.
//!
//! Builders are pure and independent of each other. Each has a fallback
//! string returned when there is nothing to say (or the document cannot be
//! loaded); fallbacks are recognised as placeholders and never written.

mod checklist;
mod family;
mod preventive;
mod social;

use std::path::Path;

use crate::intake::IntakeDocument;
use crate::selectors::SectionKey;

pub use checklist::{ChecklistSummary, MAJOR_EVENTS, NUTRITION_HISTORY, ONGOING_PROBLEMS};
pub use family::FamilyHistorySummary;
pub use preventive::{applies_to, PreventiveCareSummary};
pub use social::{CategorySummaryState, SocialHistorySummary};

pub trait SummaryBuilder {
    fn key(&self) -> SectionKey;

    /// Placeholder texts this builder emits; the first is the load-failure fallback.
    fn placeholders(&self) -> &'static [&'static str];

    fn build(&self, doc: &IntakeDocument) -> String;

    fn fallback(&self) -> &'static str {
        self.placeholders().first().copied().unwrap_or("")
    }

    fn is_placeholder(&self, text: &str) -> bool {
        let text = text.trim();
        text.is_empty() || self.placeholders().contains(&text)
    }

    /// Build from a JSON file; unreadable or malformed input yields the fallback.
    fn summarize_file(&self, path: &Path) -> String {
        match IntakeDocument::load(path) {
            Ok(doc) => self.build(&doc),
            Err(e) => {
                tracing::warn!(
                    section = self.key().as_str(),
                    path = %path.display(),
                    error = %e,
                    "Intake document unusable, using fallback"
                );
                self.fallback().to_string()
            }
        }
    }
}

/// Builder for a chart section.
pub fn builder_for(key: SectionKey) -> Box<dyn SummaryBuilder> {
    match key {
        SectionKey::FamilyHistory => Box::new(FamilyHistorySummary),
        SectionKey::SocialHistory => Box::new(SocialHistorySummary),
        SectionKey::OngoingMedicalProblems => Box::new(ONGOING_PROBLEMS),
        SectionKey::MajorEvents => Box::new(MAJOR_EVENTS),
        SectionKey::NutritionHistory => Box::new(NUTRITION_HISTORY),
        SectionKey::PreventiveCare => Box::new(PreventiveCareSummary),
    }
}

/// Join non-empty lines, or return `fallback`.
fn lines_or(lines: Vec<String>, fallback: &str) -> String {
    if lines.is_empty() {
        fallback.to_string()
    } else {
        lines.join("\n")
    }
}
