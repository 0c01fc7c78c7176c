//! Social history: Tobacco, Alcohol, Caffeine and Exercise, plus children and occupation.

use std::collections::BTreeMap;

use super::SummaryBuilder;
use crate::intake::IntakeDocument;
use crate::selectors::SectionKey;

const FALLBACK: &str = "No social history found.";

/// Category name, question fragment and label of its metric.
const CATEGORIES: [(&str, &str, &str); 4] = [
    ("Tobacco", "packs/day", "Packs/Day"),
    ("Alcohol", "drinks/week", "Drinks/Week"),
    ("Caffeine", "cups/day", "Cups/Day"),
    ("Exercise", "days/week", "Days/Week"),
];

const NONE_LIKE: [&str; 5] = ["no", "none", "none/na", "none/ na", "n/a"];

/// Signals gathered for one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorySummaryState {
    /// Ticked Yes (true) or No/none-like (false); Yes wins when both are ticked.
    pub explicit: Option<bool>,
    /// Some other label was ticked.
    pub other_ticked: bool,
    pub metrics: BTreeMap<&'static str, String>,
    pub answered_count: usize,
}

impl CategorySummaryState {
    fn record_tick(&mut self, label: &str) {
        let label = label.trim().to_lowercase();
        if label == "yes" {
            self.explicit = Some(true);
        } else if NONE_LIKE.iter().any(|n| *n == label) {
            if self.explicit.is_none() {
                self.explicit = Some(false);
            }
        } else {
            self.other_ticked = true;
        }
    }

    /// Explicit Yes/No, then another ticked label, then any answer, then No.
    pub fn yes(&self) -> bool {
        self.explicit
            .or(self.other_ticked.then_some(true))
            .or((self.answered_count > 0).then_some(true))
            .unwrap_or(false)
    }

    fn line(&self, category: &str) -> String {
        let status = if self.yes() { "Yes" } else { "No" };
        if self.metrics.is_empty() {
            return format!("{category}: {status}");
        }
        let metrics: Vec<String> = self
            .metrics
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        format!("{category}: {status} ({})", metrics.join("; "))
    }
}

fn is_children_question(q: &str) -> bool {
    q.contains("# of children") || (q.contains("please") && q.contains("children"))
}

pub struct SocialHistorySummary;

impl SocialHistorySummary {
    pub fn category_states(doc: &IntakeDocument) -> Vec<CategorySummaryState> {
        CATEGORIES
            .iter()
            .map(|&(category, fragment, metric)| {
                let mut state = CategorySummaryState::default();
                for section in doc.sections_named(category) {
                    for label in section.ticked_labels() {
                        state.record_tick(label);
                    }
                    for qa in section.questions {
                        let answer = qa.answer.trim();
                        if answer.is_empty() {
                            continue;
                        }
                        state.answered_count += 1;
                        if qa.question.to_lowercase().contains(fragment) {
                            state
                                .metrics
                                .entry(metric)
                                .or_insert_with(|| answer.to_string());
                        }
                    }
                }
                state
            })
            .collect()
    }
}

impl SummaryBuilder for SocialHistorySummary {
    fn key(&self) -> SectionKey {
        SectionKey::SocialHistory
    }

    fn placeholders(&self) -> &'static [&'static str] {
        &[FALLBACK]
    }

    fn build(&self, doc: &IntakeDocument) -> String {
        let mut lines: Vec<String> = Self::category_states(doc)
            .iter()
            .zip(CATEGORIES)
            .map(|(state, (category, _, _))| state.line(category))
            .collect();

        let mut children = None;
        let mut occupation = None;
        for section in doc.all_sections() {
            for qa in section.questions {
                let answer = qa.answer.trim();
                if answer.is_empty() {
                    continue;
                }
                let q = qa.question.to_lowercase();
                if children.is_none() && is_children_question(&q) {
                    children = Some(answer);
                }
                if occupation.is_none() && q.contains("occupation") {
                    occupation = Some(answer);
                }
            }
        }
        if let Some(c) = children {
            lines.push(format!("Children: {c}"));
        }
        if let Some(o) = occupation {
            lines.push(format!("Occupation: {o}"));
        }
        lines.join("\n")
    }
}
