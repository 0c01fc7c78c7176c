//! Sections summarized as "ticked labels, then answers": major events,
//! ongoing problems and nutrition.

use super::{lines_or, SummaryBuilder};
use crate::intake::IntakeDocument;
use crate::selectors::SectionKey;

pub struct ChecklistSummary {
    key: SectionKey,
    /// Matches a lower-cased, trimmed section name.
    matches: fn(&str) -> bool,
    ticked_prefix: &'static str,
    fallback: &'static [&'static str],
}

pub const MAJOR_EVENTS: ChecklistSummary = ChecklistSummary {
    key: SectionKey::MajorEvents,
    matches: |name| name.replace(['/', ' '], "") == "surgeriesmajorevents",
    ticked_prefix: "Ticked Events",
    fallback: &["No major events found."],
};

pub const ONGOING_PROBLEMS: ChecklistSummary = ChecklistSummary {
    key: SectionKey::OngoingMedicalProblems,
    matches: |name| name == "reason for visit/ongoing medical problems",
    ticked_prefix: "Ticked Problems",
    fallback: &["No ongoing medical problems found."],
};

pub const NUTRITION_HISTORY: ChecklistSummary = ChecklistSummary {
    key: SectionKey::NutritionHistory,
    matches: |name| {
        name.contains("nutrition") || name.contains("diet") || name.contains("supplement")
    },
    ticked_prefix: "Ticked",
    fallback: &["No nutrition history found."],
};

impl SummaryBuilder for ChecklistSummary {
    fn key(&self) -> SectionKey {
        self.key
    }

    fn placeholders(&self) -> &'static [&'static str] {
        self.fallback
    }

    fn build(&self, doc: &IntakeDocument) -> String {
        let mut ticked = Vec::new();
        let mut answers = Vec::new();
        for section in doc.sections_where(self.matches) {
            ticked.extend(section.ticked_labels());
            answers.extend(section.qa_lines());
        }

        let mut lines = Vec::with_capacity(answers.len() + 1);
        if !ticked.is_empty() {
            lines.push(format!("{}: {}", self.ticked_prefix, ticked.join(", ")));
        }
        lines.extend(answers);
        lines_or(lines, self.fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> IntakeDocument {
        IntakeDocument::from_json(json).unwrap()
    }

    #[test]
    fn major_events_ignore_separators_in_section_name() {
        let d = doc(r#"{"pages": [{
            "sections": [{"section": "Surgeries / Major Events", "checkboxes": [
                {"label": "Appendectomy", "status": "ticked"},
                {"label": "Hip replacement", "status": "TICKED"},
                {"label": "Stroke", "status": "unticked"}
            ]}],
            "responses": [{"section": "SURGERIES/MAJOR EVENTS", "questions": [
                {"question": "Year of surgery", "answer": "2019"}
            ]}]
        }]}"#);

        assert_eq!(
            MAJOR_EVENTS.build(&d),
            "Ticked Events: Appendectomy, Hip replacement\nYear of surgery: 2019"
        );
    }

    #[test]
    fn ongoing_problems_list_ticked_then_answers() {
        let d = doc(r#"{"pages": [{"sections": [{
            "section": "Reason for Visit/Ongoing Medical Problems",
            "questions": [{"question": "Other", "answer": "Fatigue"}],
            "checkboxes": [{"label": "Hot flashes", "status": "ticked"}]
        }]}]}"#);
        assert_eq!(
            ONGOING_PROBLEMS.build(&d),
            "Ticked Problems: Hot flashes\nOther: Fatigue"
        );
    }

    #[test]
    fn nutrition_collects_every_matching_section() {
        let d = doc(r#"{"pages": [{
            "sections": [{"section": "Supplements", "checkboxes": [{"label": "Vitamin D", "status": "ticked"}]}],
            "responses": [{"section": "Nutrition History", "questions": [{"question": "Diet type", "answer": "Keto"}]},
                          {"section": "Exercise", "questions": [{"question": "Days/Week", "answer": "3"}]}]
        }]}"#);
        assert_eq!(NUTRITION_HISTORY.build(&d), "Ticked: Vitamin D\nDiet type: Keto");
    }

    #[test]
    fn nothing_relevant_is_fallback() {
        let d = doc(r#"{"pages": [{"sections": [{"section": "Nutrition"}]}]}"#);
        for builder in [MAJOR_EVENTS, ONGOING_PROBLEMS, NUTRITION_HISTORY] {
            let text = builder.build(&d);
            assert!(builder.is_placeholder(&text), "{text}");
        }
    }
}
