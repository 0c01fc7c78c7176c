use super::{lines_or, SummaryBuilder};
use crate::intake::{Gender, IntakeDocument};
use crate::selectors::SectionKey;

const FALLBACK: &str = "No preventive care details found.";

const SECTION_NAMES: [&str; 3] = [
    "pregnancy history/preventative care",
    "preventative care",
    "preventive care",
];

pub struct PreventiveCareSummary;

/// Preventive care is only written for patients with a female information section.
pub fn applies_to(gender: Option<Gender>) -> bool {
    gender == Some(Gender::Female)
}

impl SummaryBuilder for PreventiveCareSummary {
    fn key(&self) -> SectionKey {
        SectionKey::PreventiveCare
    }

    fn placeholders(&self) -> &'static [&'static str] {
        &[FALLBACK]
    }

    fn build(&self, doc: &IntakeDocument) -> String {
        let mut lines = Vec::new();
        for section in doc.sections_where(|name| SECTION_NAMES.iter().any(|n| *n == name)) {
            lines.extend(section.qa_lines());
            lines.extend(section.ticked_labels().map(str::to_string));
        }
        lines_or(lines, FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::detect_gender;

    const FEMALE_INTAKE: &str = r#"{"pages": [{
        "sections": [
            {"section": "Female Patient Information"},
            {"section": "PREGNANCY HISTORY/PREVENTATIVE CARE",
             "questions": [{"question": "Last mammogram", "answer": "2025"}],
             "checkboxes": [{"label": "Pap smear up to date", "status": "ticked"}]}
        ]
    }]}"#;

    #[test]
    fn answers_then_ticked_labels() {
        let doc = IntakeDocument::from_json(FEMALE_INTAKE).unwrap();
        assert_eq!(
            PreventiveCareSummary.build(&doc),
            "Last mammogram: 2025\nPap smear up to date"
        );
    }

    #[test]
    fn gate_requires_female_section() {
        let female = IntakeDocument::from_json(FEMALE_INTAKE).unwrap();
        assert!(applies_to(detect_gender(&female)));

        let male = IntakeDocument::from_json(
            r#"{"pages": [{"sections": [{"section": "Male Patient Information"}]}]}"#,
        )
        .unwrap();
        assert!(!applies_to(detect_gender(&male)));
        assert!(!applies_to(None));
    }
}
