use std::sync::LazyLock;

use regex::Regex;

use super::{lines_or, SummaryBuilder};
use crate::intake::{IntakeDocument, QuestionAnswer};
use crate::selectors::SectionKey;

const NOT_FOUND: &str = "No family history found.";
const NO_DETAILS: &str = "No family history details available.";

static AGE_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(.+?)\s+age\s*:?\s*$").unwrap());

pub struct FamilyHistorySummary;

/// `"<relative> Age"` → relative.
fn relative_of_age_question(question: &str) -> Option<&str> {
    AGE_QUESTION
        .captures(question)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn is_condition_question_for(question: &str, relative: &str) -> bool {
    let q = question.trim().to_lowercase();
    q.starts_with(&relative.to_lowercase()) && q.contains("medical condition")
}

fn qa_line(qa: &QuestionAnswer) -> Option<String> {
    let answer = qa.answer.trim();
    (!answer.is_empty()).then(|| format!("{}: {}", qa.question.trim(), answer))
}

fn question_lines(questions: &[QuestionAnswer]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < questions.len() {
        let current = &questions[i];
        if let (Some(relative), Some(next)) =
            (relative_of_age_question(&current.question), questions.get(i + 1))
        {
            let age = current.answer.trim();
            let conditions = next.answer.trim();
            if is_condition_question_for(&next.question, relative)
                && !age.is_empty()
                && !conditions.is_empty()
            {
                lines.push(format!("{relative}: Age {age}; Conditions: {conditions}"));
                i += 2;
                continue;
            }
        }
        lines.extend(qa_line(current));
        i += 1;
    }
    lines
}

impl SummaryBuilder for FamilyHistorySummary {
    fn key(&self) -> SectionKey {
        SectionKey::FamilyHistory
    }

    fn placeholders(&self) -> &'static [&'static str] {
        &[NOT_FOUND, NO_DETAILS]
    }

    fn build(&self, doc: &IntakeDocument) -> String {
        let sections: Vec<_> = doc.sections_named("family history").collect();
        if sections.is_empty() {
            return NOT_FOUND.to_string();
        }
        let mut lines = Vec::new();
        for section in sections {
            lines.extend(question_lines(section.questions));
            lines.extend(section.ticked_labels().map(str::to_string));
        }
        lines_or(lines, NO_DETAILS)
    }
}
