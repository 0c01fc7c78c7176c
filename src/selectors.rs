//! Declarative selector tables for the records application.
//!
//! Nothing here is mutated at runtime; every default can be overridden from
//! the settings file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::browser::Locator;

/// Stable identifier of an editable chart section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    FamilyHistory,
    SocialHistory,
    OngoingMedicalProblems,
    MajorEvents,
    NutritionHistory,
    PreventiveCare,
}

impl SectionKey {
    pub const ALL: [SectionKey; 6] = [
        SectionKey::FamilyHistory,
        SectionKey::SocialHistory,
        SectionKey::OngoingMedicalProblems,
        SectionKey::MajorEvents,
        SectionKey::NutritionHistory,
        SectionKey::PreventiveCare,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FamilyHistory => "family_history",
            Self::SocialHistory => "social_history",
            Self::OngoingMedicalProblems => "ongoing_medical_problems",
            Self::MajorEvents => "major_events",
            Self::NutritionHistory => "nutrition_history",
            Self::PreventiveCare => "preventive_care",
        }
    }
}

impl std::fmt::Display for SectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to find each affordance of one editable section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSelectorSet {
    pub section_container: Locator,
    /// Searched inside each container.
    pub add_button: Locator,
    /// Searched inside each container.
    pub edit_button: Locator,
    pub textarea_candidates: Vec<Locator>,
    pub save_button_candidates: Vec<Locator>,
    /// Rendered view of the saved text; empty means "read the container".
    #[serde(default)]
    pub view_text_candidates: Vec<Locator>,
}

fn data_element(name: &str) -> Locator {
    Locator::css(format!("[data-element='{name}']"))
}

fn history_field(container: &str, textarea: &str) -> UiSelectorSet {
    UiSelectorSet {
        section_container: data_element(container),
        add_button: data_element("past-medical-history-field-add-button"),
        edit_button: data_element("past-medical-history-field-item-0"),
        textarea_candidates: vec![data_element(textarea)],
        save_button_candidates: vec![data_element("btn-save")],
        view_text_candidates: Vec::new(),
    }
}

/// Built-in selector bundle per section.
pub fn default_section_selectors() -> BTreeMap<SectionKey, UiSelectorSet> {
    let mut map = BTreeMap::new();
    map.insert(
        SectionKey::FamilyHistory,
        UiSelectorSet {
            section_container: data_element("family-health-history-card"),
            add_button: data_element("add-family-history-button"),
            edit_button: data_element("family-health-history-card-list-item-button"),
            textarea_candidates: vec![data_element("family-health-history-text-area")],
            save_button_candidates: vec![data_element("btn-save")],
            view_text_candidates: Vec::new(),
        },
    );

    let mut social = history_field("socialHistory-section", "socialHistory-detail-text-area");
    social
        .textarea_candidates
        .push(data_element("behavioral-health-text-area"));
    social.textarea_candidates.push(Locator::css("textarea"));
    social
        .save_button_candidates
        .push(data_element("btn-social-health-save"));
    social
        .view_text_candidates
        .push(data_element("socialHistory-detail-view-text"));
    map.insert(SectionKey::SocialHistory, social);

    map.insert(
        SectionKey::OngoingMedicalProblems,
        history_field(
            "ongoingMedicalProblems-section",
            "ongoingMedicalProblems-detail-text-area",
        ),
    );
    map.insert(
        SectionKey::MajorEvents,
        history_field("events-section", "events-detail-text-area"),
    );
    map.insert(
        SectionKey::NutritionHistory,
        history_field("nutritionHistory-section", "nutritionHistory-detail-text-area"),
    );
    map.insert(
        SectionKey::PreventiveCare,
        history_field("preventiveCare-section", "preventiveCare-detail-text-area"),
    );
    map
}

// ──────────────────────────────────────────────
// Class-token predicates
// ──────────────────────────────────────────────

/// Element class filter: every `required` token present, no `forbidden` token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPredicate {
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub forbidden: Vec<String>,
}

fn default_tag() -> String {
    "button".to_string()
}

impl ClassPredicate {
    pub fn new(required: &[&str], forbidden: &[&str]) -> Self {
        Self {
            tag: default_tag(),
            required: required.iter().map(|s| s.to_string()).collect(),
            forbidden: forbidden.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// In-process check against an element's class attribute.
    pub fn matches(&self, class_attr: &str) -> bool {
        let tokens: Vec<&str> = class_attr.split_whitespace().collect();
        self.required.iter().all(|r| tokens.contains(&r.as_str()))
            && !self.forbidden.iter().any(|f| tokens.contains(&f.as_str()))
    }

    /// XPath condition (without brackets) equivalent to [`matches`](Self::matches).
    pub fn xpath_condition(&self) -> String {
        let has = |t: &String| {
            format!("contains(concat(' ', normalize-space(@class), ' '), ' {t} ')")
        };
        let mut parts: Vec<String> = self.required.iter().map(has).collect();
        parts.extend(self.forbidden.iter().map(|t| format!("not({})", has(t))));
        if parts.is_empty() {
            "true()".to_string()
        } else {
            parts.join(" and ")
        }
    }

    /// `tag[condition]` step for use in larger XPath expressions.
    pub fn xpath_step(&self) -> String {
        format!("{}[{}]", self.tag, self.xpath_condition())
    }
}

// ──────────────────────────────────────────────
// Page landmarks
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilitySelectors {
    pub trigger: Locator,
    pub container: Locator,
    pub selection_text: Locator,
    pub listbox: Locator,
    pub options: Locator,
    pub fallback_triggers: Vec<Locator>,
}

impl Default for FacilitySelectors {
    fn default() -> Self {
        Self {
            trigger: data_element("facility-select-button"),
            container: Locator::css(".composable-select"),
            selection_text: Locator::css(".composable-select__single-value"),
            listbox: Locator::css("[role='listbox']"),
            options: Locator::css("[role='option'], .composable-select__option"),
            fallback_triggers: vec![
                Locator::css(".composable-select__control"),
                Locator::css("[role='combobox']"),
                Locator::css(".composable-select"),
                data_element("dropdown-trigger"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSelectors {
    pub overlays: Vec<Locator>,
    pub popup_close: Vec<Locator>,
    pub schedule_link: Locator,
    pub filter_toggle: Locator,
    pub appointments_tab: Locator,
    /// Stable id of the date display the day buttons flank.
    pub date_anchor_id: String,
    pub date_container_xpath: String,
    pub previous_day: ClassPredicate,
    pub next_day: ClassPredicate,
    pub facility: FacilitySelectors,
    pub results_links: Locator,
    pub results_table: Locator,
    pub timeline_table: Locator,
    pub intake_links: Locator,
    pub download_button: Locator,
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self {
            overlays: [
                ".spinner-overlay.is-active",
                ".spinner-overlay",
                ".loading",
                ".busy",
                ".pf-spinner",
            ]
            .into_iter()
            .map(Locator::css)
            .collect(),
            popup_close: vec![
                data_element("btn-close"),
                data_element("modal-close-button"),
                Locator::css("[role='dialog'] button[aria-label='Close']"),
                Locator::css(".modal-header .close"),
            ],
            schedule_link: Locator::id("ember43"),
            filter_toggle: data_element("btn-filter-options"),
            appointments_tab: data_element("scheduler-tab-0"),
            date_anchor_id: "date-picker-button".to_string(),
            date_container_xpath: "ancestor::div[contains(@class,'item--TBn') and contains(@class,'box-fixed')]\
//div[contains(@class,'flex-row')][.//button[@id='date-picker-button']][1]"
                .to_string(),
            previous_day: ClassPredicate::new(&["btn-sm", "border--LRn", "rotate-180"], &[]),
            next_day: ClassPredicate::new(&["btn-sm"], &["border--LRn", "rotate-180"]),
            facility: FacilitySelectors::default(),
            results_table: Locator::css("table.data-table__grid"),
            results_links: Locator::css("table.data-table__grid a[href]"),
            timeline_table: data_element("timeline-events-table"),
            intake_links: Locator::xpath(
                ".//*[@data-element='document-type'][contains(@class,'text-color-link') \
and contains(@class,'text-truncate')]\
[contains(translate(normalize-space(.),'ABCDEFGHIJKLMNOPQRSTUVWXYZ','abcdefghijklmnopqrstuvwxyz'),'intake')]",
            ),
            download_button: data_element("download-doc-btn"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_section_has_selectors() {
        let map = default_section_selectors();
        for key in SectionKey::ALL {
            let set = map.get(&key).unwrap();
            assert!(!set.textarea_candidates.is_empty(), "{key}");
            assert!(!set.save_button_candidates.is_empty(), "{key}");
        }
    }

    #[test]
    fn section_key_serializes_snake_case() {
        let json = serde_json::to_string(&SectionKey::OngoingMedicalProblems).unwrap();
        assert_eq!(json, "\"ongoing_medical_problems\"");
        assert_eq!(SectionKey::MajorEvents.as_str(), "major_events");
    }

    #[test]
    fn class_predicate_matches_whole_tokens() {
        let prev = ClassPredicate::new(&["btn-sm", "rotate-180"], &[]);
        assert!(prev.matches("btn btn-sm rotate-180 border--LRn"));
        assert!(!prev.matches("btn btn-sm-wide rotate-180"));

        let next = ClassPredicate::new(&["btn-sm"], &["rotate-180"]);
        assert!(next.matches("btn-sm"));
        assert!(!next.matches("btn-sm rotate-180"));
    }

    #[test]
    fn class_predicate_renders_xpath() {
        let next = ClassPredicate::new(&["btn-sm"], &["rotate-180"]);
        assert_eq!(
            next.xpath_step(),
            "button[contains(concat(' ', normalize-space(@class), ' '), ' btn-sm ') \
and not(contains(concat(' ', normalize-space(@class), ' '), ' rotate-180 '))]"
        );
    }

    #[test]
    fn page_selectors_partial_json_keeps_defaults() {
        let json = r##"{"schedule_link": {"using": "css", "value": "#schedule"}}"##;
        let sel: PageSelectors = serde_json::from_str(json).unwrap();
        assert_eq!(sel.schedule_link, Locator::css("#schedule"));
        assert_eq!(sel.date_anchor_id, "date-picker-button");
        assert_eq!(sel.overlays.len(), 5);
    }
}
