use std::collections::HashSet;

use crate::config::Timeouts;
use crate::error::AutomationError;
use crate::interaction::Interactor;
use crate::routes::{is_patient_summary_route, PatientLink};

/// Collect patient summary links from the schedule results table.
///
/// A missing table (after a bounded wait) is an empty schedule, not an error.
/// Order of first appearance is kept; repeats and id-less links are dropped.
pub fn collect_patient_links(ui: &Interactor<'_>) -> Result<Vec<PatientLink>, AutomationError> {
    let selectors = ui.selectors();
    let table_wait = Timeouts::ms(ui.timeouts().table_ms);
    if ui.wait_present(&selectors.results_table, table_wait)?.is_none() {
        tracing::info!("Results table not found, no patients to process");
        return Ok(Vec::new());
    }

    let anchors = match ui.browser().find_all(&selectors.results_links) {
        Ok(found) => found,
        Err(e) if e.is_session_lost() => return Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read result links");
            return Ok(Vec::new());
        }
    };

    let mut hrefs = Vec::with_capacity(anchors.len());
    for anchor in &anchors {
        match ui.browser().attribute(anchor, "href") {
            Ok(Some(href)) => hrefs.push(href),
            Ok(None) => {}
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => tracing::debug!(error = %e, "Skipping unreadable link"),
        }
    }

    let links = summary_links(hrefs);
    tracing::info!(
        anchors = anchors.len(),
        patients = links.len(),
        "Harvested patient links"
    );
    Ok(links)
}

/// Filter to patient summary routes, de-duplicated in encounter order.
pub fn summary_links(hrefs: impl IntoIterator<Item = String>) -> Vec<PatientLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in hrefs {
        if !is_patient_summary_route(&href) || !seen.insert(href.clone()) {
            continue;
        }
        match PatientLink::from_href(&href) {
            Some(link) => links.push(link),
            None => tracing::warn!(href = %href, "Summary link without patient id, skipped"),
        }
    }
    links
}
