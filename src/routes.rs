//! Patient chart routes: id extraction and summary ↔ timeline rewriting.
//!
//! The application may route through the URL path or through the hash
//! fragment; every function here treats both forms the same way.

use url::Url;

/// Path marker preceding the patient id in chart routes.
pub const PATIENT_ROUTE_MARKER: &str = "/PF/charts/patients/";

/// Timeline view listing documents awaiting signature.
pub const PENDING_VIEW: &str = "pendingdocuments";

/// Timeline view listing signed documents.
pub const SIGNED_VIEW: &str = "signeddocuments";

const SUMMARY_SEGMENT: &str = "summary";

/// A harvested patient chart link; the id is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientLink {
    pub href: String,
    pub patient_id: String,
}

impl PatientLink {
    /// `None` when the href carries no usable patient id.
    pub fn from_href(href: &str) -> Option<Self> {
        let patient_id = extract_patient_id(href);
        if patient_id.is_empty() {
            return None;
        }
        Some(Self {
            href: href.to_string(),
            patient_id,
        })
    }
}

/// `href` split so that `head + route + query + tail == href`, where `route`
/// is whichever part (fragment or path) carries the patient marker.
struct RouteParts<'a> {
    head: &'a str,
    route: &'a str,
    query: &'a str,
    tail: &'a str,
}

impl<'a> RouteParts<'a> {
    fn split(href: &'a str) -> Self {
        let (head, body, tail) = match href.find('#') {
            Some(i) if href[i + 1..].contains(PATIENT_ROUTE_MARKER) => {
                (&href[..=i], &href[i + 1..], "")
            }
            Some(i) => ("", &href[..i], &href[i..]),
            None => ("", href, ""),
        };
        let (route, query) = match body.find('?') {
            Some(i) => body.split_at(i),
            None => (body, ""),
        };
        Self {
            head,
            route,
            query,
            tail,
        }
    }

    fn with_route(&self, route: &str) -> String {
        format!("{}{}{}{}", self.head, route, self.query, self.tail)
    }
}

/// Route text of `href`: the fragment if it holds the marker, else the URL path.
fn route_part(href: &str) -> String {
    if let Ok(parsed) = Url::parse(href) {
        if let Some(fragment) = parsed.fragment() {
            if fragment.contains(PATIENT_ROUTE_MARKER) {
                return fragment.split('?').next().unwrap_or_default().to_string();
            }
        }
        return parsed.path().to_string();
    }
    // Relative href: fall back to plain string handling.
    RouteParts::split(href).route.to_string()
}

/// Percent-decoded route text: the fragment if it holds the marker once
/// decoded, else the URL path.
fn decoded_route(href: &str) -> String {
    let decode =
        |raw: &str| String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned();
    if let Ok(parsed) = Url::parse(href) {
        let fragment = decode(parsed.fragment().unwrap_or_default());
        if fragment.contains(PATIENT_ROUTE_MARKER) {
            return fragment;
        }
        return decode(parsed.path());
    }
    decode(RouteParts::split(href).route)
}

/// First non-empty segment after the marker, decoded and sanitized to
/// `[A-Za-z0-9-]`. Empty when absent.
pub fn extract_patient_id(href: &str) -> String {
    let route = decoded_route(href);
    let Some((_, rest)) = route.split_once(PATIENT_ROUTE_MARKER) else {
        return String::new();
    };
    rest.split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// True when the route holds the marker and its last segment is `summary`
/// (query and trailing slash ignored).
pub fn is_patient_summary_route(href: &str) -> bool {
    let route = route_part(href);
    route.contains(PATIENT_ROUTE_MARKER)
        && route.trim_end_matches('/').rsplit('/').next() == Some(SUMMARY_SEGMENT)
}

/// Replace the trailing `summary` segment with `timeline/<view>`, in the path
/// or fragment, preserving everything else. `None` if `href` is not a summary route.
pub fn to_timeline_route(href: &str, view: &str) -> Option<String> {
    let parts = RouteParts::split(href);
    if !parts.route.contains(PATIENT_ROUTE_MARKER) {
        return None;
    }
    let base = parts
        .route
        .trim_end_matches('/')
        .strip_suffix(SUMMARY_SEGMENT)?;
    if !base.ends_with('/') {
        return None;
    }
    Some(parts.with_route(&format!("{base}timeline/{view}")))
}

/// Inverse of [`to_timeline_route`]: `timeline/<view>` becomes `summary`.
pub fn to_summary_route(href: &str) -> Option<String> {
    let parts = RouteParts::split(href);
    if !parts.route.contains(PATIENT_ROUTE_MARKER) {
        return None;
    }
    let (base, view) = parts.route.trim_end_matches('/').rsplit_once('/')?;
    let base = base.strip_suffix("/timeline")?;
    if view.is_empty() {
        return None;
    }
    Some(parts.with_route(&format!("{base}/{SUMMARY_SEGMENT}")))
}
