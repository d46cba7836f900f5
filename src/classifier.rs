// Eligibility classification and access-token extraction.
//
// A CTF qualifies for a notification when it is publicly joinable, or when it
// gates entry behind a code that the organizer published somewhere in the
// event's free text. Extraction is a heuristic: an unrecognized phrasing is a
// false negative and an unrelated matching string is a false positive; both
// are accepted, not defects.
use crate::model::CtfDetail;
use once_cell::sync::Lazy;
use regex::Regex;

// URL query parameters take precedence over labeled phrases.
static URL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[?&](?:code|token|access_code|invite)=([A-Za-z0-9_\-]{4,80})").unwrap()
});

static LABELED_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:token|access\s*(?:code|key)|join\s*code|join\s*key|invite\s*code)\s*[:=\-]?\s*([A-Za-z0-9_\-]{4,40})",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub eligible: bool,
    pub token: Option<String>,
}

/// Decide whether a CTF qualifies for a notification.
///
/// Open events (no `hasCode` flag) are always eligible and no token search is
/// performed. Gated events are eligible only when a token can be extracted;
/// otherwise they are reclassified on every future run, because organizers
/// routinely publish the code after the initial announcement.
pub fn classify(detail: &CtfDetail) -> Classification {
    if !detail.requires_code() {
        return Classification {
            eligible: true,
            token: None,
        };
    }

    match extract_token(&detail.joined_text()) {
        Some(token) => Classification {
            eligible: true,
            token: Some(token),
        },
        None => Classification {
            eligible: false,
            token: None,
        },
    }
}

/// Pull an access token out of free text. First match wins, URL pattern first.
pub fn extract_token(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    URL_TOKEN_RE
        .captures(text)
        .or_else(|| LABELED_TOKEN_RE.captures(text))
        .map(|caps| caps[1].to_string())
}
