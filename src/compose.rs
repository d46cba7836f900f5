// Renders discovery and reminder notifications.
//
// Everything in this module is a pure function from catalog records to a
// subject/body pair; delivery lives in `mailer`.
use crate::model::{CtfDetail, CtfSummary};
use chrono::{DateTime, Utc};

/// Fixed origin of the public event pages, also used to complete
/// root-relative artwork references.
pub const EVENT_ORIGIN: &str = "https://ctf.hackthebox.com";

/// A rendered notification: HTML body plus a plain-text fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Render the one-shot alert for a newly discovered eligible CTF.
pub fn compose_discovery(
    summary: &CtfSummary,
    detail: &CtfDetail,
    token: Option<&str>,
) -> Message {
    let org = summary
        .org_name
        .as_deref()
        .or(detail.org_name.as_deref())
        .unwrap_or("Unknown");
    let starts = format_timestamp(summary.starts_at.as_deref().or(detail.starts_at.as_deref()));
    let ends = format_timestamp(summary.ends_at.as_deref().or(detail.ends_at.as_deref()));
    let url = event_url(&summary.slug);
    let banner = choose_banner(detail, summary);

    let mut html = format!(
        "<h2>🟢 New HackTheBox CTF Detected!</h2>\n\
         <p><b>{}</b></p>\n\
         <p><b>Organiser:</b> {}<br>\n\
            <b>Starts:</b> {}<br>\n\
            <b>Ends:</b> {}<br>\n\
            <a href=\"{}\">View on HackTheBox</a></p>\n",
        summary.name, org, starts, ends, url
    );
    let mut text = format!(
        "New HackTheBox CTF: {}\nOrganiser: {}\nStarts: {}\nEnds: {}\n",
        summary.name, org, starts, ends
    );

    if let Some(token) = token {
        html.push_str(&format!(
            "<p><b>🔑 Access Token:</b> <code>{}</code></p>\n",
            token
        ));
        text.push_str(&format!("Access token: {}\n", token));
    }
    if let Some(banner) = banner {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"CTF banner\" width=\"500\"><br>\n",
            banner
        ));
    }
    text.push_str(&url);

    Message {
        subject: format!("New HTB CTF: {}", summary.name),
        text,
        html,
    }
}

/// Render the single look-ahead reminder for a tracked CTF.
pub fn compose_reminder(name: &str, slug: &str) -> Message {
    let url = event_url(slug);
    Message {
        subject: format!("Starting soon: {}", name),
        text: format!("{} is about to start.\n{}", name, url),
        html: format!(
            "<h2>⏰ CTF Starting Soon</h2>\n\
             <p><b>{}</b> is about to start.</p>\n\
             <p><a href=\"{}\">View on HackTheBox</a></p>\n",
            name, url
        ),
    }
}

fn event_url(slug: &str) -> String {
    format!("{}/event/{}", EVENT_ORIGIN, slug)
}

/// Fixed, unambiguous UTC rendering for catalog timestamps. Missing values
/// render as a literal placeholder; an unparseable value is echoed verbatim
/// rather than dropped.
fn format_timestamp(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return "Unknown".to_string();
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M UTC")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Pick the event artwork: for each known key the detail's value is preferred
/// over the summary's, and the first candidate that resolves to an absolute
/// reference wins.
fn choose_banner(detail: &CtfDetail, summary: &CtfSummary) -> Option<String> {
    for (d, s) in detail
        .images
        .candidates()
        .into_iter()
        .zip(summary.images.candidates())
    {
        let candidate = d
            .filter(|v| !v.trim().is_empty())
            .or(s.filter(|v| !v.trim().is_empty()));
        if let Some(value) = candidate
            && let Some(resolved) = resolve_image_url(value.trim())
        {
            return Some(resolved);
        }
    }
    None
}

/// Resolution order for artwork references: scheme-prefixed pass through,
/// protocol-relative gain https, root-relative gain the catalog origin, and
/// anything else is discarded.
fn resolve_image_url(value: &str) -> Option<String> {
    if value.starts_with("https://") || value.starts_with("http://") {
        Some(value.to_string())
    } else if value.starts_with("//") {
        Some(format!("https:{}", value))
    } else if value.starts_with('/') {
        Some(format!("{}{}", EVENT_ORIGIN, value))
    } else {
        None
    }
}
