// Wire types for the public CTF catalog API.
//
// These records are produced by the catalog and detail fetches and are
// read-only to the rest of the crate. Unknown JSON fields are ignored so
// upstream API additions never break a run.
use serde::{Deserialize, Serialize};

/// Optional artwork references shared by summary and detail records.
///
/// The API is inconsistent about which key carries the event artwork, so all
/// known spellings are kept and probed in order (see `compose`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRefs {
    pub banner: Option<String>,
    pub logo: Option<String>,
    pub avatar: Option<String>,
    pub image: Option<String>,
    pub banner_image: Option<String>,
}

impl ImageRefs {
    /// Candidate values in probe order.
    pub fn candidates(&self) -> [Option<&str>; 5] {
        [
            self.banner.as_deref(),
            self.logo.as_deref(),
            self.avatar.as_deref(),
            self.image.as_deref(),
            self.banner_image.as_deref(),
        ]
    }
}

/// One entry of the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtfSummary {
    pub id: u64,
    pub name: String,
    pub org_name: Option<String>,
    /// Path segment used to build the detail URL and the public event URL.
    pub slug: String,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    #[serde(flatten)]
    pub images: ImageRefs,
}

impl CtfSummary {
    /// Stable cache key for this event. The wire format carries a numeric id;
    /// the tracking cache is keyed by its decimal string form.
    pub fn cache_key(&self) -> String {
        self.id.to_string()
    }
}

/// The richer per-event record fetched on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtfDetail {
    /// Whether joining requires an access code. Absent means false.
    #[serde(rename = "hasCode")]
    pub has_code: Option<bool>,
    pub name: Option<String>,
    pub org_name: Option<String>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub short_description: Option<String>,
    pub instructions: Option<String>,
    pub join_instructions: Option<String>,
    #[serde(flatten)]
    pub images: ImageRefs,
}

impl CtfDetail {
    pub fn requires_code(&self) -> bool {
        self.has_code.unwrap_or(false)
    }

    /// All free-text fields joined with newlines, absent fields treated as
    /// empty. This is the haystack the token extractor searches.
    pub fn joined_text(&self) -> String {
        [
            &self.description,
            &self.long_description,
            &self.short_description,
            &self.instructions,
            &self.join_instructions,
        ]
        .iter()
        .map(|field| field.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
    }
}
