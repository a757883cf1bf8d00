//! Shared User-Agent string for search, photo, and video traffic.
//!
//! Single source for the identifying header so every outbound request from
//! this tool is attributable to the same client (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/harvester";

/// Identifying User-Agent sent on every search and media request.
#[must_use]
pub fn identifying_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (media-archive-tool; +{PROJECT_UA_URL})")
}
