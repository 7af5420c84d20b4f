//! Compiled regex patterns shared across the engine.
//!
//! Compiled once on first use. Update these when the ticket key scheme or the
//! marker file naming changes.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Agent Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Ticket keys such as `KAN-42`. Window names matching this are agent windows.
pub const DEFAULT_AGENT_ID_PATTERN: &str = r"^[A-Z][A-Z0-9]*-[0-9]+$";

pub static RE_TICKET_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_AGENT_ID_PATTERN).unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Marker Files
// ═══════════════════════════════════════════════════════════════════════════════

/// `<agent-id>.<suffix>` where suffix is one of the known marker kinds.
pub static RE_MARKER_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<id>[^./][^/]*?)\.(?P<kind>state|title|kill-agent)$").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_keys_match() {
        assert!(RE_TICKET_KEY.is_match("KAN-42"));
        assert!(RE_TICKET_KEY.is_match("OPS2-7"));
        assert!(!RE_TICKET_KEY.is_match("zsh"));
        assert!(!RE_TICKET_KEY.is_match("KAN-"));
        assert!(!RE_TICKET_KEY.is_match("kan-42"));
    }

    #[test]
    fn marker_file_names_split_into_id_and_kind() {
        let caps = RE_MARKER_FILE.captures("KAN-42.kill-agent").unwrap();
        assert_eq!(&caps["id"], "KAN-42");
        assert_eq!(&caps["kind"], "kill-agent");

        assert!(RE_MARKER_FILE.captures("KAN-42.tmp").is_none());
        assert!(RE_MARKER_FILE.captures(".state").is_none());
    }
}
