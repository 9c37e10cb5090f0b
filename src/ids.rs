//! Opaque 128-bit identifier helpers.
//!
//! Tokens, client tokens, and profile ids all travel on the wire as 32
//! lowercase hex characters (an undashed UUID).

use uuid::Uuid;

/// Generate a fresh random identifier in undashed hex form.
#[must_use]
pub fn random_undashed() -> String {
    undashed(Uuid::new_v4())
}

/// Canonical undashed (32 hex chars) form of a UUID.
#[must_use]
pub fn undashed(id: Uuid) -> String {
    id.simple().to_string()
}

/// Parse an identifier in canonical undashed form. Dashed, braced, urn,
/// and uppercase renditions are rejected: the wire shape is exactly 32
/// lowercase hex characters.
pub fn parse_undashed(s: &str) -> Option<Uuid> {
    if s.len() != 32
        || !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return None;
    }
    Uuid::try_parse(s).ok()
}
