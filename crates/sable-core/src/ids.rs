//! Short random identifiers for records, proposals, and fixes.

/// A random 12-hex-character token, derived from a v4 UUID.
#[must_use]
pub fn token12() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}
