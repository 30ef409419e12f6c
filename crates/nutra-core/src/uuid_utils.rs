//! UUID v7 utilities for time-ordered identifiers.
//!
//! Queue items and request IDs use UUIDv7, which embeds a millisecond
//! timestamp in the first 48 bits so lexicographic order matches
//! creation order.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check if a UUID is version 7.
#[inline]
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}
