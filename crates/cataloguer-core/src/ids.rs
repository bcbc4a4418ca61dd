//! Identifier generation
//!
//! Entity ids are UUIDv7 rendered as 32 lowercase hex characters, so they sort
//! by creation time. Invitation codes are short random alphanumeric strings.

use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Length of an invitation code.
pub const INVITATION_CODE_LENGTH: usize = 10;

/// Generate a new time-sortable entity id.
pub fn new_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Generate a random invitation code.
pub fn new_invitation_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITATION_CODE_LENGTH)
        .map(char::from)
        .collect()
}
