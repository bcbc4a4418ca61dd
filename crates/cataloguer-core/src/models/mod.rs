//! Data models for the catalogue service
//!
//! Each module defines one persisted entity together with its request DTOs and
//! the pure functions that fill defaults and recompute derived attributes on
//! create and update. Attribute names serialize in camelCase and timestamps as
//! epoch milliseconds, which is the persisted layout of the table.

mod bulk;
mod catalogue;
mod image;
mod invitation;
mod item;
mod membership;
mod organization;
mod user;

pub use bulk::*;
pub use catalogue::*;
pub use image::*;
pub use invitation::*;
pub use item::*;
pub use membership::*;
pub use organization::*;
pub use user::*;

use crate::error::AppError;

/// Maximum length of entity names.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum length of free-text descriptions.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Trim a required text attribute and reject blank or oversized values.
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Normalize an optional description: blank becomes absent.
pub(crate) fn optional_text(field: &str, value: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(Some(value.to_string()))
}
