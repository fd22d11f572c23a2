use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};

/// Distinguishes an omitted field (`None`) from an explicit `null` (`Some(None)`)
/// in partial update payloads. Use together with `#[serde(default)]`.
pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn required_text(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional string; blank values collapse to `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Same as [`required_text`] for a field that may be omitted in a partial update.
pub fn updated_text(field: &str, value: Option<String>) -> AppResult<Option<String>> {
    value.map(|raw| required_text(field, &raw)).transpose()
}
