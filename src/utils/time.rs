use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serializer;

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Requests carry offset-aware timestamps; columns hold UTC.
pub fn naive(value: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    value.map(|at| at.naive_utc())
}

pub fn serialize_iso<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&to_iso(*value))
}

pub fn serialize_iso_option<S: Serializer>(
    value: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_str(&to_iso(*value)),
        None => serializer.serialize_none(),
    }
}
