//! Shared types and result types for the database layer

pub mod errors;

use chrono::{DateTime, SecondsFormat, Utc};

pub use errors::DatabaseError;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Timestamps are stored as fixed-width RFC 3339 text so that they sort
/// lexicographically.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(raw: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| DatabaseError::InvalidRow(format!("bad timestamp {raw:?}: {err}")))
}

pub fn decode_optional_timestamp(raw: Option<String>) -> DatabaseResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_timestamp).transpose()
}
