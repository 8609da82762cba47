//! Lenient timestamp handling for replica metadata.
//!
//! Index and settings files are written by arbitrary versions of the app on
//! arbitrary machines. A malformed or missing stamp must lose every ordering
//! comparison instead of failing a merge, so parsing normalizes everything
//! unreadable to the Unix epoch.

use chrono::{DateTime, Utc};

/// Field carrying the whole-document last-writer-wins stamp in a settings
/// object.
pub const SETTINGS_UPDATED_AT: &str = "_updatedAt";

/// The ordering value of corrupt or absent metadata.
pub fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Parses an RFC 3339 timestamp, mapping anything unparsable to the epoch.
pub fn parse_lenient(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| epoch())
}

/// Extracts the LWW stamp from a settings document. Missing, non-string, or
/// corrupt values order as the epoch, so a malformed document always loses
/// to a well-formed one.
pub fn settings_stamp(doc: &serde_json::Value) -> DateTime<Utc> {
    doc.get(SETTINGS_UPDATED_AT)
        .and_then(|v| v.as_str())
        .map(parse_lenient)
        .unwrap_or_else(epoch)
}

/// Serde helpers for required timestamp fields. Unreadable values
/// deserialize to the epoch instead of erroring.
pub mod lenient {
    use super::{epoch, parse_lenient};
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(value.as_str().map(parse_lenient).unwrap_or_else(epoch))
    }
}

/// Serde helpers for optional timestamp fields. Absent or null stays `None`;
/// present-but-unreadable normalizes to the epoch.
pub mod lenient_opt {
    use super::{epoch, parse_lenient};
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(raw) => Some(parse_lenient(&raw)),
            _ => Some(epoch()),
        })
    }
}
