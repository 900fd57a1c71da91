//! Textual date format used wherever dates cross the ledger boundary.
//!
//! All dates are UTC and rendered as `dd/MM/yyyy HH:mm:ss`. The module doubles
//! as a serde `with` helper for `DateTime<Utc>` fields.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Format a timestamp for display or serialization.
/// Sub-second precision is dropped.
pub fn format(date: &DateTime<Utc>) -> String {
    date.format(FORMAT).to_string()
}

/// Parse a `dd/MM/yyyy HH:mm:ss` string as a UTC timestamp.
pub fn parse(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(input.trim(), FORMAT).map(|dt| dt.and_utc())
}

pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(date))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

/// Same as the parent module, for optional dates (e.g. open-ended ranges).
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_some(&super::format(date)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
