//! Serde helpers for the JSON shapes the auth.js REST adapter speaks.
//!
//! Timestamps are held as Unix epoch seconds and travel as RFC 3339 strings.
//! Decoding also accepts bare integers. User ids arrive as numbers or numeric
//! strings depending on the client.

use serde::{de, Deserialize, Deserializer, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{AdapterError, AdapterResult};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Unix(i64),
    Text(String),
}

impl RawTimestamp {
    fn into_unix(self) -> Result<i64, String> {
        match self {
            RawTimestamp::Unix(n) => format_unix(n)
                .map(|_| n)
                .map_err(|e| format!("timestamp {} out of range: {}", n, e)),
            RawTimestamp::Text(s) => OffsetDateTime::parse(&s, &Rfc3339)
                .map(|dt| dt.unix_timestamp())
                .map_err(|e| format!("invalid timestamp {:?}: {}", s, e)),
        }
    }
}

fn format_unix(unix: i64) -> Result<String, String> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| e.to_string())?
        .format(&Rfc3339)
        .map_err(|e| e.to_string())
}

/// Epoch seconds to a UTC datetime for the relational store.
pub fn datetime_from_unix(unix: i64) -> AdapterResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| AdapterError::Validation(format!("timestamp out of range: {}", e)))
}

pub mod rfc3339 {
    use super::*;

    pub fn serialize<S: Serializer>(unix: &i64, s: S) -> Result<S::Ok, S::Error> {
        let text = format_unix(*unix).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        RawTimestamp::deserialize(d)?
            .into_unix()
            .map_err(de::Error::custom)
    }
}

pub mod rfc3339_option {
    use super::*;

    pub fn serialize<S: Serializer>(unix: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match unix {
            Some(unix) => super::rfc3339::serialize(unix, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Option::<RawTimestamp>::deserialize(d)?
            .map(RawTimestamp::into_unix)
            .transpose()
            .map_err(de::Error::custom)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

pub fn user_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match RawId::deserialize(d)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid user id {:?}", s))),
    }
}
