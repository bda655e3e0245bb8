use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;

use super::wire::datetime_from_unix;
use crate::error::{AdapterError, AdapterResult};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn ensure_valid_email(email: &str) -> AdapterResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AdapterError::Validation(format!("invalid email: {:?}", email)))
    }
}

pub(crate) fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Seconds from now until `expires_at`. A record that is already due, or
/// whose expiry has no calendar representation, is rejected.
pub(crate) fn ttl_until(expires_at: i64) -> AdapterResult<u64> {
    datetime_from_unix(expires_at)?;
    let ttl = expires_at
        .checked_sub(now_unix())
        .ok_or_else(|| AdapterError::Validation(format!("expiry {} out of range", expires_at)))?;
    if ttl <= 0 {
        return Err(AdapterError::Validation(format!(
            "expiry is {}s in the past",
            -ttl
        )));
    }
    Ok(ttl as u64)
}
