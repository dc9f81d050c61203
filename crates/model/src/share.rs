//! Share link records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A capability token granting access to one path.
///
/// `path` is absolute (the owner's scope joined with the scope-relative
/// path). `expire_date` is only meaningful when `expires` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// Unguessable URL-safe token.
    pub hash: String,
    /// Absolute path the link grants access to.
    pub path: String,
    /// Whether the link has an expiry date.
    pub expires: bool,
    /// When the link stops being valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<DateTime<Utc>>,
}

impl ShareLink {
    /// Create a link that never expires.
    pub fn permanent(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            path: path.into(),
            expires: false,
            expire_date: None,
        }
    }

    /// Create a link valid until `expire_date`.
    pub fn expiring(
        path: impl Into<String>,
        hash: impl Into<String>,
        expire_date: DateTime<Utc>,
    ) -> Self {
        Self {
            hash: hash.into(),
            path: path.into(),
            expires: true,
            expire_date: Some(expire_date),
        }
    }

    /// Whether this is a permanent (non-expiring) link.
    pub fn is_permanent(&self) -> bool {
        !self.expires
    }

    /// Whether the link is past its expiry date at `now`.
    ///
    /// An expiring link without a date is treated as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if !self.expires {
            return false;
        }
        match self.expire_date {
            Some(date) => now > date,
            None => true,
        }
    }
}

/// Unit an expiry amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryUnit {
    Seconds,
    Minutes,
    #[default]
    Hours,
    Days,
}

impl ExpiryUnit {
    /// Parse a unit name. Unknown or missing names fall back to hours.
    pub fn parse(unit: Option<&str>) -> Self {
        match unit {
            Some("seconds") => ExpiryUnit::Seconds,
            Some("minutes") => ExpiryUnit::Minutes,
            Some("days") => ExpiryUnit::Days,
            _ => ExpiryUnit::Hours,
        }
    }

    /// Convert `amount` of this unit to a duration.
    ///
    /// Returns `None` when the duration does not fit.
    pub fn duration(&self, amount: u64) -> Option<Duration> {
        let amount = i64::try_from(amount).ok()?;
        match self {
            ExpiryUnit::Seconds => Duration::try_seconds(amount),
            ExpiryUnit::Minutes => Duration::try_minutes(amount),
            ExpiryUnit::Hours => Duration::try_hours(amount),
            ExpiryUnit::Days => Duration::try_days(amount),
        }
    }
}
