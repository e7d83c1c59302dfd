use std::fmt;

use chrono::{DateTime, Utc};

// Storage timestamp with whole-second precision.
//
// Timestamp columns are persisted as epoch seconds in an INTEGER column, so
// the type truncates on construction to keep stored-then-fetched values
// equal to their originals.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_epoch_seconds(Utc::now().timestamp())
    }

    pub fn from_epoch_seconds(seconds: i64) -> Self {
        Timestamp(DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn inner(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_epoch_seconds(dt.timestamp())
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_round_trip() {
        let ts = Timestamp::from_epoch_seconds(1_600_000_000);
        assert_eq!(ts.epoch_seconds(), 1_600_000_000);
        assert_eq!(Timestamp::from_epoch_seconds(ts.epoch_seconds()), ts);
    }

    #[test]
    fn now_is_truncated_to_seconds() {
        let ts = Timestamp::now();
        assert_eq!(ts.inner().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn display_format() {
        let ts = Timestamp::from_epoch_seconds(0);
        assert_eq!(ts.to_string(), "1970-01-01T00:00:00Z");
    }
}
