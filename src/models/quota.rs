use serde::Serialize;
use time::{Date, OffsetDateTime};

/// Outcome of a conditional increment on a day's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReservation {
    Granted { emails_sent: i64 },
    Denied { emails_sent: i64 },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuotaStatus {
    pub day: Date,
    pub emails_sent: i64,
    pub daily_limit: i64,
    pub remaining: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub resets_at: OffsetDateTime,
}
