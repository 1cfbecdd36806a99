use std::sync::Arc;

use time::{Date, OffsetDateTime, Time};
use tracing::{info, warn};

use crate::db::quota_repository::QuotaRepository;
use crate::models::quota::{QuotaReservation, QuotaStatus};

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error(
        "daily email limit reached: requested {requested}, {available} remaining until {resets_at}"
    )]
    Exhausted {
        requested: i64,
        available: i64,
        resets_at: OffsetDateTime,
    },
    #[error("reservation amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The UTC calendar day a timestamp falls on.
pub fn utc_day(now: OffsetDateTime) -> Date {
    now.to_offset(time::UtcOffset::UTC).date()
}

/// Midnight UTC following `day`, when its counter stops being consulted.
pub fn next_reset(day: Date) -> OffsetDateTime {
    let next = day.next_day().unwrap_or(day);
    next.with_time(Time::MIDNIGHT).assume_utc()
}

/// A granted reservation. Hand it back to `release` if the guarded send
/// fails; drop it once the send succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPermit {
    pub day: Date,
    pub amount: i64,
    pub remaining: i64,
}

/// Per-UTC-day send counter shared by every outbound-email caller.
#[derive(Clone)]
pub struct QuotaLedger {
    repo: Arc<dyn QuotaRepository>,
    daily_limit: i64,
}

impl QuotaLedger {
    pub fn new(repo: Arc<dyn QuotaRepository>, daily_limit: i64) -> Self {
        Self { repo, daily_limit }
    }

    pub async fn reserve(&self, amount: i64) -> Result<QuotaPermit, QuotaError> {
        self.reserve_on(OffsetDateTime::now_utc(), amount).await
    }

    pub async fn reserve_on(
        &self,
        now: OffsetDateTime,
        amount: i64,
    ) -> Result<QuotaPermit, QuotaError> {
        if amount <= 0 {
            return Err(QuotaError::InvalidAmount(amount));
        }
        let day = utc_day(now);
        match self.repo.try_reserve(day, amount, self.daily_limit).await? {
            QuotaReservation::Granted { emails_sent } => Ok(QuotaPermit {
                day,
                amount,
                remaining: (self.daily_limit - emails_sent).max(0),
            }),
            QuotaReservation::Denied { emails_sent } => {
                let available = (self.daily_limit - emails_sent).max(0);
                let resets_at = next_reset(day);
                warn!(%day, requested = amount, available, "email quota exhausted");
                Err(QuotaError::Exhausted {
                    requested: amount,
                    available,
                    resets_at,
                })
            }
        }
    }

    /// Returns a permit's slots to the day it was drawn from. A release that
    /// would take the counter negative is ignored.
    pub async fn release(&self, permit: QuotaPermit) -> Result<bool, QuotaError> {
        self.release_on(permit.day, permit.amount).await
    }

    pub async fn release_on(&self, day: Date, amount: i64) -> Result<bool, QuotaError> {
        if amount <= 0 {
            return Err(QuotaError::InvalidAmount(amount));
        }
        let released = self.repo.release(day, amount).await?;
        if released {
            info!(%day, amount, "released email quota");
        } else {
            warn!(%day, amount, "ignored quota release larger than the reserved balance");
        }
        Ok(released)
    }

    pub async fn status(&self) -> Result<QuotaStatus, QuotaError> {
        self.status_on(OffsetDateTime::now_utc()).await
    }

    pub async fn status_on(&self, now: OffsetDateTime) -> Result<QuotaStatus, QuotaError> {
        let day = utc_day(now);
        let emails_sent = self.repo.emails_sent(day).await?;
        Ok(QuotaStatus {
            day,
            emails_sent,
            daily_limit: self.daily_limit,
            remaining: (self.daily_limit - emails_sent).max(0),
            resets_at: next_reset(day),
        })
    }
}
