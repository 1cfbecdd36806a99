use async_trait::async_trait;
use time::Date;

use crate::models::quota::QuotaReservation;

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Creates the day row if needed and increments it by `amount` only when
    /// the result stays within `limit`. Never mutates on denial.
    async fn try_reserve(
        &self,
        day: Date,
        amount: i64,
        limit: i64,
    ) -> Result<QuotaReservation, sqlx::Error>;

    /// Decrements the day row by `amount` unless that would go below zero.
    /// Returns whether anything was released.
    async fn release(&self, day: Date, amount: i64) -> Result<bool, sqlx::Error>;

    async fn emails_sent(&self, day: Date) -> Result<i64, sqlx::Error>;
}
