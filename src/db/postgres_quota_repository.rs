use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;

use crate::db::quota_repository::QuotaRepository;
use crate::models::quota::QuotaReservation;

pub struct PostgresQuotaRepository {
    pub pool: PgPool,
}

#[async_trait]
impl QuotaRepository for PostgresQuotaRepository {
    async fn try_reserve(
        &self,
        day: Date,
        amount: i64,
        limit: i64,
    ) -> Result<QuotaReservation, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO email_quota (day, emails_sent)
            VALUES ($1, 0)
            ON CONFLICT (day) DO NOTHING
            "#,
        )
        .bind(day)
        .execute(&mut *tx)
        .await?;

        // Single conditional increment: the row lock taken by UPDATE serializes
        // concurrent reservers on the same day.
        let granted = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE email_quota
            SET emails_sent = emails_sent + $2,
                updated_at = now()
            WHERE day = $1 AND emails_sent + $2 <= $3
            RETURNING emails_sent
            "#,
        )
        .bind(day)
        .bind(amount)
        .bind(limit)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match granted {
            Some(emails_sent) => QuotaReservation::Granted { emails_sent },
            None => {
                let emails_sent =
                    sqlx::query_scalar::<_, i64>("SELECT emails_sent FROM email_quota WHERE day = $1")
                        .bind(day)
                        .fetch_one(&mut *tx)
                        .await?;
                QuotaReservation::Denied { emails_sent }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn release(&self, day: Date, amount: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_quota
            SET emails_sent = emails_sent - $2,
                updated_at = now()
            WHERE day = $1 AND emails_sent >= $2
            "#,
        )
        .bind(day)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn emails_sent(&self, day: Date) -> Result<i64, sqlx::Error> {
        let sent = sqlx::query_scalar::<_, i64>("SELECT emails_sent FROM email_quota WHERE day = $1")
            .bind(day)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sent.unwrap_or(0))
    }
}
