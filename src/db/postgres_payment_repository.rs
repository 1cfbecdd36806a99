use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{is_unique_violation, payment_repository::PaymentRepository};
use crate::models::payment::{
    CreatePaymentOutcome, FinalPaymentUpdate, NewPaymentRecord, PaymentRecord, ProjectStatus,
};

const PAYMENT_COLUMNS: &str = r#"
    id,
    project_code,
    access_token,
    plan_name,
    total_amount,
    first_payment,
    second_payment,
    email,
    name,
    client_id,
    first_paid,
    second_paid,
    first_paid_at,
    second_paid_at,
    first_session_id,
    second_session_id,
    project_status,
    project_ready,
    created_at,
    updated_at
"#;

pub struct PostgresPaymentRepository {
    pub pool: PgPool,
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_by_code_or_session(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE ($1::text IS NOT NULL AND project_code = $1)
               OR first_session_id = $2
            ORDER BY created_at
            LIMIT 1
            "#
        ))
        .bind(project_code)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_project_code(
        &self,
        project_code: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE project_code = $1"
        ))
        .bind(project_code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE access_token = $1"
        ))
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await
    }

    async fn project_code_exists(&self, project_code: &str) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM payments WHERE project_code = $1")
            .bind(project_code)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(exists)
    }

    async fn create_initial_payment(
        &self,
        new: &NewPaymentRecord,
    ) -> Result<CreatePaymentOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE project_code = $1 OR first_session_id = $2
            LIMIT 1
            "#
        ))
        .bind(&new.project_code)
        .bind(&new.first_session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(record) = existing {
            tx.rollback().await?;
            return Ok(CreatePaymentOutcome::AlreadyExists(record));
        }

        let inserted = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            INSERT INTO payments (
                id,
                project_code,
                access_token,
                plan_name,
                total_amount,
                first_payment,
                second_payment,
                email,
                name,
                first_paid,
                first_paid_at,
                first_session_id,
                project_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $11, 'in_progress'::project_status)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.project_code)
        .bind(&new.access_token)
        .bind(&new.plan_name)
        .bind(new.total_amount)
        .bind(new.first_payment)
        .bind(new.second_payment)
        .bind(&new.email)
        .bind(&new.name)
        .bind(new.first_paid_at)
        .bind(&new.first_session_id)
        .fetch_one(&mut *tx)
        .await;

        let record = match inserted {
            Ok(record) => record,
            Err(err) if is_unique_violation(&err) => {
                // The aborted transaction is discarded either way.
                let _ = tx.rollback().await;
                return Ok(CreatePaymentOutcome::LostRace);
            }
            Err(err) => return Err(err),
        };

        if let Some(accepted_at) = new.terms_accepted_at {
            sqlx::query(
                r#"
                INSERT INTO terms_acceptances (id, payment_id, email, accepted_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(record.id)
            .bind(&record.email)
            .bind(accepted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(CreatePaymentOutcome::Created(record))
    }

    async fn record_final_payment(
        &self,
        payment_id: Uuid,
        session_id: &str,
        paid_at: OffsetDateTime,
    ) -> Result<FinalPaymentUpdate, sqlx::Error> {
        let updated = sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            UPDATE payments
            SET second_paid = TRUE,
                second_paid_at = $2,
                second_session_id = $3,
                project_status = 'completed'::project_status,
                updated_at = now()
            WHERE id = $1 AND second_paid = FALSE
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(paid_at)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = updated {
            return Ok(FinalPaymentUpdate::Applied(record));
        }

        Ok(match self.find_by_id(payment_id).await? {
            Some(record) => FinalPaymentUpdate::AlreadyPaid(record),
            None => FinalPaymentUpdate::NotFound,
        })
    }

    async fn update_project_status(
        &self,
        payment_id: Uuid,
        expected: ProjectStatus,
        next: ProjectStatus,
        project_ready: Option<OffsetDateTime>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        sqlx::query_as::<_, PaymentRecord>(&format!(
            r#"
            UPDATE payments
            SET project_status = $3,
                project_ready = COALESCE($4, project_ready),
                updated_at = now()
            WHERE id = $1 AND project_status = $2
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(expected)
        .bind(next)
        .bind(project_ready)
        .fetch_optional(&self.pool)
        .await
    }
}
