use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::payment::{
    CreatePaymentOutcome, FinalPaymentUpdate, NewPaymentRecord, PaymentRecord, ProjectStatus,
};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Lookup by either natural key. `project_code` is optional because the
    /// browser redirect may arrive without it.
    async fn find_by_code_or_session(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error>;

    async fn find_by_project_code(
        &self,
        project_code: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    async fn find_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;

    async fn project_code_exists(&self, project_code: &str) -> Result<bool, sqlx::Error>;

    /// Re-checks absence and inserts the paid deposit (plus the terms row) in
    /// one transaction. A unique violation comes back as `LostRace`, never as
    /// an error.
    async fn create_initial_payment(
        &self,
        new: &NewPaymentRecord,
    ) -> Result<CreatePaymentOutcome, sqlx::Error>;

    /// Marks the second installment paid and forces `completed`. Only the
    /// first application reports `Applied`.
    async fn record_final_payment(
        &self,
        payment_id: Uuid,
        session_id: &str,
        paid_at: OffsetDateTime,
    ) -> Result<FinalPaymentUpdate, sqlx::Error>;

    /// Compare-and-set on the current status. Returns `None` when the row is
    /// gone or its status no longer equals `expected`.
    async fn update_project_status(
        &self,
        payment_id: Uuid,
        expected: ProjectStatus,
        next: ProjectStatus,
        project_ready: Option<OffsetDateTime>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error>;
}
