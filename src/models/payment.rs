use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    ReadyForPayment,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::ReadyForPayment => "ready_for_payment",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ProjectStatus::Pending),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "ready_for_payment" => Ok(ProjectStatus::ReadyForPayment),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(format!("unknown project status: {other}")),
        }
    }
}

/// One row per project engagement. Amounts are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub project_code: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub plan_name: String,
    pub total_amount: i64,
    pub first_payment: i64,
    pub second_payment: i64,
    pub email: String,
    pub name: String,
    pub client_id: Option<Uuid>,
    pub first_paid: bool,
    pub second_paid: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub second_paid_at: Option<OffsetDateTime>,
    pub first_session_id: Option<String>,
    pub second_session_id: Option<String>,
    pub project_status: ProjectStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub project_ready: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Everything needed to insert a paid deposit. Built either from webhook
/// metadata or from a session retrieved directly from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentRecord {
    pub project_code: String,
    pub access_token: String,
    pub plan_name: String,
    pub total_amount: i64,
    pub first_payment: i64,
    pub second_payment: i64,
    pub email: String,
    pub name: String,
    pub first_session_id: String,
    pub first_paid_at: OffsetDateTime,
    pub terms_accepted_at: Option<OffsetDateTime>,
}

/// Result of a single creation attempt against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePaymentOutcome {
    Created(PaymentRecord),
    AlreadyExists(PaymentRecord),
    /// The insert hit a unique constraint: another writer committed between
    /// our existence check and our insert.
    LostRace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalPaymentUpdate {
    Applied(PaymentRecord),
    AlreadyPaid(PaymentRecord),
    NotFound,
}

/// What the client portal and the success page get to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectView {
    pub project_code: String,
    pub plan_name: String,
    pub name: String,
    pub total_amount: i64,
    pub first_payment: i64,
    pub second_payment: i64,
    pub first_paid: bool,
    pub second_paid: bool,
    pub project_status: ProjectStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub project_ready: Option<OffsetDateTime>,
}

impl From<&PaymentRecord> for ProjectView {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            project_code: record.project_code.clone(),
            plan_name: record.plan_name.clone(),
            name: record.name.clone(),
            total_amount: record.total_amount,
            first_payment: record.first_payment,
            second_payment: record.second_payment,
            first_paid: record.first_paid,
            second_paid: record.second_paid,
            project_status: record.project_status,
            project_ready: record.project_ready,
        }
    }
}
