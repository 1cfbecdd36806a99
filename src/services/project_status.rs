use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::db::payment_repository::PaymentRepository;
use crate::models::payment::{PaymentRecord, ProjectStatus};
use crate::services::notifications::Notifier;
use crate::utils::codes::normalize_project_code;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("no project found for code {0}")]
    NotFound(String),
    #[error("project {project_code} cannot change status before the deposit is paid")]
    DepositNotPaid { project_code: String },
    #[error("project {project_code} is fully paid; only `completed` is allowed, got `{requested}`")]
    FullyPaid {
        project_code: String,
        requested: ProjectStatus,
    },
    #[error("project {project_code} cannot move from `{from}` to `{to}`")]
    NotAllowed {
        project_code: String,
        from: ProjectStatus,
        to: ProjectStatus,
    },
    #[error("project {project_code} was updated concurrently; reload and try again")]
    Conflict { project_code: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Forward edges of the lifecycle. Anything not listed is rejected.
pub fn allowed_next(current: ProjectStatus) -> &'static [ProjectStatus] {
    match current {
        ProjectStatus::Pending => &[ProjectStatus::InProgress],
        ProjectStatus::InProgress => &[ProjectStatus::ReadyForPayment],
        ProjectStatus::ReadyForPayment => &[ProjectStatus::Completed],
        ProjectStatus::Completed => &[],
    }
}

/// Payment facts that must hold before any status change.
pub fn check_preconditions(
    record: &PaymentRecord,
    target: ProjectStatus,
) -> Result<(), TransitionError> {
    if record.second_paid && target != ProjectStatus::Completed {
        return Err(TransitionError::FullyPaid {
            project_code: record.project_code.clone(),
            requested: target,
        });
    }
    if !record.first_paid {
        return Err(TransitionError::DepositNotPaid {
            project_code: record.project_code.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    Apply {
        from: ProjectStatus,
        to: ProjectStatus,
    },
    /// Already in the requested state.
    Unchanged,
}

pub fn plan_transition(
    record: &PaymentRecord,
    target: ProjectStatus,
) -> Result<TransitionPlan, TransitionError> {
    check_preconditions(record, target)?;

    let current = record.project_status;
    if current == target {
        return Ok(TransitionPlan::Unchanged);
    }
    // A received final payment forces completion from wherever the project is.
    if record.second_paid || allowed_next(current).contains(&target) {
        return Ok(TransitionPlan::Apply {
            from: current,
            to: target,
        });
    }
    Err(TransitionError::NotAllowed {
        project_code: record.project_code.clone(),
        from: current,
        to: target,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub record: PaymentRecord,
    pub changed: bool,
}

#[derive(Clone)]
pub struct ProjectStatusMachine {
    payments: Arc<dyn PaymentRepository>,
    notifier: Notifier,
}

impl ProjectStatusMachine {
    pub fn new(payments: Arc<dyn PaymentRepository>, notifier: Notifier) -> Self {
        Self { payments, notifier }
    }

    pub async fn request_transition(
        &self,
        project_code: &str,
        target: ProjectStatus,
    ) -> Result<TransitionResult, TransitionError> {
        let project_code = normalize_project_code(project_code);
        let record = self
            .payments
            .find_by_project_code(&project_code)
            .await?
            .ok_or_else(|| TransitionError::NotFound(project_code.clone()))?;

        let (from, to) = match plan_transition(&record, target) {
            Ok(TransitionPlan::Apply { from, to }) => (from, to),
            Ok(TransitionPlan::Unchanged) => {
                return Ok(TransitionResult {
                    record,
                    changed: false,
                })
            }
            Err(err) => {
                warn!(
                    %project_code,
                    from = %record.project_status,
                    to = %target,
                    %err,
                    "rejected project status change"
                );
                return Err(err);
            }
        };

        let project_ready = (to == ProjectStatus::ReadyForPayment).then(OffsetDateTime::now_utc);
        let updated = self
            .payments
            .update_project_status(record.id, from, to, project_ready)
            .await?
            .ok_or_else(|| TransitionError::Conflict {
                project_code: project_code.clone(),
            })?;

        info!(
            %project_code,
            payment_id = %updated.id,
            %from,
            %to,
            "project status changed"
        );

        if to == ProjectStatus::ReadyForPayment {
            self.notifier.project_ready(&updated).await;
        }

        Ok(TransitionResult {
            record: updated,
            changed: true,
        })
    }
}
