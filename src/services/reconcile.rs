use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::ReconcileSettings;
use crate::db::payment_repository::PaymentRepository;
use crate::models::checkout::{MetadataError, SessionMetadata};
use crate::models::payment::PaymentRecord;
use crate::services::payments::{new_deposit, PaymentRecorder, RecordSource};
use crate::services::stripe::{StripeService, StripeServiceError};
use crate::utils::codes::normalize_project_code;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("checkout session {session_id} has not been paid")]
    NotPaid { session_id: String },
    #[error("checkout session could not be retrieved: {0}")]
    SessionUnavailable(#[source] StripeServiceError),
    #[error("checkout session {session_id} metadata: {source}")]
    Metadata {
        session_id: String,
        #[source]
        source: MetadataError,
    },
    #[error("checkout session {session_id} does not belong to project {project_code}")]
    SessionMismatch {
        session_id: String,
        project_code: String,
    },
    #[error("checkout session {session_id} charged {charged:?}, expected deposit of {expected}")]
    AmountMismatch {
        session_id: String,
        expected: i64,
        charged: Option<i64>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReconcileError {
    /// The webhook may still resolve these on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ReconcileError::SessionUnavailable(_) | ReconcileError::Database(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// The record was already in the store (webhook won, or a lost race).
    Store,
    /// This call reconstructed the record from the processor's session.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub record: PaymentRecord,
    pub resolved_by: ResolvedBy,
}

/// Synchronous resolver behind the browser's success redirect: waits a
/// bounded time for the webhook, then rebuilds the record from the session.
#[derive(Clone)]
pub struct SuccessReconciler {
    payments: Arc<dyn PaymentRepository>,
    stripe: Arc<dyn StripeService>,
    recorder: PaymentRecorder,
    settings: ReconcileSettings,
}

impl SuccessReconciler {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        stripe: Arc<dyn StripeService>,
        recorder: PaymentRecorder,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            payments,
            stripe,
            recorder,
            settings,
        }
    }

    pub async fn reconcile(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let project_code = project_code
            .map(normalize_project_code)
            .filter(|c| !c.is_empty());
        let code = project_code.as_deref();

        if let Some(record) = self.lookup(code, session_id).await? {
            return Ok(found(record));
        }

        for attempt in 1..=self.settings.max_attempts {
            tokio::time::sleep(self.settings.poll_interval).await;
            if let Some(record) = self.lookup(code, session_id).await? {
                info!(attempt, session_id, "payment record appeared while polling");
                return Ok(found(record));
            }
        }

        warn!(
            session_id,
            project_code = ?code,
            attempts = self.settings.max_attempts,
            "no webhook within polling budget, falling back to processor session"
        );
        self.fallback(code, session_id).await
    }

    async fn lookup(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        let record = self
            .payments
            .find_by_code_or_session(project_code, session_id)
            .await?;
        Ok(record.filter(|r| {
            let matches = belongs_to_session(r, session_id);
            if !matches {
                warn!(
                    session_id,
                    project_code = %r.project_code,
                    record_session_id = ?r.first_session_id,
                    "project code belongs to a different checkout session, ignoring"
                );
            }
            matches
        }))
    }

    async fn fallback(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let session = self
            .stripe
            .retrieve_checkout_session(session_id)
            .await
            .map_err(|err| {
                warn!(?err, session_id, "failed to retrieve checkout session");
                ReconcileError::SessionUnavailable(err)
            })?;

        if !session.is_paid() {
            info!(
                session_id,
                payment_status = %session.payment_status,
                "checkout session not paid, nothing to reconstruct"
            );
            return Err(ReconcileError::NotPaid {
                session_id: session_id.to_string(),
            });
        }

        let metadata =
            SessionMetadata::from_map(&session.metadata).map_err(|source| {
                ReconcileError::Metadata {
                    session_id: session_id.to_string(),
                    source,
                }
            })?;

        let mut meta = match metadata {
            SessionMetadata::Initial(meta) => meta,
            SessionMetadata::Final(meta) => {
                // Final payments only ever update an existing record.
                return match self.payments.find_by_id(meta.payment_id).await? {
                    Some(record) => Ok(found(record)),
                    None => Err(ReconcileError::SessionMismatch {
                        session_id: session_id.to_string(),
                        project_code: meta.project_code,
                    }),
                };
            }
        };

        if let Some(code) = project_code {
            if code != meta.project_code {
                warn!(
                    session_id,
                    project_code = code,
                    metadata_project_code = %meta.project_code,
                    "success redirect project code does not match session"
                );
                return Err(ReconcileError::SessionMismatch {
                    session_id: session_id.to_string(),
                    project_code: code.to_string(),
                });
            }
        }

        if session.amount_total != Some(meta.first_payment) {
            warn!(
                session_id,
                project_code = %meta.project_code,
                amount_total = ?session.amount_total,
                first_payment = meta.first_payment,
                "checkout session amounts disagree with its metadata, refusing to reconstruct"
            );
            return Err(ReconcileError::AmountMismatch {
                session_id: session_id.to_string(),
                expected: meta.first_payment,
                charged: session.amount_total,
            });
        }

        if let Some(email) = session.customer_email.filter(|e| !e.trim().is_empty()) {
            meta.customer_email = email;
        }
        if meta.customer_name.is_empty() {
            if let Some(name) = session.customer_name {
                meta.customer_name = name;
            }
        }

        if let Some(record) = self.lookup(Some(&meta.project_code), session_id).await? {
            return Ok(found(record));
        }

        let new = new_deposit(&meta, session_id, OffsetDateTime::now_utc());
        let outcome = self
            .recorder
            .record_deposit(new, RecordSource::Fallback)
            .await?;
        let resolved_by = if outcome.was_created() {
            ResolvedBy::Fallback
        } else {
            ResolvedBy::Store
        };
        Ok(Reconciled {
            record: outcome.into_record(),
            resolved_by,
        })
    }
}

/// A record found through its project code alone must still have been paid
/// through the session the browser came back from.
fn belongs_to_session(record: &PaymentRecord, session_id: &str) -> bool {
    match record.first_session_id.as_deref() {
        None => true,
        Some(first) => {
            first == session_id || record.second_session_id.as_deref() == Some(session_id)
        }
    }
}

fn found(record: PaymentRecord) -> Reconciled {
    Reconciled {
        record,
        resolved_by: ResolvedBy::Store,
    }
}
