use std::sync::Arc;

use tracing::{info, warn};

use crate::db::payment_repository::PaymentRepository;
use crate::models::checkout::{
    CheckoutStarted, FinalCheckoutRequest, FinalPaymentMetadata, InitialCheckoutRequest,
    InitialPaymentMetadata, PaymentPhase, SessionMetadata,
};
use crate::models::payment::ProjectStatus;
use crate::services::stripe::{
    CheckoutLineItem, CreateCheckoutSessionRequest, StripeService, StripeServiceError,
};
use crate::utils::codes::{normalize_project_code, random_project_code};

/// Collisions tolerated before giving up on finding a free project code.
pub const MAX_CODE_ATTEMPTS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("invalid checkout request: {0}")]
    InvalidRequest(String),
    #[error("no project found for code {0}")]
    ProjectNotFound(String),
    #[error("project {project_code} is not ready for final payment: {reason}")]
    NotPayable {
        project_code: String,
        reason: &'static str,
    },
    #[error("no unused project code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },
    #[error("payment processor returned a session without a checkout url")]
    MissingCheckoutUrl,
    #[error(transparent)]
    Stripe(#[from] StripeServiceError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Deposit rounds up so the two halves always sum to `total`.
pub fn split_payment(total: i64) -> (i64, i64) {
    let first = total / 2 + total % 2;
    (first, total - first)
}

/// Builds processor sessions for both installments. Nothing is persisted for
/// the deposit: the record is created only once the payment is confirmed.
#[derive(Clone)]
pub struct CheckoutSessionFactory {
    payments: Arc<dyn PaymentRepository>,
    stripe: Arc<dyn StripeService>,
    frontend_origin: String,
    currency: String,
}

impl CheckoutSessionFactory {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        stripe: Arc<dyn StripeService>,
        frontend_origin: &str,
        currency: &str,
    ) -> Self {
        Self {
            payments,
            stripe,
            frontend_origin: frontend_origin.trim_end_matches('/').to_string(),
            currency: currency.to_string(),
        }
    }

    fn success_url(&self, project_code: &str) -> String {
        // Stripe substitutes the literal `{CHECKOUT_SESSION_ID}` placeholder.
        format!(
            "{}/checkout/success?project_code={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_origin,
            urlencoding::encode(project_code)
        )
    }

    fn cancel_url(&self, project_code: &str) -> String {
        format!(
            "{}/checkout/cancel?project_code={}",
            self.frontend_origin,
            urlencoding::encode(project_code)
        )
    }

    async fn unused_project_code(&self) -> Result<String, CheckoutError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = random_project_code(&mut rand::rng());
            if !self.payments.project_code_exists(&code).await? {
                return Ok(code);
            }
            warn!(attempt, project_code = %code, "project code collision, drawing again");
        }
        Err(CheckoutError::CodeSpaceExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    pub async fn start_initial(
        &self,
        req: InitialCheckoutRequest,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let plan_name = req.plan_name.trim().to_string();
        if plan_name.is_empty() {
            return Err(CheckoutError::InvalidRequest("plan_name is required".into()));
        }
        if req.total_amount <= 0 {
            return Err(CheckoutError::InvalidRequest(
                "total_amount must be positive".into(),
            ));
        }
        let email = req.email.trim().to_string();
        if email.parse::<lettre::Address>().is_err() {
            return Err(CheckoutError::InvalidRequest(format!(
                "invalid email address: {email}"
            )));
        }

        let (first_payment, second_payment) = split_payment(req.total_amount);
        let project_code = self.unused_project_code().await?;

        let metadata = SessionMetadata::Initial(InitialPaymentMetadata {
            project_code: project_code.clone(),
            plan_name: plan_name.clone(),
            total_amount: req.total_amount,
            first_payment,
            second_payment,
            customer_email: email.clone(),
            customer_name: req.name.trim().to_string(),
            terms_accepted_at: req.terms_accepted_at,
        });

        let session = self
            .stripe
            .create_checkout_session(CreateCheckoutSessionRequest {
                success_url: self.success_url(&project_code),
                cancel_url: self.cancel_url(&project_code),
                currency: self.currency.clone(),
                line_items: vec![CheckoutLineItem {
                    name: format!("{plan_name} (deposit)"),
                    description: req
                        .description
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty()),
                    unit_amount: first_payment,
                    quantity: 1,
                }],
                customer_email: Some(email),
                client_reference_id: Some(project_code.clone()),
                metadata: metadata.to_map(),
            })
            .await?;

        info!(
            project_code = %project_code,
            session_id = %session.id,
            first_payment,
            second_payment,
            "created deposit checkout session"
        );

        Ok(CheckoutStarted {
            session_id: session.id,
            url: Some(session.url.ok_or(CheckoutError::MissingCheckoutUrl)?),
            project_code,
            phase: PaymentPhase::Initial,
            first_payment,
            second_payment,
        })
    }

    pub async fn start_final(
        &self,
        req: FinalCheckoutRequest,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let project_code = normalize_project_code(&req.project_code);
        let record = self
            .payments
            .find_by_project_code(&project_code)
            .await?
            .ok_or_else(|| CheckoutError::ProjectNotFound(project_code.clone()))?;

        let not_payable = |reason: &'static str| CheckoutError::NotPayable {
            project_code: project_code.clone(),
            reason,
        };
        if !record.first_paid {
            return Err(not_payable("the deposit has not been received"));
        }
        if record.second_paid {
            return Err(not_payable("the final payment has already been received"));
        }
        if record.project_status != ProjectStatus::ReadyForPayment {
            return Err(not_payable("the project is not ready for final payment yet"));
        }

        let metadata = SessionMetadata::Final(FinalPaymentMetadata {
            payment_id: record.id,
            project_code: record.project_code.clone(),
            amount: record.second_payment,
        });

        let session = self
            .stripe
            .create_checkout_session(CreateCheckoutSessionRequest {
                success_url: self.success_url(&record.project_code),
                cancel_url: self.cancel_url(&record.project_code),
                currency: self.currency.clone(),
                line_items: vec![CheckoutLineItem {
                    name: format!("{} (final payment)", record.plan_name),
                    description: None,
                    unit_amount: record.second_payment,
                    quantity: 1,
                }],
                customer_email: Some(record.email.clone()),
                client_reference_id: Some(record.project_code.clone()),
                metadata: metadata.to_map(),
            })
            .await?;

        info!(
            project_code = %record.project_code,
            payment_id = %record.id,
            session_id = %session.id,
            amount = record.second_payment,
            "created final-payment checkout session"
        );

        Ok(CheckoutStarted {
            session_id: session.id,
            url: Some(session.url.ok_or(CheckoutError::MissingCheckoutUrl)?),
            project_code: record.project_code,
            phase: PaymentPhase::Final,
            first_payment: record.first_payment,
            second_payment: record.second_payment,
        })
    }
}
