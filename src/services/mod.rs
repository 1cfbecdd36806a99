pub mod checkout;
pub mod notifications;
pub mod payments;
pub mod pluggable_mailer;
pub mod project_status;
pub mod quota;
pub mod reconcile;
pub mod resend_mailer;
pub mod smtp_mailer;
pub mod stripe;
pub mod webhook;
