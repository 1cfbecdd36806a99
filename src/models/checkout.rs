use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

pub const META_PAYMENT_TYPE: &str = "payment_type";
pub const META_PROJECT_CODE: &str = "project_code";
pub const META_PLAN_NAME: &str = "plan_name";
pub const META_TOTAL_AMOUNT: &str = "total_amount";
pub const META_FIRST_PAYMENT: &str = "first_payment";
pub const META_SECOND_PAYMENT: &str = "second_payment";
pub const META_CUSTOMER_EMAIL: &str = "customer_email";
pub const META_CUSTOMER_NAME: &str = "customer_name";
pub const META_TERMS_ACCEPTED_AT: &str = "terms_accepted_at";
pub const META_PAYMENT_ID: &str = "payment_id";
pub const META_AMOUNT: &str = "amount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPhase {
    Initial,
    Final,
}

impl PaymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPhase::Initial => "initial",
            PaymentPhase::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitialCheckoutRequest {
    pub plan_name: String,
    pub total_amount: i64,
    pub description: Option<String>,
    pub email: String,
    pub name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub terms_accepted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalCheckoutRequest {
    pub project_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutStarted {
    pub session_id: String,
    pub url: Option<String>,
    pub project_code: String,
    pub phase: PaymentPhase,
    pub first_payment: i64,
    pub second_payment: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("session metadata is missing `{0}`")]
    Missing(&'static str),
    #[error("session metadata `{key}` has invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
    #[error("unknown payment phase `{0}`")]
    UnknownPhase(String),
    #[error("installments {first} + {second} do not sum to total {total}")]
    InconsistentSplit { total: i64, first: i64, second: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPaymentMetadata {
    pub project_code: String,
    pub plan_name: String,
    pub total_amount: i64,
    pub first_payment: i64,
    pub second_payment: i64,
    pub customer_email: String,
    pub customer_name: String,
    pub terms_accepted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalPaymentMetadata {
    pub payment_id: Uuid,
    pub project_code: String,
    pub amount: i64,
}

/// Opaque state attached to a processor session. It carries enough to rebuild
/// a payment record without any prior database row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMetadata {
    Initial(InitialPaymentMetadata),
    Final(FinalPaymentMetadata),
}

impl SessionMetadata {
    pub fn phase(&self) -> PaymentPhase {
        match self {
            SessionMetadata::Initial(_) => PaymentPhase::Initial,
            SessionMetadata::Final(_) => PaymentPhase::Final,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(META_PAYMENT_TYPE.to_string(), self.phase().as_str().to_string());
        match self {
            SessionMetadata::Initial(m) => {
                map.insert(META_PROJECT_CODE.to_string(), m.project_code.clone());
                map.insert(META_PLAN_NAME.to_string(), m.plan_name.clone());
                map.insert(META_TOTAL_AMOUNT.to_string(), m.total_amount.to_string());
                map.insert(META_FIRST_PAYMENT.to_string(), m.first_payment.to_string());
                map.insert(META_SECOND_PAYMENT.to_string(), m.second_payment.to_string());
                map.insert(META_CUSTOMER_EMAIL.to_string(), m.customer_email.clone());
                map.insert(META_CUSTOMER_NAME.to_string(), m.customer_name.clone());
                if let Some(accepted) = m.terms_accepted_at.and_then(|t| t.format(&Rfc3339).ok())
                {
                    map.insert(META_TERMS_ACCEPTED_AT.to_string(), accepted);
                }
            }
            SessionMetadata::Final(m) => {
                map.insert(META_PAYMENT_ID.to_string(), m.payment_id.to_string());
                map.insert(META_PROJECT_CODE.to_string(), m.project_code.clone());
                map.insert(META_AMOUNT.to_string(), m.amount.to_string());
            }
        }
        map
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, MetadataError> {
        let phase = required(map, META_PAYMENT_TYPE)?;
        match phase {
            "initial" => {
                let terms_accepted_at = match map.get(META_TERMS_ACCEPTED_AT) {
                    Some(raw) if !raw.trim().is_empty() => Some(
                        OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|_| {
                            MetadataError::Invalid {
                                key: META_TERMS_ACCEPTED_AT,
                                value: raw.clone(),
                            }
                        })?,
                    ),
                    _ => None,
                };
                let total = amount(map, META_TOTAL_AMOUNT)?;
                let first = amount(map, META_FIRST_PAYMENT)?;
                let second = amount(map, META_SECOND_PAYMENT)?;
                if first.checked_add(second) != Some(total) {
                    return Err(MetadataError::InconsistentSplit {
                        total,
                        first,
                        second,
                    });
                }
                Ok(SessionMetadata::Initial(InitialPaymentMetadata {
                    project_code: required(map, META_PROJECT_CODE)?.to_string(),
                    plan_name: required(map, META_PLAN_NAME)?.to_string(),
                    total_amount: total,
                    first_payment: first,
                    second_payment: second,
                    customer_email: required(map, META_CUSTOMER_EMAIL)?.to_string(),
                    customer_name: map
                        .get(META_CUSTOMER_NAME)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default(),
                    terms_accepted_at,
                }))
            }
            "final" => {
                let raw_id = required(map, META_PAYMENT_ID)?;
                let payment_id = Uuid::parse_str(raw_id).map_err(|_| MetadataError::Invalid {
                    key: META_PAYMENT_ID,
                    value: raw_id.to_string(),
                })?;
                Ok(SessionMetadata::Final(FinalPaymentMetadata {
                    payment_id,
                    project_code: required(map, META_PROJECT_CODE)?.to_string(),
                    amount: amount(map, META_AMOUNT)?,
                }))
            }
            other => Err(MetadataError::UnknownPhase(other.to_string())),
        }
    }
}

fn required<'a>(
    map: &'a BTreeMap<String, String>,
    key: &'static str,
) -> Result<&'a str, MetadataError> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(MetadataError::Missing(key))
}

fn amount(map: &BTreeMap<String, String>, key: &'static str) -> Result<i64, MetadataError> {
    let raw = required(map, key)?;
    raw.parse::<i64>()
        .ok()
        .filter(|v| *v >= 0)
        .ok_or_else(|| MetadataError::Invalid {
            key,
            value: raw.to_string(),
        })
}
