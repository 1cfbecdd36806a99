use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::{Date, OffsetDateTime};
use tokio::sync::Barrier;
use uuid::Uuid;

use crate::db::{payment_repository::PaymentRepository, quota_repository::QuotaRepository};
use crate::models::payment::{
    CreatePaymentOutcome, FinalPaymentUpdate, NewPaymentRecord, PaymentRecord, ProjectStatus,
};
use crate::models::quota::QuotaReservation;

/// Row of the terms-acceptance audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsAcceptance {
    pub payment_id: Uuid,
    pub email: String,
    pub accepted_at: OffsetDateTime,
}

/// In-memory payments table enforcing the same unique keys as Postgres.
#[derive(Default)]
pub struct MockPaymentRepository {
    pub records: Mutex<Vec<PaymentRecord>>,
    pub terms: Mutex<Vec<TermsAcceptance>>,
    pub create_attempts: Mutex<usize>,
    pub lost_races: Mutex<usize>,
    pub lookups: Mutex<usize>,
    /// Codes passed to `project_code_exists`, in order.
    pub code_checks: Mutex<Vec<String>>,
    /// The next N codes checked are reported as taken.
    pub codes_reported_taken: Mutex<usize>,
    /// Every creator waits here between its existence check and its insert,
    /// which forces concurrent writers to interleave.
    pub insert_barrier: Option<Arc<Barrier>>,
    pub should_fail: bool,
}

impl MockPaymentRepository {
    pub fn with_records(records: Vec<PaymentRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn with_insert_barrier(barrier: Arc<Barrier>) -> Self {
        Self {
            insert_barrier: Some(barrier),
            ..Default::default()
        }
    }

    pub fn insert(&self, record: PaymentRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn all(&self) -> Vec<PaymentRecord> {
        self.records.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }

    fn find(&self, pred: impl Fn(&PaymentRecord) -> bool) -> Option<PaymentRecord> {
        self.records.lock().unwrap().iter().find(|r| pred(r)).cloned()
    }
}

/// A paid-deposit record in `in_progress`, ready to be tweaked by tests.
pub fn sample_record(project_code: &str, session_id: &str) -> PaymentRecord {
    let now = OffsetDateTime::now_utc();
    PaymentRecord {
        id: Uuid::new_v4(),
        project_code: project_code.to_string(),
        access_token: format!("token-{project_code}"),
        plan_name: "Starter Site".to_string(),
        total_amount: 300_000,
        first_payment: 150_000,
        second_payment: 150_000,
        email: "client@example.com".to_string(),
        name: "Casey Client".to_string(),
        client_id: None,
        first_paid: true,
        second_paid: false,
        first_paid_at: Some(now),
        second_paid_at: None,
        first_session_id: Some(session_id.to_string()),
        second_session_id: None,
        project_status: ProjectStatus::InProgress,
        project_ready: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl PaymentRepository for MockPaymentRepository {
    async fn find_by_code_or_session(
        &self,
        project_code: Option<&str>,
        session_id: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.check()?;
        *self.lookups.lock().unwrap() += 1;
        Ok(self.find(|r| {
            project_code.is_some_and(|code| r.project_code == code)
                || r.first_session_id.as_deref() == Some(session_id)
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.check()?;
        Ok(self.find(|r| r.id == id))
    }

    async fn find_by_project_code(
        &self,
        project_code: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.check()?;
        Ok(self.find(|r| r.project_code == project_code))
    }

    async fn find_by_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.check()?;
        Ok(self.find(|r| r.access_token == access_token))
    }

    async fn project_code_exists(&self, project_code: &str) -> Result<bool, sqlx::Error> {
        self.check()?;
        self.code_checks.lock().unwrap().push(project_code.to_string());
        let mut taken = self.codes_reported_taken.lock().unwrap();
        if *taken > 0 {
            *taken -= 1;
            return Ok(true);
        }
        drop(taken);
        Ok(self.find(|r| r.project_code == project_code).is_some())
    }

    async fn create_initial_payment(
        &self,
        new: &NewPaymentRecord,
    ) -> Result<CreatePaymentOutcome, sqlx::Error> {
        self.check()?;
        *self.create_attempts.lock().unwrap() += 1;

        if let Some(existing) = self.find(|r| {
            r.project_code == new.project_code
                || r.first_session_id.as_deref() == Some(new.first_session_id.as_str())
        }) {
            return Ok(CreatePaymentOutcome::AlreadyExists(existing));
        }

        if let Some(barrier) = &self.insert_barrier {
            barrier.wait().await;
        }

        let mut records = self.records.lock().unwrap();
        let violates_unique = records.iter().any(|r| {
            r.project_code == new.project_code
                || r.access_token == new.access_token
                || r.first_session_id.as_deref() == Some(new.first_session_id.as_str())
        });
        if violates_unique {
            *self.lost_races.lock().unwrap() += 1;
            return Ok(CreatePaymentOutcome::LostRace);
        }

        let now = OffsetDateTime::now_utc();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            project_code: new.project_code.clone(),
            access_token: new.access_token.clone(),
            plan_name: new.plan_name.clone(),
            total_amount: new.total_amount,
            first_payment: new.first_payment,
            second_payment: new.second_payment,
            email: new.email.clone(),
            name: new.name.clone(),
            client_id: None,
            first_paid: true,
            second_paid: false,
            first_paid_at: Some(new.first_paid_at),
            second_paid_at: None,
            first_session_id: Some(new.first_session_id.clone()),
            second_session_id: None,
            project_status: ProjectStatus::InProgress,
            project_ready: None,
            created_at: now,
            updated_at: now,
        };
        records.push(record.clone());

        if let Some(accepted_at) = new.terms_accepted_at {
            self.terms.lock().unwrap().push(TermsAcceptance {
                payment_id: record.id,
                email: record.email.clone(),
                accepted_at,
            });
        }

        Ok(CreatePaymentOutcome::Created(record))
    }

    async fn record_final_payment(
        &self,
        payment_id: Uuid,
        session_id: &str,
        paid_at: OffsetDateTime,
    ) -> Result<FinalPaymentUpdate, sqlx::Error> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.iter_mut().find(|r| r.id == payment_id) else {
            return Ok(FinalPaymentUpdate::NotFound);
        };
        if record.second_paid {
            return Ok(FinalPaymentUpdate::AlreadyPaid(record.clone()));
        }
        record.second_paid = true;
        record.second_paid_at = Some(paid_at);
        record.second_session_id = Some(session_id.to_string());
        record.project_status = ProjectStatus::Completed;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(FinalPaymentUpdate::Applied(record.clone()))
    }

    async fn update_project_status(
        &self,
        payment_id: Uuid,
        expected: ProjectStatus,
        next: ProjectStatus,
        project_ready: Option<OffsetDateTime>,
    ) -> Result<Option<PaymentRecord>, sqlx::Error> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.id == payment_id && r.project_status == expected)
        else {
            return Ok(None);
        };
        record.project_status = next;
        if project_ready.is_some() {
            record.project_ready = project_ready;
        }
        record.updated_at = OffsetDateTime::now_utc();
        Ok(Some(record.clone()))
    }
}

#[derive(Default)]
pub struct MockQuotaRepository {
    pub counters: Mutex<HashMap<Date, i64>>,
    pub release_calls: Mutex<usize>,
    pub should_fail: bool,
}

impl MockQuotaRepository {
    pub fn sent_on(&self, day: Date) -> Option<i64> {
        self.counters.lock().unwrap().get(&day).copied()
    }

    pub fn set_sent(&self, day: Date, emails_sent: i64) {
        self.counters.lock().unwrap().insert(day, emails_sent);
    }
}

#[async_trait]
impl QuotaRepository for MockQuotaRepository {
    async fn try_reserve(
        &self,
        day: Date,
        amount: i64,
        limit: i64,
    ) -> Result<QuotaReservation, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(day).or_insert(0);
        if *entry + amount > limit {
            return Ok(QuotaReservation::Denied {
                emails_sent: *entry,
            });
        }
        *entry += amount;
        Ok(QuotaReservation::Granted {
            emails_sent: *entry,
        })
    }

    async fn release(&self, day: Date, amount: i64) -> Result<bool, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        *self.release_calls.lock().unwrap() += 1;
        let mut counters = self.counters.lock().unwrap();
        match counters.get_mut(&day) {
            Some(sent) if *sent >= amount => {
                *sent -= amount;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn emails_sent(&self, day: Date) -> Result<i64, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(self.sent_on(day).unwrap_or(0))
    }
}
