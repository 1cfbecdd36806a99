pub mod payment_repository;
pub mod postgres_payment_repository;
pub mod postgres_quota_repository;
pub mod quota_repository;

#[cfg(test)]
pub mod mock_db;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == "23505"; // unique_violation
        }
    }
    false
}
