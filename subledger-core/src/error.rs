use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Typed errors surfaced by the subledger engine.
///
/// Every business-rule violation is raised inside the active database
/// transaction and rolls the whole transaction back before reaching the
/// caller. Callers translate these into user-facing messages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Period closed: no changes allowed for transactions dated {0}")]
    PeriodClosed(NaiveDate),

    #[error("State conflict: {0}")]
    StateConflict(anyhow::Error),

    #[error("Data integrity error: {0}")]
    DataIntegrity(anyhow::Error),

    #[error("Concurrency conflict: {0}")]
    Concurrency(anyhow::Error),

    #[error("Division error: divisor {0} must be positive")]
    Division(Decimal),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}
