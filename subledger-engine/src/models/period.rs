//! Accounting period lock model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Closing boundary for a (company, module) pair. Transactions dated on or
/// before `closed_through` may no longer be created or altered.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PeriodLock {
    pub lock_id: Uuid,
    pub company_id: Uuid,
    pub module: String,
    pub closed_through: NaiveDate,
    pub created_utc: DateTime<Utc>,
}
