//! Period lock guard.
//!
//! Accounting control preventing historical transactions from being
//! created or altered once a reporting month is closed. Checked first by
//! Create/Edit/Post/Unpost, before any mutation.

use crate::models::PeriodLock;
use crate::services::database::map_db_err;
use chrono::{Days, NaiveDate};
use sqlx::PgConnection;
use subledger_core::error::AppError;
use uuid::Uuid;

/// True iff a closing boundary exists and `date` falls on or before it.
pub fn is_closed(closed_through: Option<NaiveDate>, date: NaiveDate) -> bool {
    matches!(closed_through, Some(boundary) if date <= boundary)
}

async fn boundary_for(
    conn: &mut PgConnection,
    company_id: Uuid,
    module: &str,
) -> Result<Option<NaiveDate>, AppError> {
    sqlx::query_scalar(
        r#"
        SELECT MAX(closed_through) FROM period_locks
        WHERE company_id = $1 AND module = $2
        "#,
    )
    .bind(company_id)
    .bind(module)
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_err("Failed to read period locks", e))
}

/// Abort with `PeriodClosed` if `date` falls inside a closed period for
/// the (company, module) pair.
pub async fn guard(
    conn: &mut PgConnection,
    company_id: Uuid,
    module: &str,
    date: NaiveDate,
) -> Result<(), AppError> {
    let boundary = boundary_for(conn, company_id, module).await?;
    if is_closed(boundary, date) {
        return Err(AppError::PeriodClosed(date));
    }
    Ok(())
}

/// Earliest open transaction date, for UI hinting. `None` when no period
/// has ever been closed.
pub async fn minimum_editable_date(
    conn: &mut PgConnection,
    company_id: Uuid,
    module: &str,
) -> Result<Option<NaiveDate>, AppError> {
    let boundary = boundary_for(conn, company_id, module).await?;
    Ok(boundary.and_then(|b| b.checked_add_days(Days::new(1))))
}

/// Close a module's books through `closed_through`. Boundaries only ever
/// move forward; a date behind the current boundary is rejected.
pub async fn close(
    conn: &mut PgConnection,
    company_id: Uuid,
    module: &str,
    closed_through: NaiveDate,
) -> Result<PeriodLock, AppError> {
    let boundary = boundary_for(&mut *conn, company_id, module).await?;
    if matches!(boundary, Some(current) if closed_through <= current) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "{} is already closed through {}",
            module,
            boundary.unwrap_or(closed_through)
        )));
    }

    sqlx::query_as::<_, PeriodLock>(
        r#"
        INSERT INTO period_locks (lock_id, company_id, module, closed_through)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(module)
    .bind(closed_through)
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_err("Failed to close period", e))
}

/// Every lock recorded for a company, newest boundary first.
pub async fn list_locks(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Vec<PeriodLock>, AppError> {
    sqlx::query_as::<_, PeriodLock>(
        r#"
        SELECT * FROM period_locks
        WHERE company_id = $1
        ORDER BY closed_through DESC, module
        "#,
    )
    .bind(company_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_err("Failed to list period locks", e))
}
