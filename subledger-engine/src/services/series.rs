//! Sequential document number generator.
//!
//! Numbers are consumed inside the caller's transaction; the row update on
//! `document_series` takes a row lock, so concurrent creates serialize and
//! the sequence stays gap-free per (company, series).

use crate::models::document::DocumentType;
use crate::services::database::map_db_err;
use sqlx::PgConnection;
use subledger_core::error::AppError;
use uuid::Uuid;

const CODE_WIDTH: usize = 10;

/// Series key for payments aggregating multiple source invoices.
const MULTI_PAYMENT_SERIES: &str = "multi_payment";

pub fn format_code(prefix: &str, value: i64) -> String {
    format!("{}-{:0width$}", prefix, value, width = CODE_WIDTH)
}

/// Next document number for a (company, document type) series.
pub async fn next_code(
    conn: &mut PgConnection,
    company_id: Uuid,
    document_type: DocumentType,
) -> Result<String, AppError> {
    next_in_series(
        conn,
        company_id,
        document_type.as_str(),
        document_type.code_prefix(),
    )
    .await
}

/// Next number for a multi-invoice payment, same contract as `next_code`.
pub async fn next_multi_payment_code(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<String, AppError> {
    next_in_series(conn, company_id, MULTI_PAYMENT_SERIES, "MP").await
}

async fn next_in_series(
    conn: &mut PgConnection,
    company_id: Uuid,
    series_key: &str,
    prefix: &str,
) -> Result<String, AppError> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_series (company_id, series_key, next_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (company_id, series_key)
        DO UPDATE SET next_value = document_series.next_value + 1
        RETURNING next_value
        "#,
    )
    .bind(company_id)
    .bind(series_key)
    .fetch_one(conn)
    .await
    .map_err(|e| map_db_err("Failed to advance document series", e))?;

    Ok(format_code(prefix, value))
}
