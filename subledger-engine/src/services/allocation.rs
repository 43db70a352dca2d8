//! Payment allocation engine.
//!
//! Splits a payment's amount across one or many source documents and
//! reverses those splits, maintaining the outstanding-balance invariant:
//! for every source, the sum of its allocation rows equals its
//! `amount_paid`, and `0 <= amount_paid <= total` within tolerance.
//!
//! The arithmetic lives in pure functions over in-memory documents; the
//! async functions fetch sources `FOR UPDATE` and persist the plan inside
//! the caller's transaction.

use crate::models::document::{DocumentStatus, FinancialDocument};
use crate::models::{AllocationRequest, PaymentAllocation};
use crate::services::database::map_db_err;
use crate::services::metrics::ALLOCATIONS_TOTAL;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use std::collections::HashMap;
use subledger_core::error::AppError;
use tracing::info;
use uuid::Uuid;

/// Comparison slack for money equality, 0.0001.
pub fn tolerance() -> Decimal {
    Decimal::new(1, 4)
}

/// Status a source document should carry given its payment state.
pub fn payment_status(amount_paid: Decimal, total: Decimal, posted: bool) -> DocumentStatus {
    if total > Decimal::ZERO && amount_paid >= total - tolerance() {
        DocumentStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        DocumentStatus::PartiallyPaid
    } else if posted {
        DocumentStatus::Posted
    } else {
        DocumentStatus::ForPosting
    }
}

/// Whether a source counts as fully paid for the post-time paid flag.
pub fn fully_paid(source: &FinancialDocument) -> bool {
    source.total > Decimal::ZERO && source.amount_paid >= source.total - tolerance()
}

/// Remaining room on a source for this payment. The add-back of the
/// payment's own prior allocation supports in-place edits.
pub fn remaining_on(source: &FinancialDocument, prior_from_payment: Decimal) -> Decimal {
    source.total - source.amount_paid + prior_from_payment
}

/// Reject non-positive or over-balance amounts.
pub fn validate_amount(amount: Decimal, remaining: Decimal) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "allocation amount {} must be positive",
            amount
        )));
    }
    if amount > remaining + tolerance() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "allocation amount {} exceeds remaining balance {}",
            amount,
            remaining
        )));
    }
    Ok(())
}

/// Apply allocation requests against in-memory sources.
///
/// Mutates each source's `amount_paid` and `status` and returns the rows to
/// persist. `prior_by_source` carries this payment's existing allocation per
/// source (the edit add-back); pass an empty map for fresh allocations.
pub fn plan_allocations(
    company_id: Uuid,
    payment_id: Uuid,
    sources: &mut [FinancialDocument],
    requests: &[AllocationRequest],
    prior_by_source: &HashMap<Uuid, Decimal>,
) -> Result<Vec<PaymentAllocation>, AppError> {
    let mut rows = Vec::with_capacity(requests.len());

    for request in requests {
        let source = sources
            .iter_mut()
            .find(|s| s.document_id == request.source_id)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "source document {} not found",
                    request.source_id
                ))
            })?;

        if source.parsed_status().is_terminal() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "cannot allocate against {} {} ({})",
                source.document_type,
                source.document_no,
                source.status
            )));
        }

        let prior = prior_by_source
            .get(&request.source_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let remaining = remaining_on(source, prior);
        validate_amount(request.amount, remaining)?;

        source.amount_paid += request.amount;
        source.status = payment_status(source.amount_paid, source.total, source.is_posted())
            .as_str()
            .to_string();

        rows.push(PaymentAllocation {
            allocation_id: Uuid::new_v4(),
            company_id,
            payment_id,
            source_id: request.source_id,
            amount: request.amount,
            kind: request.kind.as_str().to_string(),
            created_utc: Utc::now(),
        });
    }

    Ok(rows)
}

/// Reverse allocation rows against in-memory sources: subtract each row's
/// amount (floored at zero), recompute status, and drop the paid flag when
/// the source is no longer fully covered.
pub fn reverse_allocations(sources: &mut [FinancialDocument], rows: &[PaymentAllocation]) {
    for row in rows {
        if let Some(source) = sources
            .iter_mut()
            .find(|s| s.document_id == row.source_id)
        {
            source.amount_paid = (source.amount_paid - row.amount).max(Decimal::ZERO);
            source.status = payment_status(source.amount_paid, source.total, source.is_posted())
                .as_str()
                .to_string();
            if !fully_paid(source) {
                source.is_paid = false;
            }
        }
    }
}

// -------------------------------------------------------------------------
// Transaction-composable persistence
// -------------------------------------------------------------------------

/// Canonical row-lock order: ascending by id, duplicates collapsed.
/// Payments locking overlapping source sets always take the locks in the
/// same order and cannot deadlock each other.
pub fn lock_order(source_ids: &[Uuid]) -> Vec<Uuid> {
    let mut ordered = source_ids.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}

/// Fetch source documents with row locks, serializing concurrent payments
/// against the same source.
pub async fn fetch_sources_for_update(
    conn: &mut PgConnection,
    company_id: Uuid,
    source_ids: &[Uuid],
) -> Result<Vec<FinancialDocument>, AppError> {
    let ordered = lock_order(source_ids);
    let sources = sqlx::query_as::<_, FinancialDocument>(
        r#"
        SELECT * FROM documents
        WHERE company_id = $1 AND document_id = ANY($2)
        ORDER BY document_id
        FOR UPDATE
        "#,
    )
    .bind(company_id)
    .bind(&ordered)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_db_err("Failed to lock source documents", e))?;

    for id in source_ids {
        if !sources.iter().any(|s| s.document_id == *id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "source document {} not found",
                id
            )));
        }
    }

    Ok(sources)
}

/// This payment's existing allocation per source, for the edit add-back.
pub async fn prior_allocations_by_source(
    conn: &mut PgConnection,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<HashMap<Uuid, Decimal>, AppError> {
    let rows: Vec<(Uuid, Decimal)> = sqlx::query_as(
        r#"
        SELECT source_id, COALESCE(SUM(amount), 0)
        FROM allocations
        WHERE company_id = $1 AND payment_id = $2
        GROUP BY source_id
        "#,
    )
    .bind(company_id)
    .bind(payment_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_db_err("Failed to sum prior allocations", e))?;

    Ok(rows.into_iter().collect())
}

/// Persist a source document's payment state after planning or reversal.
pub async fn persist_source_state(
    conn: &mut PgConnection,
    source: &FinancialDocument,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE documents
        SET amount_paid = $3, status = $4, is_paid = $5
        WHERE company_id = $1 AND document_id = $2
        "#,
    )
    .bind(source.company_id)
    .bind(source.document_id)
    .bind(source.amount_paid)
    .bind(&source.status)
    .bind(source.is_paid)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_db_err("Failed to update source payment state", e))?;
    Ok(())
}

/// Allocate a payment across its sources inside the caller's transaction.
pub async fn allocate(
    conn: &mut PgConnection,
    company_id: Uuid,
    payment_id: Uuid,
    requests: &[AllocationRequest],
) -> Result<Vec<PaymentAllocation>, AppError> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let source_ids: Vec<Uuid> = requests.iter().map(|r| r.source_id).collect();
    let mut sources = fetch_sources_for_update(&mut *conn, company_id, &source_ids).await?;
    let prior = prior_allocations_by_source(&mut *conn, company_id, payment_id).await?;

    let rows = plan_allocations(company_id, payment_id, &mut sources, requests, &prior)?;

    for row in &rows {
        sqlx::query(
            r#"
            INSERT INTO allocations (allocation_id, company_id, payment_id, source_id, amount, kind, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.allocation_id)
        .bind(row.company_id)
        .bind(row.payment_id)
        .bind(row.source_id)
        .bind(row.amount)
        .bind(&row.kind)
        .bind(row.created_utc)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_err("Failed to insert allocation", e))?;

        ALLOCATIONS_TOTAL.with_label_values(&[&row.kind]).inc();
    }

    for source in &sources {
        persist_source_state(&mut *conn, source).await?;
    }

    info!(
        payment_id = %payment_id,
        allocation_count = rows.len(),
        "Payment allocated"
    );

    Ok(rows)
}

/// Reverse and delete every allocation owned by a payment.
pub async fn deallocate(
    conn: &mut PgConnection,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<(), AppError> {
    let rows = sqlx::query_as::<_, PaymentAllocation>(
        r#"
        SELECT * FROM allocations
        WHERE company_id = $1 AND payment_id = $2
        "#,
    )
    .bind(company_id)
    .bind(payment_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_db_err("Failed to fetch allocations", e))?;

    if rows.is_empty() {
        return Ok(());
    }

    let source_ids: Vec<Uuid> = rows.iter().map(|r| r.source_id).collect();
    let mut sources = fetch_sources_for_update(&mut *conn, company_id, &source_ids).await?;

    reverse_allocations(&mut sources, &rows);

    for source in &sources {
        persist_source_state(&mut *conn, source).await?;
    }

    sqlx::query("DELETE FROM allocations WHERE company_id = $1 AND payment_id = $2")
        .bind(company_id)
        .bind(payment_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_err("Failed to delete allocations", e))?;

    info!(
        payment_id = %payment_id,
        allocation_count = rows.len(),
        "Payment deallocated"
    );

    Ok(())
}

/// Flip the post-time paid flag on every source linked to a payment.
/// `amount_paid` is deliberately untouched here.
pub async fn set_linked_paid_flags(
    conn: &mut PgConnection,
    company_id: Uuid,
    payment_id: Uuid,
    posting: bool,
) -> Result<(), AppError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT source_id FROM allocations
        WHERE company_id = $1 AND payment_id = $2
        "#,
    )
    .bind(company_id)
    .bind(payment_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_db_err("Failed to list linked sources", e))?;

    if rows.is_empty() {
        return Ok(());
    }

    let source_ids: Vec<Uuid> = rows.into_iter().map(|(id,)| id).collect();
    let mut sources = fetch_sources_for_update(&mut *conn, company_id, &source_ids).await?;

    for source in &mut sources {
        source.is_paid = posting && fully_paid(source);
        persist_source_state(&mut *conn, source).await?;
    }

    Ok(())
}
