//! Book recorders.
//!
//! Derived, rebuildable projections of posted documents: every posted
//! document lands in the general ledger book, and disbursement vouchers /
//! collection receipts additionally land in their own book. Rows are
//! deleted by document reference on Void/Unpost.

use crate::models::document::FinancialDocument;
use crate::models::line::JournalLine;
use crate::models::BookKind;
use crate::services::database::map_db_err;
use sqlx::PgConnection;
use subledger_core::error::AppError;
use uuid::Uuid;

/// Project a posted document's full line set into its books.
pub async fn record_on_post(
    conn: &mut PgConnection,
    document: &FinancialDocument,
    lines: &[JournalLine],
) -> Result<(), AppError> {
    let mut books = vec![BookKind::GeneralLedger];
    if let Some(book) = BookKind::for_document(document.parsed_type()) {
        books.push(book);
    }

    for book in books {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO book_entries (entry_id, company_id, book, reference, account_code, account_name, debit, credit, entry_date)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(document.company_id)
            .bind(book.as_str())
            .bind(&document.document_no)
            .bind(&line.account_code)
            .bind(&line.account_name)
            .bind(line.debit)
            .bind(line.credit)
            .bind(document.transaction_date)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_db_err("Failed to write book entry", e))?;
        }
    }

    Ok(())
}

/// Delete every book row carrying a document reference.
pub async fn delete_by_reference(
    conn: &mut PgConnection,
    company_id: Uuid,
    reference: &str,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM book_entries WHERE company_id = $1 AND reference = $2")
        .bind(company_id)
        .bind(reference)
        .execute(conn)
        .await
        .map_err(|e| map_db_err("Failed to delete book entries", e))?;
    Ok(())
}
