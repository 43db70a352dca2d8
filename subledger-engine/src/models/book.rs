//! Accounting book projections.
//!
//! Append-only side tables written on Post and deleted by document
//! reference on Void/Unpost. Derived and rebuildable; they carry no
//! invariants of their own.

use crate::models::document::DocumentType;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Which book an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookKind {
    Disbursement,
    CashReceipt,
    GeneralLedger,
}

impl BookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookKind::Disbursement => "disbursement",
            BookKind::CashReceipt => "cash_receipt",
            BookKind::GeneralLedger => "general_ledger",
        }
    }

    /// The type-specific book a posted document lands in, if any. All
    /// posted documents additionally land in the general ledger book.
    pub fn for_document(document_type: DocumentType) -> Option<BookKind> {
        match document_type {
            DocumentType::DisbursementVoucher => Some(BookKind::Disbursement),
            DocumentType::CollectionReceipt => Some(BookKind::CashReceipt),
            _ => None,
        }
    }
}

/// One projected book row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookEntry {
    pub entry_id: Uuid,
    pub company_id: Uuid,
    pub book: String,
    pub reference: String,
    pub account_code: String,
    pub account_name: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub entry_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}
