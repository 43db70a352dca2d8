//! Payment allocation model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why a payment is linked to a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationKind {
    /// Trade payment against a receiving report or delivery receipt.
    Trade,
    /// Payment covering one of several invoices.
    MultiInvoice,
    /// Non-cash invoice-to-invoice or advance offset.
    Offset,
}

impl AllocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationKind::Trade => "trade",
            AllocationKind::MultiInvoice => "multi_invoice",
            AllocationKind::Offset => "offset",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "multi_invoice" => AllocationKind::MultiInvoice,
            "offset" => AllocationKind::Offset,
            _ => AllocationKind::Trade,
        }
    }
}

/// One payment's share of one source document's balance.
///
/// Rows are created by Allocate and destroyed by Deallocate, never mutated
/// in place; edits delete and recreate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentAllocation {
    pub allocation_id: Uuid,
    pub company_id: Uuid,
    pub payment_id: Uuid,
    pub source_id: Uuid,
    pub amount: Decimal,
    pub kind: String,
    pub created_utc: DateTime<Utc>,
}

/// Request to allocate part of a payment to one source document.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub source_id: Uuid,
    pub amount: Decimal,
    pub kind: AllocationKind,
}
