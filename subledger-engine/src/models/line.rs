//! Journal line models.
//!
//! User-entered ("trade") lines and system-generated tax/cash lines live in
//! the same table, distinguished by `is_system_generated`. Inputs keep the
//! two apart so a regeneration pass can never touch user data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Polymorphic sub-account reference kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAccountKind {
    Bank,
    Supplier,
    Employee,
    Customer,
}

impl SubAccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubAccountKind::Bank => "bank",
            SubAccountKind::Supplier => "supplier",
            SubAccountKind::Employee => "employee",
            SubAccountKind::Customer => "customer",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "bank" => Some(SubAccountKind::Bank),
            "supplier" => Some(SubAccountKind::Supplier),
            "employee" => Some(SubAccountKind::Employee),
            "customer" => Some(SubAccountKind::Customer),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubAccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted journal line.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JournalLine {
    pub line_id: Uuid,
    pub document_id: Uuid,
    pub company_id: Uuid,
    pub account_code: String,
    pub account_name: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub sub_kind: Option<String>,
    pub sub_id: Option<Uuid>,
    pub sub_name: Option<String>,
    pub is_system_generated: bool,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// User-entered line input. Account and sub-account names are resolved by
/// the engine at persist time.
#[derive(Debug, Clone)]
pub struct NewJournalLine {
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub sub_kind: Option<SubAccountKind>,
    pub sub_id: Option<Uuid>,
    pub sort_order: i32,
}

/// Fully resolved system-generated line produced by the journal builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLine {
    pub account_code: String,
    pub account_name: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub sub_kind: Option<SubAccountKind>,
    pub sub_id: Option<Uuid>,
    pub sub_name: Option<String>,
    pub sort_order: i32,
}
