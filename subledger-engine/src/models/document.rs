//! Financial document header model and lifecycle rules.

use crate::models::line::SubAccountKind;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use subledger_core::error::AppError;
use uuid::Uuid;

/// Document variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    DisbursementVoucher,
    CollectionReceipt,
    SalesInvoice,
    ServiceInvoice,
    PurchaseOrder,
    ReceivingReport,
    DeliveryReceipt,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::DisbursementVoucher => "disbursement_voucher",
            DocumentType::CollectionReceipt => "collection_receipt",
            DocumentType::SalesInvoice => "sales_invoice",
            DocumentType::ServiceInvoice => "service_invoice",
            DocumentType::PurchaseOrder => "purchase_order",
            DocumentType::ReceivingReport => "receiving_report",
            DocumentType::DeliveryReceipt => "delivery_receipt",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "collection_receipt" => DocumentType::CollectionReceipt,
            "sales_invoice" => DocumentType::SalesInvoice,
            "service_invoice" => DocumentType::ServiceInvoice,
            "purchase_order" => DocumentType::PurchaseOrder,
            "receiving_report" => DocumentType::ReceivingReport,
            "delivery_receipt" => DocumentType::DeliveryReceipt,
            _ => DocumentType::DisbursementVoucher,
        }
    }

    /// Series prefix used by the code generator.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            DocumentType::DisbursementVoucher => "DV",
            DocumentType::CollectionReceipt => "CR",
            DocumentType::SalesInvoice => "SI",
            DocumentType::ServiceInvoice => "SV",
            DocumentType::PurchaseOrder => "PO",
            DocumentType::ReceivingReport => "RR",
            DocumentType::DeliveryReceipt => "DR",
        }
    }

    /// Period-lock module this document type belongs to.
    pub fn module(&self) -> &'static str {
        match self {
            DocumentType::DisbursementVoucher => "disbursement",
            DocumentType::CollectionReceipt => "collection",
            DocumentType::SalesInvoice | DocumentType::ServiceInvoice => "sales",
            DocumentType::PurchaseOrder | DocumentType::ReceivingReport => "purchasing",
            DocumentType::DeliveryReceipt => "delivery",
        }
    }

    /// Payment documents settle other documents through allocations and
    /// carry system-generated tax/cash journal lines.
    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            DocumentType::DisbursementVoucher | DocumentType::CollectionReceipt
        )
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document status.
///
/// Lifecycle states (`ForPosting`, `Posted`, terminal `Voided`/`Canceled`,
/// receipt deposit states) and payment states (`PartiallyPaid`, `Paid`)
/// share one field; the allocation engine overwrites lifecycle states with
/// payment states as money lands on a source document and restores them on
/// deallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    ForPosting,
    Posted,
    PartiallyPaid,
    Paid,
    Voided,
    Canceled,
    Deposited,
    Returned,
    Cleared,
    Liquidated,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::ForPosting => "for_posting",
            DocumentStatus::Posted => "posted",
            DocumentStatus::PartiallyPaid => "partially_paid",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Voided => "voided",
            DocumentStatus::Canceled => "canceled",
            DocumentStatus::Deposited => "deposited",
            DocumentStatus::Returned => "returned",
            DocumentStatus::Cleared => "cleared",
            DocumentStatus::Liquidated => "liquidated",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "posted" => DocumentStatus::Posted,
            "partially_paid" => DocumentStatus::PartiallyPaid,
            "paid" => DocumentStatus::Paid,
            "voided" => DocumentStatus::Voided,
            "canceled" => DocumentStatus::Canceled,
            "deposited" => DocumentStatus::Deposited,
            "returned" => DocumentStatus::Returned,
            "cleared" => DocumentStatus::Cleared,
            "liquidated" => DocumentStatus::Liquidated,
            _ => DocumentStatus::ForPosting,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Voided | DocumentStatus::Canceled)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User actions driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentAction {
    Edit,
    Post,
    Unpost,
    Void,
    Cancel,
    Deposit,
    ReturnDeposit,
    Redeposit,
    ApplyClearingDate,
    Liquidate,
}

impl DocumentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentAction::Edit => "edit",
            DocumentAction::Post => "post",
            DocumentAction::Unpost => "unpost",
            DocumentAction::Void => "void",
            DocumentAction::Cancel => "cancel",
            DocumentAction::Deposit => "deposit",
            DocumentAction::ReturnDeposit => "return_deposit",
            DocumentAction::Redeposit => "redeposit",
            DocumentAction::ApplyClearingDate => "apply_clearing_date",
            DocumentAction::Liquidate => "liquidate",
        }
    }
}

/// Financial document header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinancialDocument {
    pub document_id: Uuid,
    pub company_id: Uuid,
    pub document_type: String,
    pub document_no: String,
    pub transaction_date: NaiveDate,
    pub particulars: Option<String>,
    pub payee_kind: Option<String>,
    pub payee_id: Option<Uuid>,
    pub payee_name: Option<String>,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub vat_type: String,
    pub tax_type: String,
    pub tax_rate: Decimal,
    pub is_advance: bool,
    /// Set when the paying document is posted; cleared on unpost/void.
    /// Distinct from `amount_paid`, which the allocation engine maintains.
    pub is_paid: bool,
    pub due_date: Option<NaiveDate>,
    pub bank_id: Option<Uuid>,
    pub deposited_date: Option<NaiveDate>,
    pub cleared_date: Option<NaiveDate>,
    pub liquidated_date: Option<NaiveDate>,
    pub cost_of_money: Decimal,
    pub canceled_remarks: Option<String>,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
    pub edited_by: Option<Uuid>,
    pub edited_utc: Option<DateTime<Utc>>,
    pub posted_by: Option<Uuid>,
    pub posted_utc: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub voided_utc: Option<DateTime<Utc>>,
    pub canceled_by: Option<Uuid>,
    pub canceled_utc: Option<DateTime<Utc>>,
}

impl FinancialDocument {
    pub fn parsed_type(&self) -> DocumentType {
        DocumentType::from_string(&self.document_type)
    }

    pub fn parsed_status(&self) -> DocumentStatus {
        DocumentStatus::from_string(&self.status)
    }

    pub fn is_posted(&self) -> bool {
        self.posted_utc.is_some()
    }

    /// Outstanding balance, never negative.
    pub fn balance(&self) -> Decimal {
        (self.total - self.amount_paid).max(Decimal::ZERO)
    }

    /// Check whether `action` is allowed from the document's current state.
    ///
    /// Pure guard over the transition table; the lifecycle service layers
    /// period-lock and privilege checks on top.
    pub fn validate_action(&self, action: DocumentAction) -> Result<(), AppError> {
        let status = self.parsed_status();
        if status.is_terminal() {
            return Err(AppError::StateConflict(anyhow::anyhow!(
                "{} {} is {} and accepts no further changes",
                self.document_type,
                self.document_no,
                status
            )));
        }

        let allowed = match action {
            DocumentAction::Edit => !self.is_posted(),
            DocumentAction::Post => !self.is_posted(),
            DocumentAction::Unpost => {
                self.is_posted()
                    && !matches!(
                        status,
                        DocumentStatus::Deposited
                            | DocumentStatus::Cleared
                            | DocumentStatus::Returned
                    )
            }
            DocumentAction::Void => self.is_posted(),
            DocumentAction::Cancel => !self.is_posted(),
            DocumentAction::Deposit => {
                self.parsed_type() == DocumentType::CollectionReceipt
                    && self.is_posted()
                    && self.deposited_date.is_none()
                    && status != DocumentStatus::Returned
            }
            DocumentAction::ReturnDeposit => status == DocumentStatus::Deposited,
            DocumentAction::Redeposit => status == DocumentStatus::Returned,
            DocumentAction::ApplyClearingDate => status == DocumentStatus::Deposited,
            DocumentAction::Liquidate => {
                self.is_advance && status != DocumentStatus::Liquidated
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::StateConflict(anyhow::anyhow!(
                "cannot {} {} {} while {}",
                action.as_str(),
                self.document_type,
                self.document_no,
                status
            )))
        }
    }
}

/// Input for creating a document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub document_type: DocumentType,
    pub transaction_date: NaiveDate,
    pub particulars: Option<String>,
    pub payee_kind: Option<SubAccountKind>,
    pub payee_id: Option<Uuid>,
    pub total: Decimal,
    pub vat_type: String,
    pub tax_type: String,
    pub tax_rate: Decimal,
    pub is_advance: bool,
    /// Draw the number from the shared multi-invoice payment series
    /// instead of the per-type series.
    pub multi_invoice: bool,
    pub due_date: Option<NaiveDate>,
}

/// Input for editing an unposted document. Header fields are re-supplied
/// in full; lines and allocations are wholly replaced alongside.
#[derive(Debug, Clone)]
pub struct EditDocument {
    pub transaction_date: NaiveDate,
    pub particulars: Option<String>,
    pub payee_kind: Option<SubAccountKind>,
    pub payee_id: Option<Uuid>,
    pub total: Decimal,
    pub vat_type: String,
    pub tax_type: String,
    pub tax_rate: Decimal,
    pub due_date: Option<NaiveDate>,
}
