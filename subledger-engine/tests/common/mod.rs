//! Shared builders for engine rule tests.

#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use subledger_engine::models::{
    DocumentStatus, DocumentType, FinancialDocument, JournalLine, SystemLine,
};
use uuid::Uuid;

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn document(document_type: DocumentType, total: Decimal) -> FinancialDocument {
    FinancialDocument {
        document_id: Uuid::new_v4(),
        company_id: Uuid::new_v4(),
        document_type: document_type.as_str().to_string(),
        document_no: format!("{}-0000000001", document_type.code_prefix()),
        transaction_date: NaiveDate::from_ymd_opt(2026, 7, 15).unwrap(),
        particulars: None,
        payee_kind: None,
        payee_id: None,
        payee_name: None,
        total,
        amount_paid: Decimal::ZERO,
        status: DocumentStatus::ForPosting.as_str().to_string(),
        vat_type: "exempt".to_string(),
        tax_type: "none".to_string(),
        tax_rate: Decimal::ZERO,
        is_advance: false,
        is_paid: false,
        due_date: None,
        bank_id: None,
        deposited_date: None,
        cleared_date: None,
        liquidated_date: None,
        cost_of_money: Decimal::ZERO,
        canceled_remarks: None,
        created_by: Uuid::new_v4(),
        created_utc: Utc::now(),
        edited_by: None,
        edited_utc: None,
        posted_by: None,
        posted_utc: None,
        voided_by: None,
        voided_utc: None,
        canceled_by: None,
        canceled_utc: None,
    }
}

pub fn posted(mut doc: FinancialDocument) -> FinancialDocument {
    doc.posted_by = Some(Uuid::new_v4());
    doc.posted_utc = Some(Utc::now());
    doc.status = DocumentStatus::Posted.as_str().to_string();
    doc
}

pub fn trade_line(
    doc: &FinancialDocument,
    account_code: &str,
    account_name: &str,
    debit: Decimal,
    credit: Decimal,
    sort_order: i32,
) -> JournalLine {
    JournalLine {
        line_id: Uuid::new_v4(),
        document_id: doc.document_id,
        company_id: doc.company_id,
        account_code: account_code.to_string(),
        account_name: account_name.to_string(),
        debit,
        credit,
        sub_kind: None,
        sub_id: None,
        sub_name: None,
        is_system_generated: false,
        sort_order,
        created_utc: Utc::now(),
    }
}

/// Turn a derived system line into a persisted-shaped journal line so it
/// can flow through the balance check alongside user lines.
pub fn materialize(doc: &FinancialDocument, line: &SystemLine) -> JournalLine {
    JournalLine {
        line_id: Uuid::new_v4(),
        document_id: doc.document_id,
        company_id: doc.company_id,
        account_code: line.account_code.clone(),
        account_name: line.account_name.clone(),
        debit: line.debit,
        credit: line.credit,
        sub_kind: line.sub_kind.map(|k| k.as_str().to_string()),
        sub_id: line.sub_id,
        sub_name: line.sub_name.clone(),
        is_system_generated: true,
        sort_order: line.sort_order,
        created_utc: Utc::now(),
    }
}
