//! Journal derivation against the reference tax vector, plus the posted
//! balance invariant.

mod common;

use common::{dec, document, materialize, trade_line};
use rust_decimal::Decimal;
use subledger_core::error::AppError;
use subledger_engine::models::DocumentType;
use subledger_engine::services::journal::{
    build_system_lines, check_balance, AccountRef, WellKnownAccounts,
};
use subledger_engine::services::tax;

fn accounts() -> WellKnownAccounts {
    WellKnownAccounts {
        cash_in_bank: AccountRef {
            code: "1010".to_string(),
            name: "Cash in Bank".to_string(),
        },
        vat_input: AccountRef {
            code: "1150".to_string(),
            name: "Input VAT".to_string(),
        },
        ewt: Some(AccountRef {
            code: "2120".to_string(),
            name: "EWT Payable".to_string(),
        }),
    }
}

fn voucher() -> subledger_engine::models::FinancialDocument {
    let mut doc = document(DocumentType::DisbursementVoucher, dec("11200.00"));
    doc.vat_type = "vatable".to_string();
    doc.tax_type = "withholding".to_string();
    doc.tax_rate = dec("0.02");
    doc
}

/// 11200 gross, vatable, 2% withholding: base 10181.8182, input VAT
/// 1221.8182, EWT 203.6364, net cash 11200.0000.
#[test]
fn derives_the_full_tax_block() {
    let doc = voucher();
    let user_lines = vec![trade_line(
        &doc,
        "5200",
        "Professional Fees",
        Decimal::ZERO,
        Decimal::ZERO,
        1,
    )];

    let breakdown = tax::compute_for_document(&doc).unwrap();
    let lines = build_system_lines(&doc, &user_lines, &breakdown, &accounts()).unwrap();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].account_code, "5200");
    assert_eq!(lines[0].debit, dec("10181.8182"));
    assert_eq!(lines[1].account_code, "1150");
    assert_eq!(lines[1].debit, dec("1221.8182"));
    assert_eq!(lines[2].account_code, "2120");
    assert_eq!(lines[2].credit, dec("203.6364"));
    assert_eq!(lines[3].account_code, "1010");
    assert_eq!(lines[3].credit, dec("11200.0000"));

    let debits: Decimal = lines.iter().map(|l| l.debit).sum();
    let credits: Decimal = lines.iter().map(|l| l.credit).sum();
    assert_eq!(tax::round_money(debits), tax::round_money(credits));
}

/// Regenerating system lines from the same header is deterministic, so an
/// unpost followed by a post reproduces the original journal.
#[test]
fn regeneration_is_deterministic() {
    let doc = voucher();
    let user_lines = vec![trade_line(
        &doc,
        "5200",
        "Professional Fees",
        Decimal::ZERO,
        Decimal::ZERO,
        1,
    )];
    let breakdown = tax::compute_for_document(&doc).unwrap();

    let first = build_system_lines(&doc, &user_lines, &breakdown, &accounts()).unwrap();
    let second = build_system_lines(&doc, &user_lines, &breakdown, &accounts()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn withholding_without_an_ewt_title_fails() {
    let doc = voucher();
    let user_lines = vec![trade_line(
        &doc,
        "5200",
        "Professional Fees",
        Decimal::ZERO,
        Decimal::ZERO,
        1,
    )];
    let breakdown = tax::compute_for_document(&doc).unwrap();

    let mut missing_ewt = accounts();
    missing_ewt.ewt = None;

    let err = build_system_lines(&doc, &user_lines, &breakdown, &missing_ewt).unwrap_err();
    assert!(matches!(err, AppError::DataIntegrity(_)));
}

#[test]
fn documents_without_trade_lines_fail() {
    let doc = voucher();
    let breakdown = tax::compute_for_document(&doc).unwrap();
    let err = build_system_lines(&doc, &[], &breakdown, &accounts()).unwrap_err();
    assert!(matches!(err, AppError::DataIntegrity(_)));
}

/// The posted-document invariant holds over user plus system lines.
#[test]
fn full_line_set_balances() {
    let doc = voucher();
    let user_lines = vec![trade_line(
        &doc,
        "5200",
        "Professional Fees",
        Decimal::ZERO,
        Decimal::ZERO,
        1,
    )];
    let breakdown = tax::compute_for_document(&doc).unwrap();
    let system = build_system_lines(&doc, &user_lines, &breakdown, &accounts()).unwrap();

    let mut all = user_lines;
    all.extend(system.iter().map(|l| materialize(&doc, l)));
    check_balance(&doc, &all).unwrap();
}

#[test]
fn unbalanced_lines_are_rejected() {
    let doc = document(DocumentType::SalesInvoice, dec("500"));
    let lines = vec![
        trade_line(&doc, "1200", "Accounts Receivable", dec("500"), Decimal::ZERO, 1),
        trade_line(&doc, "4010", "Sales", Decimal::ZERO, dec("499"), 2),
    ];
    let err = check_balance(&doc, &lines).unwrap_err();
    assert!(matches!(err, AppError::DataIntegrity(_)));
}
