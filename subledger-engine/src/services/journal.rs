//! Ledger journal builder.
//!
//! Expands a payment document's user-entered trade lines into a balanced
//! line set by appending system-generated tax and cash lines derived from
//! the tax calculator. Regeneration always deletes prior system lines
//! first; user lines are never touched by this step.

use crate::models::document::FinancialDocument;
use crate::models::line::{JournalLine, SubAccountKind, SystemLine};
use crate::services::tax::{round_money, TaxBreakdown};
use rust_decimal::Decimal;
use subledger_core::error::AppError;

/// Resolved chart-of-accounts reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub code: String,
    pub name: String,
}

/// Accounts the builder derives system lines against. The EWT account is
/// the payee's configured withholding-tax title and may be absent when the
/// payee withholds nothing.
#[derive(Debug, Clone)]
pub struct WellKnownAccounts {
    pub cash_in_bank: AccountRef,
    pub vat_input: AccountRef,
    pub ewt: Option<AccountRef>,
}

/// Derive the system-generated lines for a document.
///
/// `user_lines` must be the document's user-entered lines ordered by sort
/// order. The tax block is anchored on the first trade line only; a
/// document with several distinct trade lines still gets exactly one
/// synthetic block.
pub fn build_system_lines(
    document: &FinancialDocument,
    user_lines: &[JournalLine],
    tax: &TaxBreakdown,
    accounts: &WellKnownAccounts,
) -> Result<Vec<SystemLine>, AppError> {
    let first_trade = user_lines
        .iter()
        .find(|line| !line.is_system_generated)
        .ok_or_else(|| {
            AppError::DataIntegrity(anyhow::anyhow!(
                "{} {} has no trade lines to derive tax lines from",
                document.document_type,
                document.document_no
            ))
        })?;

    let next_order = user_lines.iter().map(|l| l.sort_order).max().unwrap_or(0) + 1;
    let mut lines = Vec::with_capacity(4);

    lines.push(SystemLine {
        account_code: first_trade.account_code.clone(),
        account_name: first_trade.account_name.clone(),
        debit: tax.base,
        credit: Decimal::ZERO,
        sub_kind: first_trade
            .sub_kind
            .as_deref()
            .and_then(SubAccountKind::from_string),
        sub_id: first_trade.sub_id,
        sub_name: first_trade.sub_name.clone(),
        sort_order: next_order,
    });

    if tax.input_vat != Decimal::ZERO {
        lines.push(SystemLine {
            account_code: accounts.vat_input.code.clone(),
            account_name: accounts.vat_input.name.clone(),
            debit: tax.input_vat,
            credit: Decimal::ZERO,
            sub_kind: None,
            sub_id: None,
            sub_name: None,
            sort_order: next_order + 1,
        });
    }

    if tax.ewt != Decimal::ZERO {
        let ewt_account = accounts.ewt.as_ref().ok_or_else(|| {
            AppError::DataIntegrity(anyhow::anyhow!(
                "payee of {} {} has no withholding-tax title configured",
                document.document_type,
                document.document_no
            ))
        })?;
        lines.push(SystemLine {
            account_code: ewt_account.code.clone(),
            account_name: ewt_account.name.clone(),
            debit: Decimal::ZERO,
            credit: tax.ewt,
            sub_kind: document
                .payee_kind
                .as_deref()
                .and_then(SubAccountKind::from_string),
            sub_id: document.payee_id,
            sub_name: document.payee_name.clone(),
            sort_order: next_order + 2,
        });
    }

    lines.push(SystemLine {
        account_code: accounts.cash_in_bank.code.clone(),
        account_name: accounts.cash_in_bank.name.clone(),
        debit: Decimal::ZERO,
        credit: tax.net_of_ewt,
        sub_kind: None,
        sub_id: None,
        sub_name: None,
        sort_order: next_order + 3,
    });

    Ok(lines)
}

/// Debits must equal credits across a posted document's full line set.
pub fn check_balance(document: &FinancialDocument, lines: &[JournalLine]) -> Result<(), AppError> {
    let debit_sum: Decimal = lines.iter().map(|l| l.debit).sum();
    let credit_sum: Decimal = lines.iter().map(|l| l.credit).sum();
    if round_money(debit_sum) != round_money(credit_sum) {
        return Err(AppError::DataIntegrity(anyhow::anyhow!(
            "unbalanced journal for {} {}: debits {} != credits {}",
            document.document_type,
            document.document_no,
            debit_sum,
            credit_sum
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{DocumentStatus, DocumentType};
    use crate::services::tax;
    use chrono::Utc;
    use uuid::Uuid;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn accounts(with_ewt: bool) -> WellKnownAccounts {
        WellKnownAccounts {
            cash_in_bank: AccountRef {
                code: "1010".to_string(),
                name: "Cash in Bank".to_string(),
            },
            vat_input: AccountRef {
                code: "1150".to_string(),
                name: "VAT Input".to_string(),
            },
            ewt: with_ewt.then(|| AccountRef {
                code: "2130".to_string(),
                name: "EWT Payable - Services".to_string(),
            }),
        }
    }

    fn voucher(total: &str, vat_type: &str, tax_type: &str, rate: &str) -> FinancialDocument {
        let ty = DocumentType::DisbursementVoucher;
        FinancialDocument {
            document_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            document_type: ty.as_str().to_string(),
            document_no: "DV-0000000001".to_string(),
            transaction_date: chrono::NaiveDate::from_ymd_opt(2026, 7, 15).unwrap(),
            particulars: None,
            payee_kind: Some("supplier".to_string()),
            payee_id: Some(Uuid::new_v4()),
            payee_name: Some("Acme Trading".to_string()),
            total: dec(total),
            amount_paid: Decimal::ZERO,
            status: DocumentStatus::ForPosting.as_str().to_string(),
            vat_type: vat_type.to_string(),
            tax_type: tax_type.to_string(),
            tax_rate: dec(rate),
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

    fn trade_line(document: &FinancialDocument, sort_order: i32) -> JournalLine {
        JournalLine {
            line_id: Uuid::new_v4(),
            document_id: document.document_id,
            company_id: document.company_id,
            account_code: "5210".to_string(),
            account_name: "Hauling Expense".to_string(),
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            sub_kind: None,
            sub_id: None,
            sub_name: None,
            is_system_generated: false,
            sort_order,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn builds_all_four_lines_for_vatable_withholding_voucher() {
        let doc = voucher("11200.00", "vatable", "withholding", "0.02");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let lines =
            build_system_lines(&doc, &[trade_line(&doc, 1)], &breakdown, &accounts(true)).unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].account_code, "5210");
        assert_eq!(lines[0].debit, dec("10181.8182"));
        assert_eq!(lines[1].account_code, "1150");
        assert_eq!(lines[1].debit, dec("1221.8182"));
        assert_eq!(lines[2].account_code, "2130");
        assert_eq!(lines[2].credit, dec("203.6364"));
        assert_eq!(lines[3].account_code, "1010");
        assert_eq!(lines[3].credit, dec("11200.0000"));

        let debits: Decimal = lines.iter().map(|l| l.debit).sum();
        let credits: Decimal = lines.iter().map(|l| l.credit).sum();
        assert_eq!(debits, credits);
    }

    #[test]
    fn skips_vat_and_ewt_lines_when_not_applicable() {
        let doc = voucher("5000.00", "exempt", "none", "0");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let lines =
            build_system_lines(&doc, &[trade_line(&doc, 1)], &breakdown, &accounts(false)).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].debit, dec("5000.00"));
        assert_eq!(lines[1].credit, dec("5000.00"));
    }

    #[test]
    fn tax_block_is_anchored_on_first_trade_line_only() {
        let doc = voucher("1120.00", "vatable", "none", "0");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let mut second = trade_line(&doc, 2);
        second.account_code = "5220".to_string();
        let lines = build_system_lines(
            &doc,
            &[trade_line(&doc, 1), second],
            &breakdown,
            &accounts(false),
        )
        .unwrap();

        // one synthetic block, anchored on the first line's account
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].account_code, "5210");
        assert!(lines.iter().all(|l| l.account_code != "5220"));
    }

    #[test]
    fn missing_trade_lines_is_a_data_integrity_error() {
        let doc = voucher("1000.00", "vatable", "none", "0");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let err = build_system_lines(&doc, &[], &breakdown, &accounts(false)).unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity(_)));
    }

    #[test]
    fn missing_ewt_title_is_a_data_integrity_error() {
        let doc = voucher("980.00", "exempt", "withholding", "0.02");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let err = build_system_lines(&doc, &[trade_line(&doc, 1)], &breakdown, &accounts(false))
            .unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity(_)));
    }

    #[test]
    fn regeneration_is_deterministic() {
        let doc = voucher("11200.00", "vatable", "withholding", "0.02");
        let breakdown = tax::compute_for_document(&doc).unwrap();
        let user = [trade_line(&doc, 1)];
        let first = build_system_lines(&doc, &user, &breakdown, &accounts(true)).unwrap();
        let second = build_system_lines(&doc, &user, &breakdown, &accounts(true)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unbalanced_line_set_fails_the_balance_check() {
        let doc = voucher("1000.00", "exempt", "none", "0");
        let mut debit = trade_line(&doc, 1);
        debit.debit = dec("1000.00");
        let mut credit = trade_line(&doc, 2);
        credit.credit = dec("999.99");
        let err = check_balance(&doc, &[debit, credit]).unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity(_)));
    }
}
