//! Tax and withholding math over a net cash figure.
//!
//! The net cash amount actually disbursed is the authoritative figure; the
//! pretax base, input VAT, and withheld tax are reconstructed from it by
//! algebraically inverting the base → VAT → EWT → net chain. Rounding and
//! operand order are load-bearing: statements reconcile to the peso only
//! if VAT and EWT are taken from the unrounded quotient and every output
//! is then rounded to 4 decimal places, half away from zero.

use crate::models::document::FinancialDocument;
use rust_decimal::{Decimal, RoundingStrategy};
use subledger_core::error::AppError;

const MONEY_DP: u32 = 4;

/// Statutory parts recovered from a net cash total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub base: Decimal,
    pub input_vat: Decimal,
    pub ewt: Decimal,
    pub net_of_ewt: Decimal,
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn vat_multiplier() -> Decimal {
    Decimal::new(112, 2) // 1.12
}

fn vat_rate() -> Decimal {
    Decimal::new(12, 2) // 0.12
}

/// Invert a net cash `total` into base / input VAT / EWT / net-of-EWT.
///
/// `rate` is the withholding rate, `0 <= rate < 1`. A divisor that is not
/// strictly positive is rejected before any division happens.
pub fn compute(
    total: Decimal,
    is_vatable: bool,
    is_withholding_taxable: bool,
    rate: Decimal,
) -> Result<TaxBreakdown, AppError> {
    let divisor = match (is_withholding_taxable, is_vatable) {
        (true, true) => vat_multiplier() - rate,
        (true, false) => Decimal::ONE - rate,
        (false, true) => vat_multiplier(),
        (false, false) => Decimal::ONE,
    };
    if divisor <= Decimal::ZERO {
        return Err(AppError::Division(divisor));
    }

    // VAT and EWT come from the unrounded quotient; only outputs round
    let raw_base = total / divisor;
    let base = round_money(raw_base);
    let input_vat = if is_vatable {
        round_money(raw_base * vat_rate())
    } else {
        Decimal::ZERO
    };
    let gross = base + input_vat;
    let ewt = if is_withholding_taxable {
        round_money(raw_base * rate)
    } else {
        Decimal::ZERO
    };

    Ok(TaxBreakdown {
        base,
        input_vat,
        ewt,
        net_of_ewt: gross - ewt,
    })
}

/// Compute the breakdown from a document header's tax configuration.
pub fn compute_for_document(document: &FinancialDocument) -> Result<TaxBreakdown, AppError> {
    let is_vatable = document.vat_type == "vatable";
    let is_withholding = document.tax_type == "withholding";
    compute(document.total, is_vatable, is_withholding, document.tax_rate)
}
