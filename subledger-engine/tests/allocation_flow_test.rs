//! Payment allocation scenarios driven through the planning layer.

mod common;

use common::{dec, document, posted};
use rust_decimal::Decimal;
use std::collections::HashMap;
use subledger_core::error::AppError;
use subledger_engine::models::{AllocationKind, AllocationRequest, DocumentStatus, DocumentType};
use subledger_engine::services::allocation;
use uuid::Uuid;

fn request(source_id: Uuid, amount: Decimal, kind: AllocationKind) -> AllocationRequest {
    AllocationRequest {
        source_id,
        amount,
        kind,
    }
}

/// An advance voucher settles a receiving report in full, and reversing
/// the allocation restores the report exactly.
#[test]
fn advance_voucher_settles_and_void_restores() {
    let company_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();
    let mut sources = vec![posted(document(DocumentType::ReceivingReport, dec("5000")))];
    let source_id = sources[0].document_id;

    let rows = allocation::plan_allocations(
        company_id,
        payment_id,
        &mut sources,
        &[request(source_id, dec("5000"), AllocationKind::Offset)],
        &HashMap::new(),
    )
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(sources[0].amount_paid, dec("5000"));
    assert_eq!(sources[0].parsed_status(), DocumentStatus::Paid);

    allocation::reverse_allocations(&mut sources, &rows);
    assert_eq!(sources[0].amount_paid, Decimal::ZERO);
    assert_eq!(sources[0].parsed_status(), DocumentStatus::Posted);
    assert!(!sources[0].is_paid);
}

/// One payment of 9000 spread over three invoices of 3000 each pays
/// every invoice in full.
#[test]
fn multi_invoice_payment_spreads_across_sources() {
    let company_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();
    let mut sources: Vec<_> = (0..3)
        .map(|_| posted(document(DocumentType::SalesInvoice, dec("3000"))))
        .collect();

    let requests: Vec<_> = sources
        .iter()
        .map(|s| request(s.document_id, dec("3000"), AllocationKind::MultiInvoice))
        .collect();

    let rows = allocation::plan_allocations(
        company_id,
        payment_id,
        &mut sources,
        &requests,
        &HashMap::new(),
    )
    .unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().map(|r| r.amount).sum::<Decimal>(), dec("9000"));
    for source in &sources {
        assert_eq!(source.parsed_status(), DocumentStatus::Paid);
        assert_eq!(source.balance(), Decimal::ZERO);
    }
}

#[test]
fn partial_allocation_leaves_source_partially_paid() {
    let mut sources = vec![posted(document(DocumentType::ReceivingReport, dec("5000")))];
    let source_id = sources[0].document_id;

    allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut sources,
        &[request(source_id, dec("2000"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap();

    assert_eq!(sources[0].parsed_status(), DocumentStatus::PartiallyPaid);
    assert_eq!(sources[0].balance(), dec("3000"));
}

#[test]
fn over_allocation_is_rejected() {
    let mut sources = vec![posted(document(DocumentType::ReceivingReport, dec("5000")))];
    let source_id = sources[0].document_id;

    let err = allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut sources,
        &[request(source_id, dec("5000.01"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    // rejected plans leave the source untouched
    assert_eq!(sources[0].amount_paid, Decimal::ZERO);
}

/// Payments within the money tolerance of the balance are accepted.
#[test]
fn tolerance_absorbs_rounding_residue() {
    let mut sources = vec![posted(document(DocumentType::ReceivingReport, dec("5000")))];
    let source_id = sources[0].document_id;

    allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut sources,
        &[request(source_id, dec("5000.0001"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap();

    assert_eq!(sources[0].parsed_status(), DocumentStatus::Paid);
}

/// Editing a payment adds its own prior allocation back before checking
/// the remaining balance, so re-submitting the same split succeeds.
#[test]
fn edit_add_back_frees_this_payments_share() {
    let payment_id = Uuid::new_v4();
    let mut sources = vec![posted(document(DocumentType::ReceivingReport, dec("5000")))];
    sources[0].amount_paid = dec("5000");
    sources[0].status = DocumentStatus::Paid.as_str().to_string();
    let source_id = sources[0].document_id;

    // without the add-back there is no room at all
    let mut fresh = sources.clone();
    let err = allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut fresh,
        &[request(source_id, dec("5000"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut prior = HashMap::new();
    prior.insert(source_id, dec("5000"));

    let rows = allocation::plan_allocations(
        Uuid::new_v4(),
        payment_id,
        &mut sources,
        &[request(source_id, dec("5000"), AllocationKind::Trade)],
        &prior,
    )
    .unwrap();
    assert_eq!(rows[0].amount, dec("5000"));
}

/// Reversing the rows a plan produced restores the sources exactly.
#[test]
fn reverse_undoes_plan_exactly() {
    let mut sources = vec![
        posted(document(DocumentType::SalesInvoice, dec("1234.56"))),
        posted(document(DocumentType::ServiceInvoice, dec("789.12"))),
    ];
    let first = sources[0].document_id;
    let second = sources[1].document_id;
    let before: Vec<_> = sources
        .iter()
        .map(|s| (s.amount_paid, s.status.clone(), s.is_paid))
        .collect();

    let rows = allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut sources,
        &[
            request(first, dec("1234.56"), AllocationKind::Trade),
            request(second, dec("100"), AllocationKind::Trade),
        ],
        &HashMap::new(),
    )
    .unwrap();

    allocation::reverse_allocations(&mut sources, &rows);

    let after: Vec<_> = sources
        .iter()
        .map(|s| (s.amount_paid, s.status.clone(), s.is_paid))
        .collect();
    assert_eq!(before, after);
}

#[test]
fn terminal_sources_reject_allocation() {
    let mut voided = posted(document(DocumentType::ReceivingReport, dec("5000")));
    voided.status = DocumentStatus::Voided.as_str().to_string();
    let mut sources = vec![voided];
    let source_id = sources[0].document_id;

    let err = allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut sources,
        &[request(source_id, dec("100"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
}

/// Two payments naming an overlapping source set in opposite orders must
/// take their row locks in the same order.
#[test]
fn lock_order_is_canonical() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();

    let forward = allocation::lock_order(&[a, b, c]);
    let backward = allocation::lock_order(&[c, b, a]);
    assert_eq!(forward, backward);

    let with_duplicates = allocation::lock_order(&[b, a, b, c, a]);
    assert_eq!(with_duplicates, forward);
    assert!(with_duplicates.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn unknown_source_is_not_found() {
    let err = allocation::plan_allocations(
        Uuid::new_v4(),
        Uuid::new_v4(),
        &mut [],
        &[request(Uuid::new_v4(), dec("100"), AllocationKind::Trade)],
        &HashMap::new(),
    )
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}
