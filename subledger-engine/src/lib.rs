//! Subledger Engine - transactional core of an AP/AR subledger.
//!
//! Keeps a web of linked financial documents (purchase orders, receiving
//! reports, delivery receipts, invoices, disbursement vouchers, collection
//! receipts) mutually consistent as money moves through them: document
//! lifecycle, payment allocation, and VAT/withholding tax derivation, all
//! inside single atomic database transactions.

pub mod config;
pub mod models;
pub mod services;
