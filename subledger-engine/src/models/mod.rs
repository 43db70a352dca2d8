//! Data models for the subledger engine.

pub mod allocation;
pub mod audit;
pub mod book;
pub mod document;
pub mod line;
pub mod period;

pub use allocation::{AllocationKind, AllocationRequest, PaymentAllocation};
pub use audit::AuditEvent;
pub use book::{BookEntry, BookKind};
pub use document::{
    CreateDocument, DocumentAction, DocumentStatus, DocumentType, EditDocument, FinancialDocument,
};
pub use line::{JournalLine, NewJournalLine, SubAccountKind, SystemLine};
pub use period::PeriodLock;
