//! subledger-core: Shared infrastructure for the subledger engine crates.

pub mod context;
pub mod error;
pub mod observability;

pub use context::ActorContext;
pub use error::AppError;
