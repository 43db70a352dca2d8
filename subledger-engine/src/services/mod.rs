//! Engine services.

pub mod allocation;
pub mod audit;
pub mod book;
pub mod database;
pub mod journal;
pub mod lifecycle;
pub mod metrics;
pub mod period;
pub mod series;
pub mod tax;
