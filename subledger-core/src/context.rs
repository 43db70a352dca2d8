//! Explicit caller identity for every engine operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is performing an operation, and for which company.
///
/// The engine never looks identity up implicitly; callers construct this
/// from whatever session or claim mechanism they use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub display_name: String,
    pub company_id: Uuid,
    /// Elevated capability. Required for Void.
    pub privileged: bool,
}

impl ActorContext {
    pub fn new(user_id: Uuid, display_name: impl Into<String>, company_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            company_id,
            privileged: false,
        }
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}
