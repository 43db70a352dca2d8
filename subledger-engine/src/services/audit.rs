//! Audit sink.
//!
//! Every lifecycle transition appends exactly one event, committed in the
//! same transaction as the state change. A failed audit write therefore
//! rolls the whole transaction back.

use crate::services::database::map_db_err;
use sqlx::PgConnection;
use subledger_core::context::ActorContext;
use subledger_core::error::AppError;
use uuid::Uuid;

pub async fn append(
    conn: &mut PgConnection,
    actor: &ActorContext,
    category: &str,
    message: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (audit_id, company_id, actor_id, actor_name, category, message)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor.company_id)
    .bind(actor.user_id)
    .bind(&actor.display_name)
    .bind(category)
    .bind(message)
    .execute(conn)
    .await
    .map_err(|e| map_db_err("Failed to append audit event", e))?;
    Ok(())
}
