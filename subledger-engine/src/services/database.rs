//! Database service for the subledger engine.
//!
//! Pool-level reads live here as `Database` methods. Mutations that must
//! compose into one atomic transaction are free functions in their domain
//! modules (`allocation`, `series`, `period`, `audit`, `book`,
//! `lifecycle`) taking a `PgConnection`.

use crate::models::{
    AuditEvent, BookEntry, FinancialDocument, JournalLine, PaymentAllocation, SubAccountKind,
};
use crate::services::journal::AccountRef;
use crate::services::metrics::{DB_QUERY_DURATION, ERRORS_TOTAL};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use subledger_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Map storage errors to the engine taxonomy. Serialization and deadlock
/// failures surface as `Concurrency` so callers can retry the whole
/// transaction.
pub(crate) fn map_db_err(context: &str, e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
            ERRORS_TOTAL.with_label_values(&["concurrency"]).inc();
            return AppError::Concurrency(anyhow::anyhow!("{}: {}", context, e));
        }
    }
    ERRORS_TOTAL.with_label_values(&["database"]).inc();
    AppError::Database(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "subledger-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Document reads
    // -------------------------------------------------------------------------

    /// Get a document by ID.
    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    pub async fn get_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<FinancialDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_document"])
            .start_timer();

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            SELECT * FROM documents
            WHERE company_id = $1 AND document_id = $2
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get document", e))?;

        timer.observe_duration();

        Ok(document)
    }

    /// Get all journal lines for a document, user lines first by sort order.
    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    pub async fn get_lines(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<JournalLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, JournalLine>(
            r#"
            SELECT * FROM journal_lines
            WHERE company_id = $1 AND document_id = $2
            ORDER BY is_system_generated, sort_order, created_utc
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get journal lines", e))?;

        timer.observe_duration();

        Ok(lines)
    }

    /// Get all allocations owned by a payment document.
    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    pub async fn get_allocations_by_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Vec<PaymentAllocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_allocations_by_payment"])
            .start_timer();

        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT * FROM allocations
            WHERE company_id = $1 AND payment_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(company_id)
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get allocations", e))?;

        timer.observe_duration();

        Ok(allocations)
    }

    /// Get all allocations targeting a source document.
    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id))]
    pub async fn get_allocations_by_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Vec<PaymentAllocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_allocations_by_source"])
            .start_timer();

        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            SELECT * FROM allocations
            WHERE company_id = $1 AND source_id = $2
            ORDER BY created_utc
            "#,
        )
        .bind(company_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get allocations", e))?;

        timer.observe_duration();

        Ok(allocations)
    }

    /// Get book entries by document reference.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn get_book_entries(
        &self,
        company_id: Uuid,
        reference: &str,
    ) -> Result<Vec<BookEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_book_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, BookEntry>(
            r#"
            SELECT * FROM book_entries
            WHERE company_id = $1 AND reference = $2
            ORDER BY book, created_utc
            "#,
        )
        .bind(company_id)
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to get book entries", e))?;

        timer.observe_duration();

        Ok(entries)
    }

    /// List recent audit events for a company.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn list_audit_events(
        &self,
        company_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_audit_events"])
            .start_timer();

        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT * FROM audit_log
            WHERE company_id = $1
            ORDER BY created_utc DESC
            LIMIT $2
            "#,
        )
        .bind(company_id)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to list audit events", e))?;

        timer.observe_duration();

        Ok(events)
    }
}

// -------------------------------------------------------------------------
// Collaborator lookups (transaction-composable)
// -------------------------------------------------------------------------

/// Resolved sub-account with its optional withholding-tax title.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubAccountInfo {
    pub name: String,
    pub ewt_account_code: Option<String>,
}

/// Resolve a chart account code. A required code that does not resolve is
/// fatal to the calling transaction.
pub async fn resolve_account(
    conn: &mut PgConnection,
    company_id: Uuid,
    code: &str,
) -> Result<AccountRef, AppError> {
    let row: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT code, name FROM accounts
        WHERE company_id = $1 AND code = $2
        "#,
    )
    .bind(company_id)
    .bind(code)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_err("Failed to resolve account", e))?;

    let (code, name) = row.ok_or_else(|| {
        AppError::DataIntegrity(anyhow::anyhow!("account code {} does not resolve", code))
    })?;

    Ok(AccountRef { code, name })
}

/// Resolve a sub-account (bank, supplier, employee, customer) by kind + id.
pub async fn resolve_subaccount(
    conn: &mut PgConnection,
    company_id: Uuid,
    kind: SubAccountKind,
    sub_id: Uuid,
) -> Result<SubAccountInfo, AppError> {
    let info = sqlx::query_as::<_, SubAccountInfo>(
        r#"
        SELECT name, ewt_account_code FROM subaccounts
        WHERE company_id = $1 AND kind = $2 AND sub_id = $3
        "#,
    )
    .bind(company_id)
    .bind(kind.as_str())
    .bind(sub_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_err("Failed to resolve sub-account", e))?;

    info.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("{} {} not found", kind, sub_id)))
}
