//! Document state machine.
//!
//! Orchestrates the period guard, series generator, allocation engine,
//! journal builder, book recorders, and audit sink to drive documents
//! through create / edit / post / unpost / void / cancel and the
//! receipt-specific deposit states. Every operation runs as one atomic
//! database transaction; any failure rolls the whole transaction back and
//! no partial ledger write is ever observable.

use crate::config::{EngineConfig, WellKnownCodes};
use crate::models::document::{
    CreateDocument, DocumentAction, DocumentType, EditDocument, FinancialDocument,
};
use crate::models::line::{NewJournalLine, SubAccountKind, SystemLine};
use crate::models::{AllocationRequest, JournalLine};
use crate::services::database::{self, map_db_err, Database};
use crate::services::metrics::TRANSITIONS_TOTAL;
use crate::services::tax::round_money;
use crate::services::{allocation, audit, book, journal, period, series, tax};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use subledger_core::context::ActorContext;
use subledger_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

const DAYS_PER_YEAR: i64 = 360;

/// The document state machine. One instance per embedding process.
#[derive(Clone)]
pub struct Lifecycle {
    db: Database,
    accounts: WellKnownCodes,
    cost_of_money_annual_rate: Decimal,
}

impl Lifecycle {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Self {
            db,
            accounts: config.accounts.clone(),
            cost_of_money_annual_rate: config.cost_of_money_annual_rate,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create a document: assign its number from the series, persist the
    /// header and user lines, and allocate against source documents.
    #[instrument(skip(self, actor, input, lines, allocations), fields(company_id = %actor.company_id))]
    pub async fn create(
        &self,
        actor: &ActorContext,
        input: CreateDocument,
        lines: Vec<NewJournalLine>,
        allocations: Vec<AllocationRequest>,
    ) -> Result<FinancialDocument, AppError> {
        validate_tax_fields(&input.vat_type, &input.tax_type, input.tax_rate, input.total)?;

        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        period::guard(
            &mut tx,
            company_id,
            input.document_type.module(),
            input.transaction_date,
        )
        .await?;

        let document_no = if input.multi_invoice {
            series::next_multi_payment_code(&mut tx, company_id).await?
        } else {
            series::next_code(&mut tx, company_id, input.document_type).await?
        };

        let payee_name =
            resolve_payee_name(&mut tx, company_id, input.payee_kind, input.payee_id).await?;

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            INSERT INTO documents (
                document_id, company_id, document_type, document_no, transaction_date,
                particulars, payee_kind, payee_id, payee_name, total, status,
                vat_type, tax_type, tax_rate, is_advance, due_date, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'for_posting', $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(input.document_type.as_str())
        .bind(&document_no)
        .bind(input.transaction_date)
        .bind(&input.particulars)
        .bind(input.payee_kind.map(|k| k.as_str()))
        .bind(input.payee_id)
        .bind(&payee_name)
        .bind(input.total)
        .bind(&input.vat_type)
        .bind(&input.tax_type)
        .bind(input.tax_rate)
        .bind(input.is_advance)
        .bind(input.due_date)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to insert document", e))?;

        insert_user_lines(&mut tx, &document, &lines).await?;
        allocation::allocate(&mut tx, company_id, document.document_id, &allocations).await?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Created {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "create"])
            .inc();
        info!(document_id = %document.document_id, document_no = %document.document_no, "Document created");

        Ok(document)
    }

    /// Edit an unposted document: replace header fields and lines wholesale,
    /// deallocate and reallocate, and rebuild the system-generated tax lines.
    #[instrument(skip(self, actor, input, lines, allocations), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn edit(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        input: EditDocument,
        lines: Vec<NewJournalLine>,
        allocations: Vec<AllocationRequest>,
    ) -> Result<FinancialDocument, AppError> {
        validate_tax_fields(&input.vat_type, &input.tax_type, input.tax_rate, input.total)?;

        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let existing = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        existing.validate_action(DocumentAction::Edit)?;

        let module = existing.parsed_type().module();
        period::guard(&mut tx, company_id, module, existing.transaction_date).await?;
        period::guard(&mut tx, company_id, module, input.transaction_date).await?;

        let payee_name =
            resolve_payee_name(&mut tx, company_id, input.payee_kind, input.payee_id).await?;

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET transaction_date = $3, particulars = $4, payee_kind = $5, payee_id = $6,
                payee_name = $7, total = $8, vat_type = $9, tax_type = $10, tax_rate = $11,
                due_date = $12, edited_by = $13, edited_utc = NOW()
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(input.transaction_date)
        .bind(&input.particulars)
        .bind(input.payee_kind.map(|k| k.as_str()))
        .bind(input.payee_id)
        .bind(&payee_name)
        .bind(input.total)
        .bind(&input.vat_type)
        .bind(&input.tax_type)
        .bind(input.tax_rate)
        .bind(input.due_date)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to update document", e))?;

        // lines are wholly replaced: delete-all, insert-new
        delete_lines(&mut tx, company_id, document_id, false).await?;
        insert_user_lines(&mut tx, &document, &lines).await?;

        allocation::deallocate(&mut tx, company_id, document_id).await?;
        allocation::allocate(&mut tx, company_id, document_id, &allocations).await?;

        self.rebuild_system_lines(&mut tx, &document).await?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Edited {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "edit"])
            .inc();
        info!(document_id = %document_id, "Document edited");

        Ok(document)
    }

    /// Post a document: regenerate system lines, verify the journal
    /// balances, project book rows, stamp the poster, and flip linked
    /// sources' paid flags.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn post(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
    ) -> Result<FinancialDocument, AppError> {
        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(DocumentAction::Post)?;
        period::guard(
            &mut tx,
            company_id,
            document.parsed_type().module(),
            document.transaction_date,
        )
        .await?;

        self.rebuild_system_lines(&mut tx, &document).await?;

        let all_lines = fetch_lines(&mut tx, company_id, document_id).await?;
        journal::check_balance(&document, &all_lines)?;
        book::record_on_post(&mut tx, &document, &all_lines).await?;

        let status = allocation::payment_status(document.amount_paid, document.total, true);
        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET posted_by = $3, posted_utc = NOW(), status = $4
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(actor.user_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to post document", e))?;

        allocation::set_linked_paid_flags(&mut tx, company_id, document_id, true).await?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Posted {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "post"])
            .inc();
        info!(document_id = %document_id, document_no = %document.document_no, "Document posted");

        Ok(document)
    }

    /// Unpost a posted document: delete system lines and book rows, clear
    /// the posting stamps, and flip linked sources' paid flags back.
    /// Allocation amounts are deliberately untouched so a re-post
    /// regenerates an identical state.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn unpost(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
    ) -> Result<FinancialDocument, AppError> {
        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(DocumentAction::Unpost)?;
        period::guard(
            &mut tx,
            company_id,
            document.parsed_type().module(),
            document.transaction_date,
        )
        .await?;

        delete_lines(&mut tx, company_id, document_id, true).await?;
        book::delete_by_reference(&mut tx, company_id, &document.document_no).await?;

        let status = allocation::payment_status(document.amount_paid, document.total, false);
        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET posted_by = NULL, posted_utc = NULL, status = $3
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to unpost document", e))?;

        allocation::set_linked_paid_flags(&mut tx, company_id, document_id, false).await?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Unposted {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "unpost"])
            .inc();
        info!(document_id = %document_id, "Document unposted");

        Ok(document)
    }

    /// Void a posted document. Privileged and irreversible: book rows are
    /// deleted and every linked allocation is reversed outright, zeroing
    /// the sources' paid amounts for this payment's share.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn void(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        remarks: Option<String>,
    ) -> Result<FinancialDocument, AppError> {
        if !actor.privileged {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "voiding requires an elevated capability"
            )));
        }

        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(DocumentAction::Void)?;

        book::delete_by_reference(&mut tx, company_id, &document.document_no).await?;
        allocation::deallocate(&mut tx, company_id, document_id).await?;

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET posted_by = NULL, posted_utc = NULL, voided_by = $3, voided_utc = NOW(),
                canceled_remarks = COALESCE($4, canceled_remarks), status = 'voided'
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(actor.user_id)
        .bind(&remarks)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to void document", e))?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Voided {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "void"])
            .inc();
        info!(document_id = %document_id, "Document voided");

        Ok(document)
    }

    /// Cancel an unposted document. Irreversible but unprivileged.
    #[instrument(skip(self, actor, remarks), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn cancel(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        remarks: String,
    ) -> Result<FinancialDocument, AppError> {
        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(DocumentAction::Cancel)?;

        allocation::deallocate(&mut tx, company_id, document_id).await?;

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET canceled_by = $3, canceled_utc = NOW(), canceled_remarks = $4, status = 'canceled'
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(actor.user_id)
        .bind(&remarks)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to cancel document", e))?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("Canceled {} {}", document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "cancel"])
            .inc();
        info!(document_id = %document_id, "Document canceled");

        Ok(document)
    }

    /// Deposit a posted collection receipt to a bank. When the deposit
    /// lands past a linked delivery receipt's due date, a cost-of-money
    /// penalty accrues on that delivery receipt for the days late.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn deposit(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        bank_id: Uuid,
        deposit_date: NaiveDate,
    ) -> Result<FinancialDocument, AppError> {
        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(DocumentAction::Deposit)?;

        // bank must resolve before money is marked as landed there
        database::resolve_subaccount(&mut tx, company_id, SubAccountKind::Bank, bank_id).await?;

        let penalty = self
            .accrue_cost_of_money(&mut tx, company_id, document_id, deposit_date)
            .await?;

        let document = sqlx::query_as::<_, FinancialDocument>(
            r#"
            UPDATE documents
            SET bank_id = $3, deposited_date = $4, status = 'deposited'
            WHERE company_id = $1 AND document_id = $2
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .bind(bank_id)
        .bind(deposit_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_err("Failed to deposit receipt", e))?;

        let message = if penalty > Decimal::ZERO {
            format!(
                "Deposited {} {} (cost of money {})",
                document.document_type, document.document_no, penalty
            )
        } else {
            format!(
                "Deposited {} {}",
                document.document_type, document.document_no
            )
        };
        audit::append(&mut tx, actor, &document.document_type, &message).await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, "deposit"])
            .inc();
        info!(document_id = %document_id, %penalty, "Receipt deposited");

        Ok(document)
    }

    /// Return a deposited receipt from the bank.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn return_deposit(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
    ) -> Result<FinancialDocument, AppError> {
        self.simple_transition(
            actor,
            document_id,
            DocumentAction::ReturnDeposit,
            "UPDATE documents SET deposited_date = NULL, status = 'returned' \
             WHERE company_id = $1 AND document_id = $2 RETURNING *",
            None,
            "Returned",
        )
        .await
    }

    /// Redeposit a returned receipt on a new date.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn redeposit(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        deposit_date: NaiveDate,
    ) -> Result<FinancialDocument, AppError> {
        self.simple_transition(
            actor,
            document_id,
            DocumentAction::Redeposit,
            "UPDATE documents SET deposited_date = $3, status = 'deposited' \
             WHERE company_id = $1 AND document_id = $2 RETURNING *",
            Some(deposit_date),
            "Redeposited",
        )
        .await
    }

    /// Stamp the bank clearing date on a deposited receipt.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn apply_clearing_date(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        cleared_date: NaiveDate,
    ) -> Result<FinancialDocument, AppError> {
        self.simple_transition(
            actor,
            document_id,
            DocumentAction::ApplyClearingDate,
            "UPDATE documents SET cleared_date = $3, status = 'cleared' \
             WHERE company_id = $1 AND document_id = $2 RETURNING *",
            Some(cleared_date),
            "Cleared",
        )
        .await
    }

    /// Mark an advance document as liquidated.
    #[instrument(skip(self, actor), fields(company_id = %actor.company_id, document_id = %document_id))]
    pub async fn liquidate(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        liquidation_date: NaiveDate,
    ) -> Result<FinancialDocument, AppError> {
        self.simple_transition(
            actor,
            document_id,
            DocumentAction::Liquidate,
            "UPDATE documents SET liquidated_date = $3, status = 'liquidated' \
             WHERE company_id = $1 AND document_id = $2 RETURNING *",
            Some(liquidation_date),
            "Liquidated",
        )
        .await
    }

    async fn simple_transition(
        &self,
        actor: &ActorContext,
        document_id: Uuid,
        action: DocumentAction,
        sql: &str,
        date_arg: Option<NaiveDate>,
        verb: &str,
    ) -> Result<FinancialDocument, AppError> {
        let mut tx = begin(&self.db).await?;
        let company_id = actor.company_id;

        let document = fetch_document_for_update(&mut tx, company_id, document_id).await?;
        document.validate_action(action)?;

        let mut query = sqlx::query_as::<_, FinancialDocument>(sql)
            .bind(company_id)
            .bind(document_id);
        if let Some(date) = date_arg {
            query = query.bind(date);
        }
        let document = query
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_db_err("Failed to apply transition", e))?;

        audit::append(
            &mut tx,
            actor,
            &document.document_type,
            &format!("{} {} {}", verb, document.document_type, document.document_no),
        )
        .await?;

        commit(tx).await?;
        TRANSITIONS_TOTAL
            .with_label_values(&[&document.document_type, action.as_str()])
            .inc();
        info!(document_id = %document_id, action = action.as_str(), "Transition applied");

        Ok(document)
    }

    /// Delete and regenerate the system-generated tax/cash lines for a
    /// payment document. Non-payment documents carry user lines only.
    async fn rebuild_system_lines(
        &self,
        conn: &mut PgConnection,
        document: &FinancialDocument,
    ) -> Result<(), AppError> {
        delete_lines(&mut *conn, document.company_id, document.document_id, true).await?;

        if !document.parsed_type().is_payment() {
            return Ok(());
        }

        let user_lines = fetch_lines(&mut *conn, document.company_id, document.document_id)
            .await?
            .into_iter()
            .filter(|l| !l.is_system_generated)
            .collect::<Vec<_>>();

        let breakdown = tax::compute_for_document(document)?;

        let cash_in_bank =
            database::resolve_account(&mut *conn, document.company_id, &self.accounts.cash_in_bank)
                .await?;
        let vat_input =
            database::resolve_account(&mut *conn, document.company_id, &self.accounts.vat_input)
                .await?;
        let ewt = self.resolve_ewt_title(&mut *conn, document).await?;

        let system_lines = journal::build_system_lines(
            document,
            &user_lines,
            &breakdown,
            &journal::WellKnownAccounts {
                cash_in_bank,
                vat_input,
                ewt,
            },
        )?;

        for line in &system_lines {
            insert_system_line(&mut *conn, document, line).await?;
        }

        Ok(())
    }

    /// The payee's configured withholding-tax title, if any.
    async fn resolve_ewt_title(
        &self,
        conn: &mut PgConnection,
        document: &FinancialDocument,
    ) -> Result<Option<journal::AccountRef>, AppError> {
        let (Some(kind), Some(payee_id)) = (
            document
                .payee_kind
                .as_deref()
                .and_then(SubAccountKind::from_string),
            document.payee_id,
        ) else {
            return Ok(None);
        };

        let info =
            database::resolve_subaccount(&mut *conn, document.company_id, kind, payee_id).await?;
        match info.ewt_account_code {
            Some(code) => Ok(Some(
                database::resolve_account(&mut *conn, document.company_id, &code).await?,
            )),
            None => Ok(None),
        }
    }

    /// Accrue the deposit-lateness penalty on linked delivery receipts.
    async fn accrue_cost_of_money(
        &self,
        conn: &mut PgConnection,
        company_id: Uuid,
        payment_id: Uuid,
        deposit_date: NaiveDate,
    ) -> Result<Decimal, AppError> {
        let rows: Vec<(Uuid, Decimal)> = sqlx::query_as(
            r#"
            SELECT source_id, COALESCE(SUM(amount), 0)
            FROM allocations
            WHERE company_id = $1 AND payment_id = $2
            GROUP BY source_id
            "#,
        )
        .bind(company_id)
        .bind(payment_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_db_err("Failed to sum allocations", e))?;

        if rows.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let source_ids: Vec<Uuid> = rows.iter().map(|(id, _)| *id).collect();
        let sources =
            allocation::fetch_sources_for_update(&mut *conn, company_id, &source_ids).await?;

        let mut total_penalty = Decimal::ZERO;
        for (source_id, allocated) in rows {
            let Some(source) = sources.iter().find(|s| s.document_id == source_id) else {
                continue;
            };
            if source.parsed_type() != DocumentType::DeliveryReceipt {
                continue;
            }
            let Some(due_date) = source.due_date else {
                continue;
            };
            let days_late = (deposit_date - due_date).num_days();
            if days_late <= 0 {
                continue;
            }

            let penalty = round_money(
                allocated * self.cost_of_money_annual_rate * Decimal::from(days_late)
                    / Decimal::from(DAYS_PER_YEAR),
            );
            if penalty <= Decimal::ZERO {
                continue;
            }

            sqlx::query(
                "UPDATE documents SET cost_of_money = cost_of_money + $3 \
                 WHERE company_id = $1 AND document_id = $2",
            )
            .bind(company_id)
            .bind(source_id)
            .bind(penalty)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_db_err("Failed to accrue cost of money", e))?;

            total_penalty += penalty;
        }

        Ok(total_penalty)
    }
}

// -------------------------------------------------------------------------
// Transaction plumbing
// -------------------------------------------------------------------------

async fn begin(db: &Database) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, AppError> {
    db.pool()
        .begin()
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to begin transaction: {}", e)))
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| AppError::Database(anyhow::anyhow!("Failed to commit transaction: {}", e)))
}

async fn fetch_document_for_update(
    conn: &mut PgConnection,
    company_id: Uuid,
    document_id: Uuid,
) -> Result<FinancialDocument, AppError> {
    sqlx::query_as::<_, FinancialDocument>(
        "SELECT * FROM documents WHERE company_id = $1 AND document_id = $2 FOR UPDATE",
    )
    .bind(company_id)
    .bind(document_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_db_err("Failed to lock document", e))?
    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("document {} not found", document_id)))
}

async fn fetch_lines(
    conn: &mut PgConnection,
    company_id: Uuid,
    document_id: Uuid,
) -> Result<Vec<JournalLine>, AppError> {
    sqlx::query_as::<_, JournalLine>(
        r#"
        SELECT * FROM journal_lines
        WHERE company_id = $1 AND document_id = $2
        ORDER BY is_system_generated, sort_order, created_utc
        "#,
    )
    .bind(company_id)
    .bind(document_id)
    .fetch_all(conn)
    .await
    .map_err(|e| map_db_err("Failed to fetch journal lines", e))
}

async fn delete_lines(
    conn: &mut PgConnection,
    company_id: Uuid,
    document_id: Uuid,
    system_only: bool,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        DELETE FROM journal_lines
        WHERE company_id = $1 AND document_id = $2
          AND ($3::bool = FALSE OR is_system_generated = TRUE)
        "#,
    )
    .bind(company_id)
    .bind(document_id)
    .bind(system_only)
    .execute(conn)
    .await
    .map_err(|e| map_db_err("Failed to delete journal lines", e))?;
    Ok(())
}

async fn insert_user_lines(
    conn: &mut PgConnection,
    document: &FinancialDocument,
    lines: &[NewJournalLine],
) -> Result<(), AppError> {
    for line in lines {
        let account =
            database::resolve_account(&mut *conn, document.company_id, &line.account_code).await?;
        let sub_name = match (line.sub_kind, line.sub_id) {
            (Some(kind), Some(sub_id)) => Some(
                database::resolve_subaccount(&mut *conn, document.company_id, kind, sub_id)
                    .await?
                    .name,
            ),
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(anyhow::anyhow!(
                    "sub-account kind and id must be supplied together"
                )))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO journal_lines (
                line_id, document_id, company_id, account_code, account_name,
                debit, credit, sub_kind, sub_id, sub_name, is_system_generated, sort_order
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(document.document_id)
        .bind(document.company_id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(line.debit)
        .bind(line.credit)
        .bind(line.sub_kind.map(|k| k.as_str()))
        .bind(line.sub_id)
        .bind(&sub_name)
        .bind(line.sort_order)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_err("Failed to insert journal line", e))?;
    }
    Ok(())
}

async fn insert_system_line(
    conn: &mut PgConnection,
    document: &FinancialDocument,
    line: &SystemLine,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO journal_lines (
            line_id, document_id, company_id, account_code, account_name,
            debit, credit, sub_kind, sub_id, sub_name, is_system_generated, sort_order
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(document.document_id)
    .bind(document.company_id)
    .bind(&line.account_code)
    .bind(&line.account_name)
    .bind(line.debit)
    .bind(line.credit)
    .bind(line.sub_kind.map(|k| k.as_str()))
    .bind(line.sub_id)
    .bind(&line.sub_name)
    .bind(line.sort_order)
    .execute(conn)
    .await
    .map_err(|e| map_db_err("Failed to insert system line", e))?;
    Ok(())
}

async fn resolve_payee_name(
    conn: &mut PgConnection,
    company_id: Uuid,
    kind: Option<SubAccountKind>,
    payee_id: Option<Uuid>,
) -> Result<Option<String>, AppError> {
    match (kind, payee_id) {
        (Some(kind), Some(payee_id)) => Ok(Some(
            database::resolve_subaccount(conn, company_id, kind, payee_id)
                .await?
                .name,
        )),
        (None, None) => Ok(None),
        _ => Err(AppError::Validation(anyhow::anyhow!(
            "payee kind and id must be supplied together"
        ))),
    }
}

fn validate_tax_fields(
    vat_type: &str,
    tax_type: &str,
    tax_rate: Decimal,
    total: Decimal,
) -> Result<(), AppError> {
    if !matches!(vat_type, "vatable" | "exempt" | "zero_rated") {
        return Err(AppError::Validation(anyhow::anyhow!(
            "unknown vat type {}",
            vat_type
        )));
    }
    if !matches!(tax_type, "withholding" | "none") {
        return Err(AppError::Validation(anyhow::anyhow!(
            "unknown tax type {}",
            tax_type
        )));
    }
    if tax_rate < Decimal::ZERO || tax_rate >= Decimal::ONE {
        return Err(AppError::Validation(anyhow::anyhow!(
            "tax rate {} must be in [0, 1)",
            tax_rate
        )));
    }
    if total < Decimal::ZERO {
        return Err(AppError::Validation(anyhow::anyhow!(
            "total {} must not be negative",
            total
        )));
    }
    Ok(())
}
