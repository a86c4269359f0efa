//! PostgreSQL invoice ledger
//!
//! Implements the invoicing domain's `InvoiceLedger` port. The ledger's
//! compare-and-swap contract maps directly onto conditional `UPDATE`
//! statements: the `WHERE` clause carries the expected (status, version)
//! pair, and zero affected rows means the caller lost the race.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{AttemptId, ClientId, InvoiceId, Money, ProjectId};
use domain_invoicing::{
    ActiveIntentChange, AttemptResolution, AttemptStatus, Invoice, InvoiceLedger, InvoiceStatus,
    InvoicingError, NewInvoice, PaymentAttempt, TransitionEffects,
};

use crate::error::DatabaseError;

/// `InvoiceLedger` backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgInvoiceLedger {
    pool: PgPool,
}

impl PgInvoiceLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, InvoicingError> {
        let row = sqlx::query_as::<_, InvoiceRow>("SELECT * FROM invoices WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        row.map(Invoice::try_from).transpose()
    }

    async fn fetch_attempt(&self, id: AttemptId) -> Result<Option<PaymentAttempt>, InvoicingError> {
        let row = sqlx::query_as::<_, AttemptRow>("SELECT * FROM payment_attempts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        row.map(PaymentAttempt::try_from).transpose()
    }
}

#[async_trait]
impl InvoiceLedger for PgInvoiceLedger {
    async fn create(&self, new: NewInvoice) -> Result<Invoice, InvoicingError> {
        let invoice = new.into_invoice()?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, client_id, project_id, title,
                amount_minor, currency, status, due_date,
                active_intent_id, paid_at, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(*invoice.id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(*invoice.client_id.as_uuid())
        .bind(invoice.project_id.map(|p| *p.as_uuid()))
        .bind(&invoice.title)
        .bind(invoice.amount_minor_units())
        .bind(invoice.currency().code())
        .bind(invoice_status_str(invoice.status))
        .bind(invoice.due_date)
        .bind(invoice.active_intent_id.map(|a| *a.as_uuid()))
        .bind(invoice.paid_at)
        .bind(invoice.version as i64)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(invoice)
    }

    async fn get(&self, id: InvoiceId) -> Result<Invoice, InvoicingError> {
        self.fetch_invoice(id)
            .await?
            .ok_or_else(|| InvoicingError::not_found(format!("invoice {id}")))
    }

    async fn list_by_client(&self, client_id: ClientId) -> Result<Vec<Invoice>, InvoicingError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM invoices WHERE client_id = $1 ORDER BY created_at DESC",
        )
        .bind(*client_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn list_due_before(
        &self,
        cutoff: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Invoice>, InvoicingError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT * FROM invoices
            WHERE status = 'pending' AND due_date < $1
            ORDER BY due_date
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn transition(
        &self,
        id: InvoiceId,
        from: InvoiceStatus,
        to: InvoiceStatus,
        expected_version: u64,
        effects: TransitionEffects,
    ) -> Result<Invoice, InvoicingError> {
        if !from.can_transition_to(to) {
            return Err(InvoicingError::IllegalTransition {
                invoice: id.to_string(),
                from,
                to,
            });
        }

        let (apply_intent, intent_value): (bool, Option<Uuid>) = match effects.active_intent {
            Some(ActiveIntentChange::Set(attempt_id)) => (true, Some(*attempt_id.as_uuid())),
            Some(ActiveIntentChange::Clear) => (true, None),
            None => (false, None),
        };

        // The (status, version) guard in the WHERE clause is the CAS: zero
        // rows updated means another writer moved the invoice first.
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            UPDATE invoices SET
                status = $2,
                version = version + 1,
                updated_at = NOW(),
                paid_at = CASE WHEN $2 = 'paid' THEN NOW() ELSE paid_at END,
                active_intent_id = CASE WHEN $5 THEN $6 ELSE active_intent_id END
            WHERE id = $1 AND status = $3 AND version = $4
            RETURNING *
            "#,
        )
        .bind(*id.as_uuid())
        .bind(invoice_status_str(to))
        .bind(invoice_status_str(from))
        .bind(expected_version as i64)
        .bind(apply_intent)
        .bind(intent_value)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        match row {
            Some(row) => Invoice::try_from(row),
            None => match self.fetch_invoice(id).await? {
                Some(current) => Err(InvoicingError::Conflict {
                    invoice: id.to_string(),
                    expected: expected_version,
                    actual: current.version,
                }),
                None => Err(InvoicingError::not_found(format!("invoice {id}"))),
            },
        }
    }

    async fn insert_attempt(
        &self,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, InvoicingError> {
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                id, invoice_id, ordinal, idempotency_key, gateway_intent_id,
                status, failure_reason, created_at, resolved_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*attempt.id.as_uuid())
        .bind(*attempt.invoice_id.as_uuid())
        .bind(attempt.ordinal as i32)
        .bind(&attempt.idempotency_key)
        .bind(attempt.gateway_intent_id.as_deref())
        .bind(attempt_status_str(attempt.status))
        .bind(attempt.failure_reason.as_deref())
        .bind(attempt.created_at)
        .bind(attempt.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(attempt)
    }

    async fn attempt(&self, id: AttemptId) -> Result<PaymentAttempt, InvoicingError> {
        self.fetch_attempt(id)
            .await?
            .ok_or_else(|| InvoicingError::not_found(format!("attempt {id}")))
    }

    async fn attempt_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM payment_attempts WHERE gateway_intent_id = $1",
        )
        .bind(gateway_intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        row.map(PaymentAttempt::try_from)
            .transpose()?
            .ok_or_else(|| {
                InvoicingError::not_found(format!("gateway intent {gateway_intent_id}"))
            })
    }

    async fn attempts_for_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            "SELECT * FROM payment_attempts WHERE invoice_id = $1 ORDER BY ordinal",
        )
        .bind(*invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        rows.into_iter().map(PaymentAttempt::try_from).collect()
    }

    async fn assign_gateway_intent(
        &self,
        attempt_id: AttemptId,
        gateway_intent_id: &str,
    ) -> Result<PaymentAttempt, InvoicingError> {
        // The unique index on gateway_intent_id turns a duplicate into a
        // 23505, surfaced as AlreadyExists.
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE payment_attempts SET gateway_intent_id = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(*attempt_id.as_uuid())
        .bind(gateway_intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        row.map(PaymentAttempt::try_from)
            .transpose()?
            .ok_or_else(|| InvoicingError::not_found(format!("attempt {attempt_id}")))
    }

    async fn resolve_attempt(
        &self,
        attempt_id: AttemptId,
        resolution: AttemptResolution,
    ) -> Result<PaymentAttempt, InvoicingError> {
        // One-way door: only an unresolved attempt matches the WHERE clause.
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE payment_attempts SET
                status = $2,
                failure_reason = $3,
                resolved_at = NOW()
            WHERE id = $1 AND status = 'created'
            RETURNING *
            "#,
        )
        .bind(*attempt_id.as_uuid())
        .bind(attempt_status_str(resolution.status()))
        .bind(resolution.failure_reason())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        match row {
            Some(row) => PaymentAttempt::try_from(row),
            None => match self.fetch_attempt(attempt_id).await? {
                Some(current) => Err(InvoicingError::Conflict {
                    invoice: current.invoice_id.to_string(),
                    expected: 0,
                    actual: 0,
                }),
                None => Err(InvoicingError::not_found(format!("attempt {attempt_id}"))),
            },
        }
    }

    async fn list_stale_attempts(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PaymentAttempt>, InvoicingError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM payment_attempts
            WHERE status = 'created' AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        rows.into_iter().map(PaymentAttempt::try_from).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    client_id: Uuid,
    project_id: Option<Uuid>,
    title: String,
    amount_minor: i64,
    currency: String,
    status: String,
    due_date: NaiveDate,
    active_intent_id: Option<Uuid>,
    paid_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = InvoicingError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let currency = row
            .currency
            .parse()
            .map_err(|e| InvoicingError::Storage(format!("invoice {}: {e}", row.id)))?;
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            invoice_number: row.invoice_number,
            client_id: ClientId::from_uuid(row.client_id),
            project_id: row.project_id.map(ProjectId::from_uuid),
            title: row.title,
            amount: Money::from_minor(row.amount_minor, currency),
            status: invoice_status_parse(&row.status)
                .map_err(|e| InvoicingError::Storage(format!("invoice {}: {e}", row.id)))?,
            due_date: row.due_date,
            active_intent_id: row.active_intent_id.map(AttemptId::from_uuid),
            paid_at: row.paid_at,
            version: row.version as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    invoice_id: Uuid,
    ordinal: i32,
    idempotency_key: String,
    gateway_intent_id: Option<String>,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for PaymentAttempt {
    type Error = InvoicingError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: AttemptId::from_uuid(row.id),
            invoice_id: InvoiceId::from_uuid(row.invoice_id),
            ordinal: row.ordinal as u32,
            idempotency_key: row.idempotency_key,
            gateway_intent_id: row.gateway_intent_id,
            status: attempt_status_parse(&row.status)
                .map_err(|e| InvoicingError::Storage(format!("attempt {}: {e}", row.id)))?,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn invoice_status_str(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Draft => "draft",
        InvoiceStatus::Pending => "pending",
        InvoiceStatus::Processing => "processing",
        InvoiceStatus::Paid => "paid",
        InvoiceStatus::Overdue => "overdue",
        InvoiceStatus::Failed => "failed",
        InvoiceStatus::Void => "void",
    }
}

fn invoice_status_parse(s: &str) -> Result<InvoiceStatus, String> {
    match s {
        "draft" => Ok(InvoiceStatus::Draft),
        "pending" => Ok(InvoiceStatus::Pending),
        "processing" => Ok(InvoiceStatus::Processing),
        "paid" => Ok(InvoiceStatus::Paid),
        "overdue" => Ok(InvoiceStatus::Overdue),
        "failed" => Ok(InvoiceStatus::Failed),
        "void" => Ok(InvoiceStatus::Void),
        other => Err(format!("unknown invoice status '{other}'")),
    }
}

fn attempt_status_str(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::Created => "created",
        AttemptStatus::Confirmed => "confirmed",
        AttemptStatus::Declined => "declined",
        AttemptStatus::Abandoned => "abandoned",
    }
}

fn attempt_status_parse(s: &str) -> Result<AttemptStatus, String> {
    match s {
        "created" => Ok(AttemptStatus::Created),
        "confirmed" => Ok(AttemptStatus::Confirmed),
        "declined" => Ok(AttemptStatus::Declined),
        "abandoned" => Ok(AttemptStatus::Abandoned),
        other => Err(format!("unknown attempt status '{other}'")),
    }
}
