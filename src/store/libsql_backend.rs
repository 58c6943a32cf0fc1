//! libSQL backend — async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases. Monetary values are
//! stored as decimal strings and re-parsed on read; timestamps are
//! RFC 3339 text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{
    ApprovalStatus, Currency, Discrepancy, Invoice, InvoiceStatus, NewInvoice, NewPurchaseOrder,
    NewValidationReport, PendingApproval, PurchaseOrder, SummaryRow, ValidationReport,
};
use crate::store::traits::{InsertOutcome, RecordStore};

/// libSQL record-store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse a stored decimal-string column.
fn parse_decimal(s: &str) -> Option<Decimal> {
    s.parse::<Decimal>().ok()
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert an optional decimal to a libsql Value (stored as text).
fn opt_decimal(d: Option<Decimal>) -> libsql::Value {
    match d {
        Some(d) => libsql::Value::Text(d.to_string()),
        None => libsql::Value::Null,
    }
}

/// Whether a libsql error is a UNIQUE-constraint violation.
fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

const PO_COLUMNS: &str = "id, po_number, vendor_name, issue_date, total_amount, status, created_at";

const INVOICE_COLUMNS: &str = "id, invoice_number, po_number, vendor_name, invoice_date, \
     total_amount, due_date, tax_amount, subtotal, currency, file_path, status, \
     validation_result, created_at";

const REPORT_COLUMNS: &str =
    "id, invoice_id, report_content, discrepancies, approval_status, created_at";

/// Map a libsql Row to a PurchaseOrder. Column order matches PO_COLUMNS.
fn row_to_po(row: &libsql::Row) -> Result<PurchaseOrder, DatabaseError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let amount_str: String = row.get(4).map_err(row_err)?;
    let status_str: String = row.get(5).map_err(row_err)?;
    let created_str: String = row.get(6).map_err(row_err)?;

    Ok(PurchaseOrder {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        po_number: row.get(1).map_err(row_err)?,
        vendor_name: row.get(2).map_err(row_err)?,
        issue_date: row.get(3).map_err(row_err)?,
        total_amount: parse_decimal(&amount_str).unwrap_or_default(),
        status: status_str.parse().unwrap_or_default(),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to an Invoice. Column order matches INVOICE_COLUMNS.
fn row_to_invoice(row: &libsql::Row) -> Result<Invoice, DatabaseError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let total_str: Option<String> = row.get(5).ok();
    let tax_str: Option<String> = row.get(7).ok();
    let subtotal_str: Option<String> = row.get(8).ok();
    let currency_str: String = row.get(9).unwrap_or_else(|_| "USD".into());
    let status_str: String = row.get(11).map_err(row_err)?;
    let created_str: String = row.get(13).map_err(row_err)?;

    Ok(Invoice {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        invoice_number: row.get(1).map_err(row_err)?,
        po_number: row.get(2).ok(),
        vendor_name: row.get(3).ok(),
        invoice_date: row.get(4).ok(),
        total_amount: total_str.as_deref().and_then(parse_decimal),
        due_date: row.get(6).ok(),
        tax_amount: tax_str.as_deref().and_then(parse_decimal),
        subtotal: subtotal_str.as_deref().and_then(parse_decimal),
        currency: Currency::from_code(&currency_str).unwrap_or_default(),
        file_path: row.get(10).ok(),
        status: status_str
            .parse()
            .unwrap_or(InvoiceStatus::Pending),
        validation_result: row.get(12).ok(),
        created_at: parse_datetime(&created_str),
    })
}

/// Map a libsql Row to a ValidationReport. Column order matches REPORT_COLUMNS.
fn row_to_report(row: &libsql::Row) -> Result<ValidationReport, DatabaseError> {
    let id_str: String = row.get(0).map_err(row_err)?;
    let invoice_id_str: String = row.get(1).map_err(row_err)?;
    let discrepancies_str: Option<String> = row.get(3).ok();
    let approval_str: String = row.get(4).map_err(row_err)?;
    let created_str: String = row.get(5).map_err(row_err)?;

    let discrepancies: Vec<Discrepancy> = match discrepancies_str {
        Some(ref s) => serde_json::from_str(s)
            .map_err(|e| DatabaseError::Serialization(format!("discrepancies column: {e}")))?,
        None => Vec::new(),
    };

    Ok(ValidationReport {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        invoice_id: Uuid::parse_str(&invoice_id_str).unwrap_or_else(|_| Uuid::nil()),
        report_content: row.get(2).map_err(row_err)?,
        discrepancies,
        approval_status: approval_str
            .parse()
            .map_err(DatabaseError::Serialization)?,
        created_at: parse_datetime(&created_str),
    })
}

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn insert_purchase_order(
        &self,
        po: &NewPurchaseOrder,
    ) -> Result<InsertOutcome, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let result = self
            .conn()
            .execute(
                "INSERT INTO purchase_orders (id, po_number, vendor_name, issue_date, \
                 total_amount, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    po.po_number.clone(),
                    po.vendor_name.clone(),
                    po.issue_date.clone(),
                    po.total_amount.to_string(),
                    po.status.to_string(),
                    now,
                ],
            )
            .await;

        match result {
            Ok(_) => {
                info!(po_number = %po.po_number, "Purchase order registered");
                Ok(InsertOutcome::Inserted(id))
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(po_number = %po.po_number, "Purchase order already exists");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(DatabaseError::Query(format!("insert_purchase_order: {e}"))),
        }
    }

    async fn lookup_purchase_order(
        &self,
        po_number: &str,
    ) -> Result<Option<PurchaseOrder>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PO_COLUMNS} FROM purchase_orders WHERE po_number = ?1"),
                params![po_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("lookup_purchase_order: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_po(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("lookup_purchase_order: {e}"))),
        }
    }

    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InsertOutcome, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let result = self
            .conn()
            .execute(
                "INSERT INTO invoices (id, invoice_number, po_number, vendor_name, invoice_date, \
                 total_amount, due_date, tax_amount, subtotal, currency, file_path, status, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', ?12)",
                params![
                    id.to_string(),
                    invoice.invoice_number.clone(),
                    opt_text(invoice.po_number.as_deref()),
                    opt_text(invoice.vendor_name.as_deref()),
                    opt_text(invoice.invoice_date.as_deref()),
                    opt_decimal(invoice.total_amount),
                    opt_text(invoice.due_date.as_deref()),
                    opt_decimal(invoice.tax_amount),
                    opt_decimal(invoice.subtotal),
                    invoice.currency.code(),
                    opt_text(invoice.file_path.as_deref()),
                    now,
                ],
            )
            .await;

        match result {
            Ok(_) => {
                info!(invoice_number = %invoice.invoice_number, id = %id, "Invoice stored");
                Ok(InsertOutcome::Inserted(id))
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(invoice_number = %invoice.invoice_number, "Duplicate invoice rejected");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(DatabaseError::Query(format!("insert_invoice: {e}"))),
        }
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_invoice: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_invoice(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_invoice: {e}"))),
        }
    }

    async fn get_invoice_by_number(
        &self,
        invoice_number: &str,
    ) -> Result<Option<Invoice>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = ?1"),
                params![invoice_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_invoice_by_number: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_invoice(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_invoice_by_number: {e}"))),
        }
    }

    async fn update_invoice_status(
        &self,
        id: Uuid,
        status: InvoiceStatus,
        validation_result: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE invoices SET status = ?1, \
                 validation_result = COALESCE(?2, validation_result) WHERE id = ?3",
                params![
                    status.to_string(),
                    opt_text(validation_result),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_invoice_status: {e}")))?;

        debug!(invoice_id = %id, status = %status, "Invoice status updated");
        Ok(())
    }

    async fn record_validation(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        validation_result: &str,
        report: &NewValidationReport,
    ) -> Result<Uuid, DatabaseError> {
        let report_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let discrepancies_json = if report.discrepancies.is_empty() {
            libsql::Value::Null
        } else {
            libsql::Value::Text(
                serde_json::to_string(&report.discrepancies)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            )
        };

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_validation begin: {e}")))?;

        tx.execute(
            "UPDATE invoices SET status = ?1, validation_result = ?2 WHERE id = ?3",
            params![
                status.to_string(),
                validation_result,
                invoice_id.to_string(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_validation invoice: {e}")))?;

        tx.execute(
            "INSERT INTO validation_reports (id, invoice_id, report_content, discrepancies, \
             approval_status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                report_id.to_string(),
                invoice_id.to_string(),
                report.report_content.clone(),
                discrepancies_json,
                report.approval_status.to_string(),
                now,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_validation report: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_validation commit: {e}")))?;

        debug!(
            invoice_id = %invoice_id,
            report_id = %report_id,
            status = %status,
            approval_status = %report.approval_status,
            "Reconciliation run recorded"
        );
        Ok(report_id)
    }

    async fn get_report(&self, report_id: Uuid) -> Result<Option<ValidationReport>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {REPORT_COLUMNS} FROM validation_reports WHERE id = ?1"),
                params![report_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_report: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_report(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_report: {e}"))),
        }
    }

    async fn record_decision(
        &self,
        report_id: Uuid,
        invoice_id: Uuid,
        status: ApprovalStatus,
        comment: &str,
    ) -> Result<(), DatabaseError> {
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_decision begin: {e}")))?;

        tx.execute(
            "UPDATE validation_reports SET approval_status = ?1, \
             report_content = report_content || ?2 WHERE id = ?3",
            params![status.to_string(), comment, report_id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_decision report: {e}")))?;

        let invoice_status = match status {
            ApprovalStatus::Approved => InvoiceStatus::Approved,
            _ => InvoiceStatus::Rejected,
        };
        tx.execute(
            "UPDATE invoices SET status = ?1 WHERE id = ?2",
            params![invoice_status.to_string(), invoice_id.to_string()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_decision invoice: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_decision commit: {e}")))?;

        info!(report_id = %report_id, decision = %status, "Approval decision recorded");
        Ok(())
    }

    async fn list_requiring_approval(&self) -> Result<Vec<PendingApproval>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT vr.id, i.invoice_number, i.po_number, i.vendor_name, i.total_amount, \
                 i.file_path, vr.created_at \
                 FROM validation_reports vr \
                 JOIN invoices i ON vr.invoice_id = i.id \
                 WHERE vr.approval_status = 'requires_approval' \
                 ORDER BY vr.created_at DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_requiring_approval: {e}")))?;

        let mut pending = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let report_id_str: String = row.get(0).map_err(row_err)?;
            let total_str: Option<String> = row.get(4).ok();
            let created_str: String = row.get(6).map_err(row_err)?;
            pending.push(PendingApproval {
                report_id: Uuid::parse_str(&report_id_str).unwrap_or_else(|_| Uuid::nil()),
                invoice_number: row.get(1).map_err(row_err)?,
                po_number: row.get(2).ok(),
                vendor_name: row.get(3).ok(),
                total_amount: total_str.as_deref().and_then(parse_decimal),
                file_path: row.get(5).ok(),
                created_at: parse_datetime(&created_str),
            });
        }
        Ok(pending)
    }

    async fn summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SummaryRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT i.invoice_number, i.po_number, i.vendor_name, i.invoice_date, \
                 i.total_amount, i.status, i.validation_result, \
                 (SELECT vr.approval_status FROM validation_reports vr \
                  WHERE vr.invoice_id = i.id ORDER BY vr.created_at DESC LIMIT 1) \
                 FROM invoices i \
                 WHERE i.created_at >= ?1 AND i.created_at < ?2 \
                 ORDER BY i.created_at DESC",
                params![start.to_rfc3339(), end.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("summary: {e}")))?;

        let mut summary = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let total_str: Option<String> = row.get(4).ok();
            let status_str: String = row.get(5).map_err(row_err)?;
            let approval_str: Option<String> = row.get(7).ok();
            summary.push(SummaryRow {
                invoice_number: row.get(0).map_err(row_err)?,
                po_number: row.get(1).ok(),
                vendor_name: row.get(2).ok(),
                invoice_date: row.get(3).ok(),
                total_amount: total_str.as_deref().and_then(parse_decimal),
                status: status_str.parse().unwrap_or(InvoiceStatus::Pending),
                validation_result: row.get(6).ok(),
                approval_status: approval_str.as_deref().and_then(|s| s.parse().ok()),
            });
        }
        Ok(summary)
    }
}
