//! Approval flow — the lifecycle of a validation report from its
//! creation-time status to a terminal human decision.
//!
//! `auto_approved` and `requires_approval` reports accept one decision;
//! `approved`/`rejected` are terminal and reject any further decision.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::DecisionError;
use crate::store::RecordStore;
use crate::store::model::ApprovalStatus;

/// An approver's verdict on a validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    fn approval_status(&self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
        }
    }

    fn default_comment(&self) -> &'static str {
        match self {
            Self::Approved => "Approved without comments",
            Self::Rejected => "Rejected without comments",
        }
    }
}

/// Drives approval decisions against the record store.
pub struct ApprovalFlow {
    store: Arc<dyn RecordStore>,
}

impl ApprovalFlow {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Apply an approver decision to a validation report.
    ///
    /// Appends the approver comment to the report content, sets the
    /// report's approval status, and mirrors the decision onto the
    /// owning invoice — all in one store transaction.
    ///
    /// Fails without mutation when the report does not resolve, or when
    /// it has already been decided (decisions are final; re-deciding an
    /// already-terminal report is operator error).
    pub async fn decide(
        &self,
        report_id: Uuid,
        decision: Decision,
        comments: Option<&str>,
    ) -> Result<(), DecisionError> {
        let report = self
            .store
            .get_report(report_id)
            .await?
            .ok_or(DecisionError::ReportNotFound { report_id })?;

        if report.approval_status.is_terminal() {
            return Err(DecisionError::AlreadyDecided {
                report_id,
                current: report.approval_status,
            });
        }

        let comment = format!(
            "\n\nApprover Comments: {}",
            comments.unwrap_or_else(|| decision.default_comment())
        );

        self.store
            .record_decision(
                report_id,
                report.invoice_id,
                decision.approval_status(),
                &comment,
            )
            .await?;

        info!(report_id = %report_id, decision = ?decision, "Report decided");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::store::LibSqlBackend;
    use crate::store::model::{InvoiceStatus, NewInvoice, NewValidationReport};

    async fn store_with_report(approval_status: ApprovalStatus) -> (Arc<dyn RecordStore>, Uuid, Uuid) {
        let store: Arc<dyn RecordStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let invoice_id = store
            .insert_invoice(&NewInvoice {
                invoice_number: "INV-1".into(),
                po_number: Some("PO-1".into()),
                total_amount: Some(dec!(100.00)),
                ..Default::default()
            })
            .await
            .unwrap()
            .id()
            .unwrap();

        let status = match approval_status {
            ApprovalStatus::AutoApproved => InvoiceStatus::Validated,
            _ => InvoiceStatus::DiscrepanciesFound,
        };
        let report_id = store
            .record_validation(
                invoice_id,
                status,
                "test run",
                &NewValidationReport {
                    report_content: "Invoice Validation Report".into(),
                    discrepancies: vec![],
                    approval_status,
                },
            )
            .await
            .unwrap();
        (store, invoice_id, report_id)
    }

    #[tokio::test]
    async fn decision_updates_report_and_mirrors_invoice() {
        let (store, invoice_id, report_id) =
            store_with_report(ApprovalStatus::RequiresApproval).await;
        let flow = ApprovalFlow::new(Arc::clone(&store));

        flow.decide(report_id, Decision::Approved, Some("Verified with the vendor"))
            .await
            .unwrap();

        let report = store.get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.approval_status, ApprovalStatus::Approved);
        assert!(
            report
                .report_content
                .contains("Approver Comments: Verified with the vendor")
        );

        let invoice = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);
    }

    #[tokio::test]
    async fn rejection_mirrors_onto_invoice() {
        let (store, invoice_id, report_id) =
            store_with_report(ApprovalStatus::RequiresApproval).await;
        let flow = ApprovalFlow::new(Arc::clone(&store));

        flow.decide(report_id, Decision::Rejected, None).await.unwrap();

        let report = store.get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.approval_status, ApprovalStatus::Rejected);
        assert!(report.report_content.contains("Rejected without comments"));

        let invoice = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Rejected);
    }

    #[tokio::test]
    async fn unknown_report_fails_without_mutation() {
        let (store, invoice_id, _) = store_with_report(ApprovalStatus::RequiresApproval).await;
        let flow = ApprovalFlow::new(Arc::clone(&store));

        let err = flow
            .decide(Uuid::new_v4(), Decision::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::ReportNotFound { .. }));

        let invoice = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::DiscrepanciesFound);
    }

    #[tokio::test]
    async fn second_decision_fails_closed_and_first_stands() {
        let (store, invoice_id, report_id) =
            store_with_report(ApprovalStatus::RequiresApproval).await;
        let flow = ApprovalFlow::new(Arc::clone(&store));

        flow.decide(report_id, Decision::Approved, None).await.unwrap();

        let err = flow
            .decide(report_id, Decision::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DecisionError::AlreadyDecided {
                current: ApprovalStatus::Approved,
                ..
            }
        ));

        // First decision stands on both the report and the invoice.
        let report = store.get_report(report_id).await.unwrap().unwrap();
        assert_eq!(report.approval_status, ApprovalStatus::Approved);
        let invoice = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Approved);
    }

    #[tokio::test]
    async fn auto_approved_report_can_still_be_overridden_once() {
        let (store, invoice_id, report_id) = store_with_report(ApprovalStatus::AutoApproved).await;
        let flow = ApprovalFlow::new(Arc::clone(&store));

        flow.decide(report_id, Decision::Rejected, Some("Caught on audit"))
            .await
            .unwrap();

        let invoice = store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Rejected);
    }
}
