//! Billing and insurance handlers

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::actions::{ActionContext, ActionError, ActionHandler, ActionOutcome};
use crate::domain::{ActionKind, Invoice, InvoiceStatus, StepAction, format_cents};

/// Mark a patient's insurance as verified
pub struct VerifyInsuranceHandler;

#[async_trait]
impl ActionHandler for VerifyInsuranceHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::VerifyInsurance
    }

    fn description(&self) -> &'static str {
        "Verify a patient's insurance eligibility"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::VerifyInsurance { patient_id } = action else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%patient_id, "VerifyInsuranceHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let patient = state
            .snapshot
            .patients
            .iter_mut()
            .find(|p| p.id == *patient_id)
            .ok_or_else(|| ActionError::not_found("patient", patient_id.as_str()))?;
        let policy = patient
            .insurance
            .as_mut()
            .ok_or_else(|| ActionError::InsuranceMissing {
                patient_id: patient_id.clone(),
            })?;
        policy.verified_at = Some(Utc::now());

        Ok(ActionOutcome::new(format!(
            "Verified {} coverage for {}",
            policy.payer, patient.name
        )))
    }
}

/// Issue a new open invoice
pub struct CreateInvoiceHandler;

#[async_trait]
impl ActionHandler for CreateInvoiceHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateInvoice
    }

    fn description(&self) -> &'static str {
        "Create an invoice for a patient"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::CreateInvoice {
            invoice_id,
            patient_id,
            amount_cents,
            description,
        } = action
        else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%invoice_id, %patient_id, %amount_cents, "CreateInvoiceHandler::execute: called");

        if *amount_cents <= 0 {
            return Err(ActionError::InvalidArgument(format!(
                "invoice amount must be positive, got {}",
                format_cents(*amount_cents)
            )));
        }

        let mut state = ctx.clinic.lock().await;
        if state.snapshot.patient(patient_id).is_none() {
            return Err(ActionError::not_found("patient", patient_id.as_str()));
        }
        if state.snapshot.invoice(invoice_id).is_some() {
            return Err(ActionError::Conflict(format!("invoice {} already exists", invoice_id)));
        }

        state.snapshot.invoices.push(Invoice {
            id: invoice_id.clone(),
            patient_id: patient_id.clone(),
            amount_cents: *amount_cents,
            description: description.clone(),
            status: InvoiceStatus::Open,
        });

        Ok(ActionOutcome::new(format!(
            "Created {} for {}",
            invoice_id,
            format_cents(*amount_cents)
        )))
    }
}

/// Move an invoice between open, paid and void
pub struct SetInvoiceStatusHandler;

#[async_trait]
impl ActionHandler for SetInvoiceStatusHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::SetInvoiceStatus
    }

    fn description(&self) -> &'static str {
        "Change the status of an invoice"
    }

    async fn execute(&self, action: &StepAction, ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
        let StepAction::SetInvoiceStatus { invoice_id, from, to } = action else {
            return Err(ActionError::mismatch(self.kind(), action));
        };
        debug!(%invoice_id, %from, %to, "SetInvoiceStatusHandler::execute: called");

        let mut state = ctx.clinic.lock().await;
        let invoice = state
            .snapshot
            .invoices
            .iter_mut()
            .find(|i| i.id == *invoice_id)
            .ok_or_else(|| ActionError::not_found("invoice", invoice_id.as_str()))?;
        if invoice.status != *from {
            return Err(ActionError::stale(invoice_id.as_str(), from, invoice.status));
        }
        invoice.status = *to;

        Ok(ActionOutcome::new(format!("Marked {} {}", invoice_id, to)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::demo_ctx;

    #[tokio::test]
    async fn test_verify_insurance_sets_timestamp() {
        let ctx = demo_ctx();
        let action = StepAction::VerifyInsurance {
            patient_id: "pat-sarah".into(),
        };
        let outcome = VerifyInsuranceHandler.execute(&action, &ctx).await.unwrap();
        assert!(outcome.summary.contains("Aetna"));

        let snapshot = ctx.clinic.snapshot().await;
        let policy = snapshot.patient("pat-sarah").unwrap().insurance.as_ref().unwrap();
        assert!(policy.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_verify_insurance_missing_policy() {
        let ctx = demo_ctx();
        let action = StepAction::VerifyInsurance {
            patient_id: "pat-michael-b".into(),
        };
        let err = VerifyInsuranceHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InsuranceMissing { .. }));
    }

    #[tokio::test]
    async fn test_create_invoice_and_duplicate() {
        let ctx = demo_ctx();
        let action = StepAction::CreateInvoice {
            invoice_id: "inv-900".into(),
            patient_id: "pat-sarah".into(),
            amount_cents: 8_500,
            description: "Copay".into(),
        };
        let outcome = CreateInvoiceHandler.execute(&action, &ctx).await.unwrap();
        assert!(outcome.summary.contains("$85.00"));

        let err = CreateInvoiceHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Conflict(_)));
        assert_eq!(ctx.clinic.snapshot().await.invoices.len(), 2);
    }

    #[tokio::test]
    async fn test_create_invoice_rejects_non_positive_amount() {
        let ctx = demo_ctx();
        let action = StepAction::CreateInvoice {
            invoice_id: "inv-901".into(),
            patient_id: "pat-sarah".into(),
            amount_cents: 0,
            description: "Nothing".into(),
        };
        let err = CreateInvoiceHandler.execute(&action, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_set_invoice_status() {
        let ctx = demo_ctx();
        let void = StepAction::SetInvoiceStatus {
            invoice_id: "inv-501".into(),
            from: InvoiceStatus::Open,
            to: InvoiceStatus::Void,
        };
        SetInvoiceStatusHandler.execute(&void, &ctx).await.unwrap();
        assert_eq!(
            ctx.clinic.snapshot().await.invoice("inv-501").unwrap().status,
            InvoiceStatus::Void
        );

        let err = SetInvoiceStatusHandler.execute(&void, &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::StaleState { .. }));
    }
}
