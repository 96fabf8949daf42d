use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::Caller;
use super::directory::{acting_account, invoice_detail, load_enrollment, InvoiceDetail};
use super::domain::{
    BillingMode, EnrollmentId, EnrollmentStatus, Invoice, InvoiceId, InvoiceStatus,
    SequenceKind, ThirdPartyPayer,
};
use super::enrollment::transition;
use super::validation::{self, ValidationError};
use super::{on_conflict, ConflictError, WorkflowError};
use crate::storage::CampusStore;

/// Cash-desk payment for one enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub enrollment_id: String,
    pub amount: i64,
    pub billing_mode: BillingMode,
    #[serde(default)]
    pub third_party_name: Option<String>,
    #[serde(default)]
    pub third_party_national_id: Option<String>,
    #[serde(default)]
    pub third_party_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidInvoice {
    pub(crate) enrollment_id: EnrollmentId,
    amount: u64,
    billing_mode: BillingMode,
    third_party: Option<ThirdPartyPayer>,
    notes: Option<String>,
}

impl InvoiceRequest {
    /// Third-party details are mandatory for THIRD_PARTY billing and dropped for SELF billing.
    pub(crate) fn validate(self) -> Result<ValidInvoice, ValidationError> {
        let enrollment_id = EnrollmentId(validation::required(
            "enrollment_id",
            &self.enrollment_id,
        )?);
        let amount = validation::amount(self.amount)?;

        let third_party = match self.billing_mode {
            BillingMode::SelfBilled => None,
            BillingMode::ThirdParty => Some(ThirdPartyPayer {
                name: third_party_field("third_party_name", self.third_party_name)?,
                national_id: third_party_field(
                    "third_party_national_id",
                    self.third_party_national_id,
                )?,
                address: third_party_field("third_party_address", self.third_party_address)?,
            }),
        };

        Ok(ValidInvoice {
            enrollment_id,
            amount,
            billing_mode: self.billing_mode,
            third_party,
            notes: validation::optional(self.notes),
        })
    }
}

fn third_party_field(
    field: &'static str,
    value: Option<String>,
) -> Result<String, ValidationError> {
    validation::optional(value).ok_or(ValidationError::MissingThirdPartyField { field })
}

/// Issues the invoice already PAID and moves the enrollment to ENROLLED in the same unit of work.
pub(crate) fn issue(
    store: &mut dyn CampusStore,
    cashier: &Caller,
    request: &ValidInvoice,
    now: DateTime<Utc>,
) -> Result<InvoiceDetail, WorkflowError> {
    let cashier = acting_account(store, cashier)?;
    let mut enrollment = load_enrollment(store, &request.enrollment_id)?;
    if store.invoice_for_enrollment(&enrollment.id)?.is_some() {
        return Err(ConflictError::AlreadyInvoiced.into());
    }
    transition(&mut enrollment, EnrollmentStatus::Enrolled)?;

    let sequence = store.next_sequence(SequenceKind::Invoice)?;
    let invoice = Invoice {
        id: InvoiceId::generate(),
        number: SequenceKind::Invoice.format(sequence),
        enrollment_id: enrollment.id.clone(),
        cashier_id: cashier.id,
        amount: request.amount,
        billing_mode: request.billing_mode,
        third_party: request.third_party.clone(),
        status: InvoiceStatus::Paid,
        issued_at: now,
        paid_at: Some(now),
        notes: request.notes.clone(),
    };
    store
        .insert_invoice(&invoice)
        .map_err(on_conflict(ConflictError::AlreadyInvoiced))?;
    store.set_enrollment_status(&enrollment.id, enrollment.status)?;

    invoice_detail(store, invoice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: BillingMode) -> InvoiceRequest {
        InvoiceRequest {
            enrollment_id: "enr-1".to_string(),
            amount: 500_000,
            billing_mode: mode,
            third_party_name: Some("Acme Ltda".to_string()),
            third_party_national_id: Some("900123".to_string()),
            third_party_address: Some("Calle 1 #2-3".to_string()),
            notes: None,
        }
    }

    #[test]
    fn self_billing_discards_payer_details() {
        let valid = request(BillingMode::SelfBilled).validate().expect("valid");
        assert_eq!(valid.third_party, None);
    }

    #[test]
    fn third_party_billing_requires_every_payer_field() {
        let valid = request(BillingMode::ThirdParty).validate().expect("valid");
        assert_eq!(
            valid.third_party.map(|payer| payer.name),
            Some("Acme Ltda".to_string())
        );

        let missing = InvoiceRequest {
            third_party_address: Some("   ".to_string()),
            ..request(BillingMode::ThirdParty)
        };
        assert_eq!(
            missing.validate(),
            Err(ValidationError::MissingThirdPartyField {
                field: "third_party_address"
            })
        );
    }

    #[test]
    fn amount_is_checked_before_anything_else_is_written() {
        let free = InvoiceRequest {
            amount: 0,
            ..request(BillingMode::SelfBilled)
        };
        assert_eq!(free.validate(), Err(ValidationError::NonPositiveAmount));
    }
}
