use super::common::*;

use crate::storage::{CampusRepository, InvoiceFilter};
use crate::workflows::domain::{
    BillingMode, EnrollmentId, EnrollmentStatus, InvoiceStatus, Role,
};
use crate::workflows::{
    AccessError, Caller, ConflictError, InvoiceQuery, InvoiceRequest, ValidationError,
    WorkflowError,
};

fn stored_invoices(campus: &Campus) -> usize {
    campus
        .repository
        .transaction(|store| store.invoices(&InvoiceFilter::default()))
        .expect("read")
        .len()
}

#[test]
fn payment_enrolls_the_student_with_one_paid_invoice() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    campus.clock.set(at(4, 10));

    let detail = campus.pay(&receipt.detail.enrollment.id, 500_000);

    assert_eq!(detail.invoice.number, "FAC-000001");
    assert_eq!(detail.invoice.amount, 500_000);
    assert_eq!(detail.invoice.status, InvoiceStatus::Paid);
    assert_eq!(detail.invoice.billing_mode, BillingMode::SelfBilled);
    assert_eq!(detail.invoice.third_party, None);
    assert_eq!(detail.invoice.paid_at, Some(at(4, 10)));
    assert_eq!(detail.enrollment_status, EnrollmentStatus::Enrolled);
    assert_eq!(detail.cashier.id.as_str(), "cashier-1");
    assert_eq!(detail.course.name, "Soldadura");

    let enrollment = campus
        .service
        .enrollment(&campus.clerk, &receipt.detail.enrollment.id)
        .expect("reads");
    assert_eq!(enrollment.enrollment.status, EnrollmentStatus::Enrolled);
    assert_eq!(
        enrollment.invoice.map(|invoice| invoice.number),
        Some("FAC-000001".to_string())
    );
    assert_eq!(stored_invoices(&campus), 1);
}

#[test]
fn second_invoice_for_an_enrollment_conflicts() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    campus.pay(&receipt.detail.enrollment.id, 500_000);

    let error = campus
        .service
        .issue_invoice(
            &campus.cashier,
            self_invoice(&receipt.detail.enrollment.id, 500_000),
        )
        .expect_err("already invoiced");
    assert!(matches!(
        error,
        WorkflowError::Conflict(ConflictError::AlreadyInvoiced)
    ));
    assert_eq!(stored_invoices(&campus), 1);
}

#[test]
fn invoice_numbers_follow_issue_order() {
    let campus = campus();
    let numbers: Vec<String> = ["ana@mail.example", "luis@mail.example", "eva@mail.example"]
        .into_iter()
        .map(|email| {
            let receipt = campus.enroll(email, &campus.welding);
            campus.pay(&receipt.detail.enrollment.id, 450_000).invoice.number
        })
        .collect();
    assert_eq!(numbers, vec!["FAC-000001", "FAC-000002", "FAC-000003"]);
}

#[test]
fn unknown_enrollment_is_not_found() {
    let campus = campus();
    let error = campus
        .service
        .issue_invoice(
            &campus.cashier,
            self_invoice(&EnrollmentId::from("enr-missing"), 500_000),
        )
        .expect_err("unknown enrollment");
    assert!(matches!(
        error,
        WorkflowError::NotFound {
            entity: "enrollment",
            ..
        }
    ));
}

#[test]
fn rejected_requests_do_not_consume_invoice_numbers() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    let id = receipt.detail.enrollment.id.clone();

    let third_party = InvoiceRequest {
        billing_mode: BillingMode::ThirdParty,
        third_party_name: Some("Acme Ltda".to_string()),
        ..self_invoice(&id, 500_000)
    };
    let error = campus
        .service
        .issue_invoice(&campus.cashier, third_party)
        .expect_err("payer id and address missing");
    assert!(matches!(
        error,
        WorkflowError::Validation(ValidationError::MissingThirdPartyField {
            field: "third_party_national_id"
        })
    ));

    let error = campus
        .service
        .issue_invoice(&campus.cashier, self_invoice(&id, 0))
        .expect_err("zero amount");
    assert!(matches!(
        error,
        WorkflowError::Validation(ValidationError::NonPositiveAmount)
    ));

    let detail = campus.pay(&id, 500_000);
    assert_eq!(detail.invoice.number, "FAC-000001");
}

#[test]
fn third_party_payer_is_kept_on_the_invoice() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    let request = InvoiceRequest {
        billing_mode: BillingMode::ThirdParty,
        third_party_name: Some(" Acme Ltda ".to_string()),
        third_party_national_id: Some("900123456".to_string()),
        third_party_address: Some("Calle 10 #20-30".to_string()),
        ..self_invoice(&receipt.detail.enrollment.id, 300_000)
    };

    let detail = campus
        .service
        .issue_invoice(&campus.cashier, request)
        .expect("issues");
    let payer = detail.invoice.third_party.expect("payer recorded");
    assert_eq!(payer.name, "Acme Ltda");
    assert_eq!(payer.national_id, "900123456");
}

#[test]
fn cancelled_enrollment_cannot_be_invoiced() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    campus
        .service
        .cancel_enrollment(&campus.clerk, &receipt.detail.enrollment.id)
        .expect("cancels");

    let error = campus
        .service
        .issue_invoice(
            &campus.cashier,
            self_invoice(&receipt.detail.enrollment.id, 500_000),
        )
        .expect_err("cancelled");
    assert!(matches!(
        error,
        WorkflowError::Conflict(ConflictError::InvalidTransition {
            from: EnrollmentStatus::Cancelled,
            to: EnrollmentStatus::Enrolled,
        })
    ));
    assert_eq!(stored_invoices(&campus), 0);
}

#[test]
fn only_cashiers_issue_invoices() {
    let campus = campus();
    let receipt = campus.enroll("ana@mail.example", &campus.welding);
    let student = campus.student(&receipt.detail.student.id);

    for caller in [&campus.admin, &campus.clerk, &campus.registrar, &student] {
        let error = campus
            .service
            .issue_invoice(caller, self_invoice(&receipt.detail.enrollment.id, 500_000))
            .expect_err("forbidden");
        assert!(matches!(
            error,
            WorkflowError::Access(AccessError::Forbidden { .. })
        ));
    }
    assert_eq!(stored_invoices(&campus), 0);
}

#[test]
fn invoice_listings_are_scoped_by_role() {
    let campus = campus();
    let ana = campus.enroll("ana@mail.example", &campus.welding);
    let luis = campus.enroll("luis@mail.example", &campus.electricity);
    campus.pay(&ana.detail.enrollment.id, 500_000);
    campus.pay(&luis.detail.enrollment.id, 400_000);

    let everything = campus
        .service
        .invoices(&campus.admin, InvoiceQuery::default())
        .expect("admin lists");
    assert_eq!(everything.len(), 2);

    let own = campus
        .service
        .invoices(&campus.student(&ana.detail.student.id), InvoiceQuery::default())
        .expect("student lists");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].student.id, ana.detail.student.id);

    let issued = campus
        .service
        .invoices(&campus.cashier, InvoiceQuery::default())
        .expect("cashier lists");
    assert_eq!(issued.len(), 2);

    let other_desk = Caller::new("cashier-2", Role::Cashier);
    let none = campus
        .service
        .invoices(&other_desk, InvoiceQuery::default())
        .expect("cashier lists");
    assert!(none.is_empty());
}
