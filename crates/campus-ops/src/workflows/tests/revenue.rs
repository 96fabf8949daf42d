use super::common::*;

use crate::workflows::domain::{BillingMode, Role};
use crate::workflows::{
    AccessError, Caller, InvoiceRequest, RevenueQuery, RevenueStatistics, ValidationError,
    WorkflowError,
};

/// 100 and 200 paid at the north school on the 5th and 6th, 300 at the south school on the 7th
/// billed to a third party.
fn campus_with_payments() -> Campus {
    let campus = campus();

    let ana = campus.enroll("ana@mail.example", &campus.welding);
    campus.clock.set(at(5, 9));
    campus.pay(&ana.detail.enrollment.id, 100);

    let luis = campus.enroll("luis@mail.example", &campus.welding);
    campus.clock.set(at(6, 23));
    campus.pay(&luis.detail.enrollment.id, 200);

    let eva = campus.enroll("eva@mail.example", &campus.electricity);
    campus.clock.set(at(7, 0));
    campus
        .service
        .issue_invoice(
            &campus.cashier,
            InvoiceRequest {
                billing_mode: BillingMode::ThirdParty,
                third_party_name: Some("Acme Ltda".to_string()),
                third_party_national_id: Some("900123456".to_string()),
                third_party_address: Some("Calle 10 #20-30".to_string()),
                ..self_invoice(&eva.detail.enrollment.id, 300)
            },
        )
        .expect("issues");

    // Registered but never paid; must not show up anywhere.
    campus.enroll("pending@mail.example", &campus.welding);
    campus
}

fn revenue(campus: &Campus, query: RevenueQuery) -> RevenueStatistics {
    campus
        .service
        .revenue(&campus.admin, query)
        .expect("statistics")
}

fn range(from: &str, to: &str) -> RevenueQuery {
    RevenueQuery {
        from: Some(from.to_string()),
        to: Some(to.to_string()),
        ..RevenueQuery::default()
    }
}

#[test]
fn totals_cover_every_paid_invoice() {
    let campus = campus_with_payments();
    let statistics = revenue(&campus, RevenueQuery::default());

    assert_eq!(statistics.total_revenue, 600);
    assert_eq!(statistics.invoice_count, 3);
    assert_eq!(statistics.invoices.len(), 3);
    assert_eq!(statistics.by_school.get("Escuela Norte"), Some(&300));
    assert_eq!(statistics.by_school.get("Escuela Sur"), Some(&300));
    assert_eq!(statistics.by_school.values().sum::<u64>(), 600);
    assert_eq!(statistics.by_course.get("Soldadura"), Some(&300));
    assert_eq!(statistics.by_billing_mode.get("SELF"), Some(&300));
    assert_eq!(statistics.by_billing_mode.get("THIRD_PARTY"), Some(&300));
    assert_eq!(
        statistics.by_day.keys().cloned().collect::<Vec<_>>(),
        vec!["2025-03-05", "2025-03-06", "2025-03-07"]
    );
}

#[test]
fn date_range_is_inclusive_on_both_days() {
    let campus = campus_with_payments();

    let statistics = revenue(&campus, range("2025-03-06", "2025-03-07"));
    assert_eq!(statistics.total_revenue, 500);
    assert_eq!(statistics.invoice_count, 2);

    let single_day = revenue(&campus, range("2025-03-06", "2025-03-06"));
    assert_eq!(single_day.total_revenue, 200);

    let open_ended = revenue(
        &campus,
        RevenueQuery {
            from: Some("2025-03-07".to_string()),
            ..RevenueQuery::default()
        },
    );
    assert_eq!(open_ended.total_revenue, 300);
}

#[test]
fn excluding_range_yields_an_empty_report() {
    let campus = campus_with_payments();

    for query in [range("2025-04-01", "2025-04-30"), range("2025-03-07", "2025-03-05")] {
        let statistics = revenue(&campus, query);
        assert_eq!(statistics.total_revenue, 0);
        assert_eq!(statistics.invoice_count, 0);
        assert!(statistics.invoices.is_empty());
        assert!(statistics.by_school.is_empty());
    }
}

#[test]
fn school_course_and_mode_filters_narrow_the_rows() {
    let campus = campus_with_payments();

    let north = revenue(
        &campus,
        RevenueQuery {
            school_id: Some(campus.north.to_string()),
            ..RevenueQuery::default()
        },
    );
    assert_eq!(north.total_revenue, 300);
    assert_eq!(north.invoice_count, 2);
    assert!(north.invoices.iter().all(|line| line.school == "Escuela Norte"));

    let electricity = revenue(
        &campus,
        RevenueQuery {
            course_id: Some(campus.electricity.to_string()),
            ..RevenueQuery::default()
        },
    );
    assert_eq!(electricity.total_revenue, 300);
    assert_eq!(electricity.invoices[0].course, "Electricidad");

    let third_party = revenue(
        &campus,
        RevenueQuery {
            billing_mode: Some(BillingMode::ThirdParty),
            ..RevenueQuery::default()
        },
    );
    assert_eq!(third_party.invoice_count, 1);
    assert_eq!(third_party.invoices[0].billing_mode, BillingMode::ThirdParty);

    let mismatched = revenue(
        &campus,
        RevenueQuery {
            school_id: Some(campus.south.to_string()),
            course_id: Some(campus.welding.to_string()),
            ..RevenueQuery::default()
        },
    );
    assert_eq!(mismatched.invoice_count, 0);
}

#[test]
fn malformed_dates_are_validation_errors() {
    let campus = campus_with_payments();
    let error = campus
        .service
        .revenue(&campus.admin, range("05/03/2025", "2025-03-07"))
        .expect_err("bad date");
    assert!(matches!(
        error,
        WorkflowError::Validation(ValidationError::InvalidDate { .. })
    ));
}

#[test]
fn revenue_is_visible_to_finance_and_leadership_only() {
    let campus = campus_with_payments();

    for caller in [&campus.admin, &campus.registrar, &campus.cashier] {
        let statistics = campus
            .service
            .revenue(caller, RevenueQuery::default())
            .expect("allowed");
        assert_eq!(statistics.total_revenue, 600);
    }

    let student = Caller::new("someone", Role::Student);
    for caller in [&campus.teacher, &campus.clerk, &student] {
        let error = campus
            .service
            .revenue(caller, RevenueQuery::default())
            .expect_err("forbidden");
        assert!(matches!(
            error,
            WorkflowError::Access(AccessError::Forbidden { .. })
        ));
    }
}
