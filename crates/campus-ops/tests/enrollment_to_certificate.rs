use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use campus_ops::catalog::standard_seed;
use campus_ops::storage::{CampusRepository, SqliteCampusRepository};
use campus_ops::workflows::router::{USER_ID_HEADER, USER_ROLE_HEADER};
use campus_ops::workflows::{
    campus_router, BillingMode, Caller, CampusService, CertificateRequest, CourseQuery,
    EnrollmentRequest, EnrollmentStatus, GradeRequest, InvoiceRequest, Role, UserId, UserQuery,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Staff {
    clerk: Caller,
    cashier: Caller,
    teacher: Caller,
    registrar: Caller,
}

fn seeded_service() -> (Arc<CampusService<SqliteCampusRepository>>, Staff) {
    let repository = SqliteCampusRepository::in_memory().expect("sqlite opens");
    standard_seed(&repository, Utc::now()).expect("seed applies");
    let service = Arc::new(CampusService::new(Arc::new(repository)));

    let admin = Caller::new("bootstrap", Role::Administrator);
    let staff_id = |role: Role| -> UserId {
        service
            .users(&admin, UserQuery { role: Some(role) })
            .expect("directory lists")
            .into_iter()
            .next()
            .expect("seeded account present")
            .id
    };
    let staff = Staff {
        clerk: Caller::new(staff_id(Role::EnrollmentClerk).0, Role::EnrollmentClerk),
        cashier: Caller::new(staff_id(Role::Cashier).0, Role::Cashier),
        teacher: Caller::new(staff_id(Role::Teacher).0, Role::Teacher),
        registrar: Caller::new(staff_id(Role::Registrar).0, Role::Registrar),
    };
    (service, staff)
}

#[test]
fn student_goes_from_registration_to_certificate() {
    let (service, staff) = seeded_service();
    let course = service
        .courses(CourseQuery::default())
        .expect("catalog lists")
        .into_iter()
        .find(|course| course.code == "CUR-001")
        .expect("seeded course");

    let receipt = service
        .register_enrollment(
            &staff.clerk,
            EnrollmentRequest {
                first_name: "Lucia".to_string(),
                last_name: "Benitez".to_string(),
                email: "lucia.benitez@mail.example".to_string(),
                national_id: Some("4455667".to_string()),
                course_id: course.id.to_string(),
                ..EnrollmentRequest::default()
            },
        )
        .expect("enrollment registers");
    assert!(receipt.provisioned);
    assert_eq!(receipt.detail.enrollment.status, EnrollmentStatus::Pending);
    let student = receipt.detail.student.id.clone();

    let invoice = service
        .issue_invoice(
            &staff.cashier,
            InvoiceRequest {
                enrollment_id: receipt.detail.enrollment.id.to_string(),
                amount: 500_000,
                billing_mode: BillingMode::SelfBilled,
                third_party_name: None,
                third_party_national_id: None,
                third_party_address: None,
                notes: None,
            },
        )
        .expect("invoice issues");
    assert_eq!(invoice.invoice.number, "FAC-000001");
    assert_eq!(invoice.enrollment_status, EnrollmentStatus::Enrolled);

    let subject = service
        .assigned_subjects(&staff.teacher)
        .expect("teaching load")
        .into_iter()
        .next()
        .expect("seeded assignment");
    let roster = service
        .subject_roster(&staff.teacher, &subject.subject.id)
        .expect("roster");
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].student.id, student);

    for (period, score) in [("2025-1", 58.0), ("2025-2", 92.0)] {
        service
            .record_grade(
                &staff.teacher,
                GradeRequest {
                    student_id: student.to_string(),
                    subject_id: subject.subject.id.to_string(),
                    score,
                    period: period.to_string(),
                    notes: None,
                },
            )
            .expect("grade records");
    }

    let certificate = service
        .issue_certificate(
            &staff.registrar,
            CertificateRequest {
                student_id: student.to_string(),
                course_id: course.id.to_string(),
                completion_date: "2025-12-12".to_string(),
                notes: Some("Promocion diciembre".to_string()),
            },
        )
        .expect("certificate issues");
    assert_eq!(certificate.certificate.number, "CERT-000001");
    assert!((certificate.certificate.average - 75.0).abs() < 1e-9);
    let passed: Vec<bool> = certificate
        .certificate
        .subjects
        .iter()
        .map(|subject| subject.passed)
        .collect();
    assert_eq!(passed.iter().filter(|passed| **passed).count(), 1);
    assert_eq!(passed.len(), 2);

    let stored = service
        .repository()
        .transaction(|store| store.certificate_for(&student, &course.id))
        .expect("read")
        .expect("certificate persisted");
    assert_eq!(stored.subjects.len(), 2);
}

async fn call(
    router: &axum::Router,
    method: &str,
    uri: &str,
    caller: &Caller,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, caller.user_id.as_str())
        .header(USER_ROLE_HEADER, caller.role.code());
    let request = match body {
        Some(payload) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("route executes");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body reads");
    let payload = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, payload)
}

#[tokio::test]
async fn http_flow_against_sqlite() {
    let (service, staff) = seeded_service();
    let router = campus_router(service.clone());
    let course_id = service
        .courses(CourseQuery::default())
        .expect("catalog lists")[0]
        .id
        .to_string();

    let enrollment = json!({
        "first_name": "Diego",
        "last_name": "Acosta",
        "email": "diego@mail.example",
        "course_id": course_id,
    });
    let (status, created) = call(
        &router,
        "POST",
        "/api/v1/enrollments",
        &staff.clerk,
        Some(enrollment.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, duplicate) = call(
        &router,
        "POST",
        "/api/v1/enrollments",
        &staff.clerk,
        Some(enrollment),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["kind"], "conflict");

    let invoice = json!({
        "enrollment_id": created["id"],
        "amount": 500000,
        "billing_mode": "SELF",
    });
    let (status, _) = call(
        &router,
        "POST",
        "/api/v1/invoices",
        &staff.cashier,
        Some(invoice.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, again) = call(&router, "POST", "/api/v1/invoices", &staff.cashier, Some(invoice)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "enrollment already has an invoice");

    let (status, invoices) = call(&router, "GET", "/api/v1/invoices", &staff.cashier, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoices.as_array().map(Vec::len), Some(1));
}
