use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::storage::{
    CampusRepository, CampusStore, InMemoryCampusRepository, RepositoryError,
};
use crate::workflows::domain::{
    BillingMode, Course, CourseId, CredentialState, EnrollmentId, Role, School, SchoolId,
    Subject, SubjectId, TeacherAssignment, User, UserId,
};
use crate::workflows::{
    Caller, CampusService, CertificateRequest, Clock, EnrollmentReceipt, EnrollmentRequest,
    GradeDetail, GradeRequest, InvoiceDetail, InvoiceRequest,
};

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Clock the tests move by hand.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn starting(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub(super) fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub(super) struct UnavailableRepository;

impl CampusRepository for UnavailableRepository {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CampusStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }
}

/// Two schools, one course each, three subjects on the north course (all taught by `teacher`)
/// and one subject on the south course taught by `other_teacher`.
pub(super) struct Campus {
    pub(super) service: Arc<CampusService<InMemoryCampusRepository>>,
    pub(super) repository: Arc<InMemoryCampusRepository>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) admin: Caller,
    pub(super) clerk: Caller,
    pub(super) cashier: Caller,
    pub(super) teacher: Caller,
    pub(super) other_teacher: Caller,
    pub(super) registrar: Caller,
    pub(super) north: SchoolId,
    pub(super) south: SchoolId,
    pub(super) welding: CourseId,
    pub(super) electricity: CourseId,
    pub(super) welding_subjects: Vec<SubjectId>,
    pub(super) circuits: SubjectId,
}

fn staff(id: &str, role: Role, first_name: &str) -> User {
    User {
        id: UserId::from(id),
        email: format!("{id}@campus.example"),
        first_name: first_name.to_string(),
        last_name: "Staff".to_string(),
        national_id: None,
        phone: None,
        address: None,
        role,
        active: true,
        credential: CredentialState::Managed,
        created_at: at(1, 8),
    }
}

fn school(id: &str, code: &str, name: &str) -> School {
    School {
        id: SchoolId::from(id),
        code: code.to_string(),
        name: name.to_string(),
        description: None,
        active: true,
    }
}

fn course(id: &str, school_id: &str, code: &str, name: &str) -> Course {
    Course {
        id: CourseId::from(id),
        school_id: SchoolId::from(school_id),
        code: code.to_string(),
        name: name.to_string(),
        cost: 500_000,
        active: true,
    }
}

fn subject(id: &str, course_id: &str, name: &str) -> Subject {
    Subject {
        id: SubjectId::from(id),
        course_id: CourseId::from(course_id),
        code: id.to_ascii_uppercase(),
        name: name.to_string(),
        active: true,
    }
}

pub(super) fn campus() -> Campus {
    let repository = Arc::new(InMemoryCampusRepository::default());
    repository
        .transaction(|store| {
            for user in [
                staff("admin-1", Role::Administrator, "Alba"),
                staff("clerk-1", Role::EnrollmentClerk, "Clara"),
                staff("cashier-1", Role::Cashier, "Camilo"),
                staff("teacher-1", Role::Teacher, "Teresa"),
                staff("teacher-2", Role::Teacher, "Tomas"),
                staff("registrar-1", Role::Registrar, "Rosa"),
            ] {
                store.insert_user(&user)?;
            }

            store.insert_school(&school("school-north", "EN-001", "Escuela Norte"))?;
            store.insert_school(&school("school-south", "EN-002", "Escuela Sur"))?;
            store.insert_course(&course("course-welding", "school-north", "CUR-001", "Soldadura"))?;
            store.insert_course(&course(
                "course-electricity",
                "school-south",
                "CUR-002",
                "Electricidad",
            ))?;

            for (id, name) in [
                ("sub-math", "Matematicas"),
                ("sub-safety", "Seguridad"),
                ("sub-arc", "Soldadura por arco"),
            ] {
                store.insert_subject(&subject(id, "course-welding", name))?;
                store.assign_teacher(&TeacherAssignment {
                    subject_id: SubjectId::from(id),
                    teacher_id: UserId::from("teacher-1"),
                    assigned_at: at(1, 8),
                })?;
            }
            store.insert_subject(&subject("sub-circuits", "course-electricity", "Circuitos"))?;
            store.assign_teacher(&TeacherAssignment {
                subject_id: SubjectId::from("sub-circuits"),
                teacher_id: UserId::from("teacher-2"),
                assigned_at: at(1, 8),
            })
        })
        .expect("campus fixture seeds");

    let clock = ManualClock::starting(at(3, 9));
    let service = CampusService::new(repository.clone()).with_clock(clock.clone());

    Campus {
        service: Arc::new(service),
        repository,
        clock,
        admin: Caller::new("admin-1", Role::Administrator),
        clerk: Caller::new("clerk-1", Role::EnrollmentClerk),
        cashier: Caller::new("cashier-1", Role::Cashier),
        teacher: Caller::new("teacher-1", Role::Teacher),
        other_teacher: Caller::new("teacher-2", Role::Teacher),
        registrar: Caller::new("registrar-1", Role::Registrar),
        north: SchoolId::from("school-north"),
        south: SchoolId::from("school-south"),
        welding: CourseId::from("course-welding"),
        electricity: CourseId::from("course-electricity"),
        welding_subjects: vec![
            SubjectId::from("sub-math"),
            SubjectId::from("sub-safety"),
            SubjectId::from("sub-arc"),
        ],
        circuits: SubjectId::from("sub-circuits"),
    }
}

pub(super) fn enrollment_request(email: &str, course: &CourseId) -> EnrollmentRequest {
    EnrollmentRequest {
        first_name: "Ana".to_string(),
        last_name: "Lopez".to_string(),
        email: email.to_string(),
        national_id: Some("1032456789".to_string()),
        phone: Some("3001234567".to_string()),
        address: None,
        course_id: course.to_string(),
        notes: None,
    }
}

pub(super) fn self_invoice(enrollment_id: &EnrollmentId, amount: i64) -> InvoiceRequest {
    InvoiceRequest {
        enrollment_id: enrollment_id.to_string(),
        amount,
        billing_mode: BillingMode::SelfBilled,
        third_party_name: None,
        third_party_national_id: None,
        third_party_address: None,
        notes: None,
    }
}

pub(super) fn grade_request(
    student: &UserId,
    subject: &SubjectId,
    period: &str,
    score: f64,
) -> GradeRequest {
    GradeRequest {
        student_id: student.to_string(),
        subject_id: subject.to_string(),
        score,
        period: period.to_string(),
        notes: None,
    }
}

pub(super) fn certificate_request(student: &UserId, course: &CourseId) -> CertificateRequest {
    CertificateRequest {
        student_id: student.to_string(),
        course_id: course.to_string(),
        completion_date: "2025-06-30".to_string(),
        notes: None,
    }
}

impl Campus {
    pub(super) fn enroll(&self, email: &str, course: &CourseId) -> EnrollmentReceipt {
        self.service
            .register_enrollment(&self.clerk, enrollment_request(email, course))
            .expect("enrollment registers")
    }

    pub(super) fn pay(&self, enrollment_id: &EnrollmentId, amount: i64) -> InvoiceDetail {
        self.service
            .issue_invoice(&self.cashier, self_invoice(enrollment_id, amount))
            .expect("invoice issues")
    }

    /// Enrolls and pays, returning the student id.
    pub(super) fn enrolled_student(&self, email: &str, course: &CourseId) -> UserId {
        let receipt = self.enroll(email, course);
        self.pay(&receipt.detail.enrollment.id, 500_000);
        receipt.detail.student.id
    }

    pub(super) fn grade(
        &self,
        student: &UserId,
        subject: &SubjectId,
        period: &str,
        score: f64,
    ) -> GradeDetail {
        self.service
            .record_grade(&self.teacher, grade_request(student, subject, period, score))
            .expect("grade records")
    }

    pub(super) fn student(&self, id: &UserId) -> Caller {
        Caller::new(id.as_str(), Role::Student)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn assert_error_response(response: Response, status: StatusCode, kind: &str) {
    assert_eq!(response.status(), status);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], kind, "unexpected payload: {payload}");
    assert!(payload["error"].is_string());
}
