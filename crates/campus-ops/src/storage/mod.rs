//! Persistence boundary for the campus workflows.
//!
//! Workflows are written once against [`CampusStore`]; a [`CampusRepository`] hands out a store
//! scoped to a single unit of work and commits it only when the work succeeds. Uniqueness rules
//! live in the stores themselves and surface as [`RepositoryError::Conflict`].

mod memory;
mod schema;
mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};

use crate::workflows::domain::{
    BillingMode, Certificate, Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, Grade,
    Invoice, InvoiceStatus, Role, School, SchoolId, SequenceKind, Subject, SubjectId,
    TeacherAssignment, User, UserId,
};

pub use memory::InMemoryCampusRepository;
pub use sqlite::SqliteCampusRepository;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0} references a missing record")]
    MissingReference(&'static str),
    #[error("stored {entity} is unreadable: {detail}")]
    Corrupt { entity: &'static str, detail: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub status: Option<EnrollmentStatus>,
    pub student_id: Option<UserId>,
    pub course_id: Option<CourseId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub cashier_id: Option<UserId>,
    /// Matches invoices whose enrollment belongs to this student.
    pub student_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeFilter {
    pub student_id: Option<UserId>,
    pub subject_id: Option<SubjectId>,
    pub period: Option<String>,
    /// When set, only grades for these subjects are returned (an empty list matches nothing).
    pub within_subjects: Option<Vec<SubjectId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateFilter {
    pub student_id: Option<UserId>,
    pub course_id: Option<CourseId>,
}

/// Filters pushed into the paid-invoice query. Both dates are inclusive calendar days (UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentWindow {
    pub paid_from: Option<NaiveDate>,
    pub paid_to: Option<NaiveDate>,
    pub billing_mode: Option<BillingMode>,
}

impl PaymentWindow {
    pub fn contains(&self, paid_at: DateTime<Utc>) -> bool {
        let day = paid_at.date_naive();
        self.paid_from.map_or(true, |from| day >= from) && self.paid_to.map_or(true, |to| day <= to)
    }
}

/// A paid invoice joined through enrollment and course to its school.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueRow {
    pub invoice: Invoice,
    pub paid_at: DateTime<Utc>,
    pub course_id: CourseId,
    pub course_name: String,
    pub school_id: SchoolId,
    pub school_name: String,
}

/// Operations available inside one unit of work.
pub trait CampusStore {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    /// Active users ordered by first name.
    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError>;
    fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError>;

    fn school(&self, id: &SchoolId) -> Result<Option<School>, RepositoryError>;
    fn school_by_code(&self, code: &str) -> Result<Option<School>, RepositoryError>;
    /// Active schools ordered by name.
    fn schools(&self) -> Result<Vec<School>, RepositoryError>;
    fn insert_school(&mut self, school: &School) -> Result<(), RepositoryError>;

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn course_by_code(
        &self,
        school_id: &SchoolId,
        code: &str,
    ) -> Result<Option<Course>, RepositoryError>;
    /// Active courses ordered by name.
    fn courses(&self, school_id: Option<&SchoolId>) -> Result<Vec<Course>, RepositoryError>;
    fn insert_course(&mut self, course: &Course) -> Result<(), RepositoryError>;

    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError>;
    fn subject_by_code(
        &self,
        course_id: &CourseId,
        code: &str,
    ) -> Result<Option<Subject>, RepositoryError>;
    fn subjects_for_course(&self, course_id: &CourseId) -> Result<Vec<Subject>, RepositoryError>;
    fn insert_subject(&mut self, subject: &Subject) -> Result<(), RepositoryError>;

    fn assign_teacher(&mut self, assignment: &TeacherAssignment) -> Result<(), RepositoryError>;
    fn is_assigned(&self, subject_id: &SubjectId, teacher_id: &UserId)
        -> Result<bool, RepositoryError>;
    /// Subjects assigned to a teacher, ordered by name.
    fn assigned_subjects(&self, teacher_id: &UserId) -> Result<Vec<Subject>, RepositoryError>;

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn enrollment_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    /// Newest first.
    fn enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError>;
    fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), RepositoryError>;
    fn set_enrollment_status(
        &mut self,
        id: &EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError>;

    /// Allocates the next value of a named counter within the current unit of work.
    fn next_sequence(&mut self, kind: SequenceKind) -> Result<u64, RepositoryError>;

    fn invoice_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> Result<Option<Invoice>, RepositoryError>;
    /// Newest first.
    fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, RepositoryError>;
    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), RepositoryError>;
    fn paid_invoices(&self, window: &PaymentWindow) -> Result<Vec<RevenueRow>, RepositoryError>;

    /// Inserts the grade, or overwrites score, notes, teacher and `updated_at` of the grade
    /// already stored for the same (student, subject, period). Returns the stored row.
    fn upsert_grade(&mut self, grade: &Grade) -> Result<Grade, RepositoryError>;
    /// Most recently updated first.
    fn grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>, RepositoryError>;
    /// Every grade of the student across the course's subjects, ordered by subject name then period.
    fn grades_for_course(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<Grade>, RepositoryError>;

    fn certificate_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError>;
    fn insert_certificate(&mut self, certificate: &Certificate) -> Result<(), RepositoryError>;
    /// Newest first.
    fn certificates(&self, filter: &CertificateFilter)
        -> Result<Vec<Certificate>, RepositoryError>;
}

/// Storage abstraction so the service can run against SQLite or memory.
pub trait CampusRepository: Send + Sync {
    /// Runs `work` as one unit of work: its writes become visible only if it returns `Ok`.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CampusStore) -> Result<T, E>,
        E: From<RepositoryError>;
}
