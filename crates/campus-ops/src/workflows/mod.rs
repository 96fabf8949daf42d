//! Enrollment, billing, grading and certification workflows plus revenue reporting.
//!
//! Every operation goes through [`CampusService`]: the access gate runs first, request payloads
//! are validated next, and the workflow itself executes inside a single repository unit of work.

pub mod access;
pub mod billing;
pub mod certification;
pub mod directory;
pub mod domain;
pub mod enrollment;
pub mod grading;
pub mod revenue;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

use crate::storage::RepositoryError;

pub use access::{AccessError, AccessGate, Caller, Capability};
pub use billing::InvoiceRequest;
pub use certification::CertificateRequest;
pub use directory::{
    AssignedSubject, CertificateDetail, CertificateQuery, CourseQuery, CourseSummary,
    EnrollmentDetail, EnrollmentQuery, GradeDetail, GradeQuery, InvoiceDetail, InvoiceQuery,
    RosterEntry, SchoolSummary, SubjectSummary, UserQuery, UserSummary,
};
pub use domain::{
    BillingMode, Certificate, CertificateSubject, Course, CourseId, CredentialState, Enrollment,
    EnrollmentId, EnrollmentStatus, Grade, Invoice, InvoiceStatus, Role, School, SchoolId,
    Subject, SubjectId, ThirdPartyPayer, User, UserId, PASSING_SCORE,
};
pub use enrollment::{EnrollmentReceipt, EnrollmentRequest};
pub use grading::GradeRequest;
pub use revenue::{RevenueLine, RevenueQuery, RevenueStatistics};
pub use router::campus_router;
pub use service::{CampusService, Clock, SystemClock};
pub use validation::ValidationError;

/// Uniqueness and lifecycle violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("student is already enrolled in this course")]
    DuplicateEnrollment,
    #[error("enrollment already has an invoice")]
    AlreadyInvoiced,
    #[error("a certificate was already issued for this student and course")]
    AlreadyCertified,
    #[error("enrollment cannot move from {from} to {to}")]
    InvalidTransition {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },
    #[error("{entity} already exists")]
    Duplicate { entity: &'static str },
}

/// Business preconditions that the current records do not meet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("student is not enrolled in this course")]
    NotEnrolled,
    #[error("student has no recorded grades")]
    NoGrades,
    #[error("{email} belongs to a non-student account")]
    NotAStudent { email: String },
    #[error("{entity} refers to a record that does not exist")]
    DanglingReference { entity: &'static str },
}

/// Error returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("storage failure: {0}")]
    Dependency(RepositoryError),
}

impl WorkflowError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable error kind returned to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation",
            WorkflowError::Access(
                AccessError::Unauthenticated | AccessError::UnknownAccount { .. },
            ) => "unauthenticated",
            WorkflowError::Access(_) => "forbidden",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Rejected(_) => "rejected",
            WorkflowError::Dependency(_) => "dependency",
        }
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(entity) => ConflictError::Duplicate { entity }.into(),
            RepositoryError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            RepositoryError::MissingReference(entity) => {
                Rejection::DanglingReference { entity }.into()
            }
            other => WorkflowError::Dependency(other),
        }
    }
}

/// Translates a uniqueness violation raised by the store into a specific conflict.
pub(crate) fn on_conflict(
    conflict: ConflictError,
) -> impl FnOnce(RepositoryError) -> WorkflowError {
    move |error| match error {
        RepositoryError::Conflict(_) => WorkflowError::Conflict(conflict),
        other => other.into(),
    }
}
