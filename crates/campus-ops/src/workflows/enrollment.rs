use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::directory::{enrollment_detail, load_course, load_enrollment, EnrollmentDetail};
use super::domain::{
    CourseId, CredentialState, Enrollment, EnrollmentId, EnrollmentStatus, Role, User, UserId,
};
use super::validation::{self, ValidationError};
use super::{on_conflict, ConflictError, Rejection, WorkflowError};
use crate::storage::CampusStore;

/// Registration form submitted by the enrollment desk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub course_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidEnrollment {
    first_name: String,
    last_name: String,
    pub(crate) email: String,
    national_id: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    pub(crate) course_id: CourseId,
    notes: Option<String>,
}

impl EnrollmentRequest {
    pub(crate) fn validate(self) -> Result<ValidEnrollment, ValidationError> {
        Ok(ValidEnrollment {
            first_name: validation::required("first_name", &self.first_name)?,
            last_name: validation::required("last_name", &self.last_name)?,
            email: validation::email(&self.email)?,
            national_id: validation::optional(self.national_id),
            phone: validation::optional(self.phone),
            address: validation::optional(self.address),
            course_id: CourseId(validation::required("course_id", &self.course_id)?),
            notes: validation::optional(self.notes),
        })
    }
}

/// Registered enrollment plus whether a student account had to be provisioned for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentReceipt {
    #[serde(flatten)]
    pub detail: EnrollmentDetail,
    pub provisioned: bool,
}

/// Finds or provisions the student, then records a PENDING enrollment for the course.
///
/// Provisioned accounts carry no credential; they stay `awaiting_activation` until the student
/// sets one through the session provider.
pub(crate) fn register(
    store: &mut dyn CampusStore,
    request: &ValidEnrollment,
    now: DateTime<Utc>,
) -> Result<EnrollmentReceipt, WorkflowError> {
    let course = load_course(store, &request.course_id)?;

    let (student, provisioned) = match store.user_by_email(&request.email)? {
        Some(user) if user.role != Role::Student => {
            return Err(Rejection::NotAStudent {
                email: request.email.clone(),
            }
            .into())
        }
        Some(user) => (user, false),
        None => {
            let user = User {
                id: UserId::generate(),
                email: request.email.clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                national_id: request.national_id.clone(),
                phone: request.phone.clone(),
                address: request.address.clone(),
                role: Role::Student,
                active: true,
                credential: CredentialState::AwaitingActivation,
                created_at: now,
            };
            store
                .insert_user(&user)
                .map_err(on_conflict(ConflictError::Duplicate { entity: "user" }))?;
            (user, true)
        }
    };

    if store.enrollment_for(&student.id, &course.id)?.is_some() {
        return Err(ConflictError::DuplicateEnrollment.into());
    }

    let enrollment = Enrollment {
        id: EnrollmentId::generate(),
        student_id: student.id,
        course_id: course.id,
        status: EnrollmentStatus::Pending,
        notes: request.notes.clone(),
        enrolled_at: now,
    };
    store
        .insert_enrollment(&enrollment)
        .map_err(on_conflict(ConflictError::DuplicateEnrollment))?;

    Ok(EnrollmentReceipt {
        detail: enrollment_detail(store, enrollment)?,
        provisioned,
    })
}

pub(crate) fn cancel(
    store: &mut dyn CampusStore,
    id: &EnrollmentId,
) -> Result<EnrollmentDetail, WorkflowError> {
    let mut enrollment = load_enrollment(store, id)?;
    transition(&mut enrollment, EnrollmentStatus::Cancelled)?;
    store.set_enrollment_status(&enrollment.id, enrollment.status)?;
    enrollment_detail(store, enrollment)
}

/// Applies a lifecycle step, refusing anything but the PENDING exits.
pub(crate) fn transition(
    enrollment: &mut Enrollment,
    next: EnrollmentStatus,
) -> Result<(), ConflictError> {
    if !enrollment.status.can_transition_to(next) {
        return Err(ConflictError::InvalidTransition {
            from: enrollment.status,
            to: next,
        });
    }
    enrollment.status = next;
    Ok(())
}
