use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::access::Caller;
use super::directory::{acting_account, certificate_detail, load_course, CertificateDetail};
use super::domain::{
    Certificate, CertificateId, CertificateSubject, CourseId, EnrollmentStatus, Grade,
    SequenceKind, UserId, PASSING_SCORE,
};
use super::validation::{self, ValidationError};
use super::{on_conflict, ConflictError, Rejection, WorkflowError};
use crate::storage::CampusStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub student_id: String,
    pub course_id: String,
    /// `YYYY-MM-DD`.
    pub completion_date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidCertificate {
    pub(crate) student_id: UserId,
    pub(crate) course_id: CourseId,
    completion_date: NaiveDate,
    notes: Option<String>,
}

impl CertificateRequest {
    pub(crate) fn validate(self) -> Result<ValidCertificate, ValidationError> {
        Ok(ValidCertificate {
            student_id: UserId(validation::required("student_id", &self.student_id)?),
            course_id: CourseId(validation::required("course_id", &self.course_id)?),
            completion_date: validation::date(&self.completion_date)?,
            notes: validation::optional(self.notes),
        })
    }
}

/// Mean of every grade, all periods included.
pub(crate) fn average(grades: &[Grade]) -> Option<f64> {
    if grades.is_empty() {
        return None;
    }
    let total: f64 = grades.iter().map(|grade| grade.score).sum();
    Some(total / grades.len() as f64)
}

pub(crate) fn issue(
    store: &mut dyn CampusStore,
    registrar: &Caller,
    request: &ValidCertificate,
    now: DateTime<Utc>,
) -> Result<CertificateDetail, WorkflowError> {
    let registrar = acting_account(store, registrar)?;
    let course = load_course(store, &request.course_id)?;
    match store.enrollment_for(&request.student_id, &course.id)? {
        Some(enrollment) if enrollment.status == EnrollmentStatus::Enrolled => {}
        _ => return Err(Rejection::NotEnrolled.into()),
    }
    if store.certificate_for(&request.student_id, &course.id)?.is_some() {
        return Err(ConflictError::AlreadyCertified.into());
    }

    let grades = store.grades_for_course(&request.student_id, &course.id)?;
    let mean = average(&grades).ok_or(Rejection::NoGrades)?;
    let subject_names: HashMap<_, _> = store
        .subjects_for_course(&course.id)?
        .into_iter()
        .map(|subject| (subject.id, subject.name))
        .collect();

    let sequence = store.next_sequence(SequenceKind::Certificate)?;
    let certificate = Certificate {
        id: CertificateId::generate(),
        number: SequenceKind::Certificate.format(sequence),
        student_id: request.student_id.clone(),
        course_id: course.id,
        registrar_id: registrar.id,
        completion_date: request.completion_date,
        average: mean,
        notes: request.notes.clone(),
        issued_at: now,
        subjects: grades
            .iter()
            .map(|grade| CertificateSubject {
                subject_id: grade.subject_id.clone(),
                subject_name: subject_names
                    .get(&grade.subject_id)
                    .cloned()
                    .unwrap_or_default(),
                period: grade.period.clone(),
                score: grade.score,
                passed: grade.score >= PASSING_SCORE,
            })
            .collect(),
    };
    store
        .insert_certificate(&certificate)
        .map_err(on_conflict(ConflictError::AlreadyCertified))?;

    certificate_detail(store, certificate)
}
