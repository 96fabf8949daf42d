use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::{AccessError, Caller};
use super::directory::{acting_account, grade_detail, load_user, GradeDetail};
use super::domain::{Grade, GradeId, SubjectId, UserId};
use super::validation::{self, ValidationError};
use super::WorkflowError;
use crate::storage::CampusStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub student_id: String,
    pub subject_id: String,
    pub score: f64,
    pub period: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValidGrade {
    pub(crate) student_id: UserId,
    pub(crate) subject_id: SubjectId,
    score: f64,
    pub(crate) period: String,
    notes: Option<String>,
}

impl GradeRequest {
    pub(crate) fn validate(self) -> Result<ValidGrade, ValidationError> {
        Ok(ValidGrade {
            student_id: UserId(validation::required("student_id", &self.student_id)?),
            subject_id: SubjectId(validation::required("subject_id", &self.subject_id)?),
            score: validation::score(self.score)?,
            period: validation::required("period", &self.period)?,
            notes: validation::optional(self.notes),
        })
    }
}

/// Creates or replaces the grade for (student, subject, period) on behalf of an assigned teacher.
pub(crate) fn record(
    store: &mut dyn CampusStore,
    teacher: &Caller,
    request: &ValidGrade,
    now: DateTime<Utc>,
) -> Result<GradeDetail, WorkflowError> {
    let teacher = acting_account(store, teacher)?;
    let subject = store
        .subject(&request.subject_id)?
        .ok_or_else(|| WorkflowError::not_found("subject", &request.subject_id))?;
    if !store.is_assigned(&subject.id, &teacher.id)? {
        return Err(AccessError::NotAssigned {
            subject_id: subject.id,
        }
        .into());
    }
    let student = load_user(store, &request.student_id)?;

    let stored = store.upsert_grade(&Grade {
        id: GradeId::generate(),
        student_id: student.id,
        subject_id: subject.id,
        teacher_id: teacher.id,
        score: request.score,
        period: request.period.clone(),
        notes: request.notes.clone(),
        recorded_at: now,
        updated_at: now,
    })?;

    grade_detail(store, stored)
}
