use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    CampusRepository, CampusStore, CertificateFilter, EnrollmentFilter, GradeFilter,
    InvoiceFilter, PaymentWindow, RepositoryError, RevenueRow,
};
use crate::workflows::domain::{
    Certificate, Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, Grade, Invoice,
    InvoiceStatus, Role, School, SchoolId, SequenceKind, Subject, SubjectId, TeacherAssignment,
    User, UserId,
};

/// Process-local repository used by tests and the CLI demo.
///
/// A unit of work runs against a copy of the state which replaces the shared state only when
/// the work succeeds, so failed operations leave nothing behind.
#[derive(Default, Clone)]
pub struct InMemoryCampusRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl CampusRepository for InMemoryCampusRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CampusStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))?;
        let mut working = guard.clone();
        let value = work(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: Vec<User>,
    schools: Vec<School>,
    courses: Vec<Course>,
    subjects: Vec<Subject>,
    assignments: Vec<TeacherAssignment>,
    enrollments: Vec<Enrollment>,
    invoices: Vec<Invoice>,
    grades: Vec<Grade>,
    certificates: Vec<Certificate>,
    sequences: HashMap<&'static str, u64>,
}

impl MemoryState {
    fn subject_name(&self, id: &SubjectId) -> &str {
        self.subjects
            .iter()
            .find(|subject| &subject.id == id)
            .map_or("", |subject| subject.name.as_str())
    }
}

impl CampusStore for MemoryState {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.iter().find(|user| &user.id == id).cloned())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.iter().find(|user| user.email == email).cloned())
    }

    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|user| user.active && role.map_or(true, |role| user.role == role))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.first_name.cmp(&b.first_name));
        Ok(users)
    }

    fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        if self
            .users
            .iter()
            .any(|existing| existing.id == user.id || existing.email == user.email)
        {
            return Err(RepositoryError::Conflict("user"));
        }
        self.users.push(user.clone());
        Ok(())
    }

    fn school(&self, id: &SchoolId) -> Result<Option<School>, RepositoryError> {
        Ok(self.schools.iter().find(|school| &school.id == id).cloned())
    }

    fn school_by_code(&self, code: &str) -> Result<Option<School>, RepositoryError> {
        Ok(self.schools.iter().find(|school| school.code == code).cloned())
    }

    fn schools(&self) -> Result<Vec<School>, RepositoryError> {
        let mut schools: Vec<School> = self
            .schools
            .iter()
            .filter(|school| school.active)
            .cloned()
            .collect();
        schools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schools)
    }

    fn insert_school(&mut self, school: &School) -> Result<(), RepositoryError> {
        if self
            .schools
            .iter()
            .any(|existing| existing.id == school.id || existing.code == school.code)
        {
            return Err(RepositoryError::Conflict("school"));
        }
        self.schools.push(school.clone());
        Ok(())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.courses.iter().find(|course| &course.id == id).cloned())
    }

    fn course_by_code(
        &self,
        school_id: &SchoolId,
        code: &str,
    ) -> Result<Option<Course>, RepositoryError> {
        Ok(self
            .courses
            .iter()
            .find(|course| &course.school_id == school_id && course.code == code)
            .cloned())
    }

    fn courses(&self, school_id: Option<&SchoolId>) -> Result<Vec<Course>, RepositoryError> {
        let mut courses: Vec<Course> = self
            .courses
            .iter()
            .filter(|course| course.active && school_id.map_or(true, |id| &course.school_id == id))
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(courses)
    }

    fn insert_course(&mut self, course: &Course) -> Result<(), RepositoryError> {
        if !self.schools.iter().any(|school| school.id == course.school_id) {
            return Err(RepositoryError::MissingReference("course"));
        }
        if self.courses.iter().any(|existing| {
            existing.id == course.id
                || (existing.school_id == course.school_id && existing.code == course.code)
        }) {
            return Err(RepositoryError::Conflict("course"));
        }
        self.courses.push(course.clone());
        Ok(())
    }

    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        Ok(self.subjects.iter().find(|subject| &subject.id == id).cloned())
    }

    fn subject_by_code(
        &self,
        course_id: &CourseId,
        code: &str,
    ) -> Result<Option<Subject>, RepositoryError> {
        Ok(self
            .subjects
            .iter()
            .find(|subject| &subject.course_id == course_id && subject.code == code)
            .cloned())
    }

    fn subjects_for_course(&self, course_id: &CourseId) -> Result<Vec<Subject>, RepositoryError> {
        let mut subjects: Vec<Subject> = self
            .subjects
            .iter()
            .filter(|subject| &subject.course_id == course_id)
            .cloned()
            .collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }

    fn insert_subject(&mut self, subject: &Subject) -> Result<(), RepositoryError> {
        if !self.courses.iter().any(|course| course.id == subject.course_id) {
            return Err(RepositoryError::MissingReference("subject"));
        }
        if self.subjects.iter().any(|existing| {
            existing.id == subject.id
                || (existing.course_id == subject.course_id && existing.code == subject.code)
        }) {
            return Err(RepositoryError::Conflict("subject"));
        }
        self.subjects.push(subject.clone());
        Ok(())
    }

    fn assign_teacher(&mut self, assignment: &TeacherAssignment) -> Result<(), RepositoryError> {
        if self.is_assigned(&assignment.subject_id, &assignment.teacher_id)? {
            return Err(RepositoryError::Conflict("teacher assignment"));
        }
        self.assignments.push(assignment.clone());
        Ok(())
    }

    fn is_assigned(
        &self,
        subject_id: &SubjectId,
        teacher_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.assignments.iter().any(|assignment| {
            &assignment.subject_id == subject_id && &assignment.teacher_id == teacher_id
        }))
    }

    fn assigned_subjects(&self, teacher_id: &UserId) -> Result<Vec<Subject>, RepositoryError> {
        let mut subjects: Vec<Subject> = self
            .assignments
            .iter()
            .filter(|assignment| &assignment.teacher_id == teacher_id)
            .filter_map(|assignment| {
                self.subjects
                    .iter()
                    .find(|subject| subject.id == assignment.subject_id)
                    .cloned()
            })
            .collect();
        subjects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subjects)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .enrollments
            .iter()
            .find(|enrollment| &enrollment.id == id)
            .cloned())
    }

    fn enrollment_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self
            .enrollments
            .iter()
            .find(|enrollment| {
                &enrollment.student_id == student_id && &enrollment.course_id == course_id
            })
            .cloned())
    }

    fn enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments: Vec<Enrollment> = self
            .enrollments
            .iter()
            .filter(|enrollment| {
                filter.status.map_or(true, |status| enrollment.status == status)
                    && filter
                        .student_id
                        .as_ref()
                        .map_or(true, |id| &enrollment.student_id == id)
                    && filter
                        .course_id
                        .as_ref()
                        .map_or(true, |id| &enrollment.course_id == id)
            })
            .cloned()
            .collect();
        enrollments.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(enrollments)
    }

    fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), RepositoryError> {
        if self.enrollments.iter().any(|existing| {
            existing.id == enrollment.id
                || (existing.student_id == enrollment.student_id
                    && existing.course_id == enrollment.course_id)
        }) {
            return Err(RepositoryError::Conflict("enrollment"));
        }
        self.enrollments.push(enrollment.clone());
        Ok(())
    }

    fn set_enrollment_status(
        &mut self,
        id: &EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        let enrollment = self
            .enrollments
            .iter_mut()
            .find(|enrollment| &enrollment.id == id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "enrollment",
                id: id.to_string(),
            })?;
        enrollment.status = status;
        Ok(())
    }

    fn next_sequence(&mut self, kind: SequenceKind) -> Result<u64, RepositoryError> {
        let value = self.sequences.entry(kind.name()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn invoice_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> Result<Option<Invoice>, RepositoryError> {
        Ok(self
            .invoices
            .iter()
            .find(|invoice| &invoice.enrollment_id == enrollment_id)
            .cloned())
    }

    fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, RepositoryError> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|invoice| {
                filter.status.map_or(true, |status| invoice.status == status)
                    && filter
                        .cashier_id
                        .as_ref()
                        .map_or(true, |id| &invoice.cashier_id == id)
                    && filter.student_id.as_ref().map_or(true, |student| {
                        self.enrollments.iter().any(|enrollment| {
                            enrollment.id == invoice.enrollment_id
                                && &enrollment.student_id == student
                        })
                    })
            })
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(invoices)
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), RepositoryError> {
        if self.invoices.iter().any(|existing| {
            existing.id == invoice.id
                || existing.number == invoice.number
                || existing.enrollment_id == invoice.enrollment_id
        }) {
            return Err(RepositoryError::Conflict("invoice"));
        }
        self.invoices.push(invoice.clone());
        Ok(())
    }

    fn paid_invoices(&self, window: &PaymentWindow) -> Result<Vec<RevenueRow>, RepositoryError> {
        let mut rows = Vec::new();
        for invoice in &self.invoices {
            let Some(paid_at) = invoice.paid_at else {
                continue;
            };
            if invoice.status != InvoiceStatus::Paid
                || !window.contains(paid_at)
                || window
                    .billing_mode
                    .is_some_and(|mode| mode != invoice.billing_mode)
            {
                continue;
            }

            let course = self
                .enrollments
                .iter()
                .find(|enrollment| enrollment.id == invoice.enrollment_id)
                .and_then(|enrollment| {
                    self.courses
                        .iter()
                        .find(|course| course.id == enrollment.course_id)
                });
            let school = course.and_then(|course| {
                self.schools
                    .iter()
                    .find(|school| school.id == course.school_id)
            });
            let (Some(course), Some(school)) = (course, school) else {
                return Err(RepositoryError::Corrupt {
                    entity: "invoice",
                    detail: format!("{} is not linked to a course and school", invoice.number),
                });
            };

            rows.push(RevenueRow {
                invoice: invoice.clone(),
                paid_at,
                course_id: course.id.clone(),
                course_name: course.name.clone(),
                school_id: school.id.clone(),
                school_name: school.name.clone(),
            });
        }
        rows.sort_by(|a, b| a.paid_at.cmp(&b.paid_at));
        Ok(rows)
    }

    fn upsert_grade(&mut self, grade: &Grade) -> Result<Grade, RepositoryError> {
        let existing = self.grades.iter_mut().find(|stored| {
            stored.student_id == grade.student_id
                && stored.subject_id == grade.subject_id
                && stored.period == grade.period
        });

        match existing {
            Some(stored) => {
                stored.score = grade.score;
                stored.notes = grade.notes.clone();
                stored.teacher_id = grade.teacher_id.clone();
                stored.updated_at = grade.updated_at;
                Ok(stored.clone())
            }
            None => {
                self.grades.push(grade.clone());
                Ok(grade.clone())
            }
        }
    }

    fn grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>, RepositoryError> {
        let mut grades: Vec<Grade> = self
            .grades
            .iter()
            .filter(|grade| {
                filter
                    .student_id
                    .as_ref()
                    .map_or(true, |id| &grade.student_id == id)
                    && filter
                        .subject_id
                        .as_ref()
                        .map_or(true, |id| &grade.subject_id == id)
                    && filter
                        .period
                        .as_ref()
                        .map_or(true, |period| &grade.period == period)
                    && filter
                        .within_subjects
                        .as_ref()
                        .map_or(true, |subjects| subjects.contains(&grade.subject_id))
            })
            .cloned()
            .collect();
        grades.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(grades)
    }

    fn grades_for_course(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<Grade>, RepositoryError> {
        let mut grades: Vec<Grade> = self
            .grades
            .iter()
            .filter(|grade| {
                &grade.student_id == student_id
                    && self.subjects.iter().any(|subject| {
                        subject.id == grade.subject_id && &subject.course_id == course_id
                    })
            })
            .cloned()
            .collect();
        grades.sort_by(|a, b| {
            self.subject_name(&a.subject_id)
                .cmp(self.subject_name(&b.subject_id))
                .then_with(|| a.period.cmp(&b.period))
        });
        Ok(grades)
    }

    fn certificate_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        Ok(self
            .certificates
            .iter()
            .find(|certificate| {
                &certificate.student_id == student_id && &certificate.course_id == course_id
            })
            .cloned())
    }

    fn insert_certificate(&mut self, certificate: &Certificate) -> Result<(), RepositoryError> {
        if self.certificates.iter().any(|existing| {
            existing.id == certificate.id
                || existing.number == certificate.number
                || (existing.student_id == certificate.student_id
                    && existing.course_id == certificate.course_id)
        }) {
            return Err(RepositoryError::Conflict("certificate"));
        }
        self.certificates.push(certificate.clone());
        Ok(())
    }

    fn certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, RepositoryError> {
        let mut certificates: Vec<Certificate> = self
            .certificates
            .iter()
            .filter(|certificate| {
                filter
                    .student_id
                    .as_ref()
                    .map_or(true, |id| &certificate.student_id == id)
                    && filter
                        .course_id
                        .as_ref()
                        .map_or(true, |id| &certificate.course_id == id)
            })
            .cloned()
            .collect();
        certificates.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(certificates)
    }
}
