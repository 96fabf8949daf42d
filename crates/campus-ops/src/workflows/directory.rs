//! Expanded record views and the role-scoped read operations that produce them.

use serde::{Deserialize, Serialize};

use super::access::{AccessError, Caller};
use super::domain::{
    Certificate, Course, CourseId, Enrollment, EnrollmentId, EnrollmentStatus, Grade, Invoice,
    InvoiceStatus, Role, School, SchoolId, Subject, SubjectId, User, UserId,
};
use super::WorkflowError;
use crate::storage::{
    CampusStore, CertificateFilter, EnrollmentFilter, GradeFilter, InvoiceFilter,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            national_id: user.national_id.clone(),
            phone: user.phone.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolSummary {
    pub id: SchoolId,
    pub code: String,
    pub name: String,
}

impl From<&School> for SchoolSummary {
    fn from(school: &School) -> Self {
        Self {
            id: school.id.clone(),
            code: school.code.clone(),
            name: school.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: CourseId,
    pub code: String,
    pub name: String,
    pub cost: u64,
    pub school: SchoolSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
}

impl From<&Subject> for SubjectSummary {
    fn from(subject: &Subject) -> Self {
        Self {
            id: subject.id.clone(),
            code: subject.code.clone(),
            name: subject.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub student: UserSummary,
    pub course: CourseSummary,
    pub invoice: Option<Invoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub enrollment_status: EnrollmentStatus,
    pub student: UserSummary,
    pub course: CourseSummary,
    pub cashier: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeDetail {
    #[serde(flatten)]
    pub grade: Grade,
    pub student: UserSummary,
    pub subject: SubjectSummary,
    pub teacher: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateDetail {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub student: UserSummary,
    pub course: CourseSummary,
    pub registrar: UserSummary,
}

/// A subject on a teacher's load, with its course for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedSubject {
    #[serde(flatten)]
    pub subject: SubjectSummary,
    pub course: CourseSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub enrollment_id: EnrollmentId,
    pub student: UserSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrollmentQuery {
    pub status: Option<EnrollmentStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeQuery {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateQuery {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseQuery {
    pub school_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    super::validation::optional(value)
}

pub(crate) fn load_user(store: &dyn CampusStore, id: &UserId) -> Result<User, WorkflowError> {
    store
        .user(id)?
        .ok_or_else(|| WorkflowError::not_found("user", id))
}

/// The stored account behind a session. Writes that record who acted require one.
pub(crate) fn acting_account(
    store: &dyn CampusStore,
    caller: &Caller,
) -> Result<User, WorkflowError> {
    match store.user(&caller.user_id)? {
        Some(user) if user.active && user.role == caller.role => Ok(user),
        _ => Err(AccessError::UnknownAccount {
            role: caller.role,
            user_id: caller.user_id.clone(),
        }
        .into()),
    }
}

pub(crate) fn load_course(store: &dyn CampusStore, id: &CourseId) -> Result<Course, WorkflowError> {
    store
        .course(id)?
        .ok_or_else(|| WorkflowError::not_found("course", id))
}

pub(crate) fn load_enrollment(
    store: &dyn CampusStore,
    id: &EnrollmentId,
) -> Result<Enrollment, WorkflowError> {
    store
        .enrollment(id)?
        .ok_or_else(|| WorkflowError::not_found("enrollment", id))
}

pub(crate) fn course_summary(
    store: &dyn CampusStore,
    course: &Course,
) -> Result<CourseSummary, WorkflowError> {
    let school = store
        .school(&course.school_id)?
        .ok_or_else(|| WorkflowError::not_found("school", &course.school_id))?;
    Ok(CourseSummary {
        id: course.id.clone(),
        code: course.code.clone(),
        name: course.name.clone(),
        cost: course.cost,
        school: SchoolSummary::from(&school),
    })
}

pub(crate) fn enrollment_detail(
    store: &dyn CampusStore,
    enrollment: Enrollment,
) -> Result<EnrollmentDetail, WorkflowError> {
    let student = load_user(store, &enrollment.student_id)?;
    let course = load_course(store, &enrollment.course_id)?;
    Ok(EnrollmentDetail {
        invoice: store.invoice_for_enrollment(&enrollment.id)?,
        student: UserSummary::from(&student),
        course: course_summary(store, &course)?,
        enrollment,
    })
}

pub(crate) fn invoice_detail(
    store: &dyn CampusStore,
    invoice: Invoice,
) -> Result<InvoiceDetail, WorkflowError> {
    let enrollment = load_enrollment(store, &invoice.enrollment_id)?;
    let student = load_user(store, &enrollment.student_id)?;
    let course = load_course(store, &enrollment.course_id)?;
    let cashier = load_user(store, &invoice.cashier_id)?;
    Ok(InvoiceDetail {
        enrollment_status: enrollment.status,
        student: UserSummary::from(&student),
        course: course_summary(store, &course)?,
        cashier: UserSummary::from(&cashier),
        invoice,
    })
}

pub(crate) fn grade_detail(
    store: &dyn CampusStore,
    grade: Grade,
) -> Result<GradeDetail, WorkflowError> {
    let student = load_user(store, &grade.student_id)?;
    let teacher = load_user(store, &grade.teacher_id)?;
    let subject = store
        .subject(&grade.subject_id)?
        .ok_or_else(|| WorkflowError::not_found("subject", &grade.subject_id))?;
    Ok(GradeDetail {
        student: UserSummary::from(&student),
        subject: SubjectSummary::from(&subject),
        teacher: UserSummary::from(&teacher),
        grade,
    })
}

pub(crate) fn certificate_detail(
    store: &dyn CampusStore,
    certificate: Certificate,
) -> Result<CertificateDetail, WorkflowError> {
    let student = load_user(store, &certificate.student_id)?;
    let registrar = load_user(store, &certificate.registrar_id)?;
    let course = load_course(store, &certificate.course_id)?;
    Ok(CertificateDetail {
        student: UserSummary::from(&student),
        course: course_summary(store, &course)?,
        registrar: UserSummary::from(&registrar),
        certificate,
    })
}

pub(crate) fn schools(store: &dyn CampusStore) -> Result<Vec<SchoolSummary>, WorkflowError> {
    Ok(store.schools()?.iter().map(SchoolSummary::from).collect())
}

pub(crate) fn courses(
    store: &dyn CampusStore,
    query: CourseQuery,
) -> Result<Vec<CourseSummary>, WorkflowError> {
    let school_id = non_blank(query.school_id).map(SchoolId);
    store
        .courses(school_id.as_ref())?
        .iter()
        .map(|course| course_summary(store, course))
        .collect()
}

pub(crate) fn users(
    store: &dyn CampusStore,
    query: UserQuery,
) -> Result<Vec<UserSummary>, WorkflowError> {
    Ok(store
        .users(query.role)?
        .iter()
        .map(UserSummary::from)
        .collect())
}

pub(crate) fn enrollments(
    store: &dyn CampusStore,
    caller: &Caller,
    query: EnrollmentQuery,
) -> Result<Vec<EnrollmentDetail>, WorkflowError> {
    let filter = EnrollmentFilter {
        status: query.status,
        student_id: caller.is(Role::Student).then(|| caller.user_id.clone()),
        course_id: None,
    };
    store
        .enrollments(&filter)?
        .into_iter()
        .map(|enrollment| enrollment_detail(store, enrollment))
        .collect()
}

/// Students only see their own enrollments; anything else reads as missing.
pub(crate) fn enrollment(
    store: &dyn CampusStore,
    caller: &Caller,
    id: &EnrollmentId,
) -> Result<EnrollmentDetail, WorkflowError> {
    let enrollment = load_enrollment(store, id)?;
    if caller.is(Role::Student) && enrollment.student_id != caller.user_id {
        return Err(WorkflowError::not_found("enrollment", id));
    }
    enrollment_detail(store, enrollment)
}

pub(crate) fn invoices(
    store: &dyn CampusStore,
    caller: &Caller,
    query: InvoiceQuery,
) -> Result<Vec<InvoiceDetail>, WorkflowError> {
    let filter = InvoiceFilter {
        status: query.status,
        cashier_id: caller.is(Role::Cashier).then(|| caller.user_id.clone()),
        student_id: caller.is(Role::Student).then(|| caller.user_id.clone()),
    };
    store
        .invoices(&filter)?
        .into_iter()
        .map(|invoice| invoice_detail(store, invoice))
        .collect()
}

pub(crate) fn grades(
    store: &dyn CampusStore,
    caller: &Caller,
    query: GradeQuery,
) -> Result<Vec<GradeDetail>, WorkflowError> {
    let mut filter = GradeFilter {
        student_id: non_blank(query.student_id).map(UserId),
        subject_id: non_blank(query.subject_id).map(SubjectId),
        period: non_blank(query.period),
        within_subjects: None,
    };
    match caller.role {
        Role::Student => filter.student_id = Some(caller.user_id.clone()),
        Role::Teacher => {
            let assigned = store.assigned_subjects(&caller.user_id)?;
            filter.within_subjects = Some(assigned.into_iter().map(|subject| subject.id).collect());
        }
        _ => {}
    }
    store
        .grades(&filter)?
        .into_iter()
        .map(|grade| grade_detail(store, grade))
        .collect()
}

pub(crate) fn certificates(
    store: &dyn CampusStore,
    caller: &Caller,
    query: CertificateQuery,
) -> Result<Vec<CertificateDetail>, WorkflowError> {
    let mut filter = CertificateFilter {
        student_id: non_blank(query.student_id).map(UserId),
        course_id: non_blank(query.course_id).map(CourseId),
    };
    if caller.is(Role::Student) {
        filter.student_id = Some(caller.user_id.clone());
    }
    store
        .certificates(&filter)?
        .into_iter()
        .map(|certificate| certificate_detail(store, certificate))
        .collect()
}

pub(crate) fn assigned_subjects(
    store: &dyn CampusStore,
    teacher: &Caller,
) -> Result<Vec<AssignedSubject>, WorkflowError> {
    store
        .assigned_subjects(&teacher.user_id)?
        .iter()
        .map(|subject| {
            let course = load_course(store, &subject.course_id)?;
            Ok::<_, WorkflowError>(AssignedSubject {
                subject: SubjectSummary::from(subject),
                course: course_summary(store, &course)?,
            })
        })
        .collect()
}

/// Students with an ENROLLED enrollment in the subject's course, ordered by last name.
pub(crate) fn subject_roster(
    store: &dyn CampusStore,
    teacher: &Caller,
    subject_id: &SubjectId,
) -> Result<Vec<RosterEntry>, WorkflowError> {
    let subject = store
        .subject(subject_id)?
        .ok_or_else(|| WorkflowError::not_found("subject", subject_id))?;
    if !store.is_assigned(&subject.id, &teacher.user_id)? {
        return Err(AccessError::NotAssigned {
            subject_id: subject.id,
        }
        .into());
    }

    let filter = EnrollmentFilter {
        status: Some(EnrollmentStatus::Enrolled),
        student_id: None,
        course_id: Some(subject.course_id.clone()),
    };
    let mut roster = store
        .enrollments(&filter)?
        .into_iter()
        .map(|enrollment| {
            let student = load_user(store, &enrollment.student_id)?;
            Ok::<_, WorkflowError>(RosterEntry {
                enrollment_id: enrollment.id,
                student: UserSummary::from(&student),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    roster.sort_by(|a, b| {
        (&a.student.last_name, &a.student.first_name)
            .cmp(&(&b.student.last_name, &b.student.first_name))
    });
    Ok(roster)
}
