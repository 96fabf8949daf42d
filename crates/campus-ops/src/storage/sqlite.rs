use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{
    ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Params, Row,
    TransactionBehavior,
};

use super::schema::migrate;
use super::{
    CampusRepository, CampusStore, CertificateFilter, EnrollmentFilter, GradeFilter,
    InvoiceFilter, PaymentWindow, RepositoryError, RevenueRow,
};
use crate::workflows::domain::{
    BillingMode, Certificate, CertificateId, CertificateSubject, Course, CourseId,
    CredentialState, Enrollment, EnrollmentId, EnrollmentStatus, Grade, GradeId, Invoice,
    InvoiceId, InvoiceStatus, Role, School, SchoolId, SequenceKind, Subject, SubjectId,
    TeacherAssignment, ThirdPartyPayer, User, UserId,
};

/// SQLite-backed repository. One connection, serialized behind a mutex; every unit of work is
/// an immediate transaction so sequence allocation and uniqueness checks see a stable snapshot.
pub struct SqliteCampusRepository {
    conn: Mutex<Connection>,
}

/// How long a writer waits on another process holding the database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteCampusRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| RepositoryError::Unavailable(error.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, RepositoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CampusRepository for SqliteCampusRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn CampusStore) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection lock poisoned".to_string()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        // Dropping `tx` without commit rolls the unit of work back.
        let value = work(&mut SqliteStore { conn: &tx })?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(value)
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(error: rusqlite::Error) -> Self {
        classify(error, "record")
    }
}

fn classify(error: rusqlite::Error, entity: &'static str) -> RepositoryError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    RepositoryError::Conflict(entity)
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepositoryError::MissingReference(entity),
                _ => RepositoryError::Corrupt {
                    entity,
                    detail: error.to_string(),
                },
            }
        }
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            RepositoryError::Corrupt {
                entity,
                detail: error.to_string(),
            }
        }
        _ => RepositoryError::Unavailable(error.to_string()),
    }
}

fn conflict(entity: &'static str) -> impl FnOnce(rusqlite::Error) -> RepositoryError {
    move |error| classify(error, entity)
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct DecodeError(String);

fn decode_failure(idx: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(DecodeError(detail)))
}

fn encode_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn day_start(day: NaiveDate) -> String {
    encode_time(Utc.from_utc_datetime(&day.and_time(NaiveTime::default())))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| decode_failure(idx, format!("timestamp '{raw}': {error}")))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn coded_at<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| decode_failure(idx, format!("unknown {what} '{raw}'")))
}

fn unsigned_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| decode_failure(idx, format!("negative amount {raw}")))
}

fn signed(value: u64, entity: &'static str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::Corrupt {
        entity,
        detail: format!("amount {value} does not fit the store"),
    })
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, national_id, phone, address, role, \
     active, credential, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        national_id: row.get(4)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        role: coded_at(row, 7, Role::parse, "role")?,
        active: row.get(8)?,
        credential: coded_at(row, 9, CredentialState::parse, "credential state")?,
        created_at: time_at(row, 10)?,
    })
}

const SCHOOL_COLUMNS: &str = "id, code, name, description, active";

fn school_from_row(row: &Row<'_>) -> rusqlite::Result<School> {
    Ok(School {
        id: SchoolId(row.get(0)?),
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        active: row.get(4)?,
    })
}

const COURSE_COLUMNS: &str = "id, school_id, code, name, cost, active";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: CourseId(row.get(0)?),
        school_id: SchoolId(row.get(1)?),
        code: row.get(2)?,
        name: row.get(3)?,
        cost: unsigned_at(row, 4)?,
        active: row.get(5)?,
    })
}

const SUBJECT_COLUMNS: &str = "s.id, s.course_id, s.code, s.name, s.active";

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: SubjectId(row.get(0)?),
        course_id: CourseId(row.get(1)?),
        code: row.get(2)?,
        name: row.get(3)?,
        active: row.get(4)?,
    })
}

const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, status, notes, enrolled_at";

fn enrollment_from_row(row: &Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: EnrollmentId(row.get(0)?),
        student_id: UserId(row.get(1)?),
        course_id: CourseId(row.get(2)?),
        status: coded_at(row, 3, EnrollmentStatus::parse, "enrollment status")?,
        notes: row.get(4)?,
        enrolled_at: time_at(row, 5)?,
    })
}

const INVOICE_COLUMNS: &str = "i.id, i.number, i.enrollment_id, i.cashier_id, i.amount, \
     i.billing_mode, i.third_party_name, i.third_party_national_id, i.third_party_address, \
     i.status, i.issued_at, i.paid_at, i.notes";

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    let third_party = match (
        row.get::<_, Option<String>>(6)?,
        row.get::<_, Option<String>>(7)?,
        row.get::<_, Option<String>>(8)?,
    ) {
        (Some(name), Some(national_id), Some(address)) => Some(ThirdPartyPayer {
            name,
            national_id,
            address,
        }),
        _ => None,
    };

    Ok(Invoice {
        id: InvoiceId(row.get(0)?),
        number: row.get(1)?,
        enrollment_id: EnrollmentId(row.get(2)?),
        cashier_id: UserId(row.get(3)?),
        amount: unsigned_at(row, 4)?,
        billing_mode: coded_at(row, 5, BillingMode::parse, "billing mode")?,
        third_party,
        status: coded_at(row, 9, InvoiceStatus::parse, "invoice status")?,
        issued_at: time_at(row, 10)?,
        paid_at: optional_time_at(row, 11)?,
        notes: row.get(12)?,
    })
}

const GRADE_COLUMNS: &str = "g.id, g.student_id, g.subject_id, g.teacher_id, g.score, g.period, \
     g.notes, g.recorded_at, g.updated_at";

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: GradeId(row.get(0)?),
        student_id: UserId(row.get(1)?),
        subject_id: SubjectId(row.get(2)?),
        teacher_id: UserId(row.get(3)?),
        score: row.get(4)?,
        period: row.get(5)?,
        notes: row.get(6)?,
        recorded_at: time_at(row, 7)?,
        updated_at: time_at(row, 8)?,
    })
}

const CERTIFICATE_COLUMNS: &str = "id, number, student_id, course_id, registrar_id, \
     completion_date, average, notes, issued_at";

fn certificate_from_row(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    let raw_date: String = row.get(5)?;
    let completion_date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
        .map_err(|error| decode_failure(5, format!("date '{raw_date}': {error}")))?;

    Ok(Certificate {
        id: CertificateId(row.get(0)?),
        number: row.get(1)?,
        student_id: UserId(row.get(2)?),
        course_id: CourseId(row.get(3)?),
        registrar_id: UserId(row.get(4)?),
        completion_date,
        average: row.get(6)?,
        notes: row.get(7)?,
        issued_at: time_at(row, 8)?,
        subjects: Vec::new(),
    })
}

/// Store view over one open transaction.
struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl SqliteStore<'_> {
    fn first<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>, RepositoryError> {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    fn collect<T>(
        &self,
        sql: &str,
        values: &[String],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, RepositoryError> {
        let mut statement = self.conn.prepare(sql)?;
        let rows = statement.query_map(params_from_iter(values.iter()), map)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn with_subjects(&self, mut certificate: Certificate) -> Result<Certificate, RepositoryError> {
        let mut statement = self.conn.prepare(
            "SELECT subject_id, subject_name, period, score, passed
             FROM certificate_subjects WHERE certificate_id = ?1 ORDER BY position",
        )?;
        let rows = statement.query_map([certificate.id.as_str()], |row| {
            Ok(CertificateSubject {
                subject_id: SubjectId(row.get(0)?),
                subject_name: row.get(1)?,
                period: row.get(2)?,
                score: row.get(3)?,
                passed: row.get(4)?,
            })
        })?;
        certificate.subjects = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(certificate)
    }
}

/// Accumulates `AND`-joined conditions with their positional text parameters.
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    values: Vec<String>,
}

impl Conditions {
    fn push(&mut self, clause: &str, value: impl Into<String>) {
        self.clauses.push(clause.to_string());
        self.values.push(value.into());
    }

    fn fixed(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn render(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

impl CampusStore for SqliteStore<'_> {
    fn user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.first(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id.as_str()],
            user_from_row,
        )
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.first(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            user_from_row,
        )
    }

    fn users(&self, role: Option<Role>) -> Result<Vec<User>, RepositoryError> {
        let mut conditions = Conditions::default();
        conditions.fixed("active = 1");
        if let Some(role) = role {
            conditions.push("role = ?", role.code());
        }
        self.collect(
            &format!(
                "SELECT {USER_COLUMNS} FROM users{} ORDER BY first_name",
                conditions.render()
            ),
            &conditions.values,
            user_from_row,
        )
    }

    fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO users(id, email, first_name, last_name, national_id, phone, address,
                     role, active, credential, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    user.id.as_str(),
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.national_id,
                    user.phone,
                    user.address,
                    user.role.code(),
                    user.active,
                    user.credential.code(),
                    encode_time(user.created_at),
                ],
            )
            .map_err(conflict("user"))?;
        Ok(())
    }

    fn school(&self, id: &SchoolId) -> Result<Option<School>, RepositoryError> {
        self.first(
            &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE id = ?1"),
            [id.as_str()],
            school_from_row,
        )
    }

    fn school_by_code(&self, code: &str) -> Result<Option<School>, RepositoryError> {
        self.first(
            &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE code = ?1"),
            [code],
            school_from_row,
        )
    }

    fn schools(&self) -> Result<Vec<School>, RepositoryError> {
        self.collect(
            &format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE active = 1 ORDER BY name"),
            &[],
            school_from_row,
        )
    }

    fn insert_school(&mut self, school: &School) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO schools(id, code, name, description, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    school.id.as_str(),
                    school.code,
                    school.name,
                    school.description,
                    school.active,
                ],
            )
            .map_err(conflict("school"))?;
        Ok(())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        self.first(
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
            [id.as_str()],
            course_from_row,
        )
    }

    fn course_by_code(
        &self,
        school_id: &SchoolId,
        code: &str,
    ) -> Result<Option<Course>, RepositoryError> {
        self.first(
            &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE school_id = ?1 AND code = ?2"),
            [school_id.as_str(), code],
            course_from_row,
        )
    }

    fn courses(&self, school_id: Option<&SchoolId>) -> Result<Vec<Course>, RepositoryError> {
        let mut conditions = Conditions::default();
        conditions.fixed("active = 1");
        if let Some(school_id) = school_id {
            conditions.push("school_id = ?", school_id.as_str());
        }
        self.collect(
            &format!(
                "SELECT {COURSE_COLUMNS} FROM courses{} ORDER BY name",
                conditions.render()
            ),
            &conditions.values,
            course_from_row,
        )
    }

    fn insert_course(&mut self, course: &Course) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO courses(id, school_id, code, name, cost, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    course.id.as_str(),
                    course.school_id.as_str(),
                    course.code,
                    course.name,
                    signed(course.cost, "course")?,
                    course.active,
                ],
            )
            .map_err(conflict("course"))?;
        Ok(())
    }

    fn subject(&self, id: &SubjectId) -> Result<Option<Subject>, RepositoryError> {
        self.first(
            &format!("SELECT {SUBJECT_COLUMNS} FROM subjects s WHERE s.id = ?1"),
            [id.as_str()],
            subject_from_row,
        )
    }

    fn subject_by_code(
        &self,
        course_id: &CourseId,
        code: &str,
    ) -> Result<Option<Subject>, RepositoryError> {
        self.first(
            &format!(
                "SELECT {SUBJECT_COLUMNS} FROM subjects s WHERE s.course_id = ?1 AND s.code = ?2"
            ),
            [course_id.as_str(), code],
            subject_from_row,
        )
    }

    fn subjects_for_course(&self, course_id: &CourseId) -> Result<Vec<Subject>, RepositoryError> {
        self.collect(
            &format!(
                "SELECT {SUBJECT_COLUMNS} FROM subjects s WHERE s.course_id = ? ORDER BY s.name"
            ),
            &[course_id.to_string()],
            subject_from_row,
        )
    }

    fn insert_subject(&mut self, subject: &Subject) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO subjects(id, course_id, code, name, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subject.id.as_str(),
                    subject.course_id.as_str(),
                    subject.code,
                    subject.name,
                    subject.active,
                ],
            )
            .map_err(conflict("subject"))?;
        Ok(())
    }

    fn assign_teacher(&mut self, assignment: &TeacherAssignment) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO teacher_assignments(subject_id, teacher_id, assigned_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    assignment.subject_id.as_str(),
                    assignment.teacher_id.as_str(),
                    encode_time(assignment.assigned_at),
                ],
            )
            .map_err(conflict("teacher assignment"))?;
        Ok(())
    }

    fn is_assigned(
        &self,
        subject_id: &SubjectId,
        teacher_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let found = self.first(
            "SELECT 1 FROM teacher_assignments WHERE subject_id = ?1 AND teacher_id = ?2",
            [subject_id.as_str(), teacher_id.as_str()],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(found.is_some())
    }

    fn assigned_subjects(&self, teacher_id: &UserId) -> Result<Vec<Subject>, RepositoryError> {
        self.collect(
            &format!(
                "SELECT {SUBJECT_COLUMNS} FROM subjects s
                 JOIN teacher_assignments a ON a.subject_id = s.id
                 WHERE a.teacher_id = ? ORDER BY s.name"
            ),
            &[teacher_id.to_string()],
            subject_from_row,
        )
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        self.first(
            &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?1"),
            [id.as_str()],
            enrollment_from_row,
        )
    }

    fn enrollment_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.first(
            &format!(
                "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
                 WHERE student_id = ?1 AND course_id = ?2"
            ),
            [student_id.as_str(), course_id.as_str()],
            enrollment_from_row,
        )
    }

    fn enrollments(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut conditions = Conditions::default();
        if let Some(status) = filter.status {
            conditions.push("status = ?", status.code());
        }
        if let Some(student_id) = &filter.student_id {
            conditions.push("student_id = ?", student_id.as_str());
        }
        if let Some(course_id) = &filter.course_id {
            conditions.push("course_id = ?", course_id.as_str());
        }
        self.collect(
            &format!(
                "SELECT {ENROLLMENT_COLUMNS} FROM enrollments{} ORDER BY enrolled_at DESC",
                conditions.render()
            ),
            &conditions.values,
            enrollment_from_row,
        )
    }

    fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO enrollments(id, student_id, course_id, status, notes, enrolled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    enrollment.id.as_str(),
                    enrollment.student_id.as_str(),
                    enrollment.course_id.as_str(),
                    enrollment.status.code(),
                    enrollment.notes,
                    encode_time(enrollment.enrolled_at),
                ],
            )
            .map_err(conflict("enrollment"))?;
        Ok(())
    }

    fn set_enrollment_status(
        &mut self,
        id: &EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), RepositoryError> {
        let changed = self.conn.execute(
            "UPDATE enrollments SET status = ?1 WHERE id = ?2",
            [status.code(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "enrollment",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn next_sequence(&mut self, kind: SequenceKind) -> Result<u64, RepositoryError> {
        let value: i64 = self.conn.query_row(
            "INSERT INTO sequences(name, value) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            [kind.name()],
            |row| row.get(0),
        )?;
        u64::try_from(value).map_err(|_| RepositoryError::Corrupt {
            entity: "sequence",
            detail: format!("{} is negative", kind.name()),
        })
    }

    fn invoice_for_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
    ) -> Result<Option<Invoice>, RepositoryError> {
        self.first(
            &format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE i.enrollment_id = ?1"),
            [enrollment_id.as_str()],
            invoice_from_row,
        )
    }

    fn invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, RepositoryError> {
        let mut conditions = Conditions::default();
        if let Some(status) = filter.status {
            conditions.push("i.status = ?", status.code());
        }
        if let Some(cashier_id) = &filter.cashier_id {
            conditions.push("i.cashier_id = ?", cashier_id.as_str());
        }
        if let Some(student_id) = &filter.student_id {
            conditions.push(
                "i.enrollment_id IN (SELECT id FROM enrollments WHERE student_id = ?)",
                student_id.as_str(),
            );
        }
        self.collect(
            &format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices i{} ORDER BY i.issued_at DESC",
                conditions.render()
            ),
            &conditions.values,
            invoice_from_row,
        )
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), RepositoryError> {
        let third_party = invoice.third_party.as_ref();
        self.conn
            .execute(
                "INSERT INTO invoices(id, number, enrollment_id, cashier_id, amount, billing_mode,
                     third_party_name, third_party_national_id, third_party_address, status,
                     issued_at, paid_at, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    invoice.id.as_str(),
                    invoice.number,
                    invoice.enrollment_id.as_str(),
                    invoice.cashier_id.as_str(),
                    signed(invoice.amount, "invoice")?,
                    invoice.billing_mode.code(),
                    third_party.map(|payer| payer.name.as_str()),
                    third_party.map(|payer| payer.national_id.as_str()),
                    third_party.map(|payer| payer.address.as_str()),
                    invoice.status.code(),
                    encode_time(invoice.issued_at),
                    invoice.paid_at.map(encode_time),
                    invoice.notes,
                ],
            )
            .map_err(conflict("invoice"))?;
        Ok(())
    }

    fn paid_invoices(&self, window: &PaymentWindow) -> Result<Vec<RevenueRow>, RepositoryError> {
        let mut conditions = Conditions::default();
        conditions.fixed("i.status = 'PAID'");
        conditions.fixed("i.paid_at IS NOT NULL");
        if let Some(from) = window.paid_from {
            conditions.push("i.paid_at >= ?", day_start(from));
        }
        if let Some(next_day) = window.paid_to.and_then(|to| to.succ_opt()) {
            conditions.push("i.paid_at < ?", day_start(next_day));
        }
        if let Some(mode) = window.billing_mode {
            conditions.push("i.billing_mode = ?", mode.code());
        }

        self.collect(
            &format!(
                "SELECT {INVOICE_COLUMNS}, c.id, c.name, s.id, s.name
                 FROM invoices i
                 JOIN enrollments e ON e.id = i.enrollment_id
                 JOIN courses c ON c.id = e.course_id
                 JOIN schools s ON s.id = c.school_id{}
                 ORDER BY i.paid_at",
                conditions.render()
            ),
            &conditions.values,
            |row| {
                let invoice = invoice_from_row(row)?;
                let paid_at = invoice
                    .paid_at
                    .ok_or_else(|| decode_failure(11, "paid invoice without a date".to_string()))?;
                Ok(RevenueRow {
                    invoice,
                    paid_at,
                    course_id: CourseId(row.get(13)?),
                    course_name: row.get(14)?,
                    school_id: SchoolId(row.get(15)?),
                    school_name: row.get(16)?,
                })
            },
        )
    }

    fn upsert_grade(&mut self, grade: &Grade) -> Result<Grade, RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO grades(id, student_id, subject_id, teacher_id, score, period, notes,
                     recorded_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(student_id, subject_id, period) DO UPDATE SET
                     score = excluded.score,
                     notes = excluded.notes,
                     teacher_id = excluded.teacher_id,
                     updated_at = excluded.updated_at",
                params![
                    grade.id.as_str(),
                    grade.student_id.as_str(),
                    grade.subject_id.as_str(),
                    grade.teacher_id.as_str(),
                    grade.score,
                    grade.period,
                    grade.notes,
                    encode_time(grade.recorded_at),
                    encode_time(grade.updated_at),
                ],
            )
            .map_err(conflict("grade"))?;

        self.first(
            &format!(
                "SELECT {GRADE_COLUMNS} FROM grades g
                 WHERE g.student_id = ?1 AND g.subject_id = ?2 AND g.period = ?3"
            ),
            [
                grade.student_id.as_str(),
                grade.subject_id.as_str(),
                grade.period.as_str(),
            ],
            grade_from_row,
        )?
        .ok_or_else(|| RepositoryError::NotFound {
            entity: "grade",
            id: grade.id.to_string(),
        })
    }

    fn grades(&self, filter: &GradeFilter) -> Result<Vec<Grade>, RepositoryError> {
        let mut conditions = Conditions::default();
        if let Some(student_id) = &filter.student_id {
            conditions.push("g.student_id = ?", student_id.as_str());
        }
        if let Some(subject_id) = &filter.subject_id {
            conditions.push("g.subject_id = ?", subject_id.as_str());
        }
        if let Some(period) = &filter.period {
            conditions.push("g.period = ?", period.as_str());
        }
        if let Some(subjects) = &filter.within_subjects {
            if subjects.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; subjects.len()].join(", ");
            conditions
                .clauses
                .push(format!("g.subject_id IN ({placeholders})"));
            conditions
                .values
                .extend(subjects.iter().map(ToString::to_string));
        }
        self.collect(
            &format!(
                "SELECT {GRADE_COLUMNS} FROM grades g{} ORDER BY g.updated_at DESC",
                conditions.render()
            ),
            &conditions.values,
            grade_from_row,
        )
    }

    fn grades_for_course(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<Grade>, RepositoryError> {
        self.collect(
            &format!(
                "SELECT {GRADE_COLUMNS} FROM grades g
                 JOIN subjects s ON s.id = g.subject_id
                 WHERE g.student_id = ? AND s.course_id = ?
                 ORDER BY s.name, g.period"
            ),
            &[student_id.to_string(), course_id.to_string()],
            grade_from_row,
        )
    }

    fn certificate_for(
        &self,
        student_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Certificate>, RepositoryError> {
        let certificate = self.first(
            &format!(
                "SELECT {CERTIFICATE_COLUMNS} FROM certificates
                 WHERE student_id = ?1 AND course_id = ?2"
            ),
            [student_id.as_str(), course_id.as_str()],
            certificate_from_row,
        )?;
        certificate
            .map(|certificate| self.with_subjects(certificate))
            .transpose()
    }

    fn insert_certificate(&mut self, certificate: &Certificate) -> Result<(), RepositoryError> {
        self.conn
            .execute(
                "INSERT INTO certificates(id, number, student_id, course_id, registrar_id,
                     completion_date, average, notes, issued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    certificate.id.as_str(),
                    certificate.number,
                    certificate.student_id.as_str(),
                    certificate.course_id.as_str(),
                    certificate.registrar_id.as_str(),
                    certificate.completion_date.format("%Y-%m-%d").to_string(),
                    certificate.average,
                    certificate.notes,
                    encode_time(certificate.issued_at),
                ],
            )
            .map_err(conflict("certificate"))?;

        let mut statement = self.conn.prepare(
            "INSERT INTO certificate_subjects(certificate_id, position, subject_id, subject_name,
                 period, score, passed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for (position, snapshot) in certificate.subjects.iter().enumerate() {
            statement
                .execute(params![
                    certificate.id.as_str(),
                    position as i64,
                    snapshot.subject_id.as_str(),
                    snapshot.subject_name,
                    snapshot.period,
                    snapshot.score,
                    snapshot.passed,
                ])
                .map_err(conflict("certificate subject"))?;
        }
        Ok(())
    }

    fn certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<Certificate>, RepositoryError> {
        let mut conditions = Conditions::default();
        if let Some(student_id) = &filter.student_id {
            conditions.push("student_id = ?", student_id.as_str());
        }
        if let Some(course_id) = &filter.course_id {
            conditions.push("course_id = ?", course_id.as_str());
        }
        let certificates = self.collect(
            &format!(
                "SELECT {CERTIFICATE_COLUMNS} FROM certificates{} ORDER BY issued_at DESC",
                conditions.render()
            ),
            &conditions.values,
            certificate_from_row,
        )?;
        certificates
            .into_iter()
            .map(|certificate| self.with_subjects(certificate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn seed_enrollment(store: &mut dyn CampusStore) -> Result<Enrollment, RepositoryError> {
        let school = School {
            id: SchoolId::from("school-1"),
            code: "EN-001".to_string(),
            name: "Escuela Central".to_string(),
            description: None,
            active: true,
        };
        let course = Course {
            id: CourseId::from("course-1"),
            school_id: school.id.clone(),
            code: "CUR-001".to_string(),
            name: "Electricidad".to_string(),
            cost: 500_000,
            active: true,
        };
        let student = User {
            id: UserId::from("student-1"),
            email: "ana@campus.example".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            national_id: None,
            phone: None,
            address: None,
            role: Role::Student,
            active: true,
            credential: CredentialState::AwaitingActivation,
            created_at: at(1, 8),
        };
        let enrollment = Enrollment {
            id: EnrollmentId::from("enrollment-1"),
            student_id: student.id.clone(),
            course_id: course.id.clone(),
            status: EnrollmentStatus::Pending,
            notes: None,
            enrolled_at: at(1, 9),
        };
        store.insert_school(&school)?;
        store.insert_course(&course)?;
        store.insert_user(&student)?;
        store.insert_enrollment(&enrollment)?;
        Ok(enrollment)
    }

    fn paid_invoice(enrollment: &Enrollment, paid_at: DateTime<Utc>) -> Invoice {
        Invoice {
            id: InvoiceId::from("invoice-1"),
            number: SequenceKind::Invoice.format(1),
            enrollment_id: enrollment.id.clone(),
            cashier_id: enrollment.student_id.clone(),
            amount: 500_000,
            billing_mode: BillingMode::SelfBilled,
            third_party: None,
            status: InvoiceStatus::Paid,
            issued_at: paid_at,
            paid_at: Some(paid_at),
            notes: None,
        }
    }

    #[test]
    fn duplicate_enrollment_surfaces_as_conflict() {
        let repository = SqliteCampusRepository::in_memory().expect("open");
        let enrollment = repository
            .transaction(|store| seed_enrollment(store))
            .expect("seeded");

        let duplicate = Enrollment {
            id: EnrollmentId::from("enrollment-2"),
            ..enrollment
        };
        let outcome: Result<(), RepositoryError> =
            repository.transaction(|store| store.insert_enrollment(&duplicate));
        assert!(matches!(outcome, Err(RepositoryError::Conflict("enrollment"))));
    }

    #[test]
    fn rolled_back_work_is_not_visible() {
        let repository = SqliteCampusRepository::in_memory().expect("open");
        let outcome: Result<(), RepositoryError> = repository.transaction(|store| {
            seed_enrollment(store)?;
            store.next_sequence(SequenceKind::Invoice)?;
            Err(RepositoryError::Unavailable("abort".to_string()))
        });
        assert!(outcome.is_err());

        let (schools, next) = repository
            .transaction(|store| {
                Ok::<_, RepositoryError>((
                    store.schools()?,
                    store.next_sequence(SequenceKind::Invoice)?,
                ))
            })
            .expect("reads");
        assert!(schools.is_empty());
        assert_eq!(next, 1, "sequence increment must roll back too");
    }

    #[test]
    fn paid_window_is_inclusive_on_calendar_days() {
        let repository = SqliteCampusRepository::in_memory().expect("open");
        repository
            .transaction(|store| {
                let enrollment = seed_enrollment(store)?;
                store.insert_invoice(&paid_invoice(&enrollment, at(10, 23)))
            })
            .expect("seeded");

        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let rows = |window: PaymentWindow| {
            repository
                .transaction(|store| store.paid_invoices(&window))
                .expect("query")
        };

        let same_day = rows(PaymentWindow {
            paid_from: Some(day),
            paid_to: Some(day),
            billing_mode: None,
        });
        assert_eq!(same_day.len(), 1);
        assert_eq!(same_day[0].school_name, "Escuela Central");
        assert_eq!(same_day[0].course_name, "Electricidad");

        let after = rows(PaymentWindow {
            paid_from: day.succ_opt(),
            ..PaymentWindow::default()
        });
        assert!(after.is_empty());

        let third_party_only = rows(PaymentWindow {
            billing_mode: Some(BillingMode::ThirdParty),
            ..PaymentWindow::default()
        });
        assert!(third_party_only.is_empty());
    }

    #[test]
    fn certificate_round_trips_with_snapshots() {
        let repository = SqliteCampusRepository::in_memory().expect("open");
        let stored = repository
            .transaction(|store| {
                let enrollment = seed_enrollment(store)?;
                let subject = Subject {
                    id: SubjectId::from("subject-1"),
                    course_id: enrollment.course_id.clone(),
                    code: "MAT-001".to_string(),
                    name: "Matematicas".to_string(),
                    active: true,
                };
                store.insert_subject(&subject)?;
                store.insert_certificate(&Certificate {
                    id: "certificate-1".into(),
                    number: SequenceKind::Certificate.format(1),
                    student_id: enrollment.student_id.clone(),
                    course_id: enrollment.course_id.clone(),
                    registrar_id: enrollment.student_id.clone(),
                    completion_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
                    average: 72.5,
                    notes: None,
                    issued_at: at(20, 10),
                    subjects: vec![CertificateSubject {
                        subject_id: subject.id.clone(),
                        subject_name: subject.name.clone(),
                        period: "2025-1".to_string(),
                        score: 72.5,
                        passed: true,
                    }],
                })?;
                store.certificate_for(&enrollment.student_id, &enrollment.course_id)
            })
            .expect("stored")
            .expect("present");

        assert_eq!(stored.number, "CERT-000001");
        assert_eq!(stored.subjects.len(), 1);
        assert!(stored.subjects[0].passed);
        assert_eq!(stored.issued_at, at(20, 10));
    }
}
