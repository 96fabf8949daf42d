//! Reference data: the standard seed and CSV catalog imports.
//!
//! Both paths merge by natural key (school code, course code within a school, subject code within
//! a course, user email), so running them twice leaves the store unchanged.

mod parser;
mod seed;

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{CampusRepository, CampusStore, RepositoryError};
use crate::workflows::domain::{
    Course, CourseId, CredentialState, Role, School, SchoolId, Subject, SubjectId,
    TeacherAssignment, User, UserId,
};

pub use parser::CatalogRow;
pub use seed::{standard_seed, StaffAccount, STANDARD_STAFF};

/// What a seed or import actually created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub users: usize,
    pub schools: usize,
    pub courses: usize,
    pub subjects: usize,
    pub assignments: usize,
}

impl SeedReport {
    pub fn created(&self) -> usize {
        self.users + self.schools + self.courses + self.subjects + self.assignments
    }
}

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Invalid { line: usize, reason: String },
    Repository(RepositoryError),
}

impl fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read catalog file: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid catalog CSV data: {}", err),
            CatalogImportError::Invalid { line, reason } => {
                write!(f, "catalog line {}: {}", line, reason)
            }
            CatalogImportError::Repository(err) => {
                write!(f, "could not store catalog data: {}", err)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Invalid { .. } => None,
            CatalogImportError::Repository(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RepositoryError> for CatalogImportError {
    fn from(err: RepositoryError) -> Self {
        Self::Repository(err)
    }
}

/// Loads schools, courses, subjects and teacher assignments from a CSV export.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_path<R, P>(
        repository: &R,
        path: P,
        now: DateTime<Utc>,
    ) -> Result<SeedReport, CatalogImportError>
    where
        R: CampusRepository,
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(repository, file, now)
    }

    /// Parses every row first; the merge then runs as a single unit of work.
    pub fn from_reader<R, Rd>(
        repository: &R,
        reader: Rd,
        now: DateTime<Utc>,
    ) -> Result<SeedReport, CatalogImportError>
    where
        R: CampusRepository,
        Rd: Read,
    {
        let rows = parser::parse_rows(reader)?;
        repository.transaction(|store| {
            let mut merge = CatalogMerge::new(store, now);
            for (index, row) in rows.iter().enumerate() {
                merge.row(index + 2, row)?;
            }
            Ok(merge.finish())
        })
    }
}

/// Find-or-create helpers shared by the seed and the importer.
pub(crate) struct CatalogMerge<'a> {
    store: &'a mut dyn CampusStore,
    now: DateTime<Utc>,
    report: SeedReport,
}

impl<'a> CatalogMerge<'a> {
    pub(crate) fn new(store: &'a mut dyn CampusStore, now: DateTime<Utc>) -> Self {
        Self {
            store,
            now,
            report: SeedReport::default(),
        }
    }

    pub(crate) fn finish(self) -> SeedReport {
        self.report
    }

    pub(crate) fn school(
        &mut self,
        code: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<School, RepositoryError> {
        if let Some(existing) = self.store.school_by_code(code)? {
            return Ok(existing);
        }
        let school = School {
            id: SchoolId::generate(),
            code: code.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            active: true,
        };
        self.store.insert_school(&school)?;
        self.report.schools += 1;
        Ok(school)
    }

    pub(crate) fn course(
        &mut self,
        school: &School,
        code: &str,
        name: &str,
        cost: u64,
    ) -> Result<Course, RepositoryError> {
        if let Some(existing) = self.store.course_by_code(&school.id, code)? {
            return Ok(existing);
        }
        let course = Course {
            id: CourseId::generate(),
            school_id: school.id.clone(),
            code: code.to_string(),
            name: name.to_string(),
            cost,
            active: true,
        };
        self.store.insert_course(&course)?;
        self.report.courses += 1;
        Ok(course)
    }

    pub(crate) fn subject(
        &mut self,
        course: &Course,
        code: &str,
        name: &str,
    ) -> Result<Subject, RepositoryError> {
        if let Some(existing) = self.store.subject_by_code(&course.id, code)? {
            return Ok(existing);
        }
        let subject = Subject {
            id: SubjectId::generate(),
            course_id: course.id.clone(),
            code: code.to_string(),
            name: name.to_string(),
            active: true,
        };
        self.store.insert_subject(&subject)?;
        self.report.subjects += 1;
        Ok(subject)
    }

    pub(crate) fn user(&mut self, account: &StaffAccount) -> Result<User, RepositoryError> {
        if let Some(existing) = self.store.user_by_email(account.email)? {
            return Ok(existing);
        }
        let user = User {
            id: UserId::generate(),
            email: account.email.to_string(),
            first_name: account.first_name.to_string(),
            last_name: account.last_name.to_string(),
            national_id: Some(account.national_id.to_string()),
            phone: None,
            address: None,
            role: account.role,
            active: true,
            credential: CredentialState::Managed,
            created_at: self.now,
        };
        self.store.insert_user(&user)?;
        self.report.users += 1;
        Ok(user)
    }

    pub(crate) fn assign(&mut self, subject: &Subject, teacher: &User) -> Result<(), RepositoryError> {
        if self.store.is_assigned(&subject.id, &teacher.id)? {
            return Ok(());
        }
        self.store.assign_teacher(&TeacherAssignment {
            subject_id: subject.id.clone(),
            teacher_id: teacher.id.clone(),
            assigned_at: self.now,
        })?;
        self.report.assignments += 1;
        Ok(())
    }

    fn row(&mut self, line: usize, row: &CatalogRow) -> Result<(), CatalogImportError> {
        let school = self.school(&row.school_code, &row.school_name, None)?;
        let course = self.course(&school, &row.course_code, &row.course_name, row.course_cost)?;
        let subject = self.subject(&course, &row.subject_code, &row.subject_name)?;

        let Some(email) = row.teacher_email.as_deref() else {
            return Ok(());
        };
        let teacher = match self.store.user_by_email(email)? {
            Some(user) if user.role == Role::Teacher => user,
            Some(_) => {
                return Err(CatalogImportError::Invalid {
                    line,
                    reason: format!("{email} is not a teacher account"),
                })
            }
            None => {
                return Err(CatalogImportError::Invalid {
                    line,
                    reason: format!("no account found for {email}"),
                })
            }
        };
        self.assign(&subject, &teacher)?;
        Ok(())
    }
}
