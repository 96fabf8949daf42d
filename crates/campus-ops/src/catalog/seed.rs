use chrono::{DateTime, Utc};

use super::{CatalogMerge, SeedReport};
use crate::storage::{CampusRepository, RepositoryError};
use crate::workflows::domain::Role;

/// A seeded account. Credentials are managed by the session provider, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffAccount {
    pub email: &'static str,
    pub first_name: &'static str,
    pub last_name: &'static str,
    pub national_id: &'static str,
    pub role: Role,
}

/// One account per role.
pub const STANDARD_STAFF: [StaffAccount; 6] = [
    StaffAccount {
        email: "admin@campus.local",
        first_name: "Administrador",
        last_name: "Sistema",
        national_id: "1000000",
        role: Role::Administrator,
    },
    StaffAccount {
        email: "matriculas@campus.local",
        first_name: "Juan",
        last_name: "Perez",
        national_id: "2000000",
        role: Role::EnrollmentClerk,
    },
    StaffAccount {
        email: "cajero@campus.local",
        first_name: "Maria",
        last_name: "Gonzalez",
        national_id: "3000000",
        role: Role::Cashier,
    },
    StaffAccount {
        email: "profesor@campus.local",
        first_name: "Carlos",
        last_name: "Rodriguez",
        national_id: "4000000",
        role: Role::Teacher,
    },
    StaffAccount {
        email: "registro@campus.local",
        first_name: "Ana",
        last_name: "Martinez",
        national_id: "5000000",
        role: Role::Registrar,
    },
    StaffAccount {
        email: "alumno@campus.local",
        first_name: "Pedro",
        last_name: "Lopez",
        national_id: "6000000",
        role: Role::Student,
    },
];

/// Seeds the demo campus: the staff above, school `EN-001`, course `CUR-001` and subject
/// `MAT-001` taught by the seeded teacher.
pub fn standard_seed<R>(repository: &R, now: DateTime<Utc>) -> Result<SeedReport, RepositoryError>
where
    R: CampusRepository,
{
    repository.transaction(|store| {
        let mut merge = CatalogMerge::new(store, now);

        let mut teacher = None;
        for account in &STANDARD_STAFF {
            let user = merge.user(account)?;
            if user.role == Role::Teacher {
                teacher = Some(user);
            }
        }

        let school = merge.school(
            "EN-001",
            "Escuela Nautica",
            Some("Formacion nautica y maritima"),
        )?;
        let course = merge.course(&school, "CUR-001", "Navegacion basica", 500_000)?;
        let subject = merge.subject(&course, "MAT-001", "Navegacion costera")?;
        if let Some(teacher) = teacher {
            merge.assign(&subject, &teacher)?;
        }

        Ok(merge.finish())
    })
}
