//! Capability gate evaluated once per operation before any workflow code runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::domain::{Role, SubjectId, UserId};

/// Operations the gate can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    RegisterEnrollment,
    CancelEnrollment,
    ViewEnrollments,
    IssueInvoice,
    ViewInvoices,
    RecordGrade,
    ViewGrades,
    IssueCertificate,
    ViewCertificates,
    ViewRevenue,
    ViewDirectory,
    ViewTeachingLoad,
}

impl Capability {
    pub const fn label(self) -> &'static str {
        match self {
            Capability::RegisterEnrollment => "register enrollments",
            Capability::CancelEnrollment => "cancel enrollments",
            Capability::ViewEnrollments => "view enrollments",
            Capability::IssueInvoice => "issue invoices",
            Capability::ViewInvoices => "view invoices",
            Capability::RecordGrade => "record grades",
            Capability::ViewGrades => "view grades",
            Capability::IssueCertificate => "issue certificates",
            Capability::ViewCertificates => "view certificates",
            Capability::ViewRevenue => "view revenue statistics",
            Capability::ViewDirectory => "view the user directory",
            Capability::ViewTeachingLoad => "view assigned subjects",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Role {
    /// Default grants for each role.
    pub const fn capabilities(self) -> &'static [Capability] {
        use Capability::*;
        match self {
            Role::Administrator => &[
                CancelEnrollment,
                ViewEnrollments,
                ViewInvoices,
                ViewGrades,
                ViewCertificates,
                ViewRevenue,
                ViewDirectory,
            ],
            Role::EnrollmentClerk => &[
                RegisterEnrollment,
                CancelEnrollment,
                ViewEnrollments,
                ViewDirectory,
            ],
            Role::Cashier => &[
                IssueInvoice,
                ViewEnrollments,
                ViewInvoices,
                ViewRevenue,
                ViewDirectory,
            ],
            Role::Teacher => &[RecordGrade, ViewGrades, ViewTeachingLoad],
            Role::Registrar => &[
                IssueCertificate,
                ViewCertificates,
                ViewEnrollments,
                ViewGrades,
                ViewRevenue,
                ViewDirectory,
            ],
            Role::Student => &[ViewEnrollments, ViewInvoices, ViewGrades, ViewCertificates],
        }
    }
}

/// Identity supplied by the session provider. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("missing or unrecognised session")]
    Unauthenticated,
    #[error("no active {role} account '{user_id}'")]
    UnknownAccount { role: Role, user_id: UserId },
    #[error("a {role} may not {capability}")]
    Forbidden { role: Role, capability: Capability },
    #[error("not authorized for this subject")]
    NotAssigned { subject_id: SubjectId },
}

/// Role to capability table.
#[derive(Debug, Clone)]
pub struct AccessGate {
    grants: BTreeMap<Role, BTreeSet<Capability>>,
}

impl Default for AccessGate {
    fn default() -> Self {
        let grants = Role::ordered()
            .into_iter()
            .map(|role| (role, role.capabilities().iter().copied().collect()))
            .collect();
        Self { grants }
    }
}

impl AccessGate {
    pub fn permits(&self, role: Role, capability: Capability) -> bool {
        self.grants
            .get(&role)
            .is_some_and(|granted| granted.contains(&capability))
    }

    pub fn authorize(&self, caller: &Caller, capability: Capability) -> Result<(), AccessError> {
        if self.permits(caller.role, capability) {
            return Ok(());
        }

        warn!(
            user_id = %caller.user_id,
            role = caller.role.code(),
            capability = capability.label(),
            "access denied"
        );
        Err(AccessError::Forbidden {
            role: caller.role,
            capability,
        })
    }

    /// Remove a grant, e.g. to freeze billing during an audit.
    pub fn revoke(mut self, role: Role, capability: Capability) -> Self {
        if let Some(granted) = self.grants.get_mut(&role) {
            granted.remove(&capability);
        }
        self
    }
}
