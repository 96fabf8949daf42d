use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scores at or above this value count as a passed subject on a certificate.
pub const PASSING_SCORE: f64 = 60.0;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(
    /// Identifier of any account: staff members and students alike.
    UserId
);
record_id!(SchoolId);
record_id!(CourseId);
record_id!(SubjectId);
record_id!(EnrollmentId);
record_id!(InvoiceId);
record_id!(GradeId);
record_id!(CertificateId);

/// Fixed role enumeration resolved by the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Administrator,
    EnrollmentClerk,
    Cashier,
    Teacher,
    Registrar,
    Student,
}

impl Role {
    pub const fn ordered() -> [Role; 6] {
        [
            Role::Administrator,
            Role::EnrollmentClerk,
            Role::Cashier,
            Role::Teacher,
            Role::Registrar,
            Role::Student,
        ]
    }

    /// Wire code used in headers, query strings and storage.
    pub const fn code(self) -> &'static str {
        match self {
            Role::Administrator => "ADMINISTRATOR",
            Role::EnrollmentClerk => "ENROLLMENT_CLERK",
            Role::Cashier => "CASHIER",
            Role::Teacher => "TEACHER",
            Role::Registrar => "REGISTRAR",
            Role::Student => "STUDENT",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::EnrollmentClerk => "enrollment clerk",
            Role::Cashier => "cashier",
            Role::Teacher => "teacher",
            Role::Registrar => "registrar",
            Role::Student => "student",
        }
    }

    /// Case-insensitive parse of the wire code; dashes are accepted in place of underscores.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
        Role::ordered()
            .into_iter()
            .find(|role| role.code() == normalized)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How an account can sign in. Auto-provisioned students start without any credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Managed,
    AwaitingActivation,
}

impl CredentialState {
    pub const fn code(self) -> &'static str {
        match self {
            CredentialState::Managed => "managed",
            CredentialState::AwaitingActivation => "awaiting_activation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "managed" => Some(CredentialState::Managed),
            "awaiting_activation" => Some(CredentialState::AwaitingActivation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub active: bool,
    pub credential: CredentialState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub school_id: SchoolId,
    pub code: String,
    pub name: String,
    /// List price in whole currency units. Invoices do not have to match it.
    pub cost: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub course_id: CourseId,
    pub code: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherAssignment {
    pub subject_id: SubjectId,
    pub teacher_id: UserId,
    pub assigned_at: DateTime<Utc>,
}

/// Lifecycle of an enrollment. `Enrolled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Pending,
    Enrolled,
    Cancelled,
}

impl EnrollmentStatus {
    pub const fn code(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "PENDING",
            EnrollmentStatus::Enrolled => "ENROLLED",
            EnrollmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(EnrollmentStatus::Pending),
            "ENROLLED" => Some(EnrollmentStatus::Enrolled),
            "CANCELLED" => Some(EnrollmentStatus::Cancelled),
            _ => None,
        }
    }

    pub const fn can_transition_to(self, next: EnrollmentStatus) -> bool {
        matches!(
            (self, next),
            (EnrollmentStatus::Pending, EnrollmentStatus::Enrolled)
                | (EnrollmentStatus::Pending, EnrollmentStatus::Cancelled)
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub status: EnrollmentStatus,
    pub notes: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

/// Who the invoice is billed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BillingMode {
    /// The student pays for their own enrollment.
    #[serde(rename = "SELF")]
    SelfBilled,
    #[serde(rename = "THIRD_PARTY")]
    ThirdParty,
}

impl BillingMode {
    pub const fn code(self) -> &'static str {
        match self {
            BillingMode::SelfBilled => "SELF",
            BillingMode::ThirdParty => "THIRD_PARTY",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SELF" => Some(BillingMode::SelfBilled),
            "THIRD_PARTY" => Some(BillingMode::ThirdParty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThirdPartyPayer {
    pub name: String,
    pub national_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub const fn code(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(InvoiceStatus::Pending),
            "PAID" => Some(InvoiceStatus::Paid),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub number: String,
    pub enrollment_id: EnrollmentId,
    pub cashier_id: UserId,
    pub amount: u64,
    pub billing_mode: BillingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_party: Option<ThirdPartyPayer>,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: GradeId,
    pub student_id: UserId,
    pub subject_id: SubjectId,
    /// Teacher who last wrote the grade.
    pub teacher_id: UserId,
    pub score: f64,
    pub period: String,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateSubject {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub period: String,
    pub score: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub number: String,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub registrar_id: UserId,
    pub completion_date: NaiveDate,
    pub average: f64,
    pub notes: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub subjects: Vec<CertificateSubject>,
}

/// Named counters backing the human-readable document numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    Invoice,
    Certificate,
}

impl SequenceKind {
    pub const fn name(self) -> &'static str {
        match self {
            SequenceKind::Invoice => "invoice",
            SequenceKind::Certificate => "certificate",
        }
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            SequenceKind::Invoice => "FAC",
            SequenceKind::Certificate => "CERT",
        }
    }

    pub fn format(self, value: u64) -> String {
        format!("{}-{value:06}", self.prefix())
    }
}
