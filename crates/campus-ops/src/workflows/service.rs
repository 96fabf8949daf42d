use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::access::{AccessGate, Caller, Capability};
use super::billing::InvoiceRequest;
use super::certification::CertificateRequest;
use super::directory::{
    self, AssignedSubject, CertificateDetail, CertificateQuery, CourseQuery, CourseSummary,
    EnrollmentDetail, EnrollmentQuery, GradeDetail, GradeQuery, InvoiceDetail, InvoiceQuery,
    RosterEntry, SchoolSummary, UserQuery, UserSummary,
};
use super::domain::{EnrollmentId, SubjectId};
use super::enrollment::{EnrollmentReceipt, EnrollmentRequest};
use super::grading::GradeRequest;
use super::revenue::{RevenueQuery, RevenueStatistics};
use super::{billing, certification, enrollment, grading, revenue, WorkflowError};
use crate::storage::CampusRepository;

/// Source of "now" for every timestamp the workflows write.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Service composing the access gate, the workflows and a repository.
pub struct CampusService<R> {
    repository: Arc<R>,
    gate: AccessGate,
    clock: Arc<dyn Clock>,
}

impl<R> CampusService<R>
where
    R: CampusRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            gate: AccessGate::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_gate(mut self, gate: AccessGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Register a student (provisioning the account if needed) in a course as PENDING.
    pub fn register_enrollment(
        &self,
        caller: &Caller,
        request: EnrollmentRequest,
    ) -> Result<EnrollmentReceipt, WorkflowError> {
        self.gate.authorize(caller, Capability::RegisterEnrollment)?;
        let request = request.validate()?;
        let now = self.clock.now();

        let receipt = self
            .repository
            .transaction(|store| enrollment::register(store, &request, now))?;

        info!(
            enrollment_id = %receipt.detail.enrollment.id,
            course_id = %request.course_id,
            provisioned = receipt.provisioned,
            clerk_id = %caller.user_id,
            "enrollment registered"
        );
        Ok(receipt)
    }

    pub fn cancel_enrollment(
        &self,
        caller: &Caller,
        id: &EnrollmentId,
    ) -> Result<EnrollmentDetail, WorkflowError> {
        self.gate.authorize(caller, Capability::CancelEnrollment)?;
        let detail = self
            .repository
            .transaction(|store| enrollment::cancel(store, id))?;
        info!(enrollment_id = %id, user_id = %caller.user_id, "enrollment cancelled");
        Ok(detail)
    }

    pub fn enrollments(
        &self,
        caller: &Caller,
        query: EnrollmentQuery,
    ) -> Result<Vec<EnrollmentDetail>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewEnrollments)?;
        self.repository
            .transaction(|store| directory::enrollments(store, caller, query))
    }

    pub fn enrollment(
        &self,
        caller: &Caller,
        id: &EnrollmentId,
    ) -> Result<EnrollmentDetail, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewEnrollments)?;
        self.repository
            .transaction(|store| directory::enrollment(store, caller, id))
    }

    /// Issue a paid invoice for an enrollment; the enrollment becomes ENROLLED.
    pub fn issue_invoice(
        &self,
        caller: &Caller,
        request: InvoiceRequest,
    ) -> Result<InvoiceDetail, WorkflowError> {
        self.gate.authorize(caller, Capability::IssueInvoice)?;
        let request = request.validate()?;
        let now = self.clock.now();

        let detail = self
            .repository
            .transaction(|store| billing::issue(store, caller, &request, now))?;

        info!(
            invoice = %detail.invoice.number,
            enrollment_id = %request.enrollment_id,
            amount = detail.invoice.amount,
            billing_mode = detail.invoice.billing_mode.code(),
            cashier_id = %caller.user_id,
            "invoice issued"
        );
        Ok(detail)
    }

    pub fn invoices(
        &self,
        caller: &Caller,
        query: InvoiceQuery,
    ) -> Result<Vec<InvoiceDetail>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewInvoices)?;
        self.repository
            .transaction(|store| directory::invoices(store, caller, query))
    }

    /// Upsert a grade for (student, subject, period).
    pub fn record_grade(
        &self,
        caller: &Caller,
        request: GradeRequest,
    ) -> Result<GradeDetail, WorkflowError> {
        self.gate.authorize(caller, Capability::RecordGrade)?;
        let request = request.validate()?;
        let now = self.clock.now();

        let detail = self
            .repository
            .transaction(|store| grading::record(store, caller, &request, now))?;

        info!(
            grade_id = %detail.grade.id,
            student_id = %request.student_id,
            subject_id = %request.subject_id,
            period = %request.period,
            teacher_id = %caller.user_id,
            "grade recorded"
        );
        Ok(detail)
    }

    pub fn grades(
        &self,
        caller: &Caller,
        query: GradeQuery,
    ) -> Result<Vec<GradeDetail>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewGrades)?;
        self.repository
            .transaction(|store| directory::grades(store, caller, query))
    }

    /// Certify course completion for an ENROLLED student with at least one grade.
    pub fn issue_certificate(
        &self,
        caller: &Caller,
        request: CertificateRequest,
    ) -> Result<CertificateDetail, WorkflowError> {
        self.gate.authorize(caller, Capability::IssueCertificate)?;
        let request = request.validate()?;
        let now = self.clock.now();

        let detail = self
            .repository
            .transaction(|store| certification::issue(store, caller, &request, now))?;

        info!(
            certificate = %detail.certificate.number,
            student_id = %request.student_id,
            course_id = %request.course_id,
            average = detail.certificate.average,
            registrar_id = %caller.user_id,
            "certificate issued"
        );
        Ok(detail)
    }

    pub fn certificates(
        &self,
        caller: &Caller,
        query: CertificateQuery,
    ) -> Result<Vec<CertificateDetail>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewCertificates)?;
        self.repository
            .transaction(|store| directory::certificates(store, caller, query))
    }

    /// Revenue statistics, read from a single point-in-time snapshot.
    pub fn revenue(
        &self,
        caller: &Caller,
        query: RevenueQuery,
    ) -> Result<RevenueStatistics, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewRevenue)?;
        let filter = query.validate()?;
        let statistics = self
            .repository
            .transaction(|store| revenue::compute(store, &filter).map_err(WorkflowError::from))?;
        info!(
            invoices = statistics.invoice_count,
            total = statistics.total_revenue,
            "revenue statistics computed"
        );
        Ok(statistics)
    }

    /// Active schools. Catalog reads need no session.
    pub fn schools(&self) -> Result<Vec<SchoolSummary>, WorkflowError> {
        self.repository.transaction(|store| directory::schools(store))
    }

    pub fn courses(&self, query: CourseQuery) -> Result<Vec<CourseSummary>, WorkflowError> {
        self.repository
            .transaction(|store| directory::courses(store, query))
    }

    pub fn users(
        &self,
        caller: &Caller,
        query: UserQuery,
    ) -> Result<Vec<UserSummary>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewDirectory)?;
        self.repository
            .transaction(|store| directory::users(store, query))
    }

    pub fn assigned_subjects(&self, caller: &Caller) -> Result<Vec<AssignedSubject>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewTeachingLoad)?;
        self.repository
            .transaction(|store| directory::assigned_subjects(store, caller))
    }

    pub fn subject_roster(
        &self,
        caller: &Caller,
        subject_id: &SubjectId,
    ) -> Result<Vec<RosterEntry>, WorkflowError> {
        self.gate.authorize(caller, Capability::ViewTeachingLoad)?;
        self.repository
            .transaction(|store| directory::subject_roster(store, caller, subject_id))
    }
}
