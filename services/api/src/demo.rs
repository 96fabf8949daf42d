use crate::infra::format_amount;
use crate::reports::render_revenue;
use campus_ops::catalog::{standard_seed, STANDARD_STAFF};
use campus_ops::error::AppError;
use campus_ops::storage::InMemoryCampusRepository;
use campus_ops::workflows::{
    BillingMode, Caller, CampusService, CertificateRequest, CourseQuery, EnrollmentRequest,
    GradeRequest, InvoiceRequest, RevenueQuery, Role, UserQuery, WorkflowError,
};
use chrono::Utc;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of students to walk through the workflow
    #[arg(long, default_value_t = 3)]
    pub(crate) students: usize,
    /// Skip certification and stop after grading
    #[arg(long)]
    pub(crate) skip_certificates: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            students: 3,
            skip_certificates: false,
        }
    }
}

const DEMO_SCORES: [f64; 4] = [92.0, 78.5, 64.0, 55.0];

fn staff(service: &CampusService<InMemoryCampusRepository>, role: Role) -> Result<Caller, AppError> {
    let directory = Caller::new("demo", Role::Administrator);
    let user = service
        .users(&directory, UserQuery { role: Some(role) })?
        .into_iter()
        .next();
    match user {
        Some(user) => Ok(Caller::new(user.id.0, role)),
        None => Err(WorkflowError::NotFound {
            entity: "user",
            id: role.code().to_string(),
        }
        .into()),
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let repository = Arc::new(InMemoryCampusRepository::default());
    let seeded = standard_seed(repository.as_ref(), Utc::now())?;
    let service = CampusService::new(repository);

    println!("Campus operations demo");
    println!(
        "  seeded {} account(s), {} course(s), {} subject(s)",
        seeded.users, seeded.courses, seeded.subjects
    );
    for account in &STANDARD_STAFF {
        println!("  {:<18} {}", account.role.label(), account.email);
    }

    let clerk = staff(&service, Role::EnrollmentClerk)?;
    let cashier = staff(&service, Role::Cashier)?;
    let teacher = staff(&service, Role::Teacher)?;
    let registrar = staff(&service, Role::Registrar)?;

    let course = match service.courses(CourseQuery::default())?.into_iter().next() {
        Some(course) => course,
        None => return Ok(()),
    };
    let subjects = service.assigned_subjects(&teacher)?;

    println!("\nCourse {} ({}) at {}", course.name, course.code, course.school.name);

    for index in 0..args.students {
        let receipt = service.register_enrollment(
            &clerk,
            EnrollmentRequest {
                first_name: format!("Alumno {}", index + 1),
                last_name: "Demo".to_string(),
                email: format!("alumno{}@demo.local", index + 1),
                course_id: course.id.to_string(),
                ..EnrollmentRequest::default()
            },
        )?;
        let student = receipt.detail.student.id.clone();
        println!(
            "\n{} {} enrolled ({})",
            receipt.detail.student.first_name,
            receipt.detail.student.last_name,
            receipt.detail.enrollment.status
        );

        let third_party = index % 2 == 1;
        let invoice = service.issue_invoice(
            &cashier,
            InvoiceRequest {
                enrollment_id: receipt.detail.enrollment.id.to_string(),
                amount: i64::try_from(course.cost).unwrap_or(i64::MAX),
                billing_mode: if third_party {
                    BillingMode::ThirdParty
                } else {
                    BillingMode::SelfBilled
                },
                third_party_name: third_party.then(|| "Cooperativa Demo".to_string()),
                third_party_national_id: third_party.then(|| "80099887".to_string()),
                third_party_address: third_party.then(|| "Avenida Central 100".to_string()),
                notes: None,
            },
        )?;
        println!(
            "  invoice {} for {} ({}), enrollment now {}",
            invoice.invoice.number,
            format_amount(invoice.invoice.amount),
            invoice.invoice.billing_mode.code(),
            invoice.enrollment_status
        );

        for subject in &subjects {
            let score = DEMO_SCORES[index % DEMO_SCORES.len()];
            let grade = service.record_grade(
                &teacher,
                GradeRequest {
                    student_id: student.to_string(),
                    subject_id: subject.subject.id.to_string(),
                    score,
                    period: "2025-1".to_string(),
                    notes: None,
                },
            )?;
            println!("  {} graded {:.1}", grade.subject.name, grade.grade.score);
        }

        if args.skip_certificates {
            continue;
        }
        let certificate = service.issue_certificate(
            &registrar,
            CertificateRequest {
                student_id: student.to_string(),
                course_id: course.id.to_string(),
                completion_date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
                notes: None,
            },
        )?;
        let passed = certificate
            .certificate
            .subjects
            .iter()
            .filter(|subject| subject.passed)
            .count();
        println!(
            "  certificate {} average {:.2} ({}/{} subjects passed)",
            certificate.certificate.number,
            certificate.certificate.average,
            passed,
            certificate.certificate.subjects.len()
        );
    }

    println!();
    let statistics = service.revenue(&registrar, RevenueQuery::default())?;
    render_revenue(&statistics);
    Ok(())
}
