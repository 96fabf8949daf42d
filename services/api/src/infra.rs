use campus_ops::catalog::{standard_seed, SeedReport};
use campus_ops::error::AppError;
use campus_ops::storage::SqliteCampusRepository;
use campus_ops::workflows::BillingMode;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn open_repository(path: &Path) -> Result<Arc<SqliteCampusRepository>, AppError> {
    let repository = SqliteCampusRepository::open(path)?;
    info!(database = %path.display(), "database opened");
    Ok(Arc::new(repository))
}

pub(crate) fn seed(repository: &SqliteCampusRepository) -> Result<SeedReport, AppError> {
    let report = standard_seed(repository, Utc::now())?;
    info!(
        users = report.users,
        schools = report.schools,
        courses = report.courses,
        subjects = report.subjects,
        assignments = report.assignments,
        "standard seed applied"
    );
    Ok(report)
}

pub(crate) fn parse_date(raw: &str) -> Result<String, String> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|_| raw.trim().to_string())
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_billing_mode(raw: &str) -> Result<BillingMode, String> {
    let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
    BillingMode::parse(&normalized)
        .ok_or_else(|| format!("unknown billing mode '{raw}' (expected SELF or THIRD_PARTY)"))
}

/// `1234567` -> `1.234.567`, the way amounts appear on printed receipts.
pub(crate) fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    grouped
}
