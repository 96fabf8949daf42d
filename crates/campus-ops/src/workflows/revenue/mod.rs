//! Revenue statistics over paid invoices.
//!
//! Date range and billing mode are pushed into the store query; school and course filters are
//! applied to the joined rows afterwards.

mod views;

use serde::{Deserialize, Serialize};

use super::domain::{BillingMode, CourseId, SchoolId};
use super::validation::{self, ValidationError};
use crate::storage::{CampusStore, PaymentWindow, RepositoryError, RevenueRow};

pub use views::{RevenueLine, RevenueStatistics};

/// Optional filters, all as received from the query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevenueQuery {
    /// First payment day included, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Last payment day included, `YYYY-MM-DD`.
    pub to: Option<String>,
    pub school_id: Option<String>,
    pub course_id: Option<String>,
    pub billing_mode: Option<BillingMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RevenueFilter {
    window: PaymentWindow,
    school_id: Option<SchoolId>,
    course_id: Option<CourseId>,
}

impl RevenueQuery {
    /// An inverted range is not an error; it simply matches nothing.
    pub(crate) fn validate(self) -> Result<RevenueFilter, ValidationError> {
        let day = |raw: Option<String>| {
            validation::optional(raw)
                .map(|value| validation::date(&value))
                .transpose()
        };

        Ok(RevenueFilter {
            window: PaymentWindow {
                paid_from: day(self.from)?,
                paid_to: day(self.to)?,
                billing_mode: self.billing_mode,
            },
            school_id: validation::optional(self.school_id).map(SchoolId),
            course_id: validation::optional(self.course_id).map(CourseId),
        })
    }
}

impl RevenueFilter {
    fn admits(&self, row: &RevenueRow) -> bool {
        self.school_id.as_ref().map_or(true, |id| &row.school_id == id)
            && self.course_id.as_ref().map_or(true, |id| &row.course_id == id)
    }
}

impl RevenueStatistics {
    fn record(&mut self, row: RevenueRow) {
        let amount = row.invoice.amount;
        self.total_revenue = self.total_revenue.saturating_add(amount);
        self.invoice_count += 1;

        for (bucket, key) in [
            (&mut self.by_school, row.school_name.clone()),
            (&mut self.by_course, row.course_name.clone()),
            (
                &mut self.by_billing_mode,
                row.invoice.billing_mode.code().to_string(),
            ),
            (
                &mut self.by_day,
                row.paid_at.date_naive().format("%Y-%m-%d").to_string(),
            ),
        ] {
            let total = bucket.entry(key).or_insert(0);
            *total = total.saturating_add(amount);
        }

        self.invoices.push(RevenueLine {
            id: row.invoice.id,
            number: row.invoice.number,
            amount,
            paid_at: row.paid_at,
            billing_mode: row.invoice.billing_mode,
            school: row.school_name,
            course: row.course_name,
        });
    }
}

/// Aggregates the paid invoices visible to `store` at this point in time.
pub(crate) fn compute(
    store: &dyn CampusStore,
    filter: &RevenueFilter,
) -> Result<RevenueStatistics, RepositoryError> {
    let mut statistics = RevenueStatistics::default();
    for row in store.paid_invoices(&filter.window)? {
        if filter.admits(&row) {
            statistics.record(row);
        }
    }
    Ok(statistics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::domain::{Invoice, InvoiceStatus};
    use chrono::{TimeZone, Utc};

    fn row(number: u64, amount: u64, school: &str, course: &str, day: u32) -> RevenueRow {
        let paid_at = Utc.with_ymd_and_hms(2025, 4, day, 10, 30, 0).unwrap();
        RevenueRow {
            invoice: Invoice {
                id: format!("inv-{number}").as_str().into(),
                number: format!("FAC-{number:06}"),
                enrollment_id: format!("enr-{number}").as_str().into(),
                cashier_id: "cashier".into(),
                amount,
                billing_mode: BillingMode::SelfBilled,
                third_party: None,
                status: InvoiceStatus::Paid,
                issued_at: paid_at,
                paid_at: Some(paid_at),
                notes: None,
            },
            paid_at,
            course_id: CourseId(format!("{course}-id")),
            course_name: course.to_string(),
            school_id: SchoolId(format!("{school}-id")),
            school_name: school.to_string(),
        }
    }

    #[test]
    fn record_accumulates_every_bucket() {
        let mut statistics = RevenueStatistics::default();
        statistics.record(row(1, 100, "Norte", "Soldadura", 1));
        statistics.record(row(2, 200, "Norte", "Electricidad", 1));
        statistics.record(row(3, 300, "Sur", "Electricidad", 2));

        assert_eq!(statistics.total_revenue, 600);
        assert_eq!(statistics.invoice_count, 3);
        assert_eq!(statistics.by_school.values().sum::<u64>(), 600);
        assert_eq!(statistics.by_school.get("Norte"), Some(&300));
        assert_eq!(statistics.by_course.get("Electricidad"), Some(&500));
        assert_eq!(statistics.by_billing_mode.get("SELF"), Some(&600));
        assert_eq!(statistics.by_day.get("2025-04-01"), Some(&300));
        assert_eq!(statistics.invoices.len(), 3);
    }

    #[test]
    fn school_and_course_filters_apply_to_joined_rows() {
        let filter = RevenueQuery {
            school_id: Some("Sur-id".to_string()),
            ..RevenueQuery::default()
        }
        .validate()
        .expect("valid");

        assert!(filter.admits(&row(1, 100, "Sur", "Soldadura", 1)));
        assert!(!filter.admits(&row(2, 100, "Norte", "Soldadura", 1)));
    }

    #[test]
    fn blank_and_malformed_dates() {
        let blank = RevenueQuery {
            from: Some(String::new()),
            ..RevenueQuery::default()
        }
        .validate()
        .expect("blank is ignored");
        assert_eq!(blank.window.paid_from, None);

        let malformed = RevenueQuery {
            to: Some("April".to_string()),
            ..RevenueQuery::default()
        };
        assert!(matches!(
            malformed.validate(),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn wire_keys_match_export_consumers() {
        let mut statistics = RevenueStatistics::default();
        statistics.record(row(7, 250, "Norte", "Soldadura", 3));
        let payload = serde_json::to_value(&statistics).expect("serialize");

        assert_eq!(payload["totalIngresos"], 250);
        assert_eq!(payload["totalFacturas"], 1);
        assert_eq!(payload["ingresosPorEscuela"]["Norte"], 250);
        assert_eq!(payload["ingresosPorTipo"]["SELF"], 250);
        assert_eq!(payload["facturas"][0]["numero"], "FAC-000007");
        assert_eq!(payload["facturas"][0]["tipoFacturacion"], "SELF");
        assert_eq!(payload["facturas"][0]["escuela"], "Norte");
    }
}
