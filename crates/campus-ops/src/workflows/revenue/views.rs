use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{BillingMode, InvoiceId};

/// Revenue aggregate. Field names on the wire are the ones consumed by the PDF and spreadsheet
/// exporters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueStatistics {
    #[serde(rename = "totalIngresos")]
    pub total_revenue: u64,
    #[serde(rename = "totalFacturas")]
    pub invoice_count: usize,
    /// Keyed by school name.
    #[serde(rename = "ingresosPorEscuela")]
    pub by_school: BTreeMap<String, u64>,
    /// Keyed by course name.
    #[serde(rename = "ingresosPorCurso")]
    pub by_course: BTreeMap<String, u64>,
    /// Keyed by billing mode code (`SELF`, `THIRD_PARTY`).
    #[serde(rename = "ingresosPorTipo")]
    pub by_billing_mode: BTreeMap<String, u64>,
    /// Keyed by payment day, `YYYY-MM-DD`.
    #[serde(rename = "ingresosPorFecha")]
    pub by_day: BTreeMap<String, u64>,
    #[serde(rename = "facturas")]
    pub invoices: Vec<RevenueLine>,
}

/// One paid invoice, flattened for tabular export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueLine {
    pub id: InvoiceId,
    #[serde(rename = "numero")]
    pub number: String,
    #[serde(rename = "monto")]
    pub amount: u64,
    #[serde(rename = "fechaPago")]
    pub paid_at: DateTime<Utc>,
    #[serde(rename = "tipoFacturacion")]
    pub billing_mode: BillingMode,
    #[serde(rename = "escuela")]
    pub school: String,
    #[serde(rename = "curso")]
    pub course: String,
}
