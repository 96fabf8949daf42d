use crate::infra::{format_amount, open_repository, parse_billing_mode, parse_date, seed};
use campus_ops::catalog::CatalogImporter;
use campus_ops::config::AppConfig;
use campus_ops::error::AppError;
use campus_ops::workflows::{
    BillingMode, Caller, CampusService, RevenueQuery, RevenueStatistics, Role,
};
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct SeedArgs {
    /// SQLite database path (defaults to APP_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Catalog CSV with school, course and subject rows to merge after the seed
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RevenueArgs {
    /// SQLite database path (defaults to APP_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// First payment day included (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: Option<String>,
    /// Last payment day included (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) to: Option<String>,
    #[arg(long)]
    pub(crate) school_id: Option<String>,
    #[arg(long)]
    pub(crate) course_id: Option<String>,
    /// SELF or THIRD_PARTY
    #[arg(long, value_parser = parse_billing_mode)]
    pub(crate) billing_mode: Option<BillingMode>,
    /// Print the statistics as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

fn database_path(explicit: Option<PathBuf>) -> Result<PathBuf, AppError> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(AppConfig::load()?.database.path),
    }
}

pub(crate) fn run_seed(args: SeedArgs) -> Result<(), AppError> {
    let path = database_path(args.database)?;
    let repository = open_repository(&path)?;

    let report = seed(&repository)?;
    println!("Seeded {}", path.display());
    println!(
        "  users {} | schools {} | courses {} | subjects {} | assignments {}",
        report.users, report.schools, report.courses, report.subjects, report.assignments
    );

    if let Some(catalog) = args.catalog {
        let imported = CatalogImporter::from_path(repository.as_ref(), &catalog, Utc::now())?;
        println!("Imported {}", catalog.display());
        println!(
            "  schools {} | courses {} | subjects {} | assignments {}",
            imported.schools, imported.courses, imported.subjects, imported.assignments
        );
    }
    Ok(())
}

pub(crate) fn run_revenue_report(args: RevenueArgs) -> Result<(), AppError> {
    let path = database_path(args.database)?;
    let service = CampusService::new(open_repository(&path)?);
    let operator = Caller::new("cli", Role::Administrator);

    let statistics = service.revenue(
        &operator,
        RevenueQuery {
            from: args.from,
            to: args.to,
            school_id: args.school_id,
            course_id: args.course_id,
            billing_mode: args.billing_mode,
        },
    )?;

    if args.json {
        match serde_json::to_string_pretty(&statistics) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("failed to render statistics as JSON: {err}"),
        }
    } else {
        render_revenue(&statistics);
    }
    Ok(())
}

pub(crate) fn render_revenue(statistics: &RevenueStatistics) {
    println!("Revenue");
    println!(
        "  Total: {} across {} invoice(s)",
        format_amount(statistics.total_revenue),
        statistics.invoice_count
    );
    if statistics.invoice_count == 0 {
        println!("  No paid invoices in range.");
        return;
    }

    for (title, bucket) in [
        ("By school", &statistics.by_school),
        ("By course", &statistics.by_course),
        ("By billing mode", &statistics.by_billing_mode),
        ("By day", &statistics.by_day),
    ] {
        println!("\n{title}");
        for (key, amount) in bucket {
            println!("  {key:<28} {:>14}", format_amount(*amount));
        }
    }

    println!("\nInvoices");
    for line in &statistics.invoices {
        println!(
            "  {} | {} | {} | {} | {}",
            line.number,
            line.paid_at.format("%Y-%m-%d %H:%M"),
            line.billing_mode.code(),
            line.course,
            format_amount(line.amount)
        );
    }
}
