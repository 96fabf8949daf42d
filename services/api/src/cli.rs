use crate::demo::{run_demo, DemoArgs};
use crate::reports::{run_revenue_report, run_seed, RevenueArgs, SeedArgs};
use crate::server;
use campus_ops::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Campus Operations",
    about = "Run and administer the vocational-school back office from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Apply the standard seed and optionally import a catalog CSV
    Seed(SeedArgs),
    /// Print revenue statistics for paid invoices
    Revenue(RevenueArgs),
    /// Walk a student from enrollment to certificate against an in-memory store
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Skip the standard seed even if APP_SEED_ON_START is set
    #[arg(long)]
    pub(crate) no_seed: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Seed(args) => run_seed(args),
        Command::Revenue(args) => run_revenue_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
