use crate::cli::ServeArgs;
use crate::infra::{open_repository, seed, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use campus_ops::config::AppConfig;
use campus_ops::error::AppError;
use campus_ops::telemetry;
use campus_ops::workflows::CampusService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.database.take() {
        config.database.path = path;
    }
    if args.no_seed {
        config.database.seed_on_start = false;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = open_repository(&config.database.path)?;
    if config.database.seed_on_start {
        seed(&repository)?;
    }
    let service = Arc::new(CampusService::new(repository));

    let app = with_service_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        environment = config.environment.label(),
        %addr,
        "campus operations service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
