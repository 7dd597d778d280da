use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryDivisionRepository, LoggingNotifier};
use crate::routes::with_division_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use block_division::config::AppConfig;
use block_division::division::DivisionService;
use block_division::error::AppError;
use block_division::telemetry;
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryDivisionRepository::default());
    let notifier = Arc::new(LoggingNotifier::default());
    let division_service = Arc::new(DivisionService::new(
        repository,
        notifier,
        config.division.default_policy,
    ));
    let policy = division_service.default_policy();

    let app = with_division_routes(division_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        exclusive_across_rounds = policy.exclusive_across_rounds,
        carry_over_claims = policy.carry_over_claims,
        "block division service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
