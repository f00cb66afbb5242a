use crate::cli::ServeArgs;
use crate::infra::{bootstrap_tenant, platform_service, AppState, DirectoryUploader};
use crate::routes::with_platform_routes;
use alternance::config::{AppConfig, AppEnvironment};
use alternance::error::AppError;
use alternance::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    if config.workflow.cron_secret.is_none() {
        warn!("ALT_CRON_SECRET unset: cron endpoints answer 503");
    }
    let service = platform_service(config.workflow.clone());

    // the store is in-memory, so a development instance starts with one usable tenant
    if config.environment == AppEnvironment::Development || args.bootstrap {
        let bootstrap = bootstrap_tenant(&service, &args.bootstrap_slug)?;
        info!(
            tenant_id = %bootstrap.tenant.id,
            slug = %bootstrap.tenant.slug,
            admin_key = %bootstrap.admin_key,
            "bootstrap tenant ready"
        );
    }

    let uploader = Arc::new(DirectoryUploader::new(args.archive_dir.clone()));
    let app = with_platform_routes(service, uploader)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(environment = ?config.environment, %addr, archive_dir = %args.archive_dir.display(), "alternance api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
