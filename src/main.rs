use anyhow::Result;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use roadmap_planner::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    database::Database,
    log_system_event,
    roadmap_generator::{RetryPolicy, RoadmapGenerator},
    roadmap_service::RoadmapService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting Roadmap Planner server");

    // Initialize database
    let db = Database::new(&config.database.url).await?;
    info!("Database initialized successfully");

    let retry_policy = RetryPolicy {
        max_retries: config.llm.max_retries,
        timeout: Duration::from_secs(config.llm.timeout_secs),
        ..RetryPolicy::default()
    };
    let generator = RoadmapGenerator::new_with_provider(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.provider,
        config.llm.model.clone(),
    )
    .with_retry_policy(retry_policy);

    info!(
        provider = generator.provider_name(),
        model = generator.model_name(),
        "Initialized roadmap generator"
    );

    let roadmap_service =
        RoadmapService::new(db, generator).with_hours_per_week(config.timeline.hours_per_week);
    let state = AppState { roadmap_service };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,roadmap_planner=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed()
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Daily rotation, no ANSI colors in files
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "roadmap-planner.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        directory = %config.log_directory,
        file_enabled = config.file_enabled,
        console_enabled = config.console_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
