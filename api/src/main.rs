use std::net::SocketAddr;

use api::routes::routes;
use axum::Router;
use migration::{Migrator, MigratorTrait};
use tower_http::cors::CorsLayer;
use tracing_appender::rolling;
use util::{config::AppConfig, notify::Notifier, state::AppState};

#[tokio::main]
async fn main() {
    // Load configuration and initialize logging
    let (log_file, log_to_stdout, host, port, project_name) = {
        let cfg = AppConfig::global();
        (
            cfg.log_file.clone(),
            cfg.log_to_stdout,
            cfg.host.clone(),
            cfg.port,
            cfg.project_name.clone(),
        )
    };
    let _log_guard = init_logging(&log_file, log_to_stdout);

    // Set up dependencies
    let db = db::connect().await;
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    let app_state = AppState::new(db, Notifier::new());

    // Build app router
    let cors = CorsLayer::very_permissive();
    let app = Router::new()
        .nest("/api", routes(app_state))
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{host}:{port}").parse().expect("Invalid address");

    println!("Starting {project_name} on http://{host}:{port}");

    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        // ConnectInfo feeds the network trust assessor the peer address
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server crashed");
}

fn init_logging(log_file: &str, log_to_stdout: bool) -> tracing_appender::non_blocking::WorkerGuard {
    use std::fs;
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    fs::create_dir_all("logs").ok();

    let file_appender = rolling::daily("logs", log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(true);

    let env_filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("api=info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if log_to_stdout {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
