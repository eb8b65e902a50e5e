use clap::Parser;
use plantscan::db::ensure_schema;
use plantscan::db::services::user_service;
use plantscan::detection::frame::MjpegFrameSource;
use plantscan::detection::{DetectionOverlay, DetectorHandle};
use plantscan::device::{DeviceApi, DeviceClient};
use plantscan::server::config::ServerConfig;
use plantscan::services::media_store::MediaStore;
use plantscan::version::VERSION;
use plantscan::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Give an existing user admin rights, then exit
    #[arg(long, value_name = "USERNAME")]
    grant_admin: Option<String>,
}

fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "server.log"));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&server_config.log_dir);
    info!(version = VERSION, "Starting server.");

    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;
    info!("Database schema ready.");

    if let Some(username) = args.grant_admin.as_deref() {
        return match user_service::set_admin(&db, username, true).await? {
            Some(user) => {
                info!(user_id = user.id, username = %user.username, "Granted admin rights.");
                Ok(())
            }
            None => Err(format!("No user named '{username}'").into()),
        };
    }

    let device = Arc::new(DeviceClient::new(
        &server_config.device_base_url,
        Duration::from_secs(server_config.device_timeout_secs),
    ));
    info!(base_url = %device.base_url(), "Device client configured.");

    let detector = DetectorHandle::load(server_config.detector_model_path.as_deref());
    if !detector.is_ready() {
        warn!("Leaf detector unavailable, detection endpoints will report 503.");
    }
    let frames = Arc::new(MjpegFrameSource::new(device.stream_url()));
    let detection = Arc::new(DetectionOverlay::new(detector, frames));

    let media = MediaStore::new(&server_config.media_dir);
    info!(root = %media.root().display(), "Media store ready.");

    let app_state = Arc::new(AppState {
        db,
        device,
        detection,
        media,
        config: server_config.clone(),
    });
    let app_router = create_axum_router(app_state);

    let listener = tokio::net::TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, "HTTP server listening.");
    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}
