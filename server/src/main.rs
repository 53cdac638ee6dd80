use std::process::ExitCode;
use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use gate_ticketing::config::Config;
use gate_ticketing::routes::create_routes;
use gate_ticketing::services::{FsImageSink, PaymentGateway};
use gate_ticketing::state::AppState;
use gate_ticketing::store::PgStore;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Migrations run successfully");

    let store = Arc::new(PgStore::new(pool));
    let images = Arc::new(FsImageSink::new(
        &config.ticket_image_dir,
        config.ticket_image_base_url.clone(),
    ));
    let state = AppState::new(store, images, PaymentGateway::new(config.payment.clone()));

    let app = create_routes(state, config.request_timeout);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
