use campeiro::{
    api::{build_router, start_api_server},
    observability::{init_observability, log_config_info},
    startup::build_sqlite_state,
    storage::create_pool,
    Config, Result, APP_NAME, VERSION,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = Config::from_env()?;
    init_observability(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting Campeiro API");
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    let server_config = config.server.clone();
    let state = build_sqlite_state(config, pool.clone());
    let recorder = state.recorder.clone();

    start_api_server(&server_config, build_router(state)).await?;

    info!("Flushing pending audit entries");
    recorder.flush().await;
    pool.close().await;

    Ok(())
}
