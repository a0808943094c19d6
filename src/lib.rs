pub mod agent_cache;
pub mod commands;
pub mod config;
pub mod pipeline;
pub mod session;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    tauri::Builder::default()
        .manage(Arc::new(session::SessionState::new()))
        .invoke_handler(tauri::generate_handler![
            commands::health_check,
            commands::set_api_key,
            commands::reset_api_key,
            commands::get_session_status,
            commands::upload_image,
            commands::analyze_image,
        ])
        .run(tauri::generate_context!())
        .expect("error while running RadioLens");
}
