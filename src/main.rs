mod api;
mod config;
mod error;
mod quiz;
mod store;

use std::sync::Arc;

use config::Config;
use quiz::QuizServer;
use store::{QuizStore, SqliteStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn QuizStore> = match SqliteStore::connect(&config.database.path).await {
        Ok(store) => Arc::new(store),
        Err(error) => {
            tracing::error!(
                path = %config.database.path,
                error = %error,
                "Failed to open database"
            );
            std::process::exit(1);
        }
    };

    let server = QuizServer::new(store.clone());
    let routes = api::routes::routes(server, store);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "quiz-server listening"
    );
    warp::serve(routes).run(config.bind_address()).await;
}
