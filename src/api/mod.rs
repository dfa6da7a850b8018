pub mod routes;

use crate::config::Config;
use crate::db::Database;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Loopback only: the API trusts whatever `user` the caller names.
pub fn local_address(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Serves the JSON API until `shutdown` resolves, then drains in-flight requests.
pub async fn serve_until<F>(config: Arc<Config>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    // Handlers open their own connection per request; a broken store should fail startup.
    Database::open(&config.db_path)
        .with_context(|| format!("MindTrack database unusable: {}", config.db_path.display()))?;

    let listener = TcpListener::bind(local_address(config.api_port))
        .await
        .with_context(|| format!("Failed to bind MindTrack API on port {}", config.api_port))?;
    let bound = listener.local_addr()?;
    let app = routes::router(routes::ApiState { config });

    info!(address = %bound, "MindTrack API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("MindTrack API stopped with an error")?;
    info!("MindTrack API stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::serve_until;
    use crate::config::Config;
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_cleanly_when_shutdown_fires() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("mindtrack.db"),
            api_port: 0,
            ..Config::default()
        };

        serve_until(Arc::new(config), std::future::ready(()))
            .await
            .unwrap();
        assert!(dir.path().join("mindtrack.db").exists());
    }

    #[tokio::test]
    async fn unusable_database_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().to_path_buf(),
            api_port: 0,
            ..Config::default()
        };

        assert!(serve_until(Arc::new(config), std::future::ready(())).await.is_err());
    }
}
