//! Serves the greet, calculator and blog services over HTTP/1.1 and h2c.
//!
//! Configuration comes from the environment, see [`AppConfig`].

use std::sync::Arc;

use callwire::MakeServiceBuilder;
use callwire_services::AppConfig;
use callwire_services::blog::MemoryStore;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let store = Arc::new(MemoryStore::new());
    let router = MakeServiceBuilder::new()
        .add_routers(callwire_services::routers(&config, store))
        .config(config.server_config())
        .build();

    let addr = config.addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "callwire server listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            signal = &mut shutdown => {
                signal?;
                tracing::info!("shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(router.clone());

        tokio::spawn(async move {
            if let Err(err) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}
