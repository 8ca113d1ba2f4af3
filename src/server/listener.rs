use crate::config::Config;
use crate::http::connection::Connection;
use crate::server::ServerContext;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Bind the configured address and serve until the process exits.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let ctx = Arc::new(ServerContext::from_config(cfg)?);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(rules = ctx.rules.len(), "Listening on {}", cfg.listen_addr);

    serve(listener, ctx).await
}

/// Accept loop over an already-bound listener.
///
/// Split out from [`run`] so tests can bind an ephemeral port themselves.
/// Each connection gets its own task; a failed connection never affects
/// the others or the loop.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, ctx);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
