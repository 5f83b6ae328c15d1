//! Serve command - run the HTTP gateway.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Run the serve command until Ctrl+C.
pub fn run(options: &GlobalOptions, bind: Option<SocketAddr>) -> Result<(), CliError> {
    let mut runner = CliRunner::new(options)?;
    if let Some(bind) = bind {
        runner.config_mut().bind = bind;
    }
    runner.log_startup("serve");

    let gateway = runner.gateway()?;
    let addr = runner.config().bind;

    runner.runtime().block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::Serve(format!("cannot bind {}: {}", addr, e)))?;

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal, draining requests"),
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C, shutting down"),
            }
            signal_token.cancel();
        });

        println!("Serving on http://{}", addr);
        println!("Press Ctrl+C to stop");

        codgate::server::serve(listener, gateway, shutdown)
            .await
            .map_err(|e| CliError::Serve(e.to_string()))
    })
}
