use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::client::{ClientRegistry, handle_client};
use crate::config::DepotConfig;
use crate::protocol::responses::{READY, TOO_MANY_CLIENTS, format_response};
use crate::server::AppState;

pub struct Server {
    client_registry: Arc<ClientRegistry>,
    listener: TcpListener,
    state: Arc<AppState>,
    staging_max_age: Duration,
    staging_sweep_interval: Duration,
}

impl Server {
    /// Prepares the base directory, bootstraps secrets and binds the listener.
    pub async fn new(config: DepotConfig) -> io::Result<Self> {
        let (startup, runtime, tenants) = config.split();
        let socket = startup.listen_socket();

        let state = AppState::new(&startup, runtime, tenants)?;

        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => {
                info!("Server bound to {}", socket);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e);
            }
        };

        Ok(Self {
            client_registry: Arc::new(ClientRegistry::new()),
            listener,
            state: Arc::new(state),
            staging_max_age: startup.staging_max_age(),
            staging_sweep_interval: startup.staging_sweep_interval(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Runs the accept loop forever.
    pub async fn start(&self) {
        let max_clients = self.state.runtime.read().await.max_clients;
        info!(
            "Starting depot server on {} (max {} clients)",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown address".into()),
            max_clients
        );

        spawn_staging_sweeper(
            Arc::clone(&self.state),
            self.staging_max_age,
            self.staging_sweep_interval,
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let client_registry = Arc::clone(&self.client_registry);
                    let state = Arc::clone(&self.state);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) = handle_new_client(stream, addr, client_registry, state).await
                        {
                            warn!("Failed to handle client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

/// Greets a new client, enforces `max_clients` and hands off to the session loop.
async fn handle_new_client(
    mut stream: TcpStream,
    client_addr: SocketAddr,
    client_registry: Arc<ClientRegistry>,
    state: Arc<AppState>,
) -> io::Result<()> {
    let max_clients = state.runtime.read().await.max_clients;

    let Some(_registration) = client_registry.try_register(client_addr, max_clients) else {
        warn!("Rejecting {}: {} clients connected", client_addr, max_clients);
        stream
            .write_all(
                format_response(TOO_MANY_CLIENTS, "Too many connections. Try again later.")
                    .as_bytes(),
            )
            .await?;
        return Ok(());
    };

    stream
        .write_all(format_response(READY, "depot ready").as_bytes())
        .await?;
    stream.flush().await?;

    info!(
        "Accepted client {} ({}/{} clients)",
        client_addr,
        client_registry.len(),
        max_clients
    );

    handle_client(stream, client_addr, state).await;
    Ok(())
}

/// Removes stale staging files now and then every `interval`.
fn spawn_staging_sweeper(state: Arc<AppState>, max_age: Duration, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            // The first tick completes immediately.
            ticker.tick().await;

            let st = Arc::clone(&state);
            match tokio::task::spawn_blocking(move || st.engine.sweep_staging(max_age)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Staging sweep failed: {}", e),
                Err(e) => error!("Staging sweep task failed: {}", e),
            }
        }
    });
}
