use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::client::Session;
use crate::protocol::responses::{UNKNOWN_COMMAND, format_response};
use crate::protocol::{CommandStatus, handle_command, parse_command};
use crate::server::AppState;

/// Handles one client session.
///
/// - Reads command lines, bounded by `max_command_length`.
/// - Dispatches them with `handle_command`, which writes the replies.
/// - Ends on `QUIT`, on disconnect, or on a connection error.
pub async fn handle_client(stream: TcpStream, client_addr: SocketAddr, state: Arc<AppState>) {
    let mut conn = BufReader::new(stream);
    let mut session = Session::new(client_addr);
    let mut line = String::new();
    let limit = state.max_command_length as u64;

    loop {
        line.clear();
        let read = (&mut conn).take(limit + 1).read_line(&mut line).await;
        match read {
            Ok(0) => {
                info!("Connection closed by client {}", client_addr);
                break;
            }
            Ok(n) => {
                if n as u64 > limit {
                    warn!("Command from {} exceeds {} bytes", client_addr, limit);
                    let _ = conn
                        .get_mut()
                        .write_all(format_response(UNKNOWN_COMMAND, "Command too long").as_bytes())
                        .await;
                    break;
                }

                let command = parse_command(&line);
                info!(
                    "Received from {} ({}): {:?}",
                    client_addr,
                    session.subject().unwrap_or("anonymous"),
                    redact(&command)
                );

                match handle_command(&mut session, command, &mut conn, &state).await {
                    Ok(CommandStatus::CloseConnection) => {
                        info!("Client {} requested to quit", client_addr);
                        break;
                    }
                    Ok(CommandStatus::Success) => {}
                    Ok(CommandStatus::Failure(reason)) => {
                        info!("Command from {} failed: {}", client_addr, reason);
                    }
                    Err(e) => {
                        error!("Connection to {} failed: {}", client_addr, e);
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                break;
            }
        }
    }

    let _ = conn.get_mut().shutdown().await;
    info!("Client {} disconnected", client_addr);
}

/// Keeps tokens and passwords out of the log.
fn redact(command: &crate::protocol::Command) -> String {
    use crate::protocol::Command;
    match command {
        Command::AUTH(_) => "AUTH ***".to_string(),
        Command::LOG { tenant, .. } => format!("LOG {tenant} ***"),
        other => format!("{other:?}"),
    }
}
