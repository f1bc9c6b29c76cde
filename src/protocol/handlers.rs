//! Command handlers
//!
//! Executes parsed commands for one session. Inputs are validated here
//! before anything reaches the storage engine; engine calls run on the
//! blocking pool.

use log::{info, warn};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::auth::{TokenRequest, TokenVerifier};
use crate::client::Session;
use crate::error::handlers::{error_to_reply_code, handle_error};
use crate::error::{AuthError, DepotError, StorageError};
use crate::protocol::commands::{Command, CommandStatus, TokenArgs};
use crate::protocol::responses::*;
use crate::server::AppState;
use crate::storage::Permission;
use crate::storage::validation::{validate_absolute_path, validate_filename, validate_path};
use crate::transfer::{receive_upload, send_file};

/// Number of audit records returned by `LOG`.
pub const LOG_TAIL_LINES: usize = 100;

/// Buffered control connection of one client.
pub type Connection = BufReader<TcpStream>;

async fn reply(conn: &mut Connection, code: u16, message: &str) -> io::Result<()> {
    conn.get_mut()
        .write_all(format_response(code, message).as_bytes())
        .await
}

async fn reply_error(conn: &mut Connection, err: DepotError) -> io::Result<CommandStatus> {
    handle_error(&err);
    let message = err.to_string();
    reply(conn, error_to_reply_code(&err), &message).await?;
    Ok(CommandStatus::Failure(message))
}

/// Runs `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, DepotError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DepotError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DepotError::Io(io::Error::other(e)))?
}

/// Dispatches one command. Replies, including error replies, are written
/// here; an `Err` means the connection itself failed.
pub async fn handle_command(
    session: &mut Session,
    command: Command,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    match command {
        Command::AUTH(token) => handle_auth(session, &token, conn, state).await,
        Command::LIST(path) => handle_list(session, path, conn, state).await,
        Command::GET(path) => handle_get(session, path, conn, state).await,
        Command::PUT {
            path,
            filename,
            size,
            want_hash,
        } => handle_put(session, path, filename, size, want_hash, conn, state).await,
        Command::DEL(path) => handle_delete(session, path, conn, state).await,
        Command::TOKEN(args) => handle_token(args, conn, state).await,
        Command::LOG { tenant, password } => handle_log(tenant, password, conn, state).await,
        Command::QUIT => {
            reply(conn, GOODBYE, "Goodbye").await?;
            Ok(CommandStatus::CloseConnection)
        }
        Command::INVALID(message) => {
            reply(conn, INVALID_ARGUMENTS, &message).await?;
            Ok(CommandStatus::Failure(message))
        }
        Command::UNKNOWN(verb) => {
            let message = format!("Unknown command {verb}");
            reply(conn, UNKNOWN_COMMAND, &message).await?;
            Ok(CommandStatus::Failure(message))
        }
    }
}

async fn handle_auth(
    session: &mut Session,
    token: &str,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    let verifier: &dyn TokenVerifier = &state.tokens;
    match state.resolver.resolve_token(verifier, Some(token)) {
        Ok(grant) => {
            let message = format!(
                "Authenticated as {} ({})",
                grant.scope.subject(),
                grant.permissions
            );
            info!("Client {} {}", session.addr(), message);
            session.authenticate(grant);
            reply(conn, LOGIN_SUCCESS, &message).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => {
            warn!("Client {} failed to authenticate: {}", session.addr(), e);
            reply_error(conn, e.into()).await
        }
    }
}

async fn handle_list(
    session: &mut Session,
    path: String,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    if let Err(e) = validate_path(&path) {
        return reply_error(conn, e.into()).await;
    }
    let scope = match session.authorize(Permission::Read) {
        Ok(scope) => scope.clone(),
        Err(e) => return reply_error(conn, e.into()).await,
    };

    let st = Arc::clone(state);
    let entries = match blocking(move || Ok(st.engine.list(&scope, &path)?)).await {
        Ok(entries) => entries,
        Err(e) => return reply_error(conn, e).await,
    };

    reply(conn, OPENING_TRANSFER, &entries.len().to_string()).await?;
    for entry in &entries {
        conn.get_mut().write_all(format_entry(entry).as_bytes()).await?;
    }
    reply(conn, TRANSFER_COMPLETE, "Listing complete").await?;
    Ok(CommandStatus::Success)
}

async fn handle_get(
    session: &mut Session,
    path: String,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    if let Err(e) = validate_absolute_path(&path) {
        return reply_error(conn, e.into()).await;
    }
    let scope = match session.authorize(Permission::Read) {
        Ok(scope) => scope.clone(),
        Err(e) => return reply_error(conn, e.into()).await,
    };

    let st = Arc::clone(state);
    let stream = match blocking(move || Ok(st.engine.get(&scope, &path)?)).await {
        Ok(stream) => stream,
        Err(e) => return reply_error(conn, e).await,
    };

    reply(conn, OPENING_TRANSFER, &stream.size().to_string()).await?;
    send_file(stream, conn.get_mut()).await?;
    reply(conn, TRANSFER_COMPLETE, "Transfer complete").await?;
    Ok(CommandStatus::Success)
}

#[allow(clippy::too_many_arguments)]
async fn handle_put(
    session: &mut Session,
    path: String,
    filename: String,
    size: u64,
    want_hash: bool,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    if let Err(e) = validate_path(&path).and_then(|()| validate_filename(&filename)) {
        return reply_error(conn, e.into()).await;
    }
    let scope = match session.authorize(Permission::Write) {
        Ok(scope) => scope.clone(),
        Err(e) => return reply_error(conn, e.into()).await,
    };

    let limit = state.runtime.read().await.max_upload_size_bytes();
    if size > limit {
        return reply_error(conn, DepotError::UploadTooLarge { size, limit }).await;
    }

    reply(conn, OPENING_TRANSFER, &format!("Send {size} bytes")).await?;

    let st = Arc::clone(state);
    let result = receive_upload(conn, size, move |content| {
        st.engine.put(&scope, &path, &filename, content, want_hash)
    })
    .await?;

    match result {
        Ok(put) => {
            reply(
                conn,
                TRANSFER_COMPLETE,
                &format!("{} {}", put.bytes_written, put.hash),
            )
            .await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => reply_error(conn, e.into()).await,
    }
}

async fn handle_delete(
    session: &mut Session,
    path: String,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    if let Err(e) = validate_path(&path) {
        return reply_error(conn, e.into()).await;
    }
    let scope = match session.authorize(Permission::Delete) {
        Ok(scope) => scope.clone(),
        Err(e) => return reply_error(conn, e.into()).await,
    };

    let st = Arc::clone(state);
    match blocking(move || Ok(st.engine.delete(&scope, &path)?)).await {
        Ok(()) => {
            reply(conn, DELETED, "Deleted").await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => reply_error(conn, e).await,
    }
}

async fn handle_token(
    args: TokenArgs,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    let request = TokenRequest {
        tenant: args.tenant,
        password: args.password,
        realm: args.realm,
        subject: args.subject,
        mode: args.mode,
        expiration_date: args.expiration_date,
    };

    let st = Arc::clone(state);
    match blocking(move || Ok(st.tokens.issue(&request)?)).await {
        Ok(token) => {
            reply(conn, OK, &token).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => reply_error(conn, e).await,
    }
}

async fn handle_log(
    tenant: String,
    password: String,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> io::Result<CommandStatus> {
    let st = Arc::clone(state);
    let lines = blocking(move || {
        if !st.tokens.credentials().verify(&tenant, &password) {
            return Err(AuthError::AccessDenied("Invalid credentials".into()).into());
        }
        st.audit_log
            .tail(&tenant, LOG_TAIL_LINES)
            .map_err(|e| StorageError::failure("could not read audit log", e).into())
    })
    .await;

    let lines = match lines {
        Ok(lines) => lines,
        Err(e) => return reply_error(conn, e).await,
    };

    reply(conn, OPENING_TRANSFER, &lines.len().to_string()).await?;
    for line in &lines {
        conn.get_mut().write_all(format!("{line}\r\n").as_bytes()).await?;
    }
    reply(conn, TRANSFER_COMPLETE, "Log complete").await?;
    Ok(CommandStatus::Success)
}
