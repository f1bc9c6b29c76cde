//! Module `commands`
//!
//! Parses command lines received from clients into the `Command` enum and
//! defines the status a handled command reports back to the session loop.

use chrono::NaiveDate;

/// Path argument that stands for the realm root.
pub const ROOT_PATH: &str = "/";

/// Represents a command parsed from the client input.
///
/// Variants carry their arguments as received; path and name validation
/// happens in the handlers.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Present a capability token for this connection.
    AUTH(String),
    /// List a directory; the realm root when no path is given.
    LIST(String),
    /// Download a file.
    GET(String),
    /// Upload `size` bytes to `path/filename`.
    PUT {
        path: String,
        filename: String,
        size: u64,
        want_hash: bool,
    },
    /// Delete a file or directory tree.
    DEL(String),
    /// Issue a capability token with the tenant password.
    TOKEN(TokenArgs),
    /// Read the latest audit records of a tenant.
    LOG { tenant: String, password: String },
    QUIT,
    /// A known command with missing or malformed arguments.
    INVALID(String),
    UNKNOWN(String),
}

/// Arguments of a `TOKEN` command.
#[derive(PartialEq)]
pub struct TokenArgs {
    pub tenant: String,
    pub password: String,
    pub realm: String,
    pub mode: String,
    pub expiration_date: NaiveDate,
    pub subject: String,
}

impl std::fmt::Debug for TokenArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenArgs")
            .field("tenant", &self.tenant)
            .field("password", &"***")
            .field("realm", &self.realm)
            .field("mode", &self.mode)
            .field("expiration_date", &self.expiration_date)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Parses a raw command line into a `Command`.
///
/// The verb is case-insensitive. Arguments are separated by whitespace,
/// except the trailing subject of `TOKEN`, which keeps its inner spaces.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();
    let args: Vec<&str> = arg.split_whitespace().collect();

    match cmd.as_str() {
        "QUIT" | "Q" => Command::QUIT,
        "AUTH" if args.len() == 1 => Command::AUTH(args[0].to_string()),
        "AUTH" => Command::INVALID("AUTH requires a token".into()),
        "LIST" => Command::LIST(arg.to_string()),
        "GET" if !arg.is_empty() => Command::GET(arg.to_string()),
        "GET" => Command::INVALID("GET requires a file path".into()),
        "DEL" if !arg.is_empty() => Command::DEL(arg.to_string()),
        "DEL" => Command::INVALID("DEL requires a path".into()),
        "PUT" => parse_put(&args),
        "TOKEN" => parse_token(arg),
        "LOG" if args.len() == 2 => Command::LOG {
            tenant: args[0].to_string(),
            password: args[1].to_string(),
        },
        "LOG" => Command::INVALID("LOG requires tenant and password".into()),
        _ => Command::UNKNOWN(cmd),
    }
}

fn parse_put(args: &[&str]) -> Command {
    let want_hash = match args.get(3) {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case("HASH") && args.len() == 4 => true,
        Some(_) => return Command::INVALID("PUT <path> <filename> <size> [HASH]".into()),
    };

    match args {
        [path, filename, size, ..] => match size.parse::<u64>() {
            Ok(size) => Command::PUT {
                path: path.to_string(),
                filename: filename.to_string(),
                size,
                want_hash,
            },
            Err(_) => Command::INVALID(format!("invalid size {size:?}")),
        },
        _ => Command::INVALID("PUT <path> <filename> <size> [HASH]".into()),
    }
}

fn parse_token(arg: &str) -> Command {
    const USAGE: &str = "TOKEN <tenant> <password> <realm> <mode> <yyyy-mm-dd> <subject>";

    let mut parts = arg.splitn(6, char::is_whitespace);
    let mut next = || parts.next().map(str::trim).filter(|p| !p.is_empty());

    let (Some(tenant), Some(password), Some(realm), Some(mode), Some(date), Some(subject)) =
        (next(), next(), next(), next(), next(), next())
    else {
        return Command::INVALID(USAGE.into());
    };

    let Ok(expiration_date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return Command::INVALID(format!("invalid expiration date {date:?}"));
    };

    Command::TOKEN(TokenArgs {
        tenant: tenant.to_string(),
        password: password.to_string(),
        realm: realm.to_string(),
        mode: mode.to_string(),
        expiration_date,
        subject: subject.to_string(),
    })
}
