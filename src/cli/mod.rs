//! Command-line interface parsing and handling
//!
//! The binary is a thin host around [`crate::auth::AuthSession`]: it signs in,
//! signs out, reports session status, and issues raw authenticated requests.
//! When the session ends it sends the user back to `sessionward login`, the
//! unauthenticated entry point.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

use crate::auth::{ApiError, AuthSession, RequestDescriptor, SessionState};
use crate::core::config::data::path_display;
use crate::core::config::{Config, CredentialBackendKind};
use crate::utils::logging::init_tracing;

const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_SIGNED_OUT: i32 = 3;

const LOGIN_HINT: &str = "Session ended. Run 'sessionward login <username>' to sign in again.";

#[derive(Parser)]
#[command(name = "sessionward")]
#[command(about = "Authenticated requests against a bearer-token API")]
#[command(
    long_about = "sessionward keeps an access/refresh token pair for an HTTP API, attaches the \
access token to every request, and refreshes it transparently when the server answers 401. \
Concurrent expiries share a single refresh.\n\n\
Environment Variables:\n\
  SESSIONWARD_API_URL                 API root (overrides the config file)\n\
  SESSIONWARD_PASSWORD_ENCRYPTED      Encrypted password for 'login'\n\
  RUST_LOG                            Diagnostic log filter (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// API root that request paths are joined to
    #[arg(long, global = true, env = "SESSIONWARD_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the returned credential pair
    Login {
        username: String,
        /// Password, already encrypted for transport; read from stdin when omitted
        #[arg(long, env = "SESSIONWARD_PASSWORD_ENCRYPTED", hide_env_values = true)]
        password_encrypted: Option<String>,
    },
    /// Forget the stored credential pair
    Logout,
    /// Show configuration and whether a session is stored
    Status,
    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Path relative to the API root
        path: String,
        /// JSON request body
        #[arg(long, value_name = "JSON", conflicts_with = "data_file")]
        json: Option<String>,
        /// Send this file's bytes as a binary body
        #[arg(long, value_name = "FILE")]
        data_file: Option<PathBuf>,
        /// Extra header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
        headers: Vec<(HeaderName, HeaderValue)>,
    },
    /// Set a configuration value
    Set {
        /// One of: api-url, credential-backend, credentials-path, request-timeout
        key: String,
        value: String,
    },
    /// Reset a configuration value to its default
    Unset { key: String },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log.as_deref())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    match args.command {
        Commands::Set { key, value } => {
            config.set_value(&key, &value)?;
            config.save()?;
            println!("✅ Set {key} = {value}");
            Ok(())
        }
        Commands::Unset { key } => {
            config.unset_value(&key)?;
            config.save()?;
            println!("✅ Unset {key}");
            Ok(())
        }
        Commands::Status => {
            print_status(&config, args.api_url.as_deref());
            Ok(())
        }
        Commands::Logout => {
            let session = open_session(&config, args.api_url.as_deref());
            if session.logout() {
                println!("✅ Signed out");
            } else {
                println!("Already signed out");
            }
            Ok(())
        }
        Commands::Login {
            username,
            password_encrypted,
        } => {
            let session = open_session(&config, args.api_url.as_deref());
            let password_encrypted = match password_encrypted {
                Some(value) => value,
                None => read_secret("Encrypted password: ")?,
            };
            match session.login(&username, &password_encrypted).await {
                Ok(()) => {
                    println!("✅ Signed in as {username}");
                    Ok(())
                }
                Err(err) => exit_with(&err, false),
            }
        }
        Commands::Request {
            method,
            path,
            json,
            data_file,
            headers,
        } => {
            let descriptor = build_descriptor(&method, path, json, data_file, headers)?;
            let session = open_session(&config, args.api_url.as_deref());
            let mut signal = session.subscribe();

            let result = session.send(&descriptor).await;
            let signed_out = signal.has_changed().unwrap_or(false)
                && *signal.borrow_and_update() == SessionState::SignedOut;

            match result {
                Ok(body) => {
                    print_body(&body)?;
                    Ok(())
                }
                Err(err) => exit_with(&err, signed_out),
            }
        }
    }
}

fn open_session(config: &Config, api_url: Option<&str>) -> AuthSession {
    let built = config.session_settings(api_url).and_then(|settings| {
        let backend = config.build_backend()?;
        Ok((settings, backend))
    });
    let (settings, backend) = match built {
        Ok(parts) => parts,
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    match AuthSession::new(&settings, backend) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("❌ Failed to set up HTTP client: {err}");
            std::process::exit(EXIT_CONFIG);
        }
    }
}

fn exit_with(err: &ApiError, signed_out: bool) -> ! {
    eprintln!("❌ {err}");
    if signed_out || err.ends_session() {
        eprintln!("{LOGIN_HINT}");
        std::process::exit(EXIT_SIGNED_OUT);
    }
    std::process::exit(EXIT_FAILURE);
}

fn build_descriptor(
    method: &str,
    path: String,
    json: Option<String>,
    data_file: Option<PathBuf>,
    headers: Vec<(HeaderName, HeaderValue)>,
) -> Result<RequestDescriptor, Box<dyn Error>> {
    let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method '{method}'"))?;
    let mut descriptor = RequestDescriptor::new(method, path);

    if let Some(json) = json {
        let body: Value =
            serde_json::from_str(&json).map_err(|err| format!("--json is not valid JSON: {err}"))?;
        descriptor = descriptor.json(body);
    } else if let Some(file) = data_file {
        let bytes = std::fs::read(&file)
            .map_err(|err| format!("failed to read {}: {err}", path_display(&file)))?;
        descriptor = descriptor.binary(bytes);
    }

    for (name, value) in headers {
        descriptor = descriptor.header(name, value);
    }
    Ok(descriptor)
}

pub(crate) fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|err| format!("invalid header name '{}': {err}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|err| format!("invalid value for header '{name}': {err}"))?;
    Ok((name, value))
}

fn print_body(body: &Value) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout().lock();
    match body {
        Value::Null => {}
        Value::String(text) => writeln!(stdout, "{text}")?,
        other => writeln!(stdout, "{}", serde_json::to_string_pretty(other)?)?,
    }
    Ok(())
}

fn print_status(config: &Config, api_url: Option<&str>) {
    match config.resolve_api_base_url(api_url) {
        Ok(url) => println!("API URL:     {url}"),
        Err(err) => println!("API URL:     not configured ({err})"),
    }
    println!("Credentials: {}", config.credential_backend);
    if config.credential_backend == CredentialBackendKind::File {
        match config.credentials_file() {
            Ok(path) => println!("File:        {}", path_display(path)),
            Err(err) => println!("File:        unavailable ({err})"),
        }
    }

    let session = match config.build_backend() {
        Ok(backend) => {
            let store = crate::auth::CredentialStore::new(backend);
            match store.get() {
                Ok(pair) if pair.is_empty() => "signed out".to_string(),
                Ok(pair) if pair.refresh_token.is_empty() => {
                    "signed in (no refresh token stored)".to_string()
                }
                Ok(_) => "signed in".to_string(),
                Err(err) => format!("unknown ({err})"),
            }
        }
        Err(err) => format!("unknown ({err})"),
    };
    println!("Session:     {session}");
}

fn read_secret(prompt: &str) -> Result<String, Box<dyn Error>> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        return Err("password cannot be empty".into());
    }
    Ok(secret)
}
