//! Huddle CLI - command-line access to a Huddle community dashboard.
//!
//! Every command first runs the session startup pass, so a stale token is
//! refreshed and an unreachable server falls back to the cached profile the
//! same way the dashboard itself behaves.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use huddle_core::{
    AlwaysOnline, Config, ConnectivityMonitor, ConnectivityObserver, Principal, Session,
    SessionState,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: huddle <command>

Commands:
  login [email]   Sign in and store the session
  logout          Sign out and forget the session
  whoami          Show the signed-in user
  refresh         Renew the session token now
  get <path>      Call an API path with the current session";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr unless a log directory is configured, in which case a
/// daily rolling file is used. The returned guard must outlive all logging.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, "huddle.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config() -> Result<Config> {
    let mut config = Config::load().context("Failed to load config")?;
    if let Ok(url) = std::env::var("HUDDLE_API_URL") {
        config.api_base_url = url;
    }
    if let Ok(dir) = std::env::var("HUDDLE_DATA_DIR") {
        config.data_dir = Some(dir.into());
    }
    Ok(config)
}

/// Seed the monitor with one probe so startup sees the real reachability.
async fn connectivity(config: &Config) -> Arc<dyn ConnectivityObserver> {
    match config.connectivity_probe {
        Some(ref addr) => {
            let online = ConnectivityMonitor::probe(addr).await;
            let monitor = Arc::new(ConnectivityMonitor::new(online));
            monitor.spawn_probe(addr.clone(), config.probe_interval());
            monitor as Arc<dyn ConnectivityObserver>
        }
        None => Arc::new(AlwaysOnline),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = load_config()?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let session = Session::from_config(&config, connectivity(&config).await)?;
    let state = session.bootstrap().await;
    info!(command = %command, authenticated = state.is_authenticated(), "Session ready");

    let result = match command.as_str() {
        "login" => login(&session, args.get(1).cloned()).await,
        "logout" => {
            session.sign_out().await;
            println!("Signed out.");
            Ok(())
        }
        "whoami" => {
            whoami(&state);
            Ok(())
        }
        "refresh" => refresh(&session).await,
        "get" => match args.get(1) {
            Some(path) => get(&session, path).await,
            None => Err(anyhow::anyhow!("Missing path. {}", USAGE)),
        },
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    };

    session.flush().await;
    session.dispose();
    result
}

fn print_principal(principal: &Principal) {
    println!("{} ({:?})", principal.display_name(), principal.role);
    if let Some(ref email) = principal.email {
        println!("  email:    {}", email);
    }
    if let Some(ref language) = principal.language {
        println!("  language: {}", language);
    }
}

fn whoami(state: &SessionState) {
    match state {
        SessionState::Authenticated(principal) => print_principal(principal),
        _ => println!("Not signed in."),
    }
}

async fn login(session: &Session, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("\nAuthenticating...");
    let principal = session
        .sign_in(&email, &password)
        .await
        .context("Sign-in failed")?;

    println!("Login successful!\n");
    print_principal(&principal);
    Ok(())
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

async fn refresh(session: &Session) -> Result<()> {
    let principal = session.refresh().await.context("Refresh failed")?;
    println!("Session renewed.");
    print_principal(&principal);
    Ok(())
}

async fn get(session: &Session, path: &str) -> Result<()> {
    let body: serde_json::Value = session
        .api()
        .get(path)
        .await
        .with_context(|| format!("GET {} failed", path))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
