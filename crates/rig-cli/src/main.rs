//! Rig CLI - log in to a Rig platform and keep the session on disk.
//!
//! The session lives in `~/.config/rig/session.json` (see
//! `FileSessionStore`), so later commands reuse and refresh it.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rig_client::models::{LoginMethod, LoginRequest, UserIdentifier, UserPassword};
use rig_client::{Client, FileSessionStore, SessionStore};

const USAGE: &str = "\
Usage: rig <command>

Commands:
  login [--email E]   Log in with email and password and save the session
  whoami              Show the user behind the saved session
  logout              Log out and delete the saved session

Environment:
  RIG_HOST            API endpoint (default http://localhost:4747)
  RIG_CLIENT_ID       Service account client id
  RIG_CLIENT_SECRET   Service account client secret
  RUST_LOG            Log filter (default warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=rig_client=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("login") => login(parse_login_args(&args[1..])?).await,
        Some("whoami") => whoami().await,
        Some("logout") => logout().await,
        Some("-h") | Some("--help") | Some("help") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => bail!("Unknown command '{}'\n\n{}", other, USAGE),
        None => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

/// Email passed as `--email E` or `--email=E`, if any.
fn parse_login_args(args: &[String]) -> Result<Option<String>> {
    let mut email = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--email" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow::anyhow!("--email needs a value"))?;
            email = Some(value.clone());
        } else if let Some(value) = arg.strip_prefix("--email=") {
            email = Some(value.to_string());
        } else {
            bail!("Unexpected argument '{}' for login\n\n{}", arg, USAGE);
        }
    }
    Ok(email)
}

fn open_session() -> Result<Arc<FileSessionStore>> {
    let store = FileSessionStore::open_default()
        .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    debug!(path = %store.path().display(), "Using session file");
    Ok(Arc::new(store))
}

fn build_client(store: Arc<FileSessionStore>) -> Result<Client> {
    Client::builder()
        .session_store(store)
        .build()
        .context("Failed to create Rig client")
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

async fn login(email: Option<String>) -> Result<()> {
    let store = open_session()?;
    let client = build_client(store)?;

    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let request = LoginRequest {
        method: LoginMethod::UserPassword(UserPassword {
            identifier: UserIdentifier::Email(email.clone()),
            password,
            api_key: None,
            project_id: None,
        }),
    };

    let response = client
        .authentication()
        .login(&request)
        .await
        .context("Login failed")?;
    let token = response
        .token
        .ok_or_else(|| anyhow::anyhow!("Login response carried no token"))?;

    client.set_access_token(&token.access_token, &token.refresh_token);
    info!(host = %client.host(), "Logged in");
    println!("Logged in as {} on {}", email, client.host());
    Ok(())
}

async fn whoami() -> Result<()> {
    let store = open_session()?;
    if store.tokens().is_empty() {
        bail!("Not logged in. Run `rig login` first.");
    }
    let client = build_client(store)?;

    let response = client
        .authentication()
        .get()
        .await
        .context("Failed to fetch current user")?;
    let info = response.user_info.unwrap_or_default();

    println!("user id:  {}", response.user_id);
    println!("email:    {}", info.email);
    if !info.username.is_empty() {
        println!("username: {}", info.username);
    }
    Ok(())
}

async fn logout() -> Result<()> {
    let store = open_session()?;
    if !store.tokens().is_empty() {
        let client = build_client(store.clone())?;
        // The local session goes regardless of what the server says
        if let Err(e) = client.authentication().logout().await {
            debug!(error = %e, "Server-side logout failed");
        }
    }
    store.clear().context("Failed to delete session file")?;
    println!("Logged out");
    Ok(())
}
