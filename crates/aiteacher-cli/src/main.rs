//! AI Teacher CLI - a command-line client for the tutoring platform.
//!
//! Restores the saved session on start, guards the pages that need a
//! logged-in parent, and drives login, registration, and child profiles.

mod commands;
mod credentials;

use std::io::{self, Write};

use anyhow::{anyhow, Result};
use chrono::Local;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aiteacher_core::{
    AuthError, AuthSession, Config, NewAccount, NewChild, Navigation, Route, RouteGuard,
    SessionState,
};
use commands::{Command, USAGE};
use credentials::CredentialStore;

// ============================================================================
// Constants
// ============================================================================

/// Directory for a log file in addition to stderr
const LOG_DIR_ENV: &str = "AITEACHER_LOG_DIR";

const USERNAME_ENV: &str = "AITEACHER_USERNAME";
const PASSWORD_ENV: &str = "AITEACHER_PASSWORD";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must outlive `main`'s work.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "aiteacher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    }
    .with_env_overrides();
    info!(api = %config.api_base_url, ?command, "aiteacher starting");

    let session = AuthSession::connect(&config)?.with_logout_callback(|| {
        eprintln!("Your session has ended. Please log in again.");
    });

    run(command, &session, &mut config).await
}

async fn run(command: Command, session: &AuthSession, config: &mut Config) -> Result<()> {
    let guard = RouteGuard::default();

    match command {
        Command::Status => {
            let state = session.bootstrap().await;
            print_state(&state);
        }
        Command::Login { email } => login(session, config, email).await?,
        Command::Register { email, name } => {
            let password = prompt_new_password()?;
            session
                .register(&NewAccount::new(email.clone(), password, name))
                .await
                .map_err(display)?;
            println!("Registration successful! Please check {} for a verification email.", email);
        }
        Command::Logout { forget } => {
            session.logout();
            if forget {
                if let Some(ref email) = config.last_username {
                    let keychain = CredentialStore::for_server(&config.api_base_url);
                    if let Err(e) = keychain.forget(email) {
                        warn!(error = %e, "Failed to delete remembered password");
                    }
                }
            }
            println!("Logged out.");
        }
        Command::WhoAmI => {
            let state = session.bootstrap().await;
            match state.user() {
                Some(user) => {
                    println!("{} <{}> (id {})", user.display_name(), user.email, user.id);
                    if let Some(expires) = session.token_store().expires_at() {
                        println!(
                            "Session expires {}",
                            expires.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                None => println!("Not logged in."),
            }
        }
        Command::Children => {
            let state = session.bootstrap().await;
            if !allowed(&guard, Route::Dashboard, &state) {
                return Ok(());
            }
            let children = session.list_children().await.map_err(display)?;
            if children.is_empty() {
                println!("No child profiles yet. Add one with `aiteacher add-child`.");
            }
            for child in children {
                println!(
                    "{:<20} {:<12} {:<30} {}",
                    child.name,
                    child.grade,
                    child.subjects_display(),
                    child.learning_style.as_deref().unwrap_or("-")
                );
            }
        }
        Command::AddChild {
            name,
            grade,
            subjects,
            learning_style,
        } => {
            let state = session.bootstrap().await;
            if !allowed(&guard, Route::CreateChildProfile, &state) {
                return Ok(());
            }
            let mut child = NewChild::new(name, grade, subjects);
            if let Some(style) = learning_style {
                child = child.with_learning_style(style);
            }
            let created = session.create_child(&child).await.map_err(display)?;
            println!("Created profile for {} ({}).", created.name, created.id);
        }
        Command::Open { path } => {
            let state = session.bootstrap().await;
            match guard.navigate(&path, &state) {
                Navigation::Render(route) => println!("Render {}", route.path()),
                Navigation::Pending(route) => println!("Waiting for session before {}", route.path()),
                Navigation::Redirect { from, to } => {
                    println!("{} requires login, redirecting to {}", from.path(), to.path())
                }
            }
        }
        Command::ForgotPassword { email } => {
            session.reset_password(&email).await.map_err(display)?;
            println!("If an account exists for {}, a reset link is on its way.", email);
        }
        Command::VerifyEmail { token } => {
            session.verify_email(&token).await.map_err(display)?;
            println!("Email verified successfully! You can now log in.");
        }
        Command::Help => print!("{}", USAGE),
    }

    Ok(())
}

/// Apply the route guard and tell the user when they are turned away
fn allowed(guard: &RouteGuard, route: Route, state: &SessionState) -> bool {
    match guard.navigate(route.path(), state) {
        Navigation::Render(_) => true,
        Navigation::Pending(_) => {
            println!("Session is still loading.");
            false
        }
        Navigation::Redirect { to, .. } => {
            println!("Please log in first (aiteacher login). [{}]", to.path());
            false
        }
    }
}

fn print_state(state: &SessionState) {
    match state {
        SessionState::Authenticated(user) => {
            println!("Logged in as {} <{}>", user.display_name(), user.email)
        }
        other => println!("Session: {}", other.label()),
    }
}

fn display(err: AuthError) -> anyhow::Error {
    anyhow!(err.user_message())
}

// =========================================================================
// Login
// =========================================================================

async fn login(session: &AuthSession, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .filter(|e| !e.trim().is_empty())
    {
        Some(email) => email,
        None => prompt_email(config.last_username.as_deref())?,
    };

    let keychain = CredentialStore::for_server(&config.api_base_url);
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(p) if !p.is_empty() => p,
        _ => stored_or_prompted_password(&keychain, &email)?,
    };

    println!("Authenticating...");
    let user = match session.login(&email, &password).await {
        Ok(user) => user,
        Err(e) => {
            // A remembered password the server refuses is stale
            if matches!(e, AuthError::AuthRejected { .. }) {
                if let Err(err) = keychain.forget(&email) {
                    warn!(error = %err, "Failed to drop rejected password");
                }
            }
            return Err(display(e));
        }
    };

    if let Err(e) = keychain.remember(&email, &password) {
        warn!(error = %e, "Failed to store credentials");
    }

    config.last_username = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Welcome, {}!", user.display_name());
    Ok(())
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        _ => Ok(input.to_string()),
    }
}

fn stored_or_prompted_password(keychain: &CredentialStore, email: &str) -> Result<String> {
    if let Some(password) = keychain.recall(email) {
        if confirm("Use stored password? [Y/n]: ")? {
            return Ok(password);
        }
    }
    Ok(rpassword::prompt_password("Password: ")?)
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        return Err(anyhow!("Passwords do not match"));
    }
    Ok(password)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase() != "n")
}
