//! Toto Companion - Command-Line Entry Point
//!
//! Signs in with the configured account when no session is stored, then
//! prints the requested resource as JSON on stdout. Failures are printed as
//! the normalized error object and exit with status 1.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use toto_client::loader::PROFILE_NOT_FOUND;
use toto_client::{ApiClient, ApiError, ElderlyProfileLoader, FileStore};
use toto_common::init_tracing;
use tracing::{error, info};

use crate::config::Config;

const NO_CREDENTIALS: &str = "No stored session. Set TOTO_EMAIL and TOTO_PASSWORD to sign in.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Profile,
    Contacts,
    Reminders,
    History,
    Logout,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg.unwrap_or("profile") {
            "profile" => Ok(Self::Profile),
            "contacts" => Ok(Self::Contacts),
            "reminders" => Ok(Self::Reminders),
            "history" => Ok(Self::History),
            "logout" => Ok(Self::Logout),
            other => bail!(
                "Unknown command {other}; expected profile, contacts, reminders, history or logout"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(&config.tracing).context("Failed to initialize tracing")?;

    let command = Command::parse(std::env::args().nth(1).as_deref())?;
    info!(
        api = %config.client.base_url,
        state_file = %config.state_file.display(),
        ?command,
        "Starting Toto companion"
    );

    let store = Arc::new(FileStore::new(&config.state_file));
    let client = Arc::new(ApiClient::new(config.client.clone(), store)?);

    match run(&config, &client, command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(error = %err, ?command, "Command failed");
            let output = json!({ "error": err.to_normalized() });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    config: &Config,
    client: &Arc<ApiClient>,
    command: Command,
) -> Result<Value, ApiError> {
    if command == Command::Logout {
        client.logout().await?;
        return Ok(json!({ "signedOut": true }));
    }

    ensure_session(config, client).await?;

    match command {
        Command::Profile => {
            let loader = ElderlyProfileLoader::for_client(Arc::clone(client));
            loader.load();
            let state = loader.settled().await;
            match (state.profile, state.error) {
                (Some(profile), _) => Ok(serde_json::to_value(profile)?),
                (None, Some(err)) => Err(err),
                (None, None) => Err(ApiError::not_found(PROFILE_NOT_FOUND)),
            }
        }
        Command::Contacts => Ok(serde_json::to_value(client.contacts().await?)?),
        Command::Reminders => Ok(serde_json::to_value(client.reminders().await?)?),
        Command::History => Ok(serde_json::to_value(client.history().await?)?),
        Command::Logout => Ok(Value::Null),
    }
}

/// Sign in with the configured account unless a session is already stored.
async fn ensure_session(config: &Config, client: &ApiClient) -> Result<(), ApiError> {
    if client.has_session().await? {
        return Ok(());
    }

    let (Some(email), Some(password)) = (&config.email, &config.password) else {
        return Err(ApiError::unauthenticated(NO_CREDENTIALS, None));
    };
    let user = client.login(email, password.expose_secret()).await?;
    info!(user = %user.display_name(), "Signed in with configured account");
    Ok(())
}
