use clap::Parser;
use colored::*;
use serde_json::Value;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pantry_admin::api::{ApiClient, RequestOptions, SessionEvent};
use pantry_admin::cli::{Args, Command};
use pantry_admin::config::Config;
use pantry_admin::models::TokenState;
use pantry_admin::session::{FilesystemTokenStore, TokenStore};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_env_and_args(&args.overrides()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red(), e);
            process::exit(1);
        }
    };

    init_tracing(config.verbose);

    if let Err(e) = run(args.command, config).await {
        eprintln!("{} {}", "Error:".red(), e.message());
        if let Some(status) = e.status() {
            eprintln!("{}", format!("  status: {}", status).dimmed());
        }
        if let Some(details) = e.details() {
            eprintln!("{}", format!("  details: {}", details).dimmed());
        }
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "pantry_admin=debug" } else { "pantry_admin=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command, config: Config) -> pantry_admin::Result<()> {
    let store: Arc<dyn TokenStore> = match &config.storage_dir {
        Some(dir) => Arc::new(FilesystemTokenStore::with_dir(dir)),
        None => Arc::new(FilesystemTokenStore::new()?),
    };

    let client = ApiClient::builder(config.client, store)
        .coalesce_refresh(config.coalesce_refresh)
        .mirror_cookie(config.mirror_cookie)
        .build()?;
    client.tokens().load().await?;

    let mut events = client.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Terminated { reason } = event {
                eprintln!(
                    "{}",
                    format!("Session ended ({}). Run `pantry-admin login` to sign in again.", reason)
                        .yellow()
                );
            }
        }
    });

    let result = dispatch(&client, command).await;
    // Dropping the client closes the channel so the watcher drains and exits.
    drop(client);
    let _ = watcher.await;
    result
}

async fn dispatch(client: &ApiClient, command: Command) -> pantry_admin::Result<()> {
    match command {
        Command::Login { email, password } => {
            let outcome = client.login(&email, &password).await?;
            println!("{}", format!("Signed in as {}", email).green());
            if let Some(expires_at) = outcome.expires_at {
                println!("{}", format!("Token expires at {}", expires_at.to_rfc3339()).dimmed());
            }
            if let Some(user) = outcome.user {
                print_json(&user);
            }
        }
        Command::Logout => {
            client.logout().await?;
            println!("{}", "Signed out.".green());
        }
        Command::Whoami => {
            let profile: Value = client.fetch_profile().await?;
            print_json(&profile);
        }
        Command::Status => {
            let tokens = client.tokens();
            let state = tokens.state().await;
            let label = match state {
                TokenState::Valid => state.to_string().green(),
                TokenState::Expired => state.to_string().yellow(),
                TokenState::NoToken => state.to_string().red(),
            };
            println!("API:           {}", client.base_url());
            println!("Access token:  {}", label);
            match tokens.expiry().await {
                Some(expiry) => println!("Expires at:    {}", expiry.to_rfc3339()),
                None if state == TokenState::Valid => println!("Expires at:    unknown"),
                None => {}
            }
            let refresh = if tokens.refresh_token()?.is_some() { "stored" } else { "none" };
            println!("Refresh token: {}", refresh);
        }
        Command::Request { method, path, data } => {
            let body = data.map(|raw| serde_json::from_str::<Value>(&raw)).transpose()?;
            let response: Value = client
                .send(method, &path, body, RequestOptions::default())
                .await?;
            print_json(&response);
        }
        Command::Clear => {
            client.tokens().clear_session().await?;
            println!("{}", "Local session cleared.".green());
        }
    }
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", value),
    }
}
