use clap::{Parser, Subcommand};

use crate::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(name = "pantry-admin")]
#[command(about = "Command-line client for the pantry admin API", long_about = None)]
pub struct Args {
    #[arg(
        long = "api-url",
        global = true,
        help = "API origin, e.g. https://admin.example.com (the /api/{version} suffix is added)"
    )]
    pub api_url: Option<String>,

    #[arg(short = 'v', long = "verbose", global = true, help = "Log request and token handling")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PANTRY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user's profile
    Whoami,
    /// Show the stored token state
    Status,
    /// Send a request to an API path, e.g. `request GET /products?page=2`
    Request {
        #[arg(value_parser = parse_method)]
        method: reqwest::Method,
        path: String,
        #[arg(long, short = 'd', help = "JSON request body")]
        data: Option<String>,
    },
    /// Forget the stored session without contacting the server
    Clear,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            verbose: self.verbose,
        }
    }
}

fn parse_method(raw: &str) -> Result<reqwest::Method, String> {
    match raw.to_uppercase().as_str() {
        "GET" => Ok(reqwest::Method::GET),
        "POST" => Ok(reqwest::Method::POST),
        "PUT" => Ok(reqwest::Method::PUT),
        "PATCH" => Ok(reqwest::Method::PATCH),
        "DELETE" => Ok(reqwest::Method::DELETE),
        other => Err(format!("unsupported method: {}", other)),
    }
}
