mod api;
mod defaults;
mod session;
mod validation;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use api::ApiConfig;
pub use defaults::{DEFAULT_API_KEY_HEADER, DEFAULT_API_URL, DEFAULT_API_VERSION};
pub use session::SessionConfig;
pub use validation::{build_base_url, expand_env_var_in_string, expand_env_vars};

/// Everything the HTTP client needs at construction time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `{API_URL}/api/{API_VERSION}`, without a trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub api_key_header: String,
    pub timeout: Duration,
    pub default_headers: HashMap<String, String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            timeout: Duration::from_secs(defaults::default_timeout_secs()),
            default_headers: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}

/// Values given on the command line; these win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub verbose: bool,
}

pub struct Config {
    pub client: ClientConfig,
    pub storage_dir: Option<PathBuf>,
    pub coalesce_refresh: bool,
    pub mirror_cookie: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JsonConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env_and_args(overrides: &ConfigOverrides) -> Result<Self> {
        let json_config = JsonConfig::load()?;
        Self::resolve(overrides, |name| env::var(name).ok(), json_config)
    }

    /// Layer the sources: CLI overrides > environment > config file > defaults.
    pub fn resolve(
        overrides: &ConfigOverrides,
        env_lookup: impl Fn(&str) -> Option<String>,
        json_config: JsonConfig,
    ) -> Result<Self> {
        // The API key is only ever read from the environment.
        let api_key = env_lookup("PANTRY_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("PANTRY_API_KEY environment variable not set")?;

        let api_url = overrides
            .api_url
            .clone()
            .or_else(|| env_lookup("PANTRY_API_URL"))
            .or(json_config.api.url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            bail!("API URL must start with http:// or https://: {}", api_url);
        }

        let api_version = env_lookup("PANTRY_API_VERSION")
            .or(json_config.api.version.clone())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let timeout_secs = match env_lookup("PANTRY_API_TIMEOUT") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("PANTRY_API_TIMEOUT is not a number: {}", raw))?,
            None => json_config
                .api
                .timeout_secs
                .unwrap_or_else(defaults::default_timeout_secs),
        };
        if timeout_secs == 0 {
            bail!("Request timeout must be at least one second");
        }

        let verbose = overrides.verbose
            || env_lookup("PANTRY_VERBOSE")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .or(json_config.session.verbose)
                .unwrap_or(false);

        let client = ClientConfig {
            base_url: build_base_url(&api_url, &api_version),
            api_key,
            api_key_header: json_config
                .api
                .api_key_header
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            default_headers: expand_env_vars(&json_config.api.default_headers),
        };

        Ok(Config {
            client,
            storage_dir: json_config
                .session
                .storage_dir
                .as_deref()
                .map(expand_env_var_in_string)
                .map(PathBuf::from),
            coalesce_refresh: json_config.session.coalesce_refresh,
            mirror_cookie: json_config.session.mirror_cookie,
            verbose,
        })
    }
}

impl JsonConfig {
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(JsonConfig::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config file: {}", path.display()))
        }
    }

    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".pantry-admin.yaml"),
            PathBuf::from(".pantry-admin.yml"),
            PathBuf::from(".pantry-admin.json"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let config_dir = home_dir.join(".config").join("pantry-admin");
            paths.push(config_dir.join("pantry-admin.yaml"));
            paths.push(config_dir.join("pantry-admin.yml"));
            paths.push(config_dir.join("pantry-admin.json"));
        }

        paths
    }
}
