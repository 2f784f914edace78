use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub api_key_header: Option<String>,
    /// Extra headers sent with every request. Values may use `${VAR}`.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}
