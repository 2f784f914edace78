use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern is valid"))
}

/// Expand environment variables in a string using ${VAR_NAME} syntax.
/// Unset variables are left as written.
pub fn expand_env_var_in_string(value: &str) -> String {
    env_var_pattern()
        .replace_all(value, |cap: &regex::Captures<'_>| {
            env::var(&cap[1]).unwrap_or_else(|_| cap[0].to_string())
        })
        .into_owned()
}

pub fn expand_env_vars(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| (key.clone(), expand_env_var_in_string(value)))
        .collect()
}

/// Join the API origin and version into `{url}/api/{version}`.
///
/// Accepts an origin that already ends in `/api` or `/api/{version}`.
pub fn build_base_url(url: &str, version: &str) -> String {
    let url = url.trim_end_matches('/');
    let version = version.trim_matches('/');
    let versioned = format!("/api/{}", version);

    if url.ends_with(&versioned) {
        url.to_string()
    } else if url.ends_with("/api") {
        format!("{}/{}", url, version)
    } else {
        format!("{}{}", url, versioned)
    }
}
