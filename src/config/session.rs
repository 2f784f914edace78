use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    default_coalesce_refresh, default_mirror_cookie, is_default_coalesce_refresh,
    is_default_mirror_cookie,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Directory holding `session.json`; the user cache directory when unset.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,

    /// Share one in-flight refresh between requests that hit 401 together.
    #[serde(default = "default_coalesce_refresh")]
    #[serde(skip_serializing_if = "is_default_coalesce_refresh")]
    pub coalesce_refresh: bool,

    #[serde(default = "default_mirror_cookie")]
    #[serde(skip_serializing_if = "is_default_mirror_cookie")]
    pub mirror_cookie: bool,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            coalesce_refresh: default_coalesce_refresh(),
            mirror_cookie: default_mirror_cookie(),
            verbose: None,
        }
    }
}
