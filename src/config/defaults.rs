pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";

pub fn default_timeout_secs() -> u64 {
    30
}

pub fn default_coalesce_refresh() -> bool {
    true
}

pub fn default_mirror_cookie() -> bool {
    true
}

pub fn is_default_coalesce_refresh(value: &bool) -> bool {
    *value == default_coalesce_refresh()
}

pub fn is_default_mirror_cookie(value: &bool) -> bool {
    *value == default_mirror_cookie()
}
